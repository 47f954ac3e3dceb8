//! Text → typed value parsing shared by role discovery and the CSV loader.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

// ---------------------------------------------------------------------------
// Numbers
// ---------------------------------------------------------------------------

/// Parse a financial number string:
/// - Strip `$`, commas, whitespace
/// - Handle `(123.45)` → `-123.45`
/// - Returns None if non-numeric characters remain after stripping
pub fn parse_financial_number(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }

    let (is_negative, inner) = if trimmed.starts_with('(') && trimmed.ends_with(')') {
        (true, &trimmed[1..trimmed.len() - 1])
    } else {
        (false, trimmed)
    };

    let cleaned: String = inner
        .chars()
        .filter(|c| *c != '$' && *c != ',' && !c.is_whitespace())
        .collect();

    if cleaned.is_empty() {
        return None;
    }

    // Digits, one exponent, and a sign either leading or right after the exponent
    let mut prev = None;
    for (i, c) in cleaned.chars().enumerate() {
        match c {
            '0'..='9' | '.' => {}
            'e' | 'E' if i > 0 => {}
            '-' | '+' if (i == 0 && !is_negative) || matches!(prev, Some('e' | 'E')) => {}
            _ => return None,
        }
        prev = Some(c);
    }

    let value: f64 = cleaned.parse().ok()?;
    if value.is_nan() {
        return None;
    }
    Some(if is_negative { -value } else { value })
}

// ---------------------------------------------------------------------------
// Booleans
// ---------------------------------------------------------------------------

pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%Y%m%d"];

/// Parse a timestamp, dropping any UTC offset (wall-clock time is kept).
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        // %Y%m%d would also accept long digit runs; require the exact width
        if *fmt == "%Y%m%d" && (s.len() != 8 || !s.bytes().all(|b| b.is_ascii_digit())) {
            continue;
        }
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}
