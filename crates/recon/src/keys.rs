//! Deterministic per-row comparison keys.
//!
//! A key is `dimension_hash#sequence`. The hash joins every shared dimension
//! value of the row; the sequence ranks rows that share a hash by their full
//! dimension values, then their measure values, then original row position.
//! The date renders at day granularity in the hash, so same-day rows rank by
//! time of day first. Exact duplicate dimension combinations pair up by
//! measure rank on both sides.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use ordered_float::OrderedFloat;
use rayon::prelude::*;
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::dataset::{format_number, Column, Dataset, Value};
use crate::roles::SharedSchema;

/// Stands in for a missing dimension value. No escaped real value can equal it.
pub const MISSING_TOKEN: &str = "\\N";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComparisonKey {
    pub dimension_hash: String,
    pub sequence: usize,
}

impl fmt::Display for ComparisonKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.dimension_hash, self.sequence)
    }
}

impl Serialize for ComparisonKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Keys of one dataset: `keys[row]` plus a lookup from key to row.
#[derive(Debug, Clone, Default)]
pub struct KeyedDataset {
    keys: Vec<ComparisonKey>,
    index: BTreeMap<ComparisonKey, usize>,
}

impl KeyedDataset {
    /// Key of a row, by original row position.
    pub fn key(&self, row: usize) -> Option<&ComparisonKey> {
        self.keys.get(row)
    }

    pub fn keys(&self) -> &[ComparisonKey] {
        &self.keys
    }

    pub fn row_of(&self, key: &ComparisonKey) -> Option<usize> {
        self.index.get(key).copied()
    }

    pub fn contains(&self, key: &ComparisonKey) -> bool {
        self.index.contains_key(key)
    }

    /// Keys in ascending order.
    pub fn sorted_keys(&self) -> impl Iterator<Item = &ComparisonKey> {
        self.index.keys()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

pub fn build_keys(ds: &Dataset, schema: &SharedSchema) -> KeyedDataset {
    let dims: Vec<(Option<&Column>, bool)> = schema
        .dimensions
        .iter()
        .map(|d| (ds.column(d), schema.date_column.as_deref() == Some(d.as_str())))
        .collect();
    let measures: Vec<&Column> = schema.measures.iter().filter_map(|m| ds.column(m)).collect();

    let hashes: Vec<String> = (0..ds.row_count())
        .into_par_iter()
        .map(|row| dimension_hash(&dims, row))
        .collect();

    // Rows arrive in original order, so each group starts out position-sorted
    let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (row, hash) in hashes.iter().enumerate() {
        groups.entry(hash.as_str()).or_default().push(row);
    }

    let mut keys: Vec<Option<ComparisonKey>> = vec![None; hashes.len()];
    for (hash, mut rows) in groups {
        rows.sort_by(|&x, &y| {
            compare_dimensions(&dims, x, y)
                .then_with(|| compare_measures(&measures, x, y))
                .then(x.cmp(&y))
        });
        for (sequence, row) in rows.into_iter().enumerate() {
            keys[row] = Some(ComparisonKey {
                dimension_hash: hash.to_string(),
                sequence,
            });
        }
    }

    let keys: Vec<ComparisonKey> = keys.into_iter().flatten().collect();
    let index = keys.iter().cloned().enumerate().map(|(row, k)| (k, row)).collect();
    KeyedDataset { keys, index }
}

fn dimension_hash(dims: &[(Option<&Column>, bool)], row: usize) -> String {
    const MISSING: &Value = &Value::Missing;
    let mut parts = Vec::with_capacity(dims.len());
    for (col, is_date) in dims {
        let value = col.and_then(|c| c.values.get(row)).unwrap_or(MISSING);
        parts.push(render_dimension(value, *is_date));
    }
    parts.join("|")
}

fn render_dimension(value: &Value, is_date: bool) -> String {
    match value {
        v if v.is_missing() => MISSING_TOKEN.to_string(),
        Value::Timestamp(ts) if is_date => ts.format("%Y-%m-%d").to_string(),
        Value::Timestamp(ts) => ts.format("%Y-%m-%d %H:%M:%S").to_string(),
        Value::Number(n) => escape(&format_number(*n)),
        Value::Bool(b) => b.to_string(),
        Value::Text(s) => escape(s),
        Value::Missing => MISSING_TOKEN.to_string(),
    }
}

fn escape(s: &str) -> String {
    if !s.contains(['\\', '|']) {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len() + 2);
    for c in s.chars() {
        if c == '\\' || c == '|' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Raw dimension values in schema order. Within one hash group only the date
/// column can still differ (by time of day), but every column is compared.
fn compare_dimensions(dims: &[(Option<&Column>, bool)], x: usize, y: usize) -> Ordering {
    for (col, _) in dims {
        let Some(col) = col else { continue };
        let ord = match (col.values.get(x), col.values.get(y)) {
            (Some(a), Some(b)) => compare_values(a, b),
            _ => Ordering::Equal,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Missing sorts last; values of different kinds fall back to their rendering.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a.is_missing(), b.is_missing()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        (false, false) => {}
    }
    match (a, b) {
        (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => OrderedFloat(*a).cmp(&OrderedFloat(*b)),
        (Value::Text(a), Value::Text(b)) => a.cmp(b),
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (a, b) => render_dimension(a, false).cmp(&render_dimension(b, false)),
    }
}

/// Measure-by-measure comparison; missing sorts after every number.
fn compare_measures(measures: &[&Column], x: usize, y: usize) -> Ordering {
    for col in measures {
        let a = col.values.get(x).and_then(Value::as_f64).map(OrderedFloat);
        let b = col.values.get(y).and_then(Value::as_f64).map(OrderedFloat);
        let ord = match (a, b) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// SHA-256 over the keys in row order, one per line.
pub fn key_digest(keyed: &KeyedDataset) -> String {
    let mut hasher = Sha256::new();
    for key in keyed.keys() {
        hasher.update(key.to_string().as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn schema(dims: &[&str], measures: &[&str], date: Option<&str>) -> SharedSchema {
        SharedSchema {
            date_column: date.map(String::from),
            measures: measures.iter().map(|s| s.to_string()).collect(),
            dimensions: dims.iter().map(|s| s.to_string()).collect(),
            synthetic_dimension: false,
        }
    }

    fn rendered(keyed: &KeyedDataset) -> Vec<String> {
        keyed.keys().iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn duplicates_ranked_by_measure_then_position() {
        let ds = Dataset::new(vec![
            Column::text("dim", [Some("x"), Some("x"), Some("y"), Some("x")]),
            Column::numeric("val", [Some(6.0), Some(5.0), Some(1.0), Some(5.0)]),
        ])
        .unwrap();
        let keyed = build_keys(&ds, &schema(&["dim"], &["val"], None));
        assert_eq!(rendered(&keyed), vec!["x#2", "x#0", "y#0", "x#1"]);
        assert_eq!(keyed.row_of(&ComparisonKey { dimension_hash: "x".into(), sequence: 1 }), Some(3));
    }

    #[test]
    fn missing_measures_sort_last() {
        let ds = Dataset::new(vec![
            Column::text("dim", [Some("x"), Some("x"), Some("x")]),
            Column::numeric("val", [None, Some(9.0), Some(-0.0)]),
        ])
        .unwrap();
        let keyed = build_keys(&ds, &schema(&["dim"], &["val"], None));
        assert_eq!(rendered(&keyed), vec!["x#2", "x#1", "x#0"]);
    }

    #[test]
    fn missing_is_distinct_from_empty_and_escaped() {
        let ds = Dataset::new(vec![
            Column::text("a", [None, Some(""), Some("\\N"), Some("p|q")]),
            Column::numeric("n", [Some(1.0), Some(2.5), None, Some(-0.0)]),
        ])
        .unwrap();
        let keyed = build_keys(&ds, &schema(&["a", "n"], &[], None));
        assert_eq!(
            rendered(&keyed),
            vec!["\\N|1#0", "|2.5#0", "\\\\N|\\N#0", "p\\|q|0#0"]
        );
    }

    #[test]
    fn date_dimension_renders_day() {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap().and_hms_opt(17, 45, 0).unwrap();
        let ds = Dataset::new(vec![
            Column::timestamps("d", [Some(ts)]),
            Column::timestamps("loaded_at", [Some(ts)]),
        ])
        .unwrap();
        let keyed = build_keys(&ds, &schema(&["d", "loaded_at"], &[], Some("d")));
        assert_eq!(rendered(&keyed), vec!["2024-03-15|2024-03-15 17:45:00#0"]);
    }

    #[test]
    fn same_day_rows_rank_by_time_before_measure() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let nine = day.and_hms_opt(9, 0, 0).unwrap();
        let ten = day.and_hms_opt(10, 0, 0).unwrap();
        let s = schema(&["d", "dim"], &["val"], Some("d"));

        let a = Dataset::new(vec![
            Column::timestamps("d", [Some(nine), Some(ten)]),
            Column::text("dim", [Some("x"), Some("x")]),
            Column::numeric("val", [Some(5.0), Some(6.0)]),
        ])
        .unwrap();
        let b = Dataset::new(vec![
            Column::timestamps("d", [Some(ten), Some(nine)]),
            Column::text("dim", [Some("x"), Some("x")]),
            Column::numeric("val", [Some(5.0), Some(6.0)]),
        ])
        .unwrap();

        assert_eq!(rendered(&build_keys(&a, &s)), vec!["2024-01-01|x#0", "2024-01-01|x#1"]);
        assert_eq!(rendered(&build_keys(&b, &s)), vec!["2024-01-01|x#1", "2024-01-01|x#0"]);
    }

    #[test]
    fn compare_values_puts_missing_last() {
        assert_eq!(compare_values(&Value::Missing, &Value::Number(1.0)), Ordering::Greater);
        assert_eq!(compare_values(&Value::Number(f64::NAN), &Value::Missing), Ordering::Equal);
        assert_eq!(compare_values(&Value::Number(-2.0), &Value::Number(1.0)), Ordering::Less);
    }

    #[test]
    fn escape_leaves_plain_text_alone() {
        assert_eq!(escape("plain"), "plain");
        assert_eq!(escape("a\\b"), "a\\\\b");
    }

    #[test]
    fn digest_is_stable() {
        let ds = Dataset::new(vec![Column::text("dim", [Some("x"), Some("x")])]).unwrap();
        let s = schema(&["dim"], &[], None);
        let first = key_digest(&build_keys(&ds, &s));
        let second = key_digest(&build_keys(&ds, &s));
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
    }
}
