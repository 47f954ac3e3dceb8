//! Grand totals, to-date windows, monthly breakdown and partition checks.
//!
//! These operate on raw column values grouped by date. They never look at
//! comparison keys.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::Serialize;

use crate::config::ToleranceConfig;
use crate::dataset::Dataset;
use crate::roles::SharedSchema;
use crate::windows::{to_date_windows, PartitionFrequency, Period, WindowKind};

/// A result that may be unavailable for this pair of datasets.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Section<T> {
    Available(T),
    Unavailable { reason: String },
}

impl<T> Section<T> {
    pub fn available(&self) -> Option<&T> {
        match self {
            Self::Available(t) => Some(t),
            Self::Unavailable { .. } => None,
        }
    }

    pub fn unavailable_reason(&self) -> Option<&str> {
        match self {
            Self::Available(_) => None,
            Self::Unavailable { reason } => Some(reason),
        }
    }
}

// ---------------------------------------------------------------------------
// Result rows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrandTotal {
    pub measure: String,
    pub sum_a: f64,
    pub sum_b: f64,
    pub difference: f64,
    pub matches: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowSum {
    pub measure: String,
    pub window: WindowKind,
    pub label: String,
    /// `None` when the side has no rows in the period (monthly breakdown only).
    pub sum_a: Option<f64>,
    pub sum_b: Option<f64>,
    pub difference: Option<f64>,
    pub matches: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartitionCheck {
    pub period: String,
    pub measure: String,
    pub rows_a: usize,
    pub rows_b: usize,
    pub row_difference: i64,
    pub sum_a: Option<f64>,
    pub sum_b: Option<f64>,
    pub sum_difference: Option<f64>,
    pub matches: bool,
}

// ---------------------------------------------------------------------------
// Grand totals
// ---------------------------------------------------------------------------

pub fn grand_totals(
    a: &Dataset,
    b: &Dataset,
    measures: &[String],
    tolerance: &ToleranceConfig,
) -> Vec<GrandTotal> {
    measures
        .par_iter()
        .map(|m| {
            let sum_a = column_sum(a, m, |_| true);
            let sum_b = column_sum(b, m, |_| true);
            GrandTotal {
                measure: m.clone(),
                sum_a,
                sum_b,
                difference: sum_a - sum_b,
                matches: tolerance.is_close(Some(sum_a), Some(sum_b)),
            }
        })
        .collect()
}

/// Sum of the present values of `measure` in rows accepted by `keep`.
fn column_sum(ds: &Dataset, measure: &str, keep: impl Fn(usize) -> bool) -> f64 {
    ds.column(measure)
        .map(|c| {
            c.values
                .iter()
                .enumerate()
                .filter(|(row, _)| keep(*row))
                .filter_map(|(_, v)| v.as_f64())
                .sum()
        })
        .unwrap_or(0.0)
}

fn row_dates(ds: &Dataset, date_column: &str) -> Vec<Option<NaiveDate>> {
    (0..ds.row_count())
        .map(|row| ds.value(row, date_column).as_timestamp().map(|ts| ts.date()))
        .collect()
}

fn prerequisites<'a>(schema: &'a SharedSchema) -> Result<&'a str, String> {
    let date = schema
        .date_column
        .as_deref()
        .ok_or_else(|| "no shared date column".to_string())?;
    if schema.measures.is_empty() {
        return Err("no shared measure columns".into());
    }
    Ok(date)
}

// ---------------------------------------------------------------------------
// Time windows
// ---------------------------------------------------------------------------

/// Daily/MTD/QTD/YTD sums ending at the latest date of either side, then a
/// per-month breakdown over every month present on either side. Rows come out
/// window-major, measures in schema order within each window.
pub fn time_windows(
    a: &Dataset,
    b: &Dataset,
    schema: &SharedSchema,
    tolerance: &ToleranceConfig,
) -> Section<Vec<WindowSum>> {
    let date = match prerequisites(schema) {
        Ok(d) => d,
        Err(reason) => return Section::Unavailable { reason },
    };

    let dates_a = row_dates(a, date);
    let dates_b = row_dates(b, date);
    let Some(latest) = dates_a.iter().chain(&dates_b).flatten().max().copied() else {
        return Section::Unavailable {
            reason: format!("date column '{date}' has no values"),
        };
    };
    log::debug!("latest date across both datasets: {latest}");

    let windows = to_date_windows(latest);
    let measures = &schema.measures;
    let (monthly_a, monthly_b) = rayon::join(
        || totals_by_period(a, date, measures, PartitionFrequency::Monthly),
        || totals_by_period(b, date, measures, PartitionFrequency::Monthly),
    );
    let months: BTreeSet<&Period> = monthly_a.keys().chain(monthly_b.keys()).collect();

    let per_measure: Vec<Vec<WindowSum>> = measures
        .par_iter()
        .enumerate()
        .map(|(i, m)| {
            let mut rows = Vec::with_capacity(windows.len() + months.len());
            for w in &windows {
                let in_window = |dates: &[Option<NaiveDate>], row: usize| {
                    dates[row].map(|d| w.contains(d)).unwrap_or(false)
                };
                let sum_a = column_sum(a, m, |row| in_window(&dates_a[..], row));
                let sum_b = column_sum(b, m, |row| in_window(&dates_b[..], row));
                rows.push(window_sum(m, w.kind, &w.label, Some(sum_a), Some(sum_b), tolerance));
            }
            for month in &months {
                // A month absent from one side has no sum there
                let sum_a = monthly_a.get(*month).map(|t| t.sums[i]);
                let sum_b = monthly_b.get(*month).map(|t| t.sums[i]);
                rows.push(window_sum(m, WindowKind::Monthly, &month.label, sum_a, sum_b, tolerance));
            }
            rows
        })
        .collect();

    Section::Available(transpose(per_measure))
}

fn window_sum(
    measure: &str,
    window: WindowKind,
    label: &str,
    sum_a: Option<f64>,
    sum_b: Option<f64>,
    tolerance: &ToleranceConfig,
) -> WindowSum {
    WindowSum {
        measure: measure.to_string(),
        window,
        label: label.to_string(),
        sum_a,
        sum_b,
        difference: sum_a.zip(sum_b).map(|(x, y)| x - y),
        matches: tolerance.is_close(sum_a, sum_b),
    }
}

/// `[[m1w1, m1w2], [m2w1, m2w2]]` → `[m1w1, m2w1, m1w2, m2w2]`.
fn transpose<T>(per_measure: Vec<Vec<T>>) -> Vec<T> {
    let width = per_measure.first().map(Vec::len).unwrap_or(0);
    let mut iters: Vec<_> = per_measure.into_iter().map(Vec::into_iter).collect();
    let mut out = Vec::with_capacity(width * iters.len());
    for _ in 0..width {
        for it in iters.iter_mut() {
            out.extend(it.next());
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Partition checks
// ---------------------------------------------------------------------------

/// Row count and per-measure sums of one side, per period.
struct PeriodTotals {
    rows: usize,
    sums: Vec<f64>,
}

fn totals_by_period(
    ds: &Dataset,
    date: &str,
    measures: &[String],
    frequency: PartitionFrequency,
) -> BTreeMap<Period, PeriodTotals> {
    let columns: Vec<_> = measures.iter().map(|m| ds.column(m)).collect();
    let mut out: BTreeMap<Period, PeriodTotals> = BTreeMap::new();
    for (row, d) in row_dates(ds, date).into_iter().enumerate() {
        // Rows without a date belong to no partition
        let Some(d) = d else { continue };
        let totals = out.entry(frequency.period_of(d)).or_insert_with(|| PeriodTotals {
            rows: 0,
            sums: vec![0.0; measures.len()],
        });
        totals.rows += 1;
        for (i, col) in columns.iter().enumerate() {
            if let Some(v) = col.and_then(|c| c.values.get(row)).and_then(|v| v.as_f64()) {
                totals.sums[i] += v;
            }
        }
    }
    out
}

/// Row counts and sums per period and measure. A row matches only when both
/// the sums are close and the row counts are equal.
pub fn partition_checks(
    a: &Dataset,
    b: &Dataset,
    schema: &SharedSchema,
    frequency: PartitionFrequency,
    tolerance: &ToleranceConfig,
) -> Section<Vec<PartitionCheck>> {
    let date = match prerequisites(schema) {
        Ok(d) => d,
        Err(reason) => return Section::Unavailable { reason },
    };
    let measures = &schema.measures;

    let (totals_a, totals_b) = rayon::join(
        || totals_by_period(a, date, measures, frequency),
        || totals_by_period(b, date, measures, frequency),
    );
    let periods: BTreeSet<&Period> = totals_a.keys().chain(totals_b.keys()).collect();
    log::debug!("{} {frequency} partitions", periods.len());

    let mut checks = Vec::with_capacity(periods.len() * measures.len());
    for period in periods {
        let ta = totals_a.get(period);
        let tb = totals_b.get(period);
        let rows_a = ta.map(|t| t.rows).unwrap_or(0);
        let rows_b = tb.map(|t| t.rows).unwrap_or(0);
        for (i, m) in measures.iter().enumerate() {
            let sum_a = ta.map(|t| t.sums[i]);
            let sum_b = tb.map(|t| t.sums[i]);
            checks.push(PartitionCheck {
                period: period.label.clone(),
                measure: m.clone(),
                rows_a,
                rows_b,
                row_difference: rows_a as i64 - rows_b as i64,
                sum_a,
                sum_b,
                sum_difference: sum_a.zip(sum_b).map(|(x, y)| x - y),
                matches: tolerance.is_close(sum_a, sum_b) && rows_a == rows_b,
            });
        }
    }
    Section::Available(checks)
}
