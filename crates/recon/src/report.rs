//! Renders a run into seven flat tables. Headers carry the side labels, so
//! a `Target`/`Source` run gets `Target Sum` / `Source Sum` columns.

use serde::Serialize;
use serde_json::{json, Value as Json};

use crate::aggregate::Section;
use crate::dataset::{Dataset, Value};
use crate::distribution::Moments;
use crate::model::{ReconMeta, ReconResult, SideLabels};
use crate::reconcile::annotate;
use crate::roles::SYNTHETIC_DIMENSION;

pub const SUMMARY: &str = "summary";
pub const GRAND_TOTALS: &str = "grand_totals";
pub const TIME_WINDOWS: &str = "time_windows";
pub const MISMATCHES: &str = "mismatches";
pub const ANNOTATED_TARGET: &str = "annotated_target";
pub const PARTITION_CHECKS: &str = "partition_checks";
pub const DISTRIBUTION: &str = "distribution";

/// Output order.
pub const TABLE_NAMES: [&str; 7] = [
    SUMMARY,
    GRAND_TOTALS,
    TIME_WINDOWS,
    MISMATCHES,
    ANNOTATED_TARGET,
    PARTITION_CHECKS,
    DISTRIBUTION,
];

pub const ERROR_STATUS: &str = "ERROR";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Json>>,
}

impl Table {
    fn new(name: &str, columns: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            columns,
            rows: Vec::new(),
        }
    }

    /// Cell by row index and column header.
    pub fn cell(&self, row: usize, column: &str) -> Option<&Json> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row)?.get(idx)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ReconMeta>,
    /// Set when the run failed; the tables are then the fallback set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub has_differences: bool,
    pub tables: Vec<Table>,
}

impl ReconReport {
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }
}

// ---------------------------------------------------------------------------
// Headers
// ---------------------------------------------------------------------------

fn strings(cols: &[&str]) -> Vec<String> {
    cols.iter().map(|c| c.to_string()).collect()
}

fn summary_columns(l: &SideLabels) -> Vec<String> {
    vec![
        "Section".into(),
        "Metric".into(),
        format!("{} Value", l.target),
        format!("{} Value", l.source),
        "Difference".into(),
    ]
}

fn grand_total_columns(l: &SideLabels) -> Vec<String> {
    vec![
        "Measure".into(),
        format!("{} Sum", l.target),
        format!("{} Sum", l.source),
        "Difference".into(),
        "Status".into(),
    ]
}

fn time_window_columns(l: &SideLabels) -> Vec<String> {
    vec![
        "Measure".into(),
        "Window".into(),
        "Period".into(),
        format!("{} Sum", l.target),
        format!("{} Sum", l.source),
        "Difference".into(),
        "Status".into(),
    ]
}

fn partition_columns(l: &SideLabels) -> Vec<String> {
    vec![
        "Period".into(),
        "Measure".into(),
        format!("{} Row Count", l.target),
        format!("{} Row Count", l.source),
        "Row Count Difference".into(),
        format!("{} Sum", l.target),
        format!("{} Sum", l.source),
        "Sum Difference".into(),
        "Status".into(),
    ]
}

fn distribution_columns(l: &SideLabels) -> Vec<String> {
    let mut cols = vec!["Measure".to_string()];
    for stat in ["Mean", "Median", "Std Dev", "Variance"] {
        cols.push(format!("{} {stat}", l.target));
        cols.push(format!("{} {stat}", l.source));
        cols.push(format!("{stat} Difference"));
    }
    cols.extend(strings(&[
        "Drift Test",
        "Drift Statistic",
        "Drift p-value",
        "Drift Pass",
        "PSI Value",
        "PSI Pass",
    ]));
    cols
}

fn mismatch_columns(l: &SideLabels, dimensions: &[&str], measures: &[String]) -> Vec<String> {
    let mut cols = strings(&["comparison_key", "mismatch_type"]);
    cols.extend(dimensions.iter().map(|d| d.to_string()));
    cols.extend(measures.iter().map(|m| format!("{m} ({})", l.target)));
    cols.extend(measures.iter().map(|m| format!("{m} ({})", l.source)));
    cols.extend(measures.iter().map(|m| format!("{m} (Difference)")));
    cols
}

/// A's own columns; the synthetic dimension is internal.
fn visible_columns(ds: &Dataset) -> Vec<&str> {
    ds.column_names()
        .into_iter()
        .filter(|c| *c != SYNTHETIC_DIMENSION)
        .collect()
}

// ---------------------------------------------------------------------------
// Cells
// ---------------------------------------------------------------------------

fn num(v: Option<f64>) -> Json {
    v.map(|v| json!(v)).unwrap_or(Json::Null)
}

fn status(matches: bool) -> Json {
    Json::String(if matches { "Match" } else { "Mismatch" }.into())
}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

pub fn assemble(result: &ReconResult) -> ReconReport {
    let labels = &result.meta.labels;

    let mut summary = Table::new(SUMMARY, summary_columns(labels));
    summary.rows = result
        .summary
        .iter()
        .map(|r| {
            [&r.section, &r.metric, &r.a, &r.b, &r.difference]
                .into_iter()
                .map(|s| Json::String(s.clone()))
                .collect()
        })
        .collect();

    let mut totals = Table::new(GRAND_TOTALS, grand_total_columns(labels));
    totals.rows = result
        .grand_totals
        .iter()
        .map(|t| {
            vec![
                json!(t.measure),
                json!(t.sum_a),
                json!(t.sum_b),
                json!(t.difference),
                status(t.matches),
            ]
        })
        .collect();

    let mut windows = Table::new(TIME_WINDOWS, time_window_columns(labels));
    if let Section::Available(rows) = &result.time_windows {
        windows.rows = rows
            .iter()
            .map(|w| {
                vec![
                    json!(w.measure),
                    json!(w.window.to_string()),
                    json!(w.label),
                    num(w.sum_a),
                    num(w.sum_b),
                    num(w.difference),
                    status(w.matches),
                ]
            })
            .collect();
    }

    let mut partitions = Table::new(PARTITION_CHECKS, partition_columns(labels));
    if let Section::Available(rows) = &result.partitions {
        partitions.rows = rows
            .iter()
            .map(|p| {
                vec![
                    json!(p.period),
                    json!(p.measure),
                    json!(p.rows_a),
                    json!(p.rows_b),
                    json!(p.row_difference),
                    num(p.sum_a),
                    num(p.sum_b),
                    num(p.sum_difference),
                    status(p.matches),
                ]
            })
            .collect();
    }

    let mut distribution = Table::new(DISTRIBUTION, distribution_columns(labels));
    if let Section::Available(rows) = &result.distribution {
        distribution.rows = rows
            .iter()
            .map(|s| {
                let mut row = vec![json!(s.measure)];
                let stats: [(fn(&Moments) -> f64, Option<f64>); 4] = [
                    (|m| m.mean, s.mean_difference()),
                    (|m| m.median, s.median_difference()),
                    (|m| m.std_dev, s.std_dev_difference()),
                    (|m| m.variance, s.variance_difference()),
                ];
                for (get, diff) in stats {
                    row.push(num(s.a.as_ref().map(get)));
                    row.push(num(s.b.as_ref().map(get)));
                    row.push(num(diff));
                }
                row.push(json!(s.drift.method));
                row.push(num(s.drift.statistic));
                row.push(num(s.drift.p_value));
                row.push(json!(s.drift_pass));
                row.push(num(s.psi));
                row.push(json!(s.psi_pass));
                row
            })
            .collect();
    }

    let (mismatches, annotated) = reconciliation_tables(result);

    ReconReport {
        meta: Some(result.meta.clone()),
        error: None,
        has_differences: result.has_differences(),
        tables: vec![
            summary,
            totals,
            windows,
            mismatches,
            annotated,
            partitions,
            distribution,
        ],
    }
}

fn reconciliation_tables(result: &ReconResult) -> (Table, Table) {
    let labels = &result.meta.labels;
    let (a, b) = (&result.target, &result.source);
    let measures = &result.schema.measures;
    let dimensions: Vec<&str> = result
        .schema
        .dimensions
        .iter()
        .map(String::as_str)
        .filter(|d| *d != SYNTHETIC_DIMENSION)
        .collect();

    const MISSING: &Value = &Value::Missing;
    let mut mismatches = Table::new(MISMATCHES, mismatch_columns(labels, &dimensions, measures));
    for record in result.reconciliation.mismatches() {
        let mut row = vec![json!(record.key.to_string()), json!(record.outcome.to_string())];
        // Context from A's row when the key exists there
        for d in &dimensions {
            let value = match (record.row_a, record.row_b) {
                (Some(r), _) => a.value(r, d),
                (None, Some(r)) => b.value(r, d),
                (None, None) => MISSING,
            };
            row.push(value.to_json());
        }
        row.extend(record.measures.iter().map(|m| num(m.a)));
        row.extend(record.measures.iter().map(|m| num(m.b)));
        row.extend(record.measures.iter().map(|m| num(m.difference)));
        mismatches.rows.push(row);
    }

    let columns = visible_columns(a);
    let mut header: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
    header.extend(strings(&["validation_status", "mismatch_details"]));
    let mut annotated = Table::new(ANNOTATED_TARGET, header);
    for (row, (outcome, details)) in annotate(&result.reconciliation, a.row_count())
        .into_iter()
        .enumerate()
    {
        let mut cells: Vec<Json> = columns.iter().map(|c| a.value(row, c).to_json()).collect();
        cells.push(json!(outcome.to_string()));
        cells.push(json!(details));
        annotated.rows.push(cells);
    }

    (mismatches, annotated)
}

// ---------------------------------------------------------------------------
// Failure fallback
// ---------------------------------------------------------------------------

/// The table set produced when a run fails: one ERROR row in the summary,
/// every row of A marked `ERROR`, and every other table empty.
pub fn failure(message: &str, a: &Dataset, labels: &SideLabels) -> ReconReport {
    let mut summary = Table::new(SUMMARY, strings(&["Section", "Message", "Timestamp"]));
    summary.rows.push(vec![
        json!(ERROR_STATUS),
        json!(message),
        json!(chrono::Utc::now().to_rfc3339()),
    ]);

    let columns = visible_columns(a);
    let mut header: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
    header.extend(strings(&["validation_status", "mismatch_details"]));
    let mut annotated = Table::new(ANNOTATED_TARGET, header);
    for row in 0..a.row_count() {
        let mut cells: Vec<Json> = columns.iter().map(|c| a.value(row, c).to_json()).collect();
        cells.push(json!(ERROR_STATUS));
        cells.push(json!(message));
        annotated.rows.push(cells);
    }

    ReconReport {
        meta: None,
        error: Some(message.to_string()),
        has_differences: false,
        tables: vec![
            summary,
            Table::new(GRAND_TOTALS, grand_total_columns(labels)),
            Table::new(TIME_WINDOWS, time_window_columns(labels)),
            Table::new(MISMATCHES, mismatch_columns(labels, &[], &[])),
            annotated,
            Table::new(PARTITION_CHECKS, partition_columns(labels)),
            Table::new(DISTRIBUTION, distribution_columns(labels)),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Column;

    #[test]
    fn failure_report_keeps_every_table() {
        let a = Dataset::new(vec![
            Column::text("region", [Some("east"), Some("west")]),
            Column::numeric("amt", [Some(1.0), None]),
        ])
        .unwrap();
        let report = failure("boom", &a, &SideLabels::default());

        let names: Vec<_> = report.tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, TABLE_NAMES);
        assert_eq!(report.error.as_deref(), Some("boom"));

        let summary = report.table(SUMMARY).unwrap();
        assert_eq!(summary.cell(0, "Section"), Some(&json!("ERROR")));
        assert_eq!(summary.cell(0, "Message"), Some(&json!("boom")));

        let annotated = report.table(ANNOTATED_TARGET).unwrap();
        assert_eq!(annotated.rows.len(), 2);
        assert_eq!(annotated.cell(1, "validation_status"), Some(&json!("ERROR")));
        assert_eq!(annotated.cell(1, "mismatch_details"), Some(&json!("boom")));
        assert_eq!(annotated.cell(1, "amt"), Some(&Json::Null));

        let totals = report.table(GRAND_TOTALS).unwrap();
        assert!(totals.rows.is_empty());
        assert_eq!(totals.columns[1], "Target Sum");
    }

    #[test]
    fn labels_flow_into_headers() {
        let labels = SideLabels {
            target: "GCP".into(),
            source: "EDW".into(),
        };
        assert_eq!(grand_total_columns(&labels)[1..3], ["GCP Sum", "EDW Sum"]);
        let dist = distribution_columns(&labels);
        assert_eq!(dist[1..4], ["GCP Mean", "EDW Mean", "Mean Difference"]);
        assert_eq!(dist.len(), 19);
        let mm = mismatch_columns(&labels, &["region"], &["amt".into()]);
        assert_eq!(mm, ["comparison_key", "mismatch_type", "region", "amt (GCP)", "amt (EDW)", "amt (Difference)"]);
    }
}
