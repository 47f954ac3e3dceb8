//! Run summary: row counts, schema and dtype drift, null counts, discovered
//! roles, outcome tallies and warnings. Every cell is a string.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::dataset::ColumnType;
use crate::error::ReconWarning;
use crate::model::SideLabels;
use crate::reconcile::OutcomeCounts;
use crate::roles::Discovery;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryRow {
    pub section: String,
    pub metric: String,
    pub a: String,
    pub b: String,
    pub difference: String,
}

impl SummaryRow {
    fn new(
        section: &str,
        metric: impl Into<String>,
        a: impl Into<String>,
        b: impl Into<String>,
        difference: impl Into<String>,
    ) -> Self {
        Self {
            section: section.to_string(),
            metric: metric.into(),
            a: a.into(),
            b: b.into(),
            difference: difference.into(),
        }
    }
}

pub struct SummaryInput<'a> {
    pub discovery: &'a Discovery,
    pub counts: &'a OutcomeCounts,
    pub key_digests: (&'a str, &'a str),
    pub warnings: &'a [ReconWarning],
    pub labels: &'a SideLabels,
}

fn signed_difference(a: usize, b: usize) -> String {
    (a as i64 - b as i64).to_string()
}

fn same_or_different(same: bool) -> &'static str {
    if same {
        "Same"
    } else {
        "Different"
    }
}

pub fn build_summary(input: &SummaryInput<'_>) -> Vec<SummaryRow> {
    let d = input.discovery;
    let mut rows = Vec::new();

    // ---- Row counts ----
    let (rows_a, rows_b) = (d.a.row_count(), d.b.row_count());
    rows.push(SummaryRow::new(
        "Row Counts",
        "Number of Rows",
        rows_a.to_string(),
        rows_b.to_string(),
        signed_difference(rows_a, rows_b),
    ));

    // ---- Schema ----
    let names_a: BTreeSet<&str> = d.declared_a.iter().map(|(n, _)| n.as_str()).collect();
    let names_b: BTreeSet<&str> = d.declared_b.iter().map(|(n, _)| n.as_str()).collect();
    let join = |names: Vec<&str>| names.join(", ");
    rows.push(SummaryRow::new(
        "Schema Differences",
        format!("Columns Only in {}", input.labels.target),
        join(names_a.difference(&names_b).copied().collect()),
        "",
        "",
    ));
    rows.push(SummaryRow::new(
        "Schema Differences",
        format!("Columns Only in {}", input.labels.source),
        "",
        join(names_b.difference(&names_a).copied().collect()),
        "",
    ));

    let shared: Vec<&str> = names_a.intersection(&names_b).copied().collect();
    for col in &shared {
        let ta = d.declared_a.iter().find(|(n, _)| n == col).map(|(_, t)| *t);
        let tb = d.declared_b.iter().find(|(n, _)| n == col).map(|(_, t)| *t);
        let render = |t: Option<ColumnType>| t.map(|t| t.to_string()).unwrap_or_default();
        rows.push(SummaryRow::new(
            "Data Type Comparison (Shared Columns)",
            *col,
            render(ta),
            render(tb),
            same_or_different(ta == tb),
        ));
    }

    for col in &shared {
        let na = d.a.column(col).map(|c| c.null_count()).unwrap_or(0);
        let nb = d.b.column(col).map(|c| c.null_count()).unwrap_or(0);
        rows.push(SummaryRow::new(
            "Null Count Comparison (Shared Columns)",
            *col,
            na.to_string(),
            nb.to_string(),
            signed_difference(na, nb),
        ));
    }

    // ---- Roles ----
    let schema = &d.schema;
    let date = schema.date_column.clone().unwrap_or_else(|| "(none)".into());
    let measures = schema.measures.join(", ");
    let dimensions = schema.dimensions.join(", ");
    for (metric, value) in [
        ("Date Column", date),
        ("Measures", measures),
        ("Dimensions", dimensions),
        ("Synthetic Dimension", schema.synthetic_dimension.to_string()),
    ] {
        rows.push(SummaryRow::new("Discovered Roles", metric, value.clone(), value, ""));
    }

    // ---- Outcomes ----
    let c = input.counts;
    for (metric, n) in [
        ("Total Keys", c.total_keys),
        ("Match", c.matched),
        ("ValueMismatch", c.value_mismatches),
        ("OnlyInA", c.only_in_a),
        ("OnlyInB", c.only_in_b),
    ] {
        rows.push(SummaryRow::new("Reconciliation Outcomes", metric, n.to_string(), "", ""));
    }
    let (digest_a, digest_b) = input.key_digests;
    rows.push(SummaryRow::new(
        "Reconciliation Outcomes",
        "Comparison Key Digest",
        digest_a,
        digest_b,
        same_or_different(digest_a == digest_b),
    ));

    // ---- Warnings ----
    for w in input.warnings {
        let metric = match w {
            ReconWarning::RoleAmbiguity { .. } => "RoleAmbiguity",
            ReconWarning::ValueCoercion { .. } => "ValueCoercion",
        };
        rows.push(SummaryRow::new("Warnings", metric, w.to_string(), "", ""));
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RolesConfig;
    use crate::dataset::{Column, Dataset, Value};
    use crate::roles::discover;

    fn labels() -> SideLabels {
        SideLabels {
            target: "GCP".into(),
            source: "EDW".into(),
        }
    }

    fn find<'a>(rows: &'a [SummaryRow], section: &str, metric: &str) -> &'a SummaryRow {
        rows.iter()
            .find(|r| r.section == section && r.metric == metric)
            .unwrap_or_else(|| panic!("no row {section} / {metric}"))
    }

    #[test]
    fn sections_and_string_cells() {
        let a = Dataset::new(vec![
            Column::text("region", [Some("east"), Some("west"), None]),
            Column::numeric("amt", [Some(1.0), Some(2.0), Some(3.0)]),
            Column::text("extra", [Some("x"), Some("y"), Some("z")]),
        ])
        .unwrap();
        let b = Dataset::new(vec![
            Column::categorical("region", [Some("east"), Some("west")]),
            Column::new("amt", ColumnType::Numeric, vec![Value::Number(1.0), Value::Text("bad".into())]),
            Column::text("legacy", [Some("q"), Some("r")]),
        ])
        .unwrap();
        let discovery = discover(&a, &b, &RolesConfig::default()).unwrap();
        let counts = OutcomeCounts::default();
        let rows = build_summary(&SummaryInput {
            discovery: &discovery,
            counts: &counts,
            key_digests: ("abc", "abc"),
            warnings: &discovery.warnings,
            labels: &labels(),
        });

        let r = find(&rows, "Row Counts", "Number of Rows");
        assert_eq!((r.a.as_str(), r.b.as_str(), r.difference.as_str()), ("3", "2", "1"));

        assert_eq!(find(&rows, "Schema Differences", "Columns Only in GCP").a, "extra");
        assert_eq!(find(&rows, "Schema Differences", "Columns Only in EDW").b, "legacy");

        let dtype = find(&rows, "Data Type Comparison (Shared Columns)", "region");
        assert_eq!((dtype.a.as_str(), dtype.b.as_str()), ("string", "categorical"));
        assert_eq!(dtype.difference, "Different");

        let nulls = find(&rows, "Null Count Comparison (Shared Columns)", "amt");
        assert_eq!((nulls.a.as_str(), nulls.b.as_str(), nulls.difference.as_str()), ("0", "1", "-1"));

        assert_eq!(find(&rows, "Discovered Roles", "Measures").a, "amt");
        assert_eq!(find(&rows, "Discovered Roles", "Date Column").a, "(none)");
        assert_eq!(find(&rows, "Reconciliation Outcomes", "Comparison Key Digest").difference, "Same");
        assert!(rows.iter().any(|r| r.section == "Warnings" && r.metric == "ValueCoercion"));
        assert!(rows.iter().any(|r| r.section == "Warnings" && r.metric == "RoleAmbiguity"));
    }
}
