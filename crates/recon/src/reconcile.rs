use std::collections::BTreeSet;
use std::fmt;

use rayon::prelude::*;
use serde::Serialize;

use crate::config::ToleranceConfig;
use crate::dataset::{format_number, Dataset};
use crate::keys::{ComparisonKey, KeyedDataset};

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Outcome {
    Match,
    OnlyInA,
    OnlyInB,
    ValueMismatch,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Match => write!(f, "Match"),
            Self::OnlyInA => write!(f, "OnlyInA"),
            Self::OnlyInB => write!(f, "OnlyInB"),
            Self::ValueMismatch => write!(f, "ValueMismatch"),
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasureComparison {
    pub measure: String,
    pub a: Option<f64>,
    pub b: Option<f64>,
    /// `a - b`; `None` unless both sides have a value.
    pub difference: Option<f64>,
    pub matches: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationRecord {
    pub key: ComparisonKey,
    pub in_a: bool,
    pub in_b: bool,
    #[serde(skip)]
    pub row_a: Option<usize>,
    #[serde(skip)]
    pub row_b: Option<usize>,
    pub measures: Vec<MeasureComparison>,
    pub outcome: Outcome,
}

impl ReconciliationRecord {
    pub fn differing(&self) -> impl Iterator<Item = &MeasureComparison> {
        self.measures.iter().filter(|m| !m.matches)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    pub total_keys: usize,
    pub matched: usize,
    pub value_mismatches: usize,
    pub only_in_a: usize,
    pub only_in_b: usize,
}

impl OutcomeCounts {
    pub fn tally(records: &[ReconciliationRecord]) -> Self {
        let mut counts = Self {
            total_keys: records.len(),
            ..Self::default()
        };
        for r in records {
            match r.outcome {
                Outcome::Match => counts.matched += 1,
                Outcome::ValueMismatch => counts.value_mismatches += 1,
                Outcome::OnlyInA => counts.only_in_a += 1,
                Outcome::OnlyInB => counts.only_in_b += 1,
            }
        }
        counts
    }

    pub fn all_matched(&self) -> bool {
        self.matched == self.total_keys
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Reconciliation {
    pub records: Vec<ReconciliationRecord>,
    pub counts: OutcomeCounts,
}

impl Reconciliation {
    pub fn mismatches(&self) -> impl Iterator<Item = &ReconciliationRecord> {
        self.records.iter().filter(|r| r.outcome != Outcome::Match)
    }
}

// ---------------------------------------------------------------------------
// Outer join
// ---------------------------------------------------------------------------

/// Full outer join of both key sets. One record per distinct key, in
/// ascending key order.
pub fn reconcile(
    a: &Dataset,
    keys_a: &KeyedDataset,
    b: &Dataset,
    keys_b: &KeyedDataset,
    measures: &[String],
    tolerance: &ToleranceConfig,
) -> Reconciliation {
    let union: Vec<&ComparisonKey> = keys_a
        .sorted_keys()
        .chain(keys_b.sorted_keys())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let records: Vec<ReconciliationRecord> = union
        .into_par_iter()
        .map(|key| {
            let row_a = keys_a.row_of(key);
            let row_b = keys_b.row_of(key);
            let comparisons: Vec<MeasureComparison> = measures
                .iter()
                .map(|m| {
                    let va = row_a.and_then(|r| a.value(r, m).as_f64());
                    let vb = row_b.and_then(|r| b.value(r, m).as_f64());
                    MeasureComparison {
                        measure: m.clone(),
                        a: va,
                        b: vb,
                        difference: va.zip(vb).map(|(x, y)| x - y),
                        matches: tolerance.is_close(va, vb),
                    }
                })
                .collect();

            // Membership decides first; missing values are legitimate data
            let outcome = match (row_a.is_some(), row_b.is_some()) {
                (true, false) => Outcome::OnlyInA,
                (false, true) => Outcome::OnlyInB,
                _ if comparisons.iter().any(|c| !c.matches) => Outcome::ValueMismatch,
                _ => Outcome::Match,
            };

            ReconciliationRecord {
                key: key.clone(),
                in_a: row_a.is_some(),
                in_b: row_b.is_some(),
                row_a,
                row_b,
                measures: comparisons,
                outcome,
            }
        })
        .collect();

    let counts = OutcomeCounts::tally(&records);
    log::info!(
        "reconciled {} keys: {} matched, {} value mismatches, {} only in A, {} only in B",
        counts.total_keys,
        counts.matched,
        counts.value_mismatches,
        counts.only_in_a,
        counts.only_in_b
    );
    Reconciliation { records, counts }
}

// ---------------------------------------------------------------------------
// Descriptions
// ---------------------------------------------------------------------------

/// `measure=<a>|<b> (Δ=<a-b>)` for every differing measure, joined by `; `.
/// Empty unless the record is a value mismatch.
pub fn describe_mismatch(record: &ReconciliationRecord) -> String {
    if record.outcome != Outcome::ValueMismatch {
        return String::new();
    }
    record
        .differing()
        .map(|m| {
            format!(
                "{}={}|{} (Δ={})",
                m.measure,
                render(m.a),
                render(m.b),
                render(m.difference)
            )
        })
        .collect::<Vec<_>>()
        .join("; ")
}

fn render(v: Option<f64>) -> String {
    v.map(format_number).unwrap_or_else(|| "NA".into())
}

/// Outcome for every row of A, in A's row order.
pub fn annotate(recon: &Reconciliation, rows_in_a: usize) -> Vec<(Outcome, String)> {
    let mut out = vec![(Outcome::Match, String::new()); rows_in_a];
    for record in &recon.records {
        if let Some(row) = record.row_a {
            if let Some(slot) = out.get_mut(row) {
                *slot = (record.outcome, describe_mismatch(record));
            }
        }
    }
    out
}
