use serde::Serialize;

use crate::aggregate::{GrandTotal, PartitionCheck, Section, WindowSum};
use crate::config::InputsConfig;
use crate::dataset::Dataset;
use crate::distribution::DistributionStats;
use crate::error::ReconWarning;
use crate::reconcile::{OutcomeCounts, Reconciliation};
use crate::roles::SharedSchema;
use crate::summary::SummaryRow;

// ---------------------------------------------------------------------------
// Labels
// ---------------------------------------------------------------------------

/// Display names of both sides, used in table headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SideLabels {
    pub target: String,
    pub source: String,
}

impl SideLabels {
    pub fn from_inputs(inputs: &InputsConfig) -> Self {
        Self {
            target: inputs.target_label.clone(),
            source: inputs.source_label.clone(),
        }
    }
}

impl Default for SideLabels {
    fn default() -> Self {
        Self::from_inputs(&InputsConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ReconMeta {
    pub config_name: Option<String>,
    pub engine_version: String,
    pub run_at: String,
    pub labels: SideLabels,
    pub rows_a: usize,
    pub rows_b: usize,
    pub outcomes: OutcomeCounts,
    /// SHA-256 over A's comparison keys in row order.
    pub key_digest_a: String,
    pub key_digest_b: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconResult {
    pub meta: ReconMeta,
    pub schema: SharedSchema,
    pub warnings: Vec<ReconWarning>,
    pub summary: Vec<SummaryRow>,
    pub grand_totals: Vec<GrandTotal>,
    pub time_windows: Section<Vec<WindowSum>>,
    pub partitions: Section<Vec<PartitionCheck>>,
    pub distribution: Section<Vec<DistributionStats>>,
    pub reconciliation: Reconciliation,
    /// Prepared copy of A (roles applied), for the annotated table.
    #[serde(skip)]
    pub target: Dataset,
    #[serde(skip)]
    pub source: Dataset,
}

impl ReconResult {
    /// True when any key, grand total, window or partition differs.
    /// Distribution drift is reported but does not count.
    pub fn has_differences(&self) -> bool {
        let windows = self
            .time_windows
            .available()
            .is_some_and(|rows| rows.iter().any(|r| !r.matches));
        let partitions = self
            .partitions
            .available()
            .is_some_and(|rows| rows.iter().any(|r| !r.matches));
        !self.reconciliation.counts.all_matched()
            || self.grand_totals.iter().any(|t| !t.matches)
            || windows
            || partitions
    }
}
