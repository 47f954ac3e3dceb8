//! `migcheck-recon`: migration reconciliation engine.
//!
//! Takes two tabular snapshots of the same logical data (a migrated target
//! and its source of record), discovers the columns they share, pairs rows by
//! a deterministic comparison key and reports matches, mismatches, aggregate
//! drift and distribution drift as flat tables.
//!
//! The engine works on in-memory [`Dataset`]s; [`load`] is a small CSV
//! front door for callers that have files.

pub mod aggregate;
pub mod config;
pub mod dataset;
pub mod distribution;
pub mod engine;
pub mod error;
pub mod keys;
pub mod load;
pub mod model;
pub mod parse;
pub mod reconcile;
pub mod report;
pub mod roles;
pub mod summary;
pub mod windows;

pub use config::ReconConfig;
pub use dataset::{Column, ColumnType, Dataset, Value};
pub use engine::{run, run_report};
pub use error::{ReconError, ReconWarning};
pub use model::{ReconResult, SideLabels};
pub use reconcile::Outcome;
pub use report::{ReconReport, Table};
