use std::fmt;

use serde::Serialize;

use crate::dataset::Side;

#[derive(Debug)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (bad tolerance, empty label, etc.).
    ConfigValidation(String),
    /// No column name is shared by both datasets and synthesis is disabled.
    NoSharedDimensions,
    /// Columns of one dataset have different lengths.
    RaggedColumns { column: String, expected: usize, found: usize },
    /// CSV decode error while loading a dataset.
    Csv(String),
    /// IO error (file read, etc.).
    Io(String),
    /// Anything unexpected inside the engine. Aborts the run.
    EngineFailure(String),
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::NoSharedDimensions => write!(
                f,
                "no shared dimension columns: the datasets must overlap on at least one column name"
            ),
            Self::RaggedColumns { column, expected, found } => write!(
                f,
                "column '{column}' has {found} values, expected {expected}"
            ),
            Self::Csv(msg) => write!(f, "CSV error: {msg}"),
            Self::Io(msg) => write!(f, "IO error: {msg}"),
            Self::EngineFailure(msg) => write!(f, "engine failure: {msg}"),
        }
    }
}

impl std::error::Error for ReconError {}

impl From<csv::Error> for ReconError {
    fn from(e: csv::Error) -> Self {
        Self::Csv(e.to_string())
    }
}

impl From<std::io::Error> for ReconError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// Non-fatal issues. Logged as they happen and carried into the Summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReconWarning {
    /// No date column could be discovered; time windows and partitions are unavailable.
    RoleAmbiguity { message: String },
    /// Non-numeric values in a measure column were coerced to missing.
    ValueCoercion { side: Side, column: String, count: usize },
}

impl fmt::Display for ReconWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RoleAmbiguity { message } => write!(f, "role ambiguity: {message}"),
            Self::ValueCoercion { side, column, count } => write!(
                f,
                "{side}: {count} non-numeric value(s) in measure '{column}' coerced to missing"
            ),
        }
    }
}
