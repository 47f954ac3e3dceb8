//! In-memory tabular datasets: columnar storage with a declared type per column.

use std::fmt;

use chrono::{NaiveDateTime, NaiveTime};
use serde::Serialize;

use crate::error::ReconError;

// ---------------------------------------------------------------------------
// Side
// ---------------------------------------------------------------------------

/// Which input a value came from. A is the migrated target, B the source of truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Side {
    A,
    B,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::B => write!(f, "B"),
        }
    }
}

// ---------------------------------------------------------------------------
// Column types + cell values
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Numeric,
    String,
    Timestamp,
    Boolean,
    Categorical,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric => write!(f, "numeric"),
            Self::String => write!(f, "string"),
            Self::Timestamp => write!(f, "timestamp"),
            Self::Boolean => write!(f, "boolean"),
            Self::Categorical => write!(f, "categorical"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Missing,
    Number(f64),
    Text(String),
    Bool(bool),
    Timestamp(NaiveDateTime),
}

impl Value {
    pub fn is_missing(&self) -> bool {
        match self {
            Self::Missing => true,
            Self::Number(n) => n.is_nan(),
            _ => false,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) if !n.is_nan() => Some(*n),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Self::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    /// JSON cell for output tables. Missing becomes null.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Number(n) if !n.is_nan() => serde_json::json!(n),
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Text(s) => serde_json::Value::String(s.clone()),
            Self::Timestamp(ts) => serde_json::Value::String(format_timestamp(ts)),
            _ => serde_json::Value::Null,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => Ok(()),
            Self::Number(n) if n.is_nan() => Ok(()),
            Self::Number(n) => write!(f, "{}", format_number(*n)),
            Self::Text(s) => write!(f, "{s}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Timestamp(ts) => write!(f, "{}", format_timestamp(ts)),
        }
    }
}

/// Shortest round-trip rendering: `1` for 1.0, `0.1` for 0.1.
pub fn format_number(n: f64) -> String {
    if n == 0.0 {
        // Collapse -0.0
        return "0".into();
    }
    format!("{n}")
}

/// `YYYY-MM-DD` at midnight, `YYYY-MM-DD HH:MM:SS[.f]` otherwise.
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    if ts.time() == NaiveTime::MIN {
        ts.format("%Y-%m-%d").to_string()
    } else {
        ts.format("%Y-%m-%d %H:%M:%S%.f").to_string()
    }
}

// ---------------------------------------------------------------------------
// Column
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub dtype: ColumnType,
    pub values: Vec<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, dtype: ColumnType, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            dtype,
            values,
        }
    }

    pub fn numeric<I>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = Option<f64>>,
    {
        let values = values
            .into_iter()
            .map(|v| v.map(Value::Number).unwrap_or(Value::Missing))
            .collect();
        Self::new(name, ColumnType::Numeric, values)
    }

    pub fn text<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        let values = values
            .into_iter()
            .map(|v| v.map(|s| Value::Text(s.into())).unwrap_or(Value::Missing))
            .collect();
        Self::new(name, ColumnType::String, values)
    }

    pub fn categorical<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        let mut col = Self::text(name, values);
        col.dtype = ColumnType::Categorical;
        col
    }

    pub fn timestamps<I>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = Option<NaiveDateTime>>,
    {
        let values = values
            .into_iter()
            .map(|v| v.map(Value::Timestamp).unwrap_or(Value::Missing))
            .collect();
        Self::new(name, ColumnType::Timestamp, values)
    }

    pub fn booleans<I>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = Option<bool>>,
    {
        let values = values
            .into_iter()
            .map(|v| v.map(Value::Bool).unwrap_or(Value::Missing))
            .collect();
        Self::new(name, ColumnType::Boolean, values)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn non_missing(&self) -> usize {
        self.values.iter().filter(|v| !v.is_missing()).count()
    }

    pub fn null_count(&self) -> usize {
        self.values.len() - self.non_missing()
    }
}

// ---------------------------------------------------------------------------
// Dataset
// ---------------------------------------------------------------------------

/// An ordered set of equally long columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    columns: Vec<Column>,
}

impl Dataset {
    pub fn new(columns: Vec<Column>) -> Result<Self, ReconError> {
        if let Some(first) = columns.first() {
            let expected = first.len();
            if let Some(bad) = columns.iter().find(|c| c.len() != expected) {
                return Err(ReconError::RaggedColumns {
                    column: bad.name.clone(),
                    expected,
                    found: bad.len(),
                });
            }
        }
        Ok(Self { columns })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map(|c| c.len()).unwrap_or(0)
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub(crate) fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    pub(crate) fn columns_mut(&mut self) -> &mut Vec<Column> {
        &mut self.columns
    }

    /// Append a column with one value repeated for every row.
    pub(crate) fn push_constant(&mut self, name: &str, dtype: ColumnType, value: Value) {
        let n = self.row_count();
        self.columns.push(Column::new(name, dtype, vec![value; n]));
    }

    pub(crate) fn rename_column(&mut self, from: &str, to: &str) {
        if let Some(col) = self.column_mut(from) {
            col.name = to.to_string();
        }
    }

    /// Value at `(row, column)`; `Missing` for unknown columns.
    pub fn value(&self, row: usize, column: &str) -> &Value {
        const MISSING: &Value = &Value::Missing;
        self.column(column)
            .and_then(|c| c.values.get(row))
            .unwrap_or(MISSING)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn rejects_ragged_columns() {
        let err = Dataset::new(vec![
            Column::text("dim", [Some("x"), Some("y")]),
            Column::numeric("val", [Some(1.0)]),
        ])
        .unwrap_err();
        assert!(matches!(err, ReconError::RaggedColumns { found: 1, expected: 2, .. }));
    }

    #[test]
    fn nan_counts_as_missing() {
        let col = Column::numeric("val", [Some(1.0), Some(f64::NAN), None]);
        assert_eq!(col.non_missing(), 1);
        assert_eq!(col.null_count(), 2);
        assert_eq!(col.values[1].to_json(), serde_json::Value::Null);
    }

    #[test]
    fn number_and_timestamp_rendering() {
        assert_eq!(format_number(1.0), "1");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(2.5), "2.5");

        let midnight = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let afternoon = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap().and_hms_opt(13, 5, 9).unwrap();
        assert_eq!(format_timestamp(&midnight), "2024-03-15");
        assert_eq!(format_timestamp(&afternoon), "2024-03-15 13:05:09");
    }

    #[test]
    fn value_lookup_by_name() {
        let ds = Dataset::new(vec![
            Column::text("dim", [Some("x"), None]),
            Column::numeric("val", [Some(5.0), Some(6.0)]),
        ])
        .unwrap();
        assert_eq!(ds.row_count(), 2);
        assert_eq!(ds.value(1, "val"), &Value::Number(6.0));
        assert_eq!(ds.value(1, "dim"), &Value::Missing);
        assert_eq!(ds.value(0, "nope"), &Value::Missing);
    }
}
