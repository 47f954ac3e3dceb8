//! Role discovery: classify every column as Date, Measure or Dimension and
//! reconcile both datasets into one shared schema.
//!
//! Two passes. The first profiles each dataset on its own (date candidate,
//! numeric columns). The second intersects the profiles, aligns the date
//! column name, and coerces values to the roles they were given. The result is
//! computed once and handed to every later stage.

use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveDateTime;
use log::{info, warn};
use serde::Serialize;

use crate::config::RolesConfig;
use crate::dataset::{Column, ColumnType, Dataset, Side, Value};
use crate::error::{ReconError, ReconWarning};
use crate::parse::{parse_financial_number, parse_timestamp};

/// Name of the constant dimension introduced when no column is shared.
pub const SYNTHETIC_DIMENSION: &str = "__no_dimension__";
/// Value of every row in the synthetic dimension.
pub const SYNTHETIC_GROUP: &str = "ALL";

const DATE_NAME_TOKENS: &[&str] = &["date", "as_of", "asof", "dt", "day", "period"];

// ---------------------------------------------------------------------------
// Roles + shared schema
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Role {
    Date,
    Measure,
    Dimension,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Date => write!(f, "date"),
            Self::Measure => write!(f, "measure"),
            Self::Dimension => write!(f, "dimension"),
        }
    }
}

/// Columns shared by both datasets, by role.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SharedSchema {
    /// Present in both datasets under this name, or `None`. Always the first
    /// dimension when set.
    pub date_column: Option<String>,
    pub measures: Vec<String>,
    /// Date column first when it is shared, then the rest by name.
    pub dimensions: Vec<String>,
    pub synthetic_dimension: bool,
}

impl SharedSchema {
    pub fn role_of(&self, column: &str) -> Option<Role> {
        if self.date_column.as_deref() == Some(column) {
            Some(Role::Date)
        } else if self.measures.iter().any(|m| m == column) {
            Some(Role::Measure)
        } else if self.dimensions.iter().any(|d| d == column) {
            Some(Role::Dimension)
        } else {
            None
        }
    }

    /// Every role-bearing column in comparison order.
    pub fn roles(&self) -> Vec<(String, Role)> {
        self.dimensions
            .iter()
            .chain(self.measures.iter())
            .filter_map(|c| self.role_of(c).map(|r| (c.clone(), r)))
            .collect()
    }
}

/// Prepared copies of both inputs plus what was discovered about them.
#[derive(Debug, Clone)]
pub struct Discovery {
    pub schema: SharedSchema,
    pub a: Dataset,
    pub b: Dataset,
    /// `(name, declared type)` after name normalization, before coercion.
    pub declared_a: Vec<(String, ColumnType)>,
    pub declared_b: Vec<(String, ColumnType)>,
    pub warnings: Vec<ReconWarning>,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn discover(a: &Dataset, b: &Dataset, config: &RolesConfig) -> Result<Discovery, ReconError> {
    let mut a = normalize_names(a.clone());
    let mut b = normalize_names(b.clone());
    let declared_a = declared_types(&a);
    let mut declared_b = declared_types(&b);
    normalize_values(&mut a);
    normalize_values(&mut b);

    // Pass 1: per dataset
    let date_a = find_date_column(&mut a);
    let date_b = find_date_column(&mut b);

    // Pass 2: reconcile
    let (date_column, rename) = align_date_column(date_a, date_b, &b);
    if let Some((from, to)) = rename {
        info!("renaming B date column '{from}' to '{to}'");
        b.rename_column(&from, &to);
        if let Some(entry) = declared_b.iter_mut().find(|(name, _)| *name == from) {
            entry.0 = to;
        }
    }
    if let Some(ref date_col) = date_column {
        coerce_dates(&mut a, date_col);
        coerce_dates(&mut b, date_col);
    }

    let numeric_a = numeric_columns(&a);
    let numeric_b = numeric_columns(&b);
    let measures: Vec<String> = numeric_a.intersection(&numeric_b).cloned().collect();

    let names_a: BTreeSet<&str> = a.column_names().into_iter().collect();
    let names_b: BTreeSet<&str> = b.column_names().into_iter().collect();
    let shared: Vec<String> = names_a
        .intersection(&names_b)
        .filter(|c| !measures.iter().any(|m| m == *c))
        .map(|c| c.to_string())
        .collect();

    let mut warnings = Vec::new();
    let date_column = match date_column {
        Some(d) if shared.contains(&d) => Some(d),
        other => {
            let message = match other {
                Some(d) => format!("date column '{d}' is not present in both datasets"),
                None => "no date column discovered in either dataset".to_string(),
            };
            warnings.push(ReconWarning::RoleAmbiguity {
                message: format!("{message}; time windows and partitions are unavailable"),
            });
            None
        }
    };

    let mut dimensions = Vec::with_capacity(shared.len());
    dimensions.extend(date_column.clone());
    dimensions.extend(shared.into_iter().filter(|c| Some(c) != date_column.as_ref()));

    let mut synthetic_dimension = false;
    if dimensions.is_empty() {
        if !config.synthesize_dimension {
            return Err(ReconError::NoSharedDimensions);
        }
        let all = Value::Text(SYNTHETIC_GROUP.into());
        a.push_constant(SYNTHETIC_DIMENSION, ColumnType::String, all.clone());
        b.push_constant(SYNTHETIC_DIMENSION, ColumnType::String, all);
        dimensions.push(SYNTHETIC_DIMENSION.to_string());
        synthetic_dimension = true;
    }

    for m in &measures {
        for (side, ds) in [(Side::A, &mut a), (Side::B, &mut b)] {
            let coerced = coerce_measure(ds, m);
            if coerced > 0 {
                warnings.push(ReconWarning::ValueCoercion {
                    side,
                    column: m.clone(),
                    count: coerced,
                });
            }
        }
    }

    let schema = SharedSchema {
        date_column,
        measures,
        dimensions,
        synthetic_dimension,
    };

    for w in &warnings {
        warn!("{w}");
    }
    info!("date column: {:?}", schema.date_column);
    info!("measures: {:?}", schema.measures);
    info!("dimensions: {:?}", schema.dimensions);
    info!("rows: A={} B={}", a.row_count(), b.row_count());

    Ok(Discovery {
        schema,
        a,
        b,
        declared_a,
        declared_b,
        warnings,
    })
}

// ---------------------------------------------------------------------------
// Preparation
// ---------------------------------------------------------------------------

/// Trim column names and drop later duplicates (first occurrence wins).
fn normalize_names(mut ds: Dataset) -> Dataset {
    let mut seen = BTreeSet::new();
    let columns = ds.columns_mut();
    for col in columns.iter_mut() {
        col.name = col.name.trim().to_string();
    }
    columns.retain(|c| seen.insert(c.name.clone()));
    ds
}

fn declared_types(ds: &Dataset) -> Vec<(String, ColumnType)> {
    ds.columns().iter().map(|c| (c.name.clone(), c.dtype)).collect()
}

/// Categorical → string; trim surrounding whitespace of text values.
fn normalize_values(ds: &mut Dataset) {
    for col in ds.columns_mut().iter_mut() {
        if col.dtype == ColumnType::Categorical {
            col.dtype = ColumnType::String;
        }
        for v in col.values.iter_mut() {
            if let Value::Text(s) = v {
                let trimmed = s.trim();
                if trimmed.len() != s.len() {
                    *s = trimmed.to_string();
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Date column
// ---------------------------------------------------------------------------

/// Prefer a natively typed timestamp column (most non-missing values, first on
/// ties); otherwise the first date-named column whose values all parse. A
/// name-matched column is converted to timestamps in place.
fn find_date_column(ds: &mut Dataset) -> Option<String> {
    let typed = ds
        .columns()
        .iter()
        .filter(|c| c.dtype == ColumnType::Timestamp)
        .rev()
        .max_by_key(|c| c.non_missing())
        .map(|c| c.name.clone());
    if typed.is_some() {
        return typed;
    }

    let candidates: Vec<String> = ds
        .columns()
        .iter()
        .filter(|c| {
            let lower = c.name.to_lowercase();
            DATE_NAME_TOKENS.iter().any(|t| lower.contains(t))
        })
        .map(|c| c.name.clone())
        .collect();

    for name in candidates {
        let Some(col) = ds.column_mut(&name) else {
            continue;
        };
        if let Some(parsed) = parse_all_timestamps(col) {
            col.values = parsed;
            col.dtype = ColumnType::Timestamp;
            return Some(name);
        }
    }
    None
}

fn parse_all_timestamps(col: &Column) -> Option<Vec<Value>> {
    let mut parsed = Vec::with_capacity(col.len());
    let mut any = false;
    for v in &col.values {
        let out = match v {
            v if v.is_missing() => Value::Missing,
            v => Value::Timestamp(timestamp_of(v)?),
        };
        any |= !out.is_missing();
        parsed.push(out);
    }
    any.then_some(parsed)
}

/// Settle on one shared date-column name. When both sides found one under
/// different names, B's column takes A's name unless B already has a column
/// called that, in which case B's name is kept. Returns the chosen name and
/// the `(from, to)` rename to apply to B.
fn align_date_column(
    date_a: Option<String>,
    date_b: Option<String>,
    b: &Dataset,
) -> (Option<String>, Option<(String, String)>) {
    match (date_a, date_b) {
        (Some(da), Some(db)) if da != db => {
            if b.has_column(&da) {
                (Some(db), None)
            } else {
                (Some(da.clone()), Some((db, da)))
            }
        }
        (da, db) => (da.or(db), None),
    }
}

/// Text in any accepted layout, or an 8-digit integral number (a `YYYYMMDD`
/// column the loader typed as numeric).
fn timestamp_of(v: &Value) -> Option<NaiveDateTime> {
    match v {
        Value::Timestamp(ts) => Some(*ts),
        Value::Text(s) => parse_timestamp(s),
        Value::Number(n) if n.fract() == 0.0 && (1e7..1e8).contains(n) => {
            parse_timestamp(&format!("{}", *n as i64))
        }
        _ => None,
    }
}

fn coerce_dates(ds: &mut Dataset, name: &str) {
    let Some(col) = ds.column_mut(name) else {
        return;
    };
    for v in col.values.iter_mut() {
        *v = timestamp_of(v).map(Value::Timestamp).unwrap_or(Value::Missing);
    }
    col.dtype = ColumnType::Timestamp;
}

// ---------------------------------------------------------------------------
// Measures
// ---------------------------------------------------------------------------

fn numeric_columns(ds: &Dataset) -> BTreeSet<String> {
    ds.columns()
        .iter()
        .filter(|c| c.dtype == ColumnType::Numeric)
        .map(|c| c.name.clone())
        .collect()
}

/// Force a measure column to plain numbers. Returns how many present values
/// could not be read as a number.
fn coerce_measure(ds: &mut Dataset, name: &str) -> usize {
    let Some(col) = ds.column_mut(name) else {
        return 0;
    };
    let mut coerced = 0;
    for v in col.values.iter_mut() {
        let n = match v {
            Value::Missing => None,
            Value::Number(n) => Some(*n).filter(|n| !n.is_nan()),
            Value::Text(s) if s.is_empty() => None,
            Value::Text(s) => {
                let parsed = parse_financial_number(s);
                coerced += usize::from(parsed.is_none());
                parsed
            }
            Value::Bool(_) | Value::Timestamp(_) => {
                coerced += 1;
                None
            }
        };
        *v = n.map(Value::Number).unwrap_or(Value::Missing);
    }
    col.dtype = ColumnType::Numeric;
    coerced
}
