//! Parameterized search: filter predicates, column projections, paging.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::fields::{Field, Value};

/// Search error.
///
/// Query failures are transient by contract: the caller logs them and
/// retries the affected unit of work on the next scheduled run.
#[derive(Debug, Clone, Error)]
pub enum QueryError {
    #[error("unknown query source: {0}")]
    UnknownSource(String),

    #[error("field not mapped for this deployment: {0}")]
    UnmappedField(Field),

    #[error("column missing from result row: {0}")]
    MissingColumn(Field),

    #[error("unexpected value shape in column {field}: expected {expected}")]
    TypeMismatch { field: Field, expected: &'static str },

    #[error("search backend error: {0}")]
    Backend(String),
}

/// A filter predicate over one abstract field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    Equals(Field, Value),
    AnyOf(Field, Vec<Value>),
    GreaterThan(Field, Value),
    /// On or before the operand.
    NotAfter(Field, Value),
}

impl Filter {
    pub fn field(&self) -> Field {
        match self {
            Filter::Equals(f, _)
            | Filter::AnyOf(f, _)
            | Filter::GreaterThan(f, _)
            | Filter::NotAfter(f, _) => *f,
        }
    }

    /// Evaluate the predicate against the actual cell value. Null cells and
    /// shape mismatches never match.
    pub fn matches(&self, actual: &Value) -> bool {
        match self {
            Filter::Equals(_, wanted) => actual == wanted && *actual != Value::Null,
            Filter::AnyOf(_, options) => {
                *actual != Value::Null && options.iter().any(|o| o == actual)
            }
            Filter::GreaterThan(_, bound) => {
                matches!(actual.compare(bound), Some(std::cmp::Ordering::Greater))
            }
            Filter::NotAfter(_, bound) => matches!(
                actual.compare(bound),
                Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)
            ),
        }
    }
}

/// One parameterized search: which saved source to run against, the filter
/// set (conjunctive), and the columns to project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    /// Saved-query identifier chosen per deployment; `None` runs against
    /// the adapter's default source.
    pub source: Option<String>,
    pub filters: Vec<Filter>,
    pub columns: Vec<Field>,
}

impl QuerySpec {
    pub fn against(source: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
            filters: Vec::new(),
            columns: Vec::new(),
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn columns(mut self, columns: impl IntoIterator<Item = Field>) -> Self {
        self.columns.extend(columns);
        self
    }
}

/// Pagination parameters for a search.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Pagination {
    /// Maximum number of rows to return.
    pub limit: u32,
    /// Offset for pagination (0-based).
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: 200,
            offset: 0,
        }
    }
}

impl Pagination {
    pub fn new(limit: u32, offset: u32) -> Self {
        Self {
            limit: limit.min(1000), // Cap page size for safety
            offset,
        }
    }
}

/// One page of projected rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub rows: Vec<Row>,
    pub has_more: bool,
}

/// One projected result row, keyed by abstract field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    cells: HashMap<Field, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: Field, value: Value) -> Self {
        self.cells.insert(field, value);
        self
    }

    pub fn get(&self, field: Field) -> Option<&Value> {
        self.cells.get(&field)
    }

    fn want(&self, field: Field) -> Result<&Value, QueryError> {
        self.get(field).ok_or(QueryError::MissingColumn(field))
    }

    pub fn get_i64(&self, field: Field) -> Result<i64, QueryError> {
        match self.want(field)? {
            Value::Int(v) => Ok(*v),
            _ => Err(QueryError::TypeMismatch {
                field,
                expected: "int",
            }),
        }
    }

    pub fn get_u32(&self, field: Field) -> Result<u32, QueryError> {
        let v = self.get_i64(field)?;
        u32::try_from(v).map_err(|_| QueryError::TypeMismatch {
            field,
            expected: "u32",
        })
    }

    pub fn get_bool(&self, field: Field) -> Result<bool, QueryError> {
        match self.want(field)? {
            Value::Bool(v) => Ok(*v),
            _ => Err(QueryError::TypeMismatch {
                field,
                expected: "bool",
            }),
        }
    }

    pub fn get_date(&self, field: Field) -> Result<NaiveDate, QueryError> {
        match self.want(field)? {
            Value::Date(v) => Ok(*v),
            _ => Err(QueryError::TypeMismatch {
                field,
                expected: "date",
            }),
        }
    }

    pub fn get_datetime(&self, field: Field) -> Result<DateTime<Utc>, QueryError> {
        match self.want(field)? {
            Value::DateTime(v) => Ok(*v),
            _ => Err(QueryError::TypeMismatch {
                field,
                expected: "datetime",
            }),
        }
    }

    pub fn get_uuid(&self, field: Field) -> Result<Uuid, QueryError> {
        match self.want(field)? {
            Value::Uuid(v) => Ok(*v),
            _ => Err(QueryError::TypeMismatch {
                field,
                expected: "uuid",
            }),
        }
    }

    /// Nullable variant: a `Null` cell reads as `None`; a missing column is
    /// still an error.
    pub fn get_opt_u32(&self, field: Field) -> Result<Option<u32>, QueryError> {
        match self.want(field)? {
            Value::Null => Ok(None),
            Value::Int(_) => self.get_u32(field).map(Some),
            _ => Err(QueryError::TypeMismatch {
                field,
                expected: "u32 or null",
            }),
        }
    }

    /// Nullable variant: a `Null` cell reads as `None`; a missing column is
    /// still an error.
    pub fn get_opt_uuid(&self, field: Field) -> Result<Option<Uuid>, QueryError> {
        match self.want(field)? {
            Value::Null => Ok(None),
            Value::Uuid(v) => Ok(Some(*v)),
            _ => Err(QueryError::TypeMismatch {
                field,
                expected: "uuid or null",
            }),
        }
    }
}
