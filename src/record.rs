//! Normalized records produced by source adapters
//!
//! A [`NormalizedRecord`] is a flat column -> scalar mapping. Nested JSON
//! values are flattened to their JSON text so every value fits in a single
//! SQLite column.

use chrono::{DateTime, Utc};
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::ToSql;
use std::collections::BTreeMap;
use thiserror::Error;

/// A scalar column value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

/// One row as produced by a source adapter, keyed by column name
pub type NormalizedRecord = BTreeMap<String, Value>;

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Converts a JSON value into a scalar, serializing arrays and objects as text
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Integer(i)
                } else if let Some(f) = n.as_f64() {
                    Value::Real(f)
                } else {
                    Value::Text(n.to_string())
                }
            }
            serde_json::Value::String(s) => Value::Text(s.clone()),
            other => Value::Text(other.to_string()),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Real(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::Timestamp(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Value::Bool(b) => ToSqlOutput::from(i64::from(*b)),
            Value::Integer(i) => ToSqlOutput::from(*i),
            Value::Real(f) => ToSqlOutput::from(*f),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Timestamp(ts) => ToSqlOutput::from(ts.to_rfc3339()),
        })
    }
}

/// A record rejected by required-field validation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("record {index} is missing required fields: {}", .missing.join(", "))]
pub struct ValidationError {
    /// Position of the record in the adapter's output
    pub index: usize,
    /// Required fields that were absent or null
    pub missing: Vec<String>,
}

/// Result of partitioning a batch into valid and invalid records
#[derive(Debug, Default)]
pub struct ValidatedBatch {
    pub valid: Vec<NormalizedRecord>,
    pub invalid: Vec<ValidationError>,
}

/// Splits records into those carrying every required field with a non-null value
/// and those that do not
pub fn validate_batch(records: Vec<NormalizedRecord>, required: &[String]) -> ValidatedBatch {
    let mut batch = ValidatedBatch::default();

    for (index, record) in records.into_iter().enumerate() {
        let missing: Vec<String> = required
            .iter()
            .filter(|field| record.get(*field).map_or(true, Value::is_null))
            .cloned()
            .collect();

        if missing.is_empty() {
            batch.valid.push(record);
        } else {
            batch.invalid.push(ValidationError { index, missing });
        }
    }

    batch
}
