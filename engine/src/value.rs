//! Primitive column values and sanitization.

use crate::schema::{ColumnSchema, ColumnType};
use serde::{Deserialize, Serialize};

/// A primitive column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

impl Value {
    /// Check for null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Convert from an at-rest JSON value.
    ///
    /// Arrays and objects have no column representation and map to null,
    /// which sanitization then replaces with the column default.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => n.as_f64().map_or(Value::Null, Value::Number),
            serde_json::Value::String(s) => Value::String(s.clone()),
            _ => Value::Null,
        }
    }

    /// Convert to an at-rest JSON value. Integral numbers become JSON integers.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) if n.fract() == 0.0 && n.abs() < i64::MAX as f64 => {
                serde_json::Value::from(*n as i64)
            }
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Value::String(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value as f64)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(f64::from(value))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// Coerce a value to the column's declared type.
///
/// Values of the wrong type fall back to the column default: null for
/// optional columns, otherwise the type's zero value.
pub fn sanitize(value: Value, column: &ColumnSchema) -> Value {
    let sanitized = match (column.column_type, value) {
        (ColumnType::String, Value::String(s)) => Some(Value::String(s)),
        (ColumnType::Boolean, Value::Bool(b)) => Some(Value::Bool(b)),
        // SQLite-style integer booleans
        (ColumnType::Boolean, Value::Number(n)) if n == 1.0 => Some(Value::Bool(true)),
        (ColumnType::Boolean, Value::Number(n)) if n == 0.0 => Some(Value::Bool(false)),
        // -0 normalizes to 0
        (ColumnType::Number, Value::Number(n)) if n.is_finite() => {
            Some(Value::Number(if n == 0.0 { 0.0 } else { n }))
        }
        _ => None,
    };

    sanitized.unwrap_or_else(|| column.default_value())
}
