//! Attribute values stored on nodes and edges

use rusqlite::types::Value;
use std::collections::BTreeMap;

/// A single attribute value
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
}

/// Attributes to merge; `None` entries are nulls and are never written
pub type AttributeMap = BTreeMap<String, Option<Scalar>>;

/// Attributes as read back from the store
pub type Properties = BTreeMap<String, Scalar>;

impl Scalar {
    /// Size in bytes checked against the configured maximum value size
    pub fn size(&self) -> usize {
        match self {
            Self::Text(s) => s.len(),
            Self::Integer(_) | Self::Float(_) => 8,
            Self::Boolean(_) => 1,
        }
    }

    /// Converts an API value to a scalar
    ///
    /// JSON `null` maps to `None`. Objects and arrays are kept as their JSON
    /// text so that nested selections are not lost.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => None,
            serde_json::Value::Bool(b) => Some(Self::Boolean(*b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Some(Self::Integer(i)),
                None => n.as_f64().map(Self::Float),
            },
            serde_json::Value::String(s) => Some(Self::Text(s.clone())),
            other => Some(Self::Text(other.to_string())),
        }
    }

    pub(crate) fn kind_str(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::Boolean(_) => "boolean",
        }
    }

    pub(crate) fn to_sql_value(&self) -> Value {
        match self {
            Self::Text(s) => Value::Text(s.clone()),
            Self::Integer(i) => Value::Integer(*i),
            Self::Float(f) => Value::Real(*f),
            Self::Boolean(b) => Value::Integer(i64::from(*b)),
        }
    }

    pub(crate) fn from_sql_value(kind: &str, value: Value) -> Option<Self> {
        match (kind, value) {
            ("text", Value::Text(s)) => Some(Self::Text(s)),
            ("integer", Value::Integer(i)) => Some(Self::Integer(i)),
            ("float", Value::Real(f)) => Some(Self::Float(f)),
            ("float", Value::Integer(i)) => Some(Self::Float(i as f64)),
            ("boolean", Value::Integer(i)) => Some(Self::Boolean(i != 0)),
            _ => None,
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for Scalar {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<f64> for Scalar {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}
