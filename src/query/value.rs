//! Value vocabulary consumed by the relational engine.
use std::fmt;

use serde::Serialize;

use super::handle::GraphHandle;

/// Closed set of values every adapter function returns.
///
/// Arrays are never materialized here: an array node travels as a
/// [`RelationalValue::Handle`] and is read through `length`/`getElement`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "t", content = "v")]
pub enum RelationalValue {
    /// SQL null.
    Null,
    /// Boolean value.
    Boolean(bool),
    /// Signed 64-bit integer.
    Integer(i64),
    /// 64-bit floating point number.
    Real(f64),
    /// UTF-8 text.
    Text(String),
    /// Reference to a snapshot node.
    Handle(GraphHandle),
}

impl RelationalValue {
    /// Whether the value is SQL null.
    pub fn is_null(&self) -> bool {
        matches!(self, RelationalValue::Null)
    }

    /// Handle payload, if any.
    pub fn as_handle(&self) -> Option<&GraphHandle> {
        match self {
            RelationalValue::Handle(handle) => Some(handle),
            _ => None,
        }
    }

    /// Integer payload, if any.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            RelationalValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Text payload, if any.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            RelationalValue::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Short type name used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            RelationalValue::Null => "null",
            RelationalValue::Boolean(_) => "boolean",
            RelationalValue::Integer(_) => "integer",
            RelationalValue::Real(_) => "real",
            RelationalValue::Text(_) => "text",
            RelationalValue::Handle(_) => "handle",
        }
    }
}

impl fmt::Display for RelationalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationalValue::Null => write!(f, "null"),
            RelationalValue::Boolean(v) => write!(f, "{v}"),
            RelationalValue::Integer(v) => write!(f, "{v}"),
            RelationalValue::Real(v) => write!(f, "{v:?}"),
            RelationalValue::Text(v) => write!(f, "{v}"),
            RelationalValue::Handle(h) => write!(f, "{h}"),
        }
    }
}

impl From<&str> for RelationalValue {
    fn from(value: &str) -> Self {
        RelationalValue::Text(value.to_owned())
    }
}

impl From<String> for RelationalValue {
    fn from(value: String) -> Self {
        RelationalValue::Text(value)
    }
}

impl From<bool> for RelationalValue {
    fn from(value: bool) -> Self {
        RelationalValue::Boolean(value)
    }
}

impl From<i64> for RelationalValue {
    fn from(value: i64) -> Self {
        RelationalValue::Integer(value)
    }
}

impl From<f64> for RelationalValue {
    fn from(value: f64) -> Self {
        RelationalValue::Real(value)
    }
}

impl From<GraphHandle> for RelationalValue {
    fn from(value: GraphHandle) -> Self {
        RelationalValue::Handle(value)
    }
}

impl From<Option<GraphHandle>> for RelationalValue {
    fn from(value: Option<GraphHandle>) -> Self {
        value.map_or(RelationalValue::Null, RelationalValue::Handle)
    }
}
