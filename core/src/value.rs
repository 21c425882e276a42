//! Value types for graft attributes.
//!
//! Values are the atomic data carried by data fields. Graft stores scalar
//! types (String, Int, Float, Bool) plus Null; JSON-content fields ride as
//! serialized strings once a mutation has been enriched.

use serde_json::Value as Json;
use std::fmt;
use thiserror::Error;

/// A typed attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum DataValue {
    /// Null/missing value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit floating point.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Multiple values of a MANY-cardinality field.
    List(Vec<DataValue>),
}

/// Error converting a JSON document value into a typed attribute value.
#[derive(Debug, Error)]
#[error("expected {expected}, got {actual}")]
pub struct ValueCoercionError {
    pub expected: &'static str,
    pub actual: String,
}

impl DataValue {
    /// Returns true if this is a null value.
    pub fn is_null(&self) -> bool {
        matches!(self, DataValue::Null)
    }

    /// Get as boolean if this is a Bool value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DataValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as integer if this is an Int value.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            DataValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as string reference if this is a String value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DataValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get the values if this is a List.
    pub fn as_list(&self) -> Option<&[DataValue]> {
        match self {
            DataValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the type name of this value.
    pub fn type_name(&self) -> &'static str {
        match self {
            DataValue::Null => "Null",
            DataValue::Bool(_) => "Bool",
            DataValue::Int(_) => "Int",
            DataValue::Float(_) => "Float",
            DataValue::String(_) => "String",
            DataValue::List(_) => "List",
        }
    }

    /// Convert a JSON document value.
    ///
    /// Numbers become Int when they are whole, Float otherwise. Objects and
    /// arrays are rejected; JSON-content fields must be serialized to strings
    /// before they reach this conversion.
    pub fn from_json(value: &Json) -> Result<Self, ValueCoercionError> {
        match value {
            Json::Null => Ok(DataValue::Null),
            Json::Bool(b) => Ok(DataValue::Bool(*b)),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(DataValue::Int(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(DataValue::Float(f))
                } else {
                    Err(ValueCoercionError {
                        expected: "number",
                        actual: n.to_string(),
                    })
                }
            }
            Json::String(s) => Ok(DataValue::String(s.clone())),
            Json::Array(_) => Err(ValueCoercionError {
                expected: "scalar",
                actual: "array".to_string(),
            }),
            Json::Object(_) => Err(ValueCoercionError {
                expected: "scalar",
                actual: "object".to_string(),
            }),
        }
    }

    /// Convert back into a JSON document value.
    pub fn to_json(&self) -> Json {
        match self {
            DataValue::Null => Json::Null,
            DataValue::Bool(b) => Json::Bool(*b),
            DataValue::Int(i) => Json::from(*i),
            DataValue::Float(f) => {
                serde_json::Number::from_f64(*f).map(Json::Number).unwrap_or(Json::Null)
            }
            DataValue::String(s) => Json::String(s.clone()),
            DataValue::List(items) => Json::Array(items.iter().map(DataValue::to_json).collect()),
        }
    }

    /// Render as a statement literal, with strings quoted and escaped.
    pub fn to_literal(&self) -> String {
        match self {
            DataValue::Null => "null".to_string(),
            DataValue::Bool(b) => b.to_string(),
            DataValue::Int(i) => i.to_string(),
            DataValue::Float(f) => f.to_string(),
            DataValue::String(s) => {
                let escaped = s.replace('\\', "\\\\").replace('"', "\\\"");
                format!("\"{}\"", escaped)
            }
            // Lists never render as one literal; callers emit one binding
            // per element.
            DataValue::List(items) => items
                .iter()
                .map(DataValue::to_literal)
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

impl fmt::Display for DataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataValue::Null => write!(f, "null"),
            DataValue::Bool(b) => write!(f, "{}", b),
            DataValue::Int(i) => write!(f, "{}", i),
            DataValue::Float(fl) => write!(f, "{}", fl),
            DataValue::String(s) => write!(f, "\"{}\"", s),
            DataValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<bool> for DataValue {
    fn from(b: bool) -> Self {
        DataValue::Bool(b)
    }
}

impl From<i64> for DataValue {
    fn from(i: i64) -> Self {
        DataValue::Int(i)
    }
}

impl From<i32> for DataValue {
    fn from(i: i32) -> Self {
        DataValue::Int(i as i64)
    }
}

impl From<f64> for DataValue {
    fn from(f: f64) -> Self {
        DataValue::Float(f)
    }
}

impl From<String> for DataValue {
    fn from(s: String) -> Self {
        DataValue::String(s)
    }
}

impl From<&str> for DataValue {
    fn from(s: &str) -> Self {
        DataValue::String(s.to_string())
    }
}
