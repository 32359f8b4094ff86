//! Tagged values carried by placeholders
//!
//! Every configuration entry, action parameter and event field holds a
//! [`Value`]. The variant is the semantic type tag; [`ValueType`] names the
//! tag on its own for descriptors.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Value Types
// ─────────────────────────────────────────────────────────────────────────────

/// Semantic type tags understood by descriptors and placeholders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    /// UTF-8 text
    String,
    /// Absolute URL (an empty string means "no URL")
    Url,
    /// Boolean flag
    Bool,
    /// 64-bit signed integer
    Int,
    /// 64-bit floating point
    Float,
    /// Ordered list of strings
    StringArray,
    /// String-keyed map of nested values
    Map,
}

impl ValueType {
    /// Tag name as used in descriptors and on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Url => "url",
            ValueType::Bool => "bool",
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::StringArray => "string_array",
            ValueType::Map => "map",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Value
// ─────────────────────────────────────────────────────────────────────────────

/// A typed value flowing through configuration, actions and events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    String(String),
    Url(String),
    Bool(bool),
    Int(i64),
    Float(f64),
    StringArray(Vec<String>),
    Map(BTreeMap<String, Value>),
}

impl Default for Value {
    fn default() -> Self {
        Value::String(String::new())
    }
}

/// Error when converting a value between type tags
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValueConversionError {
    #[error("Expected {expected}, got {actual}")]
    TypeMismatch {
        expected: ValueType,
        actual: ValueType,
    },
    #[error("Invalid {target} value {input:?}: {reason}")]
    Invalid {
        target: ValueType,
        input: String,
        reason: String,
    },
    #[error("Integer overflow")]
    IntegerOverflow,
}

impl Value {
    /// Create a URL value, validating it unless it is empty
    pub fn url(s: impl Into<String>) -> Result<Self, ValueConversionError> {
        Value::String(s.into()).convert(ValueType::Url)
    }

    /// The semantic type tag of this value
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::String(_) => ValueType::String,
            Value::Url(_) => ValueType::Url,
            Value::Bool(_) => ValueType::Bool,
            Value::Int(_) => ValueType::Int,
            Value::Float(_) => ValueType::Float,
            Value::StringArray(_) => ValueType::StringArray,
            Value::Map(_) => ValueType::Map,
        }
    }

    /// Get as string slice (strings and URLs)
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Url(s) => Some(s),
            _ => None,
        }
    }

    /// Get as boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as f64 (also converts from int)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Get as string list
    pub fn as_string_array(&self) -> Option<&[String]> {
        match self {
            Value::StringArray(items) => Some(items),
            _ => None,
        }
    }

    /// Get as map
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Convert this value to another type tag
    ///
    /// Same-tag conversion is a clone. Cross-tag conversions follow a fixed
    /// table: anything scalar renders to a string, strings parse into the
    /// scalar tags, ints widen to floats and integral floats narrow to ints.
    pub fn convert(&self, target: ValueType) -> Result<Value, ValueConversionError> {
        if self.value_type() == target {
            return Ok(self.clone());
        }

        let mismatch = || ValueConversionError::TypeMismatch {
            expected: target,
            actual: self.value_type(),
        };

        match (self, target) {
            (Value::Url(s), ValueType::String) => Ok(Value::String(s.clone())),
            (Value::Bool(_) | Value::Int(_) | Value::Float(_), ValueType::String) => {
                Ok(Value::String(self.to_string()))
            }
            (Value::StringArray(items), ValueType::String) => Ok(Value::String(items.join(","))),

            (Value::String(s), ValueType::Url) => parse_url(s),
            (Value::String(s), ValueType::Bool) => parse_bool(s).map(Value::Bool),
            (Value::String(s), ValueType::Int) => {
                s.trim()
                    .parse::<i64>()
                    .map(Value::Int)
                    .map_err(|e| invalid(target, s, e))
            }
            (Value::String(s), ValueType::Float) => {
                s.trim()
                    .parse::<f64>()
                    .map(Value::Float)
                    .map_err(|e| invalid(target, s, e))
            }
            (Value::String(s), ValueType::StringArray) => Ok(Value::StringArray(vec![s.clone()])),

            (Value::Int(i), ValueType::Float) => Ok(Value::Float(*i as f64)),
            (Value::Float(f), ValueType::Int) => {
                if f.fract() != 0.0 {
                    return Err(invalid(target, &f.to_string(), "not an integral number"));
                }
                if *f < i64::MIN as f64 || *f >= i64::MAX as f64 {
                    return Err(ValueConversionError::IntegerOverflow);
                }
                Ok(Value::Int(*f as i64))
            }

            _ => Err(mismatch()),
        }
    }

    /// Coerce a raw JSON value into the declared type tag
    ///
    /// This is the entry point used at the configuration boundary, where values
    /// come from TOML/JSON documents and carry no semantic tag of their own.
    pub fn from_json(
        raw: serde_json::Value,
        target: ValueType,
    ) -> Result<Value, ValueConversionError> {
        match (raw, target) {
            (serde_json::Value::Array(items), ValueType::StringArray) => items
                .into_iter()
                .map(|item| {
                    Value::from_json(item, ValueType::String).map(|v| match v {
                        Value::String(s) => s,
                        other => other.to_string(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::StringArray),
            (serde_json::Value::Object(obj), ValueType::Map) => {
                Ok(Value::Map(obj.into_iter().map(|(k, v)| (k, Value::infer(v))).collect()))
            }
            (raw, target) => Value::infer(raw).convert(target),
        }
    }

    /// Infer a tagged value from an untagged JSON value
    ///
    /// JSON null becomes an empty string.
    pub fn infer(raw: serde_json::Value) -> Value {
        match raw {
            serde_json::Value::Null => Value::String(String::new()),
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => Value::StringArray(
                items
                    .into_iter()
                    .map(|item| match item {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    })
                    .collect(),
            ),
            serde_json::Value::Object(obj) => {
                Value::Map(obj.into_iter().map(|(k, v)| (k, Value::infer(v))).collect())
            }
        }
    }
}

fn invalid(target: ValueType, input: &str, reason: impl fmt::Display) -> ValueConversionError {
    ValueConversionError::Invalid {
        target,
        input: input.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_url(s: &str) -> Result<Value, ValueConversionError> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Ok(Value::Url(String::new()));
    }
    url::Url::parse(trimmed)
        .map(|_| Value::Url(trimmed.to_string()))
        .map_err(|e| invalid(ValueType::Url, s, e))
}

fn parse_bool(s: &str) -> Result<bool, ValueConversionError> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(invalid(ValueType::Bool, s, "expected true/false")),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) | Value::Url(s) => f.write_str(s),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::StringArray(items) => f.write_str(&items.join(",")),
            Value::Map(map) => {
                let json: serde_json::Value = Value::Map(map.clone()).into();
                write!(f, "{json}")
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// From Implementations
// ─────────────────────────────────────────────────────────────────────────────

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Value::StringArray(v)
    }
}

impl From<url::Url> for Value {
    fn from(v: url::Url) -> Self {
        Value::Url(v.into())
    }
}

impl From<Value> for serde_json::Value {
    fn from(v: Value) -> Self {
        match v {
            Value::String(s) | Value::Url(s) => serde_json::Value::String(s),
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Int(i) => serde_json::Value::Number(i.into()),
            Value::Float(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::StringArray(items) => {
                serde_json::Value::Array(items.into_iter().map(serde_json::Value::String).collect())
            }
            Value::Map(map) => serde_json::Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, serde_json::Value::from(v)))
                    .collect(),
            ),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// FromValue
// ─────────────────────────────────────────────────────────────────────────────

/// Types that can be bound from a [`Value`]
///
/// Implementations go through [`Value::convert`], so binding a `String`
/// destination from an int placeholder works the same way as coercing it.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self, ValueConversionError>;
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self, ValueConversionError> {
        Ok(value.clone())
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self, ValueConversionError> {
        match value.convert(ValueType::String)? {
            Value::String(s) => Ok(s),
            other => Err(ValueConversionError::TypeMismatch {
                expected: ValueType::String,
                actual: other.value_type(),
            }),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self, ValueConversionError> {
        value
            .convert(ValueType::Bool)?
            .as_bool()
            .ok_or(ValueConversionError::TypeMismatch {
                expected: ValueType::Bool,
                actual: value.value_type(),
            })
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self, ValueConversionError> {
        value
            .convert(ValueType::Int)?
            .as_i64()
            .ok_or(ValueConversionError::TypeMismatch {
                expected: ValueType::Int,
                actual: value.value_type(),
            })
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Result<Self, ValueConversionError> {
        let i = i64::from_value(value)?;
        i32::try_from(i).map_err(|_| ValueConversionError::IntegerOverflow)
    }
}

impl FromValue for u64 {
    fn from_value(value: &Value) -> Result<Self, ValueConversionError> {
        let i = i64::from_value(value)?;
        u64::try_from(i).map_err(|_| ValueConversionError::IntegerOverflow)
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self, ValueConversionError> {
        value
            .convert(ValueType::Float)?
            .as_f64()
            .ok_or(ValueConversionError::TypeMismatch {
                expected: ValueType::Float,
                actual: value.value_type(),
            })
    }
}

impl FromValue for Vec<String> {
    fn from_value(value: &Value) -> Result<Self, ValueConversionError> {
        match value.convert(ValueType::StringArray)? {
            Value::StringArray(items) => Ok(items),
            other => Err(ValueConversionError::TypeMismatch {
                expected: ValueType::StringArray,
                actual: other.value_type(),
            }),
        }
    }
}

impl FromValue for url::Url {
    fn from_value(value: &Value) -> Result<Self, ValueConversionError> {
        let s = String::from_value(value)?;
        url::Url::parse(s.trim()).map_err(|e| invalid(ValueType::Url, &s, e))
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self, ValueConversionError> {
        T::from_value(value).map(Some)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
