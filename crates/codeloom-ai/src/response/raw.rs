//! Provider response shapes as a closed sum type.

use serde_json::{Map, Number, Value};

/// Body of an LLM response before normalization.
///
/// Providers hand back plain text most of the time, but some return structured
/// JSON bodies (objects, arrays, even bare primitives). The variant is decided
/// once at the provider boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum RawResponse {
    Text(String),
    Object(Map<String, Value>),
    Array(Vec<Value>),
    Number(Number),
    Bool(bool),
    Null,
}

impl RawResponse {
    /// Short label used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            RawResponse::Text(_) => "text",
            RawResponse::Object(_) => "object",
            RawResponse::Array(_) => "array",
            RawResponse::Number(_) => "number",
            RawResponse::Bool(_) => "bool",
            RawResponse::Null => "null",
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            RawResponse::Text(text) => text.is_empty(),
            RawResponse::Object(map) => map.is_empty(),
            RawResponse::Array(items) => items.is_empty(),
            RawResponse::Null => true,
            RawResponse::Number(_) | RawResponse::Bool(_) => false,
        }
    }

    /// Canonical textual form.
    ///
    /// Arrays join their items with newlines, objects serialize to compact
    /// JSON, `Null` is the empty string.
    pub fn to_text(&self) -> String {
        match self {
            RawResponse::Text(text) => text.clone(),
            RawResponse::Object(map) => {
                serde_json::to_string(map).unwrap_or_default()
            }
            RawResponse::Array(items) => items
                .iter()
                .map(value_to_text)
                .collect::<Vec<_>>()
                .join("\n"),
            RawResponse::Number(number) => number_to_text(number),
            RawResponse::Bool(value) => value.to_string(),
            RawResponse::Null => String::new(),
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            RawResponse::Text(text) => Value::String(text),
            RawResponse::Object(map) => Value::Object(map),
            RawResponse::Array(items) => Value::Array(items),
            RawResponse::Number(number) => Value::Number(number),
            RawResponse::Bool(value) => Value::Bool(value),
            RawResponse::Null => Value::Null,
        }
    }
}

impl From<Value> for RawResponse {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => RawResponse::Text(text),
            Value::Object(map) => RawResponse::Object(map),
            Value::Array(items) => RawResponse::Array(items),
            Value::Number(number) => RawResponse::Number(number),
            Value::Bool(value) => RawResponse::Bool(value),
            Value::Null => RawResponse::Null,
        }
    }
}

impl From<String> for RawResponse {
    fn from(text: String) -> Self {
        RawResponse::Text(text)
    }
}

impl From<&str> for RawResponse {
    fn from(text: &str) -> Self {
        RawResponse::Text(text.to_string())
    }
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        Value::Number(number) => number_to_text(number),
        other => other.to_string(),
    }
}

/// Integral floats print without a fractional part (`3.0` -> `3`) and
/// without an exponent below `1e21` (`1e20` -> `100000000000000000000`).
fn number_to_text(number: &Number) -> String {
    if let Some(float) = number.as_f64()
        && number.is_f64()
        && float.is_finite()
        && float.fract() == 0.0
        && float.abs() < 1e21
    {
        return format!("{float}");
    }
    number.to_string()
}
