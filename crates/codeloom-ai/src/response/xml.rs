//! Tool calls expressed with XML-style tags.
//!
//! Recognised forms:
//! - `<tool_call>{"name": ..., "arguments": {...}}</tool_call>`
//! - `<tool_call><name>x</name><arguments>{...}</arguments></tool_call>`
//! - `<invoke name="x"><parameter name="p">v</parameter></invoke>`, optionally
//!   wrapped in `<function_calls>`
//! - `<x><p>v</p></x>` where `x` is a known tool name

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use super::{Extraction, remove_spans};
use crate::llm::{ToolCall, generate_call_id};

static TOOL_CALL_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<tool_call>\s*(.*?)\s*</tool_call>").expect("invalid tool_call regex")
});

static INVOKE_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<invoke\s+name\s*=\s*["']([^"']+)["']\s*>(.*?)</invoke>"#)
        .expect("invalid invoke regex")
});

static NAMED_PARAMETER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<parameter\s+name\s*=\s*["']([^"']+)["']\s*>(.*?)</parameter>"#)
        .expect("invalid parameter regex")
});

static FUNCTION_CALLS_WRAPPER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"</?function_calls>").expect("invalid function_calls regex")
});

static CHILD_ELEMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<([A-Za-z_][\w-]*)>(.*?)</([A-Za-z_][\w-]*)>")
        .expect("invalid child element regex")
});

/// Extract XML-tagged tool calls from anywhere in `text`.
pub fn parse(text: &str, known_tools: &[String]) -> Extraction {
    let mut found: Vec<(Range<usize>, ToolCall)> = Vec::new();

    for captures in TOOL_CALL_BLOCK.captures_iter(text) {
        let (Some(whole), Some(body)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        if let Some(call) = parse_tool_call_body(body.as_str()) {
            found.push((whole.range(), call));
        }
    }

    for captures in INVOKE_BLOCK.captures_iter(text) {
        let (Some(whole), Some(name), Some(body)) =
            (captures.get(0), captures.get(1), captures.get(2))
        else {
            continue;
        };
        if overlaps(&found, &whole.range()) {
            continue;
        }
        let mut arguments = Map::new();
        for param in NAMED_PARAMETER.captures_iter(body.as_str()) {
            if let (Some(key), Some(value)) = (param.get(1), param.get(2)) {
                arguments.insert(key.as_str().to_string(), parameter_value(value.as_str()));
            }
        }
        found.push((
            whole.range(),
            new_call(name.as_str(), Value::Object(arguments)),
        ));
    }

    for tool in known_tools {
        let Ok(pattern) = Regex::new(&format!(
            r"(?s)<{name}>(.*?)</{name}>",
            name = regex::escape(tool)
        )) else {
            continue;
        };
        for captures in pattern.captures_iter(text) {
            let (Some(whole), Some(body)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            if overlaps(&found, &whole.range()) {
                continue;
            }
            found.push((
                whole.range(),
                new_call(tool, Value::Object(child_elements(body.as_str()))),
            ));
        }
    }

    if found.is_empty() {
        return Extraction::none(text);
    }

    found.sort_by_key(|(range, _)| range.start);
    let mut spans: Vec<Range<usize>> = found.iter().map(|(range, _)| range.clone()).collect();
    spans.extend(FUNCTION_CALLS_WRAPPER.find_iter(text).map(|m| m.range()));

    Extraction {
        calls: found.into_iter().map(|(_, call)| call).collect(),
        remainder: remove_spans(text, spans),
    }
}

fn parse_tool_call_body(body: &str) -> Option<ToolCall> {
    let json = super::json::parse(body);
    if let Some(call) = json.calls.into_iter().next() {
        return Some(call);
    }

    let children = child_elements(body);
    let name = children.get("name").and_then(Value::as_str)?.to_string();
    let arguments = match children.get("arguments") {
        Some(Value::Object(map)) => Value::Object(map.clone()),
        Some(other) => super::json::normalize_arguments(other)?,
        None => Value::Object(Map::new()),
    };
    Some(new_call(&name, arguments))
}

fn child_elements(body: &str) -> Map<String, Value> {
    let mut map = Map::new();
    for captures in CHILD_ELEMENT.captures_iter(body) {
        let (Some(open), Some(value), Some(close)) =
            (captures.get(1), captures.get(2), captures.get(3))
        else {
            continue;
        };
        if open.as_str() != close.as_str() {
            continue;
        }
        map.insert(open.as_str().to_string(), parameter_value(value.as_str()));
    }
    map
}

/// Numbers, booleans and JSON containers keep their type; everything else is text.
fn parameter_value(raw: &str) -> Value {
    let trimmed = raw.trim();
    match serde_json::from_str::<Value>(trimmed) {
        Ok(value @ (Value::Object(_) | Value::Array(_) | Value::Number(_) | Value::Bool(_))) => {
            value
        }
        _ => Value::String(trimmed.to_string()),
    }
}

fn new_call(name: &str, arguments: Value) -> ToolCall {
    ToolCall {
        id: generate_call_id(),
        name: name.trim().to_string(),
        arguments,
    }
}

fn overlaps(found: &[(Range<usize>, ToolCall)], range: &Range<usize>) -> bool {
    found
        .iter()
        .any(|(existing, _)| existing.start < range.end && range.start < existing.end)
}
