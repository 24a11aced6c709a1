//! Tool calls expressed as JSON documents.

use serde_json::{Map, Value};

use super::Extraction;
use crate::llm::{ToolCall, generate_call_id};

const NAME_KEYS: [&str; 3] = ["name", "tool", "tool_name"];
const ARGUMENT_KEYS: [&str; 4] = ["arguments", "parameters", "input", "args"];

/// Parse a whole document as JSON and extract the tool calls it describes.
pub fn parse(text: &str) -> Extraction {
    let body = strip_enclosing_fence(text.trim());
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return Extraction::none(text);
    };

    let calls = calls_from_value(&value);
    if calls.is_empty() {
        return Extraction::none(text);
    }

    // A `{content, tool_calls}` envelope keeps its prose.
    let remainder = value
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Extraction { calls, remainder }
}

/// Collect every well-formed tool call in a JSON value.
pub(crate) fn calls_from_value(value: &Value) -> Vec<ToolCall> {
    match value {
        Value::Object(map) => {
            if let Some(Value::Array(items)) = map.get("tool_calls") {
                return items.iter().flat_map(calls_from_value).collect();
            }
            call_from_object(map).into_iter().collect()
        }
        Value::Array(items) => items.iter().flat_map(calls_from_value).collect(),
        _ => Vec::new(),
    }
}

/// Build a tool call from one object, or `None` when its name or arguments
/// are missing or unusable.
pub(crate) fn call_from_object(map: &Map<String, Value>) -> Option<ToolCall> {
    let id = map
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string);

    if let Some(Value::Object(function)) = map.get("function") {
        let name = function.get("name").and_then(Value::as_str)?;
        let arguments = normalize_arguments(function.get("arguments")?)?;
        return build(id, name, arguments);
    }

    let name = NAME_KEYS
        .iter()
        .find_map(|key| map.get(*key).and_then(Value::as_str))?;
    let raw_arguments = ARGUMENT_KEYS.iter().find_map(|key| map.get(*key))?;
    build(id, name, normalize_arguments(raw_arguments)?)
}

fn build(id: Option<String>, name: &str, arguments: Value) -> Option<ToolCall> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some(ToolCall {
        id: id.unwrap_or_else(generate_call_id),
        name: name.to_string(),
        arguments,
    })
}

/// Accept an object, or a string holding a JSON object.
pub(crate) fn normalize_arguments(value: &Value) -> Option<Value> {
    match value {
        Value::Object(_) => Some(value.clone()),
        Value::String(text) if !text.trim().is_empty() => {
            match serde_json::from_str::<Value>(text) {
                Ok(parsed @ Value::Object(_)) => Some(parsed),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Drop a single Markdown fence wrapping the entire document.
pub(crate) fn strip_enclosing_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return text;
    };
    match body.find('\n') {
        Some(newline) => body[newline + 1..].trim(),
        None => body.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_name_arguments_shape() {
        let extraction = parse(r#"{"name":"read_file","arguments":{"path":"src/lib.rs"}}"#);
        assert_eq!(extraction.calls.len(), 1);
        assert_eq!(extraction.calls[0].name, "read_file");
        assert_eq!(extraction.calls[0].arguments, json!({"path": "src/lib.rs"}));
        assert!(extraction.calls[0].id.starts_with("call_"));
        assert!(extraction.remainder.is_empty());
    }

    #[test]
    fn test_parse_openai_envelope() {
        let extraction = parse(
            r#"{"content":"Looking.","tool_calls":[{"id":"call_7","type":"function","function":{"name":"list_files","arguments":"{\"path\":\".\"}"}}]}"#,
        );
        assert_eq!(extraction.calls[0].id, "call_7");
        assert_eq!(extraction.calls[0].arguments, json!({"path": "."}));
        assert_eq!(extraction.remainder, "Looking.");
    }

    #[test]
    fn test_parse_array_of_calls_and_fence() {
        let text = "```json\n[{\"tool\":\"a\",\"parameters\":{}},{\"name\":\"b\",\"input\":{\"x\":1}}]\n```";
        let extraction = parse(text);
        let names: Vec<_> = extraction.calls.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_rejects_missing_or_empty_arguments() {
        assert!(parse(r#"{"name":"write_file"}"#).calls.is_empty());
        assert!(parse(r#"{"name":"write_file","arguments":null}"#).calls.is_empty());
        assert!(parse(r#"{"name":"write_file","arguments":""}"#).calls.is_empty());
        assert!(parse(r#"{"name":"write_file","arguments":[]}"#).calls.is_empty());
    }

    #[test]
    fn test_not_json_leaves_text() {
        let extraction = parse("{ not json");
        assert!(extraction.calls.is_empty());
        assert_eq!(extraction.remainder, "{ not json");
    }
}
