//! Near-miss tool-call shapes that no parser accepts.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use super::mixed::json_object_spans;

/// A recognised broken tool-call pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedReport {
    /// Stable identifier of the matched pattern.
    pub pattern: &'static str,
    /// Diagnostic suitable for the transcript.
    pub message: String,
}

static EMPTY_ARGUMENTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""(?:arguments|parameters|input)"\s*:\s*(?:null|""|\[\s*\])"#)
        .expect("invalid empty arguments regex")
});

static BRACKET_TOOL_USE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[tool_use:\s*([^\]]*)\]").expect("invalid tool_use regex")
});

static FUNCTION_EQUALS_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<function=([^>\s]*)>").expect("invalid function tag regex"));

static PARAMETER_EQUALS_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<parameter=([^>\s]*)>").expect("invalid parameter tag regex")
});

const CALL_ONLY_KEYS: [&str; 5] = ["name", "tool", "tool_name", "id", "type"];

/// Return the first broken pattern found in `text`.
pub fn detect(text: &str) -> Option<MalformedReport> {
    let trimmed = text.trim();

    if trimmed.starts_with('{')
        && trimmed.ends_with('}')
        && trimmed[1..trimmed.len() - 1].trim().is_empty()
    {
        return Some(MalformedReport {
            pattern: "empty_object",
            message: "Received an empty tool call `{}`. Provide a tool name and an arguments object."
                .to_string(),
        });
    }

    if let Some(name) = find_call_without_arguments(trimmed) {
        return Some(MalformedReport {
            pattern: "missing_arguments",
            message: format!(
                "Tool call `{name}` is missing its `arguments` object and was not executed. \
                 Repeat the call with arguments."
            ),
        });
    }

    if let Some(found) = EMPTY_ARGUMENTS.find(trimmed) {
        return Some(MalformedReport {
            pattern: "empty_arguments",
            message: format!(
                "Tool call arguments must be a JSON object, got `{}`.",
                found.as_str()
            ),
        });
    }

    let legacy = [
        (&*BRACKET_TOOL_USE, "bracket_tool_use"),
        (&*FUNCTION_EQUALS_TAG, "function_tag"),
        (&*PARAMETER_EQUALS_TAG, "parameter_tag"),
    ];
    for (pattern, label) in legacy {
        if let Some(found) = pattern.find(trimmed) {
            return Some(MalformedReport {
                pattern: label,
                message: format!(
                    "Unsupported tool call syntax `{}`. Use a JSON tool call with `name` and `arguments`.",
                    found.as_str()
                ),
            });
        }
    }

    None
}

fn find_call_without_arguments(text: &str) -> Option<String> {
    let mut candidates: Vec<Value> = Vec::new();
    if let Ok(value) = serde_json::from_str::<Value>(super::json::strip_enclosing_fence(text)) {
        candidates.push(value);
    } else {
        candidates.extend(
            json_object_spans(text)
                .into_iter()
                .filter_map(|range| serde_json::from_str::<Value>(&text[range]).ok()),
        );
    }

    candidates.iter().find_map(call_name_without_arguments)
}

fn call_name_without_arguments(value: &Value) -> Option<String> {
    match value {
        Value::Array(items) => items.iter().find_map(call_name_without_arguments),
        Value::Object(map) => {
            if let Some(Value::Array(items)) = map.get("tool_calls") {
                return items.iter().find_map(call_name_without_arguments);
            }
            if let Some(Value::Object(function)) = map.get("function") {
                return named_only(function, &["name"]);
            }
            named_only(map, &CALL_ONLY_KEYS)
        }
        _ => None,
    }
}

/// Name of an object that carries a tool name and nothing but identifiers.
fn named_only(map: &Map<String, Value>, allowed: &[&str]) -> Option<String> {
    let name = ["name", "tool", "tool_name"]
        .iter()
        .find_map(|key| map.get(*key).and_then(Value::as_str))?;
    map.keys()
        .all(|key| allowed.contains(&key.as_str()))
        .then(|| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object() {
        assert_eq!(detect("{ }").unwrap().pattern, "empty_object");
    }

    #[test]
    fn test_missing_arguments() {
        let report = detect(r#"{"name":"write_file"}"#).unwrap();
        assert_eq!(report.pattern, "missing_arguments");
        assert!(report.message.contains("write_file"));

        let embedded = detect(r#"Calling {"type":"function","function":{"name":"read_file"}}"#);
        assert_eq!(embedded.unwrap().pattern, "missing_arguments");
    }

    #[test]
    fn test_empty_arguments_variants() {
        for text in [
            r#"{"name":"a","arguments":null}"#,
            r#"{"name":"a","arguments":""}"#,
            r#"{"name":"a","arguments":[ ]}"#,
        ] {
            assert_eq!(detect(text).unwrap().pattern, "empty_arguments", "{text}");
        }
    }

    #[test]
    fn test_legacy_syntaxes() {
        assert_eq!(detect("[tool_use: read_file]").unwrap().pattern, "bracket_tool_use");
        assert_eq!(
            detect("<function=read_file><parameter=path>a</parameter></function>")
                .unwrap()
                .pattern,
            "function_tag"
        );
        assert_eq!(detect("<parameter=path>").unwrap().pattern, "parameter_tag");
    }

    #[test]
    fn test_regular_data_is_not_malformed() {
        assert!(detect(r#"{"name":"Ada","age":36}"#).is_none());
        assert!(detect(r#"{"name":"read_file","arguments":{}}"#).is_none());
        assert!(detect("All done, nothing else to change.").is_none());
    }
}
