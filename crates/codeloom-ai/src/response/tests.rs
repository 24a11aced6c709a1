use serde_json::json;

use super::*;
use crate::llm::FinishReason;

fn norm(raw: RawResponse) -> NormalizedResponse {
    normalize(&raw, &NormalizeOptions::default())
}

#[test]
fn test_primitives_normalize_to_their_text() {
    for (value, expected) in [
        (json!(7), "7"),
        (json!(-2.5), "-2.5"),
        (json!(true), "true"),
        (json!(false), "false"),
        (json!(3.0), "3"),
        (json!(1e20), "100000000000000000000"),
    ] {
        let response = norm(RawResponse::from(value));
        assert_eq!(response.content, expected);
        assert!(response.tool_calls.is_empty());
        assert!(!response.metadata.is_malformed);
    }
}

#[test]
fn test_empty_inputs() {
    for raw in [
        RawResponse::Null,
        RawResponse::Text(String::new()),
        RawResponse::Array(Vec::new()),
    ] {
        let response = norm(raw);
        assert_eq!(response.content, "");
        assert!(response.tool_calls.is_empty());
        assert!(!response.metadata.is_malformed);
        assert!(!is_response_complete(&response));
    }
}

#[test]
fn test_arrays_join_with_newlines() {
    let response = norm(RawResponse::from(json!(["one", "two"])));
    assert_eq!(response.content, "one\ntwo");
}

#[test]
fn test_json_tool_call_string() {
    let response = norm(RawResponse::from(
        r#"{"name":"find_files","arguments":{"pattern":"lib"}}"#,
    ));
    assert_eq!(response.tool_calls.len(), 1);
    assert_eq!(response.tool_calls[0].name, "find_files");
    assert_eq!(response.metadata.detected_format, DetectedFormat::Json);
    assert_eq!(response.metadata.confidence, Confidence::High);
    assert!(response.content.is_empty());
}

#[test]
fn test_object_input_is_parsed_like_json_text() {
    let response = norm(RawResponse::from(
        json!({"name": "read_file", "arguments": {"path": "a.txt"}}),
    ));
    assert_eq!(response.tool_calls[0].arguments, json!({"path": "a.txt"}));
}

#[test]
fn test_native_envelope_object() {
    let response = norm(RawResponse::from(json!({
        "content": "Checking.",
        "tool_calls": [{"id": "call_1", "function": {"name": "list_files", "arguments": "{}"}}]
    })));
    assert_eq!(response.content, "Checking.");
    assert_eq!(response.tool_calls[0].id, "call_1");
    assert_eq!(response.metadata.confidence, Confidence::High);
}

#[test]
fn test_missing_arguments_is_malformed() {
    let response = norm(RawResponse::from(r#"{"name":"write_file"}"#));
    assert!(response.metadata.is_malformed);
    assert!(response.tool_calls.is_empty());
    assert!(
        response
            .malformed_diagnostic()
            .is_some_and(|message| !message.is_empty())
    );
    assert_eq!(response.metadata.confidence, Confidence::Low);
    assert!(!is_response_complete(&response));
}

#[test]
fn test_legacy_bracket_syntax_is_malformed() {
    let response = norm(RawResponse::from("Let me look. [tool_use: read_file]"));
    assert!(response.metadata.is_malformed);
    assert!(response.malformed_diagnostic().is_some());
}

#[test]
fn test_xml_tool_call() {
    let response = norm(RawResponse::from(
        "<tool_call>{\"name\":\"read_file\",\"arguments\":{\"path\":\"x\"}}</tool_call>",
    ));
    assert_eq!(response.metadata.detected_format, DetectedFormat::Xml);
    assert_eq!(response.tool_calls.len(), 1);
}

#[test]
fn test_mixed_content_respects_option() {
    let text = "I'll read it.\n```json\n{\"name\":\"read_file\",\"arguments\":{\"path\":\"x\"}}\n```\nThen decide.";
    let allowed = norm(RawResponse::from(text));
    assert_eq!(allowed.metadata.detected_format, DetectedFormat::Mixed);
    assert_eq!(allowed.tool_calls.len(), 1);
    assert_eq!(allowed.content, "I'll read it.\n\nThen decide.");
    assert!(allowed.metadata.has_code_blocks);
    assert!(allowed.metadata.has_json_blocks);

    let denied = normalize(
        &RawResponse::from(text),
        &NormalizeOptions::default().with_mixed_content(false),
    );
    assert!(denied.tool_calls.is_empty());
    assert_eq!(denied.metadata.confidence, Confidence::Medium);
}

#[test]
fn test_first_successful_parser_wins() {
    // Valid as a JSON document, so the XML tag inside the string is never parsed.
    let text = r#"{"name":"read_file","arguments":{"path":"<tool_call>{\"name\":\"x\",\"arguments\":{}}</tool_call>"}}"#;
    let response = norm(RawResponse::from(text));
    assert_eq!(response.tool_calls.len(), 1);
    assert_eq!(response.tool_calls[0].name, "read_file");
}

#[test]
fn test_plain_text_confidence() {
    let response = norm(RawResponse::from("The build passes."));
    assert_eq!(response.metadata.detected_format, DetectedFormat::Plain);
    assert_eq!(response.metadata.confidence, Confidence::High);
    assert!(is_response_complete(&response));

    let ambiguous = normalize(
        &RawResponse::from("Now run `read_file` on it"),
        &NormalizeOptions::default().with_known_tools(vec!["read_file".to_string()]),
    );
    assert_eq!(ambiguous.metadata.confidence, Confidence::Low);
}

#[test]
fn test_preserve_raw_types() {
    let raw = RawResponse::from(json!(12));
    let kept = normalize(&raw, &NormalizeOptions::default().with_raw_types(true));
    assert_eq!(kept.metadata.raw, Some(raw.clone()));
    assert!(norm(raw).metadata.raw.is_none());
}

#[test]
fn test_native_calls_take_precedence() {
    let completion = CompletionResponse {
        content: RawResponse::from("Reading"),
        tool_calls: vec![ToolCall {
            id: "call_1".to_string(),
            name: "read_file".to_string(),
            arguments: json!("{\"path\":\"a\"}"),
        }],
        finish_reason: FinishReason::ToolCalls,
        usage: None,
    };
    let response = normalize_completion(&completion, &NormalizeOptions::default());
    assert_eq!(response.content, "Reading");
    assert_eq!(response.tool_calls[0].arguments, json!({"path": "a"}));
}

#[test]
fn test_remove_spans_collapses_blank_lines() {
    let text = "a\n\nXX\n\nb";
    let start = text.find("XX").unwrap();
    assert_eq!(remove_spans(text, vec![start..start + 2]), "a\n\nb");
}

#[test]
fn test_native_calls_with_broken_arguments_are_dropped() {
    let completion = CompletionResponse {
        content: RawResponse::Null,
        tool_calls: vec![ToolCall {
            id: "call_1".to_string(),
            name: "write_file".to_string(),
            arguments: serde_json::Value::Null,
        }],
        finish_reason: FinishReason::ToolCalls,
        usage: None,
    };
    let response = normalize_completion(&completion, &NormalizeOptions::default());
    assert!(response.tool_calls.is_empty());
    assert!(response.malformed_diagnostic().unwrap().contains("write_file"));
}
