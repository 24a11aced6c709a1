//! Response normalization.
//!
//! Every model turn, whatever its shape, is reduced to a [`NormalizedResponse`]:
//! the prose content, the tool calls found in it and metadata describing how
//! they were found. Extraction runs the format-specific parsers in order and
//! stops at the first one that yields a call. Malformed detection runs
//! independently so near-miss tool calls can be reported back to the model.

mod json;
mod malformed;
mod mixed;
mod raw;
mod xml;

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::{CompletionResponse, ToolCall};

pub use malformed::MalformedReport;
pub use raw::RawResponse;

/// Options controlling [`normalize`].
#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    /// Try the prose parser when the structured parsers find nothing.
    pub allow_mixed_content: bool,
    /// Keep the original response on the metadata for debugging.
    pub preserve_raw_types: bool,
    /// Tool names used for bare `<tool>...</tool>` tags and ambiguity checks.
    pub known_tools: Vec<String>,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            allow_mixed_content: true,
            preserve_raw_types: false,
            known_tools: Vec::new(),
        }
    }
}

impl NormalizeOptions {
    pub fn with_known_tools(mut self, tools: Vec<String>) -> Self {
        self.known_tools = tools;
        self
    }

    pub fn with_mixed_content(mut self, allow: bool) -> Self {
        self.allow_mixed_content = allow;
        self
    }

    pub fn with_raw_types(mut self, preserve: bool) -> Self {
        self.preserve_raw_types = preserve;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectedFormat {
    Plain,
    Json,
    Xml,
    Mixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResponseMetadata {
    pub detected_format: DetectedFormat,
    pub has_code_blocks: bool,
    pub has_xml_tags: bool,
    pub has_json_blocks: bool,
    pub is_malformed: bool,
    pub malformed_error: Option<String>,
    pub confidence: Confidence,
    /// Original response, only kept with `preserve_raw_types`.
    pub raw: Option<RawResponse>,
}

/// Canonical result of one model turn.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub metadata: ResponseMetadata,
}

impl NormalizedResponse {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Diagnostic for a malformed turn that produced no usable call.
    pub fn malformed_diagnostic(&self) -> Option<&str> {
        if self.metadata.is_malformed && self.tool_calls.is_empty() {
            self.metadata.malformed_error.as_deref()
        } else {
            None
        }
    }
}

/// Output of one parser: calls found and the text left once they are removed.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub calls: Vec<ToolCall>,
    pub remainder: String,
}

impl Extraction {
    fn none(text: &str) -> Self {
        Self {
            calls: Vec::new(),
            remainder: text.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Parser {
    Json,
    Xml,
    Mixed,
}

static XML_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"</?[A-Za-z_][\w-]*(?:\s[^<>]*)?/?>|<(?:function|parameter)=")
        .expect("invalid xml tag regex")
});

static EMBEDDED_JSON_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{\s*"(?:name|tool|tool_name|function|tool_calls)"\s*:"#)
        .expect("invalid embedded json regex")
});

static EMBEDDED_XML_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<(?:tool_call|function_calls|invoke)\b|<function=|\[tool_use:")
        .expect("invalid embedded xml regex")
});

static JSON_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"```(?:json|tool_call)\b").expect("invalid json fence regex")
});

/// Normalize a provider response body.
pub fn normalize(raw: &RawResponse, options: &NormalizeOptions) -> NormalizedResponse {
    // Provider-native envelopes carry their calls structurally.
    if let RawResponse::Object(map) = raw
        && (map.contains_key("tool_calls") || map.contains_key("function"))
    {
        let calls = json::calls_from_value(&Value::Object(map.clone()));
        if !calls.is_empty() {
            let content = map
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .trim()
                .to_string();
            let text = raw.to_text();
            return finish(&text, content, calls, DetectedFormat::Json, raw, options);
        }
    }

    let text = raw.to_text();
    let format = classify(&text);

    let order: &[Parser] = match format {
        DetectedFormat::Json => &[Parser::Json, Parser::Xml, Parser::Mixed],
        DetectedFormat::Xml => &[Parser::Xml, Parser::Json, Parser::Mixed],
        DetectedFormat::Mixed => &[Parser::Xml, Parser::Mixed],
        DetectedFormat::Plain => &[],
    };

    for parser in order {
        let extraction = match parser {
            Parser::Json => json::parse(&text),
            Parser::Xml => xml::parse(&text, &options.known_tools),
            Parser::Mixed if options.allow_mixed_content => mixed::parse(&text),
            Parser::Mixed => continue,
        };
        if !extraction.calls.is_empty() {
            tracing::debug!(
                parser = ?parser,
                calls = extraction.calls.len(),
                "Extracted tool calls from response text"
            );
            return finish(
                &text,
                extraction.remainder,
                extraction.calls,
                format,
                raw,
                options,
            );
        }
    }

    let content = text.trim().to_string();
    finish(&text, content, Vec::new(), format, raw, options)
}

/// Normalize a full completion, preferring the provider's native tool calls.
pub fn normalize_completion(
    response: &CompletionResponse,
    options: &NormalizeOptions,
) -> NormalizedResponse {
    if response.tool_calls.is_empty() {
        return normalize(&response.content, options);
    }

    let text = response.content.to_text();
    let mut calls = Vec::with_capacity(response.tool_calls.len());
    let mut rejected = Vec::new();
    for call in &response.tool_calls {
        match json::normalize_arguments(&call.arguments) {
            Some(arguments) => calls.push(ToolCall {
                arguments,
                ..call.clone()
            }),
            None => rejected.push(call.name.clone()),
        }
    }

    let content = text.trim().to_string();
    let format = classify(&text);
    let mut normalized = finish(&text, content, calls, format, &response.content, options);
    if !rejected.is_empty() {
        tracing::warn!(tools = ?rejected, "Dropping native tool calls with unusable arguments");
        normalized.metadata.is_malformed = true;
        normalized.metadata.malformed_error = Some(format!(
            "Arguments for {} were not a JSON object; the call was not executed.",
            rejected
                .iter()
                .map(|name| format!("`{name}`"))
                .collect::<Vec<_>>()
                .join(", ")
        ));
        if normalized.tool_calls.is_empty() {
            normalized.metadata.confidence = Confidence::Low;
        }
    }
    normalized
}

/// True when the turn carries usable, confidently parsed content.
pub fn is_response_complete(response: &NormalizedResponse) -> bool {
    !response.content.trim().is_empty()
        && !response.metadata.is_malformed
        && response.metadata.confidence != Confidence::Low
}

fn classify(text: &str) -> DetectedFormat {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return DetectedFormat::Plain;
    }
    if trimmed.starts_with('{') || trimmed.ends_with('}') || trimmed.starts_with("```json") {
        return DetectedFormat::Json;
    }
    if trimmed.starts_with('<') || trimmed.ends_with('>') {
        return DetectedFormat::Xml;
    }
    if EMBEDDED_JSON_CALL.is_match(trimmed)
        || EMBEDDED_XML_CALL.is_match(trimmed)
        || JSON_FENCE.is_match(trimmed)
    {
        return DetectedFormat::Mixed;
    }
    DetectedFormat::Plain
}

fn finish(
    text: &str,
    content: String,
    tool_calls: Vec<ToolCall>,
    detected_format: DetectedFormat,
    raw: &RawResponse,
    options: &NormalizeOptions,
) -> NormalizedResponse {
    let report = malformed::detect(text);
    let is_malformed = report.is_some();
    if let Some(report) = &report {
        tracing::warn!(
            pattern = report.pattern,
            extracted = tool_calls.len(),
            "Malformed tool call in model output"
        );
    }

    let confidence = if is_malformed && tool_calls.is_empty() {
        Confidence::Low
    } else if !tool_calls.is_empty() {
        Confidence::High
    } else if detected_format != DetectedFormat::Plain {
        Confidence::Medium
    } else if is_ambiguous_plain(&content, &options.known_tools) {
        Confidence::Low
    } else {
        Confidence::High
    };

    NormalizedResponse {
        content,
        metadata: ResponseMetadata {
            detected_format,
            has_code_blocks: text.contains("```"),
            has_xml_tags: XML_TAG.is_match(text),
            has_json_blocks: JSON_FENCE.is_match(text) || EMBEDDED_JSON_CALL.is_match(text),
            is_malformed,
            malformed_error: report.map(|report| report.message),
            confidence,
            raw: options.preserve_raw_types.then(|| raw.clone()),
        },
        tool_calls,
    }
}

/// Empty text, or prose naming a known tool as if calling it.
fn is_ambiguous_plain(content: &str, known_tools: &[String]) -> bool {
    if content.trim().is_empty() {
        return true;
    }
    known_tools.iter().any(|tool| {
        content.contains(&format!("{tool}(")) || content.contains(&format!("`{tool}`"))
    })
}

/// Remove byte ranges from `text` and tidy the whitespace left behind.
pub(crate) fn remove_spans(text: &str, mut spans: Vec<Range<usize>>) -> String {
    spans.sort_by_key(|span| span.start);
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for span in spans {
        if span.start < cursor {
            cursor = cursor.max(span.end);
            continue;
        }
        out.push_str(&text[cursor..span.start]);
        cursor = span.end;
    }
    if cursor < text.len() {
        out.push_str(&text[cursor..]);
    }

    let mut tidy = String::with_capacity(out.len());
    let mut blank_run = 0;
    for line in out.lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        tidy.push_str(line.trim_end());
        tidy.push('\n');
    }
    tidy.trim().to_string()
}

#[cfg(test)]
mod tests;
