//! Tool calls embedded in prose: fenced code blocks and inline JSON objects.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use super::{Extraction, remove_spans};
use crate::llm::ToolCall;

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```([\w-]*)[ \t]*\n(.*?)```").expect("invalid fenced block regex")
});

/// Fence languages that may carry a tool call.
const CALL_FENCES: [&str; 5] = ["", "json", "tool_call", "tool", "function"];

pub fn parse(text: &str) -> Extraction {
    let mut found: Vec<(Range<usize>, Vec<ToolCall>)> = Vec::new();

    let fences: Vec<_> = FENCED_BLOCK.captures_iter(text).collect();
    for captures in &fences {
        let (Some(whole), Some(lang), Some(body)) =
            (captures.get(0), captures.get(1), captures.get(2))
        else {
            continue;
        };
        if !CALL_FENCES.contains(&lang.as_str().to_ascii_lowercase().as_str()) {
            continue;
        }
        let extraction = super::json::parse(body.as_str());
        if !extraction.calls.is_empty() {
            found.push((whole.range(), extraction.calls));
        }
    }

    // Inline objects outside any fence.
    let fence_ranges: Vec<Range<usize>> = fences
        .iter()
        .filter_map(|captures| captures.get(0))
        .map(|m| m.range())
        .collect();
    for range in json_object_spans(text) {
        if fence_ranges
            .iter()
            .any(|fence| fence.start <= range.start && range.end <= fence.end)
        {
            continue;
        }
        let Ok(value) = serde_json::from_str::<Value>(&text[range.clone()]) else {
            continue;
        };
        let calls = super::json::calls_from_value(&value);
        if !calls.is_empty() {
            found.push((range, calls));
        }
    }

    if found.is_empty() {
        return Extraction::none(text);
    }

    found.sort_by_key(|(range, _)| range.start);
    let spans = found.iter().map(|(range, _)| range.clone()).collect();
    Extraction {
        calls: found.into_iter().flat_map(|(_, calls)| calls).collect(),
        remainder: remove_spans(text, spans),
    }
}

/// Byte ranges of top-level balanced `{...}` regions, skipping braces in strings.
pub(crate) fn json_object_spans(text: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (index, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = index;
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    spans.push(start..index + 1);
                }
            }
            _ => {}
        }
    }
    spans
}
