//! OpenAI-compatible chat completions provider

use std::collections::HashMap;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AiError, Result};
use crate::http_client::build_http_client;
use crate::llm::client::{
    CompletionRequest, CompletionResponse, FinishReason, LlmClient, Message, Role, StreamChunk,
    StreamResult, TokenUsage, ToolCall, ToolCallDelta,
};
use crate::llm::retry::{LlmRetryConfig, send_with_retry};
use crate::response::RawResponse;

/// OpenAI client
pub struct OpenAIClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    retry_config: LlmRetryConfig,
    streaming: bool,
}

impl OpenAIClient {
    /// Create a new OpenAI client
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: build_http_client(),
            api_key: api_key.into(),
            model: "gpt-4o".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            retry_config: LlmRetryConfig::default(),
            streaming: true,
        }
    }

    /// Set the model to use
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set custom base URL (for API-compatible services)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry_config(mut self, config: LlmRetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    /// Enable or disable SSE streaming.
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[derive(Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAITool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<Value>,
}

#[derive(Serialize)]
struct OpenAIMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAIMessageToolCall>>,
}

#[derive(Serialize)]
struct OpenAIMessageToolCall {
    id: String,
    r#type: String,
    function: OpenAIMessageFunction,
}

#[derive(Serialize)]
struct OpenAIMessageFunction {
    name: String,
    arguments: String,
}

#[derive(Serialize)]
struct OpenAITool {
    r#type: String,
    function: OpenAIFunction,
}

#[derive(Serialize)]
struct OpenAIFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIResponseMessage {
    #[serde(default)]
    content: Option<Value>,
    tool_calls: Option<Vec<OpenAIResponseToolCall>>,
}

#[derive(Deserialize)]
struct OpenAIResponseToolCall {
    id: String,
    function: OpenAIResponseFunction,
}

#[derive(Deserialize)]
struct OpenAIResponseFunction {
    name: String,
    arguments: String,
}

#[derive(Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl From<OpenAIUsage> for TokenUsage {
    fn from(usage: OpenAIUsage) -> Self {
        TokenUsage {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }
    }
}

#[derive(Deserialize)]
struct OpenAIStreamResponse {
    #[serde(default)]
    choices: Vec<OpenAIStreamChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Deserialize)]
struct OpenAIStreamChoice {
    delta: OpenAIStreamDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIStreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAIStreamToolCall>>,
}

#[derive(Deserialize)]
struct OpenAIStreamToolCall {
    index: usize,
    id: Option<String>,
    function: Option<OpenAIStreamFunction>,
}

#[derive(Deserialize)]
struct OpenAIStreamFunction {
    name: Option<String>,
    arguments: Option<String>,
}

fn to_openai_message(message: &Message) -> OpenAIMessage {
    let role = match message.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
    .to_string();

    let tool_calls = message.tool_calls.as_ref().map(|calls| {
        calls
            .iter()
            .map(|call| OpenAIMessageToolCall {
                id: call.id.clone(),
                r#type: "function".to_string(),
                function: OpenAIMessageFunction {
                    name: call.name.clone(),
                    arguments: serde_json::to_string(&call.arguments).unwrap_or_default(),
                },
            })
            .collect()
    });

    let content = if message.tool_calls.is_some() && message.content.is_empty() {
        None
    } else {
        Some(message.content.clone())
    };

    OpenAIMessage {
        role,
        content,
        tool_call_id: message.tool_call_id.clone(),
        tool_calls,
    }
}

fn build_request(model: &str, request: &CompletionRequest, stream: bool) -> OpenAIRequest {
    let tools = if request.tools.is_empty() {
        None
    } else {
        Some(
            request
                .tools
                .iter()
                .map(|tool| OpenAITool {
                    r#type: "function".to_string(),
                    function: OpenAIFunction {
                        name: tool.name.clone(),
                        description: tool.description.clone(),
                        parameters: tool.parameters.clone(),
                    },
                })
                .collect(),
        )
    };

    OpenAIRequest {
        model: model.to_string(),
        messages: request.messages.iter().map(to_openai_message).collect(),
        tools,
        temperature: request.temperature,
        max_tokens: request.max_tokens,
        stream,
        stream_options: stream.then(|| serde_json::json!({ "include_usage": true })),
    }
}

/// Empty argument strings mean "no arguments"; unparsable ones become `Null`.
fn parse_tool_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Default::default());
    }
    serde_json::from_str(raw).unwrap_or(Value::Null)
}

/// Parse one SSE `data:` payload into stream chunks.
fn parse_stream_event(
    data: &str,
    tool_call_ids: &mut HashMap<usize, String>,
    tool_call_names: &mut HashMap<usize, String>,
) -> Vec<StreamChunk> {
    let data = data.trim();
    if data.is_empty() || data == "[DONE]" {
        return Vec::new();
    }

    let parsed: OpenAIStreamResponse = match serde_json::from_str(data) {
        Ok(parsed) => parsed,
        Err(error) => {
            tracing::debug!(error = %error, "Skipping unparsable stream event");
            return Vec::new();
        }
    };

    let mut chunks = Vec::new();
    for choice in parsed.choices {
        if let Some(content) = choice.delta.content
            && !content.is_empty()
        {
            chunks.push(StreamChunk::text(content));
        }

        for tc in choice.delta.tool_calls.unwrap_or_default() {
            if let Some(id) = &tc.id {
                tool_call_ids.insert(tc.index, id.clone());
            }
            if let Some(function) = &tc.function
                && let Some(name) = &function.name
            {
                tool_call_names.insert(tc.index, name.clone());
            }
            chunks.push(StreamChunk::tool_call(ToolCallDelta {
                index: tc.index,
                id: tool_call_ids.get(&tc.index).cloned(),
                name: tool_call_names.get(&tc.index).cloned(),
                arguments: tc.function.and_then(|function| function.arguments),
            }));
        }

        if let Some(reason) = choice.finish_reason {
            chunks.push(StreamChunk::final_chunk(
                FinishReason::from_openai(&reason),
                None,
            ));
        }
    }

    if let Some(usage) = parsed.usage {
        chunks.push(StreamChunk {
            usage: Some(usage.into()),
            ..StreamChunk::default()
        });
    }

    chunks
}

#[async_trait]
impl LlmClient for OpenAIClient {
    fn provider(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let body = build_request(&self.model, &request, false);
        let response = send_with_retry(&self.retry_config, "OpenAI", || {
            self.client
                .post(self.endpoint())
                .bearer_auth(&self.api_key)
                .json(&body)
        })
        .await?;

        let data: OpenAIResponse = response.json().await?;
        let choice = data
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AiError::Llm("No response from OpenAI".to_string()))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: parse_tool_arguments(&tc.function.arguments),
            })
            .collect();

        Ok(CompletionResponse {
            content: choice
                .message
                .content
                .map(RawResponse::from)
                .unwrap_or(RawResponse::Null),
            tool_calls,
            finish_reason: choice
                .finish_reason
                .as_deref()
                .map(FinishReason::from_openai)
                .unwrap_or(FinishReason::Stop),
            usage: data.usage.map(Into::into),
        })
    }

    fn complete_stream(&self, request: CompletionRequest) -> StreamResult {
        let client = self.client.clone();
        let api_key = self.api_key.clone();
        let endpoint = self.endpoint();
        let body = build_request(&self.model, &request, true);
        let retry_config = self.retry_config.clone();

        Box::pin(async_stream::stream! {
            let sent = send_with_retry(&retry_config, "OpenAI", || {
                client.post(&endpoint).bearer_auth(&api_key).json(&body)
            })
            .await;
            let response = match sent {
                Ok(response) => response,
                Err(error) => {
                    yield Err(error);
                    return;
                }
            };

            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();
            let mut tool_call_ids = HashMap::new();
            let mut tool_call_names = HashMap::new();

            while let Some(chunk_result) = byte_stream.next().await {
                let chunk = match chunk_result {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        yield Err(AiError::Llm(format!("Stream error: {}", e)));
                        return;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(pos) = buffer.find("\n\n") {
                    let event: String = buffer.drain(..pos + 2).collect();
                    for line in event.lines() {
                        if let Some(data) = line.strip_prefix("data:") {
                            for parsed in parse_stream_event(data, &mut tool_call_ids, &mut tool_call_names) {
                                yield Ok(parsed);
                            }
                        }
                    }
                }
            }

            // Last event may lack the trailing blank line.
            for line in buffer.lines() {
                if let Some(data) = line.strip_prefix("data:") {
                    for parsed in parse_stream_event(data, &mut tool_call_ids, &mut tool_call_names) {
                        yield Ok(parsed);
                    }
                }
            }
        })
    }

    fn supports_streaming(&self) -> bool {
        self.streaming
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeloom_traits::ToolSchema;

    #[test]
    fn test_base_url_drops_trailing_slash() {
        let client = OpenAIClient::new("key").with_base_url("http://x/");
        assert_eq!(client.base_url, "http://x");
        assert_eq!(client.endpoint(), "http://x/chat/completions");
    }

    #[test]
    fn test_build_request_omits_empty_tools() {
        let request = CompletionRequest::new(vec![Message::user("hi")]);
        let body = serde_json::to_value(build_request("gpt-4o", &request, false)).unwrap();
        assert!(body.get("tools").is_none());
        assert!(body.get("stream").is_none());
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn test_build_request_serializes_tool_calls() {
        let call = ToolCall {
            id: "call_1".to_string(),
            name: "read_file".to_string(),
            arguments: serde_json::json!({"path": "a.rs"}),
        };
        let request = CompletionRequest::new(vec![
            Message::assistant_with_tool_calls(None, vec![call]),
            Message::tool_result("call_1", "read_file", "fn main() {}"),
        ])
        .with_tools(vec![ToolSchema {
            name: "read_file".to_string(),
            description: "Read".to_string(),
            parameters: serde_json::json!({"type": "object"}),
        }]);

        let body = serde_json::to_value(build_request("gpt-4o", &request, true)).unwrap();
        assert!(body["messages"][0].get("content").is_none());
        assert_eq!(
            body["messages"][0]["tool_calls"][0]["function"]["arguments"],
            "{\"path\":\"a.rs\"}"
        );
        assert_eq!(body["messages"][1]["tool_call_id"], "call_1");
        assert_eq!(body["stream"], true);
        assert_eq!(body["tools"][0]["function"]["name"], "read_file");
    }

    #[test]
    fn test_parse_stream_event_tool_call_delta() {
        let mut ids = HashMap::new();
        let mut names = HashMap::new();
        let first = parse_stream_event(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_9","function":{"name":"find_files","arguments":"{\"q\""}}]},"finish_reason":null}]}"#,
            &mut ids,
            &mut names,
        );
        let second = parse_stream_event(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":":\"rs\"}"}}]},"finish_reason":"tool_calls"}]}"#,
            &mut ids,
            &mut names,
        );

        let delta = second[0].tool_call_delta.as_ref().unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(delta.id.as_deref(), Some("call_9"));
        assert_eq!(delta.name.as_deref(), Some("find_files"));
        assert_eq!(second[1].finish_reason, Some(FinishReason::ToolCalls));
    }

    #[test]
    fn test_parse_stream_event_done_marker() {
        let mut ids = HashMap::new();
        let mut names = HashMap::new();
        assert!(parse_stream_event(" [DONE]", &mut ids, &mut names).is_empty());
    }
}
