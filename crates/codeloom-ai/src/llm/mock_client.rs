//! Scripted LLM client for conversation tests.
//!
//! Each call to [`LlmClient::complete`] pops the next [`MockStep`]. Once the
//! script runs dry the client echoes the last user message.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_stream::try_stream;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::{AiError, Result};
use crate::response::RawResponse;

use super::{
    CompletionRequest, CompletionResponse, FinishReason, LlmClient, Role, StreamChunk,
    StreamResult, TokenUsage, ToolCall, ToolCallDelta,
};

/// One scripted reaction to a completion request.
#[derive(Debug, Clone)]
pub enum MockStep {
    Reply(CompletionResponse),
    Fail(String),
    /// Never resolves; only cancellation ends the request.
    Hang,
    Delayed(Duration, Box<MockStep>),
}

impl MockStep {
    pub fn text(content: impl Into<String>) -> Self {
        let content = content.into();
        let usage = fake_usage(content.len());
        Self::Reply(CompletionResponse {
            content: RawResponse::Text(content),
            tool_calls: Vec::new(),
            finish_reason: FinishReason::Stop,
            usage: Some(usage),
        })
    }

    /// Any JSON body, e.g. an object carrying a `tool_calls` array.
    pub fn raw(value: Value) -> Self {
        Self::Reply(CompletionResponse {
            content: RawResponse::from(value),
            tool_calls: Vec::new(),
            finish_reason: FinishReason::Stop,
            usage: Some(fake_usage(0)),
        })
    }

    pub fn tool_call(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self::tool_calls(vec![ToolCall {
            id: id.into(),
            name: name.into(),
            arguments,
        }])
    }

    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self::Reply(CompletionResponse {
            content: RawResponse::Null,
            tool_calls: calls,
            finish_reason: FinishReason::ToolCalls,
            usage: Some(fake_usage(0)),
        })
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Fail(message.into())
    }

    pub fn hang() -> Self {
        Self::Hang
    }

    pub fn with_delay(self, delay_ms: u64) -> Self {
        Self::Delayed(Duration::from_millis(delay_ms), Box::new(self))
    }

    async fn play(self) -> Result<CompletionResponse> {
        let mut step = self;
        loop {
            match step {
                MockStep::Reply(response) => return Ok(response),
                MockStep::Fail(message) => return Err(AiError::Llm(message)),
                MockStep::Hang => std::future::pending::<()>().await,
                MockStep::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    step = *inner;
                }
            }
        }
    }
}

fn fake_usage(completion_len: usize) -> TokenUsage {
    let completion_tokens = completion_len as u32;
    TokenUsage {
        prompt_tokens: 1,
        completion_tokens,
        total_tokens: completion_tokens + 1,
    }
}

#[derive(Debug, Default)]
struct MockState {
    script: VecDeque<MockStep>,
    requests: Vec<CompletionRequest>,
}

/// Cheap to clone; clones share the script and the request log.
#[derive(Debug, Clone, Default)]
pub struct MockLlmClient {
    model: String,
    streaming: bool,
    state: Arc<Mutex<MockState>>,
}

impl MockLlmClient {
    pub fn new(model: impl Into<String>) -> Self {
        Self::from_steps(model, Vec::new())
    }

    pub fn from_steps(model: impl Into<String>, steps: Vec<MockStep>) -> Self {
        Self {
            model: model.into(),
            streaming: false,
            state: Arc::new(Mutex::new(MockState {
                script: steps.into(),
                requests: Vec::new(),
            })),
        }
    }

    /// Advertise streaming so the conversation loop uses `complete_stream`.
    pub fn streaming(mut self) -> Self {
        self.streaming = true;
        self
    }

    pub async fn push_step(&self, step: MockStep) {
        self.state.lock().await.script.push_back(step);
    }

    pub async fn requests(&self) -> Vec<CompletionRequest> {
        self.state.lock().await.requests.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.state.lock().await.requests.len()
    }
}

fn echo(request: &CompletionRequest) -> CompletionResponse {
    let text = request
        .messages
        .iter()
        .rev()
        .find(|message| message.role == Role::User)
        .map_or_else(|| "mock-ok".to_string(), |message| format!("mock-echo: {}", message.content));
    let usage = fake_usage(text.len());
    CompletionResponse {
        usage: Some(usage),
        ..CompletionResponse::text(text)
    }
}

/// Split text in two so stream consumers have to accumulate deltas.
fn halves(text: &str) -> [&str; 2] {
    let mid = text
        .char_indices()
        .nth(text.chars().count() / 2)
        .map_or(text.len(), |(index, _)| index);
    let (head, tail) = text.split_at(mid);
    [head, tail]
}

#[async_trait]
impl LlmClient for MockLlmClient {
    fn provider(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let step = {
            let mut state = self.state.lock().await;
            state.requests.push(request.clone());
            state.script.pop_front()
        };

        match step {
            Some(step) => step.play().await,
            None => Ok(echo(&request)),
        }
    }

    fn complete_stream(&self, request: CompletionRequest) -> StreamResult {
        let client = self.clone();
        Box::pin(try_stream! {
            let response = client.complete(request).await?;

            match &response.content {
                RawResponse::Text(text) => {
                    for part in halves(text).into_iter().filter(|part| !part.is_empty()) {
                        yield StreamChunk::text(part);
                    }
                }
                other if !other.is_empty() => {
                    yield StreamChunk::text(other.to_text());
                }
                _ => {}
            }

            for (index, call) in response.tool_calls.iter().enumerate() {
                yield StreamChunk::tool_call(ToolCallDelta {
                    index,
                    id: Some(call.id.clone()),
                    name: Some(call.name.clone()),
                    arguments: Some(serde_json::to_string(&call.arguments)?),
                });
            }

            yield StreamChunk::final_chunk(response.finish_reason, response.usage);
        })
    }

    fn supports_streaming(&self) -> bool {
        self.streaming
    }
}
