mod client;
#[cfg(any(test, feature = "test-utils"))]
mod mock_client;
mod openai;
mod retry;

pub use client::{
    CompletionRequest, CompletionResponse, FinishReason, LlmClient, Message, Role, StreamChunk,
    StreamResult, TokenUsage, ToolCall, ToolCallDelta, generate_call_id,
};
#[cfg(any(test, feature = "test-utils"))]
pub use mock_client::{MockLlmClient, MockStep};
pub use openai::OpenAIClient;
pub use retry::LlmRetryConfig;
