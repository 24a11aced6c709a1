use std::time::Duration;

use crate::agent::continuation::ContinuationConfig;
use crate::response::NormalizeOptions;

/// Default maximum number of tool calls that can execute concurrently.
pub const DEFAULT_MAX_TOOL_CONCURRENCY: usize = 8;

/// Default cap on the characters of one tool result fed back to the model.
pub const DEFAULT_MAX_TOOL_RESULT_LENGTH: usize = 16_000;

/// Default number of consecutive malformed turns answered with a diagnostic.
pub const DEFAULT_MAX_MALFORMED_RETRIES: usize = 2;

/// Configuration for one conversation turn
#[derive(Debug, Clone)]
pub struct TurnConfig {
    /// Prepended to the outbound messages when history has no system message.
    pub system_prompt: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Timeout for each tool execution (default: 300s).
    pub tool_timeout: Duration,
    pub max_tool_concurrency: usize,
    /// Max characters for tool results to prevent context overflow.
    pub max_tool_result_length: usize,
    /// Use token streaming when the client supports it.
    pub stream: bool,
    pub max_malformed_retries: usize,
    pub continuation: ContinuationConfig,
    pub normalize: NormalizeOptions,
    /// User message sent when the model narrates instead of acting.
    pub continue_nudge: String,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            system_prompt: None,
            temperature: None,
            max_tokens: None,
            tool_timeout: Duration::from_secs(300),
            max_tool_concurrency: DEFAULT_MAX_TOOL_CONCURRENCY,
            max_tool_result_length: DEFAULT_MAX_TOOL_RESULT_LENGTH,
            stream: true,
            max_malformed_retries: DEFAULT_MAX_MALFORMED_RETRIES,
            continuation: ContinuationConfig::default(),
            normalize: NormalizeOptions::default(),
            continue_nudge: "Continue.".to_string(),
        }
    }
}

impl TurnConfig {
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn with_max_tool_concurrency(mut self, max: usize) -> Self {
        self.max_tool_concurrency = max.max(1);
        self
    }

    pub fn with_max_tool_result_length(mut self, max: usize) -> Self {
        self.max_tool_result_length = max;
        self
    }

    pub fn with_streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_max_malformed_retries(mut self, retries: usize) -> Self {
        self.max_malformed_retries = retries;
        self
    }

    pub fn with_continuation(mut self, continuation: ContinuationConfig) -> Self {
        self.continuation = continuation;
        self
    }

    pub fn with_normalize(mut self, normalize: NormalizeOptions) -> Self {
        self.normalize = normalize;
        self
    }
}
