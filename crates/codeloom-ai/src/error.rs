//! Error types for the AI module

use thiserror::Error;

/// AI module error types
#[derive(Error, Debug)]
pub enum AiError {
    #[error("LLM error: {0}")]
    Llm(String),

    #[error("LLM HTTP error ({provider} {status}): {message}")]
    LlmHttp {
        provider: String,
        status: u16,
        message: String,
        retry_after_secs: Option<u64>,
    },

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid response format: {0}")]
    InvalidFormat(String),

    #[error("Plan mode error: {0}")]
    PlanMode(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AiError {
    /// Whether this error represents a cooperative cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AiError::Cancelled)
    }

    /// Whether a request that failed with this error is worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            AiError::LlmHttp { status, .. } => *status == 429 || *status >= 500,
            AiError::Http(error) => error.is_connect() || error.is_timeout(),
            AiError::Llm(message) => {
                let lower = message.to_lowercase();
                lower.contains("rate limit") || lower.contains("overloaded")
            }
            _ => false,
        }
    }

    pub fn retry_after(&self) -> Option<u64> {
        match self {
            AiError::LlmHttp {
                retry_after_secs, ..
            } => *retry_after_secs,
            _ => None,
        }
    }
}

impl From<codeloom_traits::ToolError> for AiError {
    fn from(error: codeloom_traits::ToolError) -> Self {
        match error {
            codeloom_traits::ToolError::NotFound(name) => AiError::ToolNotFound(name),
            other => AiError::Tool(other.to_string()),
        }
    }
}

/// Result type alias for AI operations
pub type Result<T> = std::result::Result<T, AiError>;
