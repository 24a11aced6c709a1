//! Error types shared by tool implementations and stores.

use thiserror::Error;

/// Tool and persistence error types
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for tool operations
pub type Result<T> = std::result::Result<T, ToolError>;
