//! Tool trait and types for agent tools.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::approval::ApprovalPolicy;
use crate::error::Result;

/// JSON Schema for tool parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value, // JSON Schema object
}

/// Risk category of a tool, used for approval and plan-mode gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolRisk {
    /// Reads state only.
    ReadOnly,
    /// Changes files (writes, renames).
    Medium,
    /// Runs arbitrary commands.
    High,
}

impl ToolRisk {
    pub fn default_policy(self) -> ApprovalPolicy {
        match self {
            ToolRisk::ReadOnly => ApprovalPolicy::Never,
            ToolRisk::Medium => ApprovalPolicy::ModeDependent,
            ToolRisk::High => ApprovalPolicy::Always,
        }
    }
}

/// Result of tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub success: bool,
    pub result: Value,
    pub error: Option<String>,
}

impl ToolOutput {
    /// Create a successful tool output.
    pub fn success(result: Value) -> Self {
        Self {
            success: true,
            result,
            error: None,
        }
    }

    /// Create a successful output carrying plain text.
    pub fn text(text: impl Into<String>) -> Self {
        Self::success(Value::String(text.into()))
    }

    /// Create an error tool output.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            result: Value::Null,
            error: Some(message.into()),
        }
    }

    /// Render the output as the text appended to the conversation.
    pub fn render(&self) -> String {
        if !self.success {
            return format!(
                "Error: {}",
                self.error.as_deref().unwrap_or("unknown error")
            );
        }
        match &self.result {
            Value::String(text) => text.clone(),
            Value::Null => String::new(),
            other => serde_json::to_string(other).unwrap_or_default(),
        }
    }
}

/// Core trait for agent tools.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name (used in LLM function calls).
    fn name(&self) -> &str;

    /// Human-readable description for LLM context.
    fn description(&self) -> &str;

    /// JSON Schema for input parameters.
    fn parameters_schema(&self) -> Value;

    /// Execute the tool with given input.
    async fn execute(&self, input: Value) -> Result<ToolOutput>;

    /// Risk category. Defaults to medium so unknown side effects ask first.
    fn risk(&self) -> ToolRisk {
        ToolRisk::Medium
    }

    /// Approval policy; derived from the risk category unless overridden.
    fn approval_policy(&self) -> ApprovalPolicy {
        self.risk().default_policy()
    }

    /// Whether this tool may run alongside its siblings in one batch.
    fn supports_parallel(&self) -> bool {
        matches!(self.risk(), ToolRisk::ReadOnly)
    }

    /// Build complete schema for LLM.
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}
