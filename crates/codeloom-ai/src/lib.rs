//! Codeloom AI - conversation and tool-calling orchestration
//!
//! This crate provides:
//! - LLM client abstraction with an OpenAI-compatible implementation
//! - Response normalization for native, JSON, XML and prose tool calls
//! - The conversation loop with approval gating, supervised tool execution
//!   and narrated-intent continuation
//! - Plan mode phase tracking and its tool policy
//! - Tool registry and the built-in file and shell tools

pub mod agent;
pub mod error;
mod http_client;
pub mod llm;
pub mod plan;
pub mod response;
pub mod tools;

// Re-export commonly used types
pub use agent::{
    ApprovalDecision, ApprovalHandler, ApprovalRequest, AutoApprove, AutoDecline,
    ConversationEvent, ConversationLoop, FixedModeSelector, ModeSelector, PlanInfo, Session,
    StreamEmitter, TurnConfig, TurnOutcome, TurnStatus,
};
pub use error::{AiError, Result};
pub use llm::{
    CompletionRequest, CompletionResponse, LlmClient, LlmRetryConfig, Message, OpenAIClient, Role,
    ToolCall,
};
#[cfg(any(test, feature = "test-utils"))]
pub use llm::{MockLlmClient, MockStep};
pub use plan::{PhaseTransitionDetector, PlanPhase, RegexPhaseDetector};
pub use response::{NormalizeOptions, NormalizedResponse, RawResponse, normalize};
pub use tools::{ToolRegistry, builtin_registry};
