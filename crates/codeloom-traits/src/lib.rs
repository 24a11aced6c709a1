//! Codeloom Traits - Shared trait definitions and core abstractions.
//!
//! This crate provides the seams shared across the Codeloom workspace:
//! - Tool trait, ToolSchema, ToolOutput, ToolRisk
//! - Session modes and per-tool approval policy
//! - DocumentStore, the key-value persistence collaborator

pub mod approval;
pub mod error;
pub mod store;
pub mod tool;

pub use approval::{ApprovalPolicy, SessionMode};
pub use error::{Result as ToolResult, ToolError};
pub use store::DocumentStore;
pub use tool::{Tool, ToolOutput, ToolRisk, ToolSchema};
