//! Human-in-the-loop approval for tool calls.

use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::Value;

use codeloom_traits::{ApprovalPolicy, SessionMode, ToolRisk};

/// Details shown to whoever approves a tool call.
#[derive(Debug, Clone)]
pub struct ApprovalRequest {
    pub tool_call_id: String,
    pub tool_name: String,
    pub arguments: Value,
    pub risk: ToolRisk,
    pub mode: SessionMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approved,
    Declined { reason: Option<String> },
    /// Approve this call and stop asking for this tool in the session.
    AlwaysAllow,
}

impl ApprovalDecision {
    pub fn declined() -> Self {
        ApprovalDecision::Declined { reason: None }
    }

    pub fn is_approved(&self) -> bool {
        !matches!(self, ApprovalDecision::Declined { .. })
    }
}

/// Asks a human (or a stand-in) whether a tool call may run.
#[async_trait]
pub trait ApprovalHandler: Send + Sync {
    async fn request_approval(&self, request: &ApprovalRequest) -> ApprovalDecision;
}

/// Approves everything. Used by tests and trusted automation.
pub struct AutoApprove;

#[async_trait]
impl ApprovalHandler for AutoApprove {
    async fn request_approval(&self, _request: &ApprovalRequest) -> ApprovalDecision {
        ApprovalDecision::Approved
    }
}

/// Declines everything that needs approval; for runs with nobody watching.
pub struct AutoDecline {
    reason: String,
}

impl AutoDecline {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl ApprovalHandler for AutoDecline {
    async fn request_approval(&self, request: &ApprovalRequest) -> ApprovalDecision {
        tracing::info!(tool = %request.tool_name, "Declining tool call without an operator");
        ApprovalDecision::Declined {
            reason: Some(self.reason.clone()),
        }
    }
}

/// Approval policy evaluation.
pub struct ApprovalGate;

impl ApprovalGate {
    /// Whether a call to `tool_name` must be confirmed before it runs.
    ///
    /// Read-only tools never ask. A tool in the always-allow set never asks.
    /// Otherwise the tool's policy decides: mode-dependent tools ask only in
    /// normal mode, `Always` tools ask in every mode.
    pub fn needs_approval(
        policy: ApprovalPolicy,
        risk: ToolRisk,
        tool_name: &str,
        mode: SessionMode,
        always_allow: &HashSet<String>,
    ) -> bool {
        if risk == ToolRisk::ReadOnly || always_allow.contains(tool_name) {
            return false;
        }
        policy.requires_approval(mode)
    }
}
