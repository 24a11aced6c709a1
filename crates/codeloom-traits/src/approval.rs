//! Session modes and per-tool approval policy.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Interaction mode of a conversation session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionMode {
    /// Every non read-only tool asks before running.
    #[default]
    Normal,
    /// File edits run without asking; command execution still asks.
    AutoAccept,
    /// Structured planning; writes are confined to the active plan's documents.
    Plan,
}

impl SessionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionMode::Normal => "normal",
            SessionMode::AutoAccept => "auto-accept",
            SessionMode::Plan => "plan",
        }
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(SessionMode::Normal),
            "auto-accept" | "auto_accept" | "autoaccept" => Ok(SessionMode::AutoAccept),
            "plan" => Ok(SessionMode::Plan),
            other => Err(format!("Unknown session mode: {other}")),
        }
    }
}

/// How a tool decides whether it needs a human confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalPolicy {
    /// Never asks (read-only tools).
    Never,
    /// Always asks, whatever the mode (arbitrary command execution).
    Always,
    /// Asks only in `normal` mode.
    ModeDependent,
}

impl ApprovalPolicy {
    /// Mode-based default, before any always-allow override is applied.
    pub fn requires_approval(self, mode: SessionMode) -> bool {
        match self {
            ApprovalPolicy::Never => false,
            ApprovalPolicy::Always => true,
            ApprovalPolicy::ModeDependent => matches!(mode, SessionMode::Normal),
        }
    }
}
