//! Tool registry for managing available tools

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;

use codeloom_traits::{SessionMode, Tool, ToolOutput, ToolSchema};

use crate::agent::ApprovalGate;
use crate::error::{AiError, Result};

/// Registry for managing available tools
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
    parallel_lock: Arc<RwLock<()>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    /// Create a new empty tool registry
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
            parallel_lock: Arc::new(RwLock::new(())),
        }
    }

    /// Register a tool
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.register_arc(Arc::new(tool));
    }

    /// Register a tool from Arc
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::warn!(tool = %name, "Replacing previously registered tool");
        }
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Check if tool exists
    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// List all tool names, sorted
    pub fn list(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Get schemas for all registered tools
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.values().map(|t| t.schema()).collect()
    }

    /// Whether a call to `name` needs confirmation in `mode`.
    ///
    /// Unknown tools report `false`; they fail before any approval is asked.
    pub fn needs_approval(
        &self,
        name: &str,
        mode: SessionMode,
        always_allow: &HashSet<String>,
    ) -> bool {
        self.get(name).is_some_and(|tool| {
            ApprovalGate::needs_approval(
                tool.approval_policy(),
                tool.risk(),
                name,
                mode,
                always_allow,
            )
        })
    }

    /// Execute a tool by name
    pub async fn execute(&self, name: &str, input: Value) -> Result<ToolOutput> {
        let tool = self
            .get(name)
            .ok_or_else(|| AiError::ToolNotFound(name.to_string()))?;
        tool.execute(input).await.map_err(Into::into)
    }

    /// Execute a tool with parallel-safety locking.
    /// Parallel-safe tools acquire a shared read lock.
    /// Non-parallel tools acquire an exclusive write lock.
    pub async fn execute_safe(&self, name: &str, input: Value) -> Result<ToolOutput> {
        let tool = self
            .get(name)
            .ok_or_else(|| AiError::ToolNotFound(name.to_string()))?;

        if tool.supports_parallel() {
            let _guard = self.parallel_lock.read().await;
            tool.execute(input).await.map_err(Into::into)
        } else {
            let _guard = self.parallel_lock.write().await;
            tool.execute(input).await.map_err(Into::into)
        }
    }
}
