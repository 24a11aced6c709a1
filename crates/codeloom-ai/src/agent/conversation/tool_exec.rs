use std::sync::Arc;

use futures::StreamExt;
use futures::stream::FuturesOrdered;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use codeloom_traits::Tool;

use crate::agent::approval::{ApprovalDecision, ApprovalRequest};
use crate::agent::stream::StreamEmitter;
use crate::error::{AiError, Result};
use crate::llm::{Message, ToolCall};

use super::ConversationLoop;

/// Outcome of one tool call, in the shape appended to history.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub tool_name: String,
    pub output: String,
    pub success: bool,
}

impl ToolResult {
    fn failed(call: &ToolCall, message: impl Into<String>) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            output: format!("Error: {}", message.into()),
            success: false,
        }
    }

    pub fn to_message(&self) -> Message {
        Message::tool_result(&self.tool_call_id, &self.tool_name, &self.output)
    }
}

/// A call after gating: either cleared to run or already answered.
enum Gated {
    Run(ToolCall, Arc<dyn Tool>),
    Answered(ToolResult),
}

impl ConversationLoop {
    /// Run a batch of tool calls and return results in call order.
    ///
    /// Gating (lookup, plan policy, approval) happens one call at a time so
    /// approval prompts never overlap. Cleared calls then run concurrently
    /// up to `max_tool_concurrency`. Returns `Err(Cancelled)` when the token
    /// fires; no partial results are handed back in that case.
    pub(crate) async fn execute_tools(
        &self,
        calls: &[ToolCall],
        emitter: &mut dyn StreamEmitter,
        cancel: &CancellationToken,
    ) -> Result<Vec<ToolResult>> {
        let mut gated = Vec::with_capacity(calls.len());
        for call in calls {
            if cancel.is_cancelled() {
                return Err(AiError::Cancelled);
            }
            let arguments = serde_json::to_string(&call.arguments).unwrap_or_default();
            emitter
                .emit_tool_call_start(&call.id, &call.name, &arguments)
                .await;
            gated.push(self.gate(call, emitter, cancel).await?);
        }

        let semaphore = Arc::new(Semaphore::new(self.config.max_tool_concurrency.max(1)));
        let mut ordered = FuturesOrdered::new();
        for entry in gated {
            let semaphore = Arc::clone(&semaphore);
            ordered.push_back(async move {
                match entry {
                    Gated::Answered(result) => Ok(result),
                    Gated::Run(call, tool) => self.run_tool(call, tool, &semaphore, cancel).await,
                }
            });
        }

        let mut results = Vec::with_capacity(calls.len());
        while let Some(result) = ordered.next().await {
            let result = result?;
            emitter
                .emit_tool_call_result(
                    &result.tool_call_id,
                    &result.tool_name,
                    &result.output,
                    result.success,
                )
                .await;
            results.push(result);
        }
        Ok(results)
    }

    async fn gate(
        &self,
        call: &ToolCall,
        emitter: &mut dyn StreamEmitter,
        cancel: &CancellationToken,
    ) -> Result<Gated> {
        let Some(tool) = self.tools.get(&call.name) else {
            tracing::warn!(tool = %call.name, "Model requested an unknown tool");
            return Ok(Gated::Answered(ToolResult::failed(
                call,
                format!(
                    "Unknown tool '{}'. Available tools: {}",
                    call.name,
                    self.tools.list().join(", ")
                ),
            )));
        };

        if let Err(reason) = self
            .session
            .check_tool(&call.name, tool.risk(), &call.arguments)
        {
            tracing::info!(tool = %call.name, %reason, "Tool blocked by plan mode");
            return Ok(Gated::Answered(ToolResult::failed(call, reason)));
        }

        let mode = self.session.mode();
        if !self
            .tools
            .needs_approval(&call.name, mode, &self.session.always_allow())
        {
            return Ok(Gated::Run(call.clone(), tool));
        }

        emitter.emit_approval_requested(&call.id, &call.name).await;
        let request = ApprovalRequest {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            arguments: call.arguments.clone(),
            risk: tool.risk(),
            mode,
        };
        let decision = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AiError::Cancelled),
            decision = self.approvals.request_approval(&request) => decision,
        };

        match decision {
            ApprovalDecision::Approved => Ok(Gated::Run(call.clone(), tool)),
            ApprovalDecision::AlwaysAllow => {
                self.session.allow_always(&call.name);
                Ok(Gated::Run(call.clone(), tool))
            }
            ApprovalDecision::Declined { reason } => {
                tracing::info!(tool = %call.name, "Tool call declined");
                let mut message = format!("User declined to run {}", call.name);
                if let Some(reason) = reason {
                    message.push_str(": ");
                    message.push_str(&reason);
                }
                Ok(Gated::Answered(ToolResult {
                    tool_call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    output: message,
                    success: false,
                }))
            }
        }
    }

    async fn run_tool(
        &self,
        call: ToolCall,
        tool: Arc<dyn Tool>,
        semaphore: &Semaphore,
        cancel: &CancellationToken,
    ) -> Result<ToolResult> {
        let _permit = semaphore
            .acquire()
            .await
            .map_err(|_| AiError::Tool("Tool concurrency semaphore closed".to_string()))?;
        if cancel.is_cancelled() {
            return Err(AiError::Cancelled);
        }

        let timeout = self.config.tool_timeout;
        let execution = tokio::time::timeout(
            timeout,
            self.tools.execute_safe(tool.name(), call.arguments.clone()),
        );
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AiError::Cancelled),
            outcome = execution => outcome,
        };

        let result = match outcome {
            Ok(Ok(output)) => ToolResult {
                tool_call_id: call.id.clone(),
                tool_name: call.name.clone(),
                output: truncate(&output.render(), self.config.max_tool_result_length),
                success: output.success,
            },
            Ok(Err(error)) => {
                tracing::warn!(tool = %call.name, error = %error, "Tool execution failed");
                ToolResult::failed(&call, error.to_string())
            }
            Err(_) => {
                tracing::warn!(tool = %call.name, timeout = ?timeout, "Tool timed out");
                ToolResult::failed(
                    &call,
                    format!("Tool {} timed out after {:?}", call.name, timeout),
                )
            }
        };
        Ok(result)
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars).collect();
    format!("{kept}\n[truncated, {total} characters total]")
}
