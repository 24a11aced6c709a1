//! The conversation loop.
//!
//! One call to [`ConversationLoop::run`] drives the model until it produces a
//! final answer, the token is cancelled, or a fatal error surfaces:
//!
//! 1. filter a copy of the history and call the model (buffered or streamed)
//! 2. normalize the response and let the session's plan machine observe it
//! 3. run any tool calls through the supervisor, append the assistant turn
//!    and its results together, and go round again
//! 4. otherwise answer malformed output with a diagnostic, nudge narrated
//!    intent after tool results, or stop with the final answer
//!
//! History only grows by complete steps, so an error or cancellation never
//! leaves an assistant tool call without its results.

mod config;
mod streaming;
mod tool_exec;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::agent::approval::ApprovalHandler;
use crate::agent::continuation::ContinuationDetector;
use crate::agent::message_filter::filter_outbound;
use crate::agent::session::Session;
use crate::agent::stream::StreamEmitter;
use crate::error::Result;
use crate::llm::{CompletionRequest, CompletionResponse, LlmClient, Message, Role};
use crate::response::{NormalizeOptions, normalize_completion};
use crate::tools::ToolRegistry;

pub use config::{
    DEFAULT_MAX_MALFORMED_RETRIES, DEFAULT_MAX_TOOL_CONCURRENCY, DEFAULT_MAX_TOOL_RESULT_LENGTH,
    TurnConfig,
};
pub use tool_exec::ToolResult;

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStatus {
    Completed,
    Cancelled,
}

/// Summary of one [`ConversationLoop::run`].
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub status: TurnStatus,
    /// Text of the last assistant turn; empty when cancelled.
    pub final_answer: String,
    pub model_calls: usize,
    pub tool_calls_executed: usize,
    /// Malformed-output diagnostics raised during the turn.
    pub diagnostics: Vec<String>,
    pub continuations: usize,
}

impl TurnOutcome {
    fn new() -> Self {
        Self {
            status: TurnStatus::Completed,
            final_answer: String::new(),
            model_calls: 0,
            tool_calls_executed: 0,
            diagnostics: Vec::new(),
            continuations: 0,
        }
    }

    fn cancelled(mut self) -> Self {
        tracing::info!(model_calls = self.model_calls, "Conversation turn cancelled");
        self.status = TurnStatus::Cancelled;
        self.final_answer.clear();
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == TurnStatus::Cancelled
    }
}

/// Drives one model through tool-using turns.
pub struct ConversationLoop {
    llm: Arc<dyn LlmClient>,
    tools: Arc<ToolRegistry>,
    session: Arc<Session>,
    approvals: Arc<dyn ApprovalHandler>,
    config: TurnConfig,
    normalize: NormalizeOptions,
    continuation: ContinuationDetector,
}

impl ConversationLoop {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        tools: Arc<ToolRegistry>,
        session: Arc<Session>,
        approvals: Arc<dyn ApprovalHandler>,
    ) -> Self {
        let config = TurnConfig::default();
        Self {
            normalize: normalize_options(&config, &tools),
            continuation: ContinuationDetector::new(config.continuation.clone()),
            llm,
            tools,
            session,
            approvals,
            config,
        }
    }

    pub fn with_config(mut self, config: TurnConfig) -> Self {
        self.normalize = normalize_options(&config, &self.tools);
        self.continuation = ContinuationDetector::new(config.continuation.clone());
        self.config = config;
        self
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn config(&self) -> &TurnConfig {
        &self.config
    }

    /// Run the model against `history` until it stops, appending each
    /// completed step to `history`.
    ///
    /// Cancellation is reported as [`TurnStatus::Cancelled`]. Any other
    /// failure of the model call is returned as `Err`.
    pub async fn run(
        &self,
        history: &mut Vec<Message>,
        emitter: &mut dyn StreamEmitter,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome> {
        let mut outcome = TurnOutcome::new();
        let mut after_tool_results = false;
        let mut malformed_streak = 0usize;
        let streamed = self.config.stream && self.llm.supports_streaming();

        loop {
            if cancel.is_cancelled() {
                return Ok(outcome.cancelled());
            }

            tracing::debug!(
                iteration = outcome.model_calls + 1,
                messages = history.len(),
                streamed,
                "Requesting model completion"
            );
            let request = self.build_request(history);
            let completion = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(outcome.cancelled()),
                completion = self.complete(request, streamed, emitter) => completion,
            };
            let completion = match completion {
                Ok(completion) => completion,
                Err(error) if error.is_cancelled() => return Ok(outcome.cancelled()),
                Err(error) => {
                    tracing::error!(error = %error, "Model call failed");
                    return Err(error);
                }
            };
            outcome.model_calls += 1;

            let normalized = normalize_completion(&completion, &self.normalize);
            if !streamed && !normalized.content.is_empty() {
                emitter.emit_text_delta(&normalized.content).await;
            }
            if let Some(transition) = self.session.observe(&normalized.content) {
                emitter
                    .emit_phase_change(transition.from, transition.to)
                    .await;
            }
            if normalized.metadata.is_malformed
                && let Some(diagnostic) = normalized.metadata.malformed_error.clone()
            {
                tracing::warn!(diagnostic = %diagnostic, "Malformed tool call in model output");
                emitter.emit_diagnostic(&diagnostic).await;
                outcome.diagnostics.push(diagnostic);
            }

            if normalized.has_tool_calls() {
                malformed_streak = 0;
                let results = match self
                    .execute_tools(&normalized.tool_calls, emitter, cancel)
                    .await
                {
                    Ok(results) => results,
                    Err(error) if error.is_cancelled() => return Ok(outcome.cancelled()),
                    Err(error) => return Err(error),
                };
                outcome.tool_calls_executed += results.len();
                let content = (!normalized.content.is_empty()).then_some(normalized.content);
                history.push(Message::assistant_with_tool_calls(
                    content,
                    normalized.tool_calls,
                ));
                history.extend(results.iter().map(ToolResult::to_message));
                after_tool_results = true;
                continue;
            }

            if let Some(diagnostic) = normalized.malformed_diagnostic()
                && malformed_streak < self.config.max_malformed_retries
            {
                malformed_streak += 1;
                history.push(Message::assistant(completion.content.to_text()));
                history.push(Message::user(format!(
                    "{diagnostic} Re-send the tool call with a complete JSON `arguments` object, or reply without tools."
                )));
                after_tool_results = false;
                continue;
            }

            if after_tool_results {
                let decision = self.continuation.detect(&normalized.content, true);
                if decision.should_continue {
                    tracing::debug!(
                        confidence = decision.confidence,
                        patterns = ?decision.detected_patterns,
                        "Model narrated further work; nudging it to continue"
                    );
                    emitter.emit_continuation(decision.confidence).await;
                    outcome.continuations += 1;
                    history.push(Message::assistant(normalized.content));
                    history.push(Message::user(self.config.continue_nudge.clone()));
                    after_tool_results = false;
                    continue;
                }
            }

            if !normalized.content.is_empty() {
                history.push(Message::assistant(normalized.content.clone()));
            }
            outcome.final_answer = normalized.content;
            tracing::info!(
                model_calls = outcome.model_calls,
                tool_calls = outcome.tool_calls_executed,
                "Conversation turn completed"
            );
            emitter.emit_complete().await;
            return Ok(outcome);
        }
    }

    async fn complete(
        &self,
        request: CompletionRequest,
        streamed: bool,
        emitter: &mut dyn StreamEmitter,
    ) -> Result<CompletionResponse> {
        if streamed {
            self.get_streaming_completion(request, emitter).await
        } else {
            self.llm.complete(request).await
        }
    }

    fn build_request(&self, history: &[Message]) -> CompletionRequest {
        let mut messages = filter_outbound(history);
        if let Some(prompt) = &self.config.system_prompt
            && messages.first().is_none_or(|m| m.role != Role::System)
        {
            messages.insert(0, Message::system(prompt.clone()));
        }

        let mut request = CompletionRequest::new(messages).with_tools(self.tools.schemas());
        request.temperature = self.config.temperature;
        request.max_tokens = self.config.max_tokens;
        request
    }
}

fn normalize_options(config: &TurnConfig, tools: &ToolRegistry) -> NormalizeOptions {
    let mut options = config.normalize.clone();
    if options.known_tools.is_empty() {
        options.known_tools = tools.list().into_iter().map(str::to_string).collect();
    }
    options
}
