use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::llm::{ToolCall, ToolCallDelta};
use crate::plan::PlanPhase;

/// Receives progress from a running conversation turn.
#[async_trait]
pub trait StreamEmitter: Send + Sync {
    async fn emit_text_delta(&mut self, text: &str);
    async fn emit_tool_call_start(&mut self, id: &str, name: &str, arguments: &str);
    async fn emit_tool_call_result(&mut self, id: &str, name: &str, result: &str, success: bool);
    async fn emit_approval_requested(&mut self, _id: &str, _name: &str) {}
    async fn emit_phase_change(&mut self, _from: PlanPhase, _to: PlanPhase) {}
    async fn emit_diagnostic(&mut self, _message: &str) {}
    async fn emit_continuation(&mut self, _confidence: f32) {}
    async fn emit_complete(&mut self);
}

pub struct NullEmitter;

#[async_trait]
impl StreamEmitter for NullEmitter {
    async fn emit_text_delta(&mut self, _text: &str) {}
    async fn emit_tool_call_start(&mut self, _id: &str, _name: &str, _arguments: &str) {}
    async fn emit_tool_call_result(
        &mut self,
        _id: &str,
        _name: &str,
        _result: &str,
        _success: bool,
    ) {
    }
    async fn emit_complete(&mut self) {}
}

/// Event forwarded by [`ChannelEmitter`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationEvent {
    TextDelta {
        content: String,
    },
    ToolCallStart {
        id: String,
        name: String,
        arguments: String,
    },
    ToolCallResult {
        id: String,
        name: String,
        result: String,
        success: bool,
    },
    ApprovalRequested {
        id: String,
        name: String,
    },
    PhaseChanged {
        from: PlanPhase,
        to: PlanPhase,
    },
    Diagnostic {
        message: String,
    },
    Continuation {
        confidence: f32,
    },
    Complete,
}

pub struct ChannelEmitter {
    tx: mpsc::Sender<ConversationEvent>,
}

impl ChannelEmitter {
    pub fn new(tx: mpsc::Sender<ConversationEvent>) -> Self {
        Self { tx }
    }

    async fn send(&self, event: ConversationEvent) {
        let _ = self.tx.send(event).await;
    }
}

#[async_trait]
impl StreamEmitter for ChannelEmitter {
    async fn emit_text_delta(&mut self, text: &str) {
        self.send(ConversationEvent::TextDelta {
            content: text.to_string(),
        })
        .await;
    }

    async fn emit_tool_call_start(&mut self, id: &str, name: &str, arguments: &str) {
        self.send(ConversationEvent::ToolCallStart {
            id: id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        })
        .await;
    }

    async fn emit_tool_call_result(&mut self, id: &str, name: &str, result: &str, success: bool) {
        self.send(ConversationEvent::ToolCallResult {
            id: id.to_string(),
            name: name.to_string(),
            result: result.to_string(),
            success,
        })
        .await;
    }

    async fn emit_approval_requested(&mut self, id: &str, name: &str) {
        self.send(ConversationEvent::ApprovalRequested {
            id: id.to_string(),
            name: name.to_string(),
        })
        .await;
    }

    async fn emit_phase_change(&mut self, from: PlanPhase, to: PlanPhase) {
        self.send(ConversationEvent::PhaseChanged { from, to }).await;
    }

    async fn emit_diagnostic(&mut self, message: &str) {
        self.send(ConversationEvent::Diagnostic {
            message: message.to_string(),
        })
        .await;
    }

    async fn emit_continuation(&mut self, confidence: f32) {
        self.send(ConversationEvent::Continuation { confidence })
            .await;
    }

    async fn emit_complete(&mut self) {
        self.send(ConversationEvent::Complete).await;
    }
}

#[derive(Debug, Clone)]
struct ToolCallBuilder {
    id: String,
    name: String,
    arguments_json: String,
}

/// Merges streamed tool-call deltas by index.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    builders: BTreeMap<usize, ToolCallBuilder>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accumulate(&mut self, delta: &ToolCallDelta) {
        let builder = self
            .builders
            .entry(delta.index)
            .or_insert_with(|| ToolCallBuilder {
                id: String::new(),
                name: String::new(),
                arguments_json: String::new(),
            });

        if let Some(id) = &delta.id
            && builder.id.is_empty()
        {
            builder.id = id.clone();
        }

        if let Some(name) = &delta.name
            && builder.name.is_empty()
        {
            builder.name = name.clone();
        }

        if let Some(args) = &delta.arguments {
            builder.arguments_json.push_str(args);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.builders.is_empty()
    }

    pub fn finalize(self) -> Vec<ToolCall> {
        self.builders
            .into_values()
            .filter(|builder| !builder.name.is_empty())
            .map(|builder| ToolCall {
                id: if builder.id.is_empty() {
                    crate::llm::generate_call_id()
                } else {
                    builder.id
                },
                name: builder.name,
                arguments: parse_arguments(&builder.arguments_json),
            })
            .collect()
    }
}

fn parse_arguments(json: &str) -> Value {
    if json.trim().is_empty() {
        return Value::Object(serde_json::Map::new());
    }
    match serde_json::from_str(json) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(
                json_len = json.len(),
                error = %e,
                "Failed to parse streamed tool call arguments"
            );
            Value::Null
        }
    }
}
