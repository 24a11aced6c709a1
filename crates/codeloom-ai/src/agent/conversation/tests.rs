use super::*;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tempfile::tempdir;
use tokio::sync::mpsc;

use codeloom_traits::{SessionMode, Tool, ToolError, ToolOutput, ToolRisk};

use crate::agent::approval::{ApprovalDecision, ApprovalRequest, AutoApprove, AutoDecline};
use crate::agent::stream::{ChannelEmitter, ConversationEvent, NullEmitter};
use crate::error::AiError;
use crate::llm::{MockLlmClient, MockStep, ToolCall};
use crate::plan::PlanPhase;
use crate::tools::builtin_registry;

/// Tool that records calls and answers with a fixed text after a delay.
struct ScriptedTool {
    name: &'static str,
    risk: ToolRisk,
    reply: &'static str,
    delay_ms: u64,
    fail: bool,
    calls: Arc<AtomicUsize>,
}

impl ScriptedTool {
    fn new(name: &'static str, risk: ToolRisk) -> Self {
        Self {
            name,
            risk,
            reply: "ok",
            delay_ms: 0,
            fail: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn replying(mut self, reply: &'static str) -> Self {
        self.reply = reply;
        self
    }

    fn delayed(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl Tool for ScriptedTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "scripted test tool"
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object"})
    }

    fn risk(&self) -> ToolRisk {
        self.risk
    }

    async fn execute(&self, _input: Value) -> codeloom_traits::ToolResult<ToolOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
        if self.fail {
            return Err(ToolError::Tool(format!("{} exploded", self.name)));
        }
        Ok(ToolOutput::text(self.reply))
    }
}

/// Approval handler that counts requests and always answers the same.
struct CountingApprovals {
    decision: ApprovalDecision,
    requests: AtomicUsize,
}

#[async_trait]
impl ApprovalHandler for CountingApprovals {
    async fn request_approval(&self, _request: &ApprovalRequest) -> ApprovalDecision {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.decision.clone()
    }
}

fn registry_with(tools: Vec<ScriptedTool>) -> Arc<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    for tool in tools {
        registry.register(tool);
    }
    Arc::new(registry)
}

fn session() -> Arc<Session> {
    Arc::new(Session::new("/work", SessionMode::Normal))
}

fn conversation(
    llm: &MockLlmClient,
    tools: Arc<ToolRegistry>,
    session: Arc<Session>,
    approvals: Arc<dyn ApprovalHandler>,
) -> ConversationLoop {
    ConversationLoop::new(Arc::new(llm.clone()), tools, session, approvals)
}

fn drain(mut rx: mpsc::Receiver<ConversationEvent>) -> Vec<ConversationEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_single_tool_call_turn_ends_after_two_model_calls() {
    let dir = tempdir().unwrap();
    std::fs::create_dir(dir.path().join("src")).unwrap();
    std::fs::write(dir.path().join("src/main.rs"), "fn main() {}").unwrap();

    let llm = MockLlmClient::from_steps(
        "mock",
        vec![
            MockStep::tool_call("call_1", "find_files", json!({"pattern": "main"})),
            MockStep::text("In summary, the project has a single src/main.rs entry point."),
        ],
    );
    let tools = Arc::new(builtin_registry(dir.path(), 30));
    let session = Arc::new(Session::new(dir.path(), SessionMode::Normal));
    let conversation = conversation(&llm, tools, session, Arc::new(AutoApprove));

    let mut history = vec![Message::user("list files")];
    let outcome = conversation
        .run(&mut history, &mut NullEmitter, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.status, TurnStatus::Completed);
    assert_eq!(outcome.model_calls, 2);
    assert_eq!(outcome.tool_calls_executed, 1);
    assert_eq!(
        outcome.final_answer,
        "In summary, the project has a single src/main.rs entry point."
    );
    assert_eq!(llm.call_count().await, 2);

    assert_eq!(history.len(), 4);
    assert_eq!(history[1].role, Role::Assistant);
    assert_eq!(history[1].calls()[0].name, "find_files");
    assert_eq!(history[2].role, Role::Tool);
    assert_eq!(history[2].tool_call_id.as_deref(), Some("call_1"));
    assert_eq!(history[2].content, "src/main.rs");
    assert_eq!(history[3].role, Role::Assistant);

    let second = &llm.requests().await[1];
    assert_eq!(second.messages.len(), 3);
    assert!(second.tools.iter().any(|schema| schema.name == "find_files"));
}

#[tokio::test]
async fn test_malformed_call_is_diagnosed_not_executed() {
    let read = ScriptedTool::new("read_file", ToolRisk::ReadOnly);
    let read_calls = read.counter();
    let llm = MockLlmClient::from_steps(
        "mock",
        vec![
            MockStep::raw(json!({"name": "read_file"})),
            MockStep::text("I could not work out which file you meant."),
        ],
    );
    let conversation = conversation(
        &llm,
        registry_with(vec![read]),
        session(),
        Arc::new(AutoApprove),
    );

    let (tx, rx) = mpsc::channel(64);
    let mut emitter = ChannelEmitter::new(tx);
    let mut history = vec![Message::user("read the config")];
    let outcome = conversation
        .run(&mut history, &mut emitter, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.status, TurnStatus::Completed);
    assert_eq!(read_calls.load(Ordering::SeqCst), 0);
    assert_eq!(outcome.diagnostics.len(), 1);
    assert!(!outcome.diagnostics[0].is_empty());
    assert_eq!(outcome.model_calls, 2);
    assert_eq!(
        outcome.final_answer,
        "I could not work out which file you meant."
    );

    // The diagnostic reached the model as part of the transcript.
    let retry = &llm.requests().await[1];
    let note = retry.messages.last().unwrap();
    assert_eq!(note.role, Role::User);
    assert!(note.content.contains(&outcome.diagnostics[0]));

    let events = drain(rx);
    assert!(
        events
            .iter()
            .any(|e| matches!(e, ConversationEvent::Diagnostic { .. }))
    );
    assert!(
        !events
            .iter()
            .any(|e| matches!(e, ConversationEvent::ToolCallStart { .. }))
    );
}

#[tokio::test]
async fn test_repeated_malformed_output_stops_after_retries() {
    let llm = MockLlmClient::from_steps(
        "mock",
        vec![
            MockStep::raw(json!({"name": "read_file"})),
            MockStep::raw(json!({"name": "read_file"})),
            MockStep::raw(json!({"name": "read_file"})),
        ],
    );
    let conversation = conversation(
        &llm,
        registry_with(vec![ScriptedTool::new("read_file", ToolRisk::ReadOnly)]),
        session(),
        Arc::new(AutoApprove),
    )
    .with_config(TurnConfig::default().with_max_malformed_retries(2));

    let mut history = vec![Message::user("read it")];
    let outcome = conversation
        .run(&mut history, &mut NullEmitter, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.status, TurnStatus::Completed);
    assert_eq!(outcome.model_calls, 3);
    assert_eq!(outcome.diagnostics.len(), 3);
}

#[tokio::test]
async fn test_cancel_while_waiting_for_model() {
    let llm = MockLlmClient::from_steps("mock", vec![MockStep::hang()]);
    let conversation = conversation(&llm, registry_with(vec![]), session(), Arc::new(AutoApprove));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let mut history = vec![Message::user("hello")];
    let outcome = conversation
        .run(&mut history, &mut NullEmitter, &cancel)
        .await
        .unwrap();

    assert!(outcome.is_cancelled());
    assert_eq!(outcome.model_calls, 0);
    assert_eq!(history, vec![Message::user("hello")]);
}

#[tokio::test]
async fn test_cancelled_token_skips_model_call() {
    let llm = MockLlmClient::new("mock");
    let conversation = conversation(&llm, registry_with(vec![]), session(), Arc::new(AutoApprove));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let mut history = vec![Message::user("hello")];
    let outcome = conversation
        .run(&mut history, &mut NullEmitter, &cancel)
        .await
        .unwrap();

    assert_eq!(outcome.status, TurnStatus::Cancelled);
    assert_eq!(llm.call_count().await, 0);
}

#[tokio::test]
async fn test_cancel_during_tool_execution_discards_the_step() {
    let slow = ScriptedTool::new("slow", ToolRisk::ReadOnly).delayed(5_000);
    let llm = MockLlmClient::from_steps(
        "mock",
        vec![MockStep::tool_call("call_1", "slow", json!({}))],
    );
    let conversation = conversation(
        &llm,
        registry_with(vec![slow]),
        session(),
        Arc::new(AutoApprove),
    );

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let mut history = vec![Message::user("go")];
    let outcome = conversation
        .run(&mut history, &mut NullEmitter, &cancel)
        .await
        .unwrap();

    assert!(outcome.is_cancelled());
    assert_eq!(outcome.model_calls, 1);
    // No assistant tool call is left without its result.
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn test_declined_call_becomes_tool_result() {
    let danger = ScriptedTool::new("danger", ToolRisk::High);
    let danger_calls = danger.counter();
    let llm = MockLlmClient::from_steps(
        "mock",
        vec![
            MockStep::tool_call("call_1", "danger", json!({"command": "rm -rf /"})),
            MockStep::text("In summary, the command was not run."),
        ],
    );
    let conversation = conversation(
        &llm,
        registry_with(vec![danger]),
        session(),
        Arc::new(AutoDecline::new("not now")),
    );

    let mut history = vec![Message::user("clean up")];
    let outcome = conversation
        .run(&mut history, &mut NullEmitter, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.status, TurnStatus::Completed);
    assert_eq!(danger_calls.load(Ordering::SeqCst), 0);
    assert_eq!(history[2].role, Role::Tool);
    assert_eq!(history[2].content, "User declined to run danger: not now");
}

#[tokio::test]
async fn test_high_risk_tool_asks_even_in_auto_accept() {
    let approvals = Arc::new(CountingApprovals {
        decision: ApprovalDecision::Approved,
        requests: AtomicUsize::new(0),
    });
    let llm = MockLlmClient::from_steps(
        "mock",
        vec![
            MockStep::tool_calls(vec![
                ToolCall::new("danger", json!({})),
                ToolCall::new("edit", json!({})),
            ]),
            MockStep::text("All done."),
        ],
    );
    let conversation = conversation(
        &llm,
        registry_with(vec![
            ScriptedTool::new("danger", ToolRisk::High),
            ScriptedTool::new("edit", ToolRisk::Medium),
        ]),
        Arc::new(Session::new("/work", SessionMode::AutoAccept)),
        approvals.clone(),
    );

    let mut history = vec![Message::user("go")];
    conversation
        .run(&mut history, &mut NullEmitter, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(approvals.requests.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_always_allow_stops_asking() {
    let edit = ScriptedTool::new("edit", ToolRisk::Medium);
    let edit_calls = edit.counter();
    let approvals = Arc::new(CountingApprovals {
        decision: ApprovalDecision::AlwaysAllow,
        requests: AtomicUsize::new(0),
    });
    let llm = MockLlmClient::from_steps(
        "mock",
        vec![
            MockStep::tool_call("call_1", "edit", json!({})),
            MockStep::tool_call("call_2", "edit", json!({})),
            MockStep::text("In summary, both edits are in."),
        ],
    );
    let session = session();
    let conversation = conversation(
        &llm,
        registry_with(vec![edit]),
        Arc::clone(&session),
        approvals.clone(),
    );

    let mut history = vec![Message::user("edit twice")];
    conversation
        .run(&mut history, &mut NullEmitter, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(edit_calls.load(Ordering::SeqCst), 2);
    assert_eq!(approvals.requests.load(Ordering::SeqCst), 1);
    assert!(session.always_allow().contains("edit"));
}

#[tokio::test]
async fn test_results_keep_call_order() {
    let llm = MockLlmClient::from_steps(
        "mock",
        vec![
            MockStep::tool_calls(vec![
                ToolCall {
                    id: "a".into(),
                    name: "slow".into(),
                    arguments: json!({}),
                },
                ToolCall {
                    id: "b".into(),
                    name: "fast".into(),
                    arguments: json!({}),
                },
                ToolCall {
                    id: "c".into(),
                    name: "missing".into(),
                    arguments: json!({}),
                },
                ToolCall {
                    id: "d".into(),
                    name: "broken".into(),
                    arguments: json!({}),
                },
            ]),
            MockStep::text("In summary, three of four calls answered."),
        ],
    );
    let conversation = conversation(
        &llm,
        registry_with(vec![
            ScriptedTool::new("slow", ToolRisk::ReadOnly)
                .replying("slow result")
                .delayed(100),
            ScriptedTool::new("fast", ToolRisk::ReadOnly).replying("fast result"),
            ScriptedTool::new("broken", ToolRisk::ReadOnly).failing(),
        ]),
        session(),
        Arc::new(AutoApprove),
    );

    let mut history = vec![Message::user("go")];
    let outcome = conversation
        .run(&mut history, &mut NullEmitter, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.tool_calls_executed, 4);
    let results: Vec<_> = history
        .iter()
        .filter(|m| m.role == Role::Tool)
        .map(|m| (m.tool_call_id.clone().unwrap(), m.content.clone()))
        .collect();
    assert_eq!(results.len(), 4);
    assert_eq!(results[0], ("a".to_string(), "slow result".to_string()));
    assert_eq!(results[1], ("b".to_string(), "fast result".to_string()));
    assert_eq!(results[2].0, "c");
    assert!(results[2].1.starts_with("Error: Unknown tool 'missing'"));
    assert_eq!(results[3].0, "d");
    assert!(results[3].1.contains("broken exploded"));
}

#[tokio::test]
async fn test_tool_timeout_is_a_tool_result() {
    let llm = MockLlmClient::from_steps(
        "mock",
        vec![
            MockStep::tool_call("call_1", "slow", json!({})),
            MockStep::text("In summary, the tool hung."),
        ],
    );
    let conversation = conversation(
        &llm,
        registry_with(vec![ScriptedTool::new("slow", ToolRisk::ReadOnly).delayed(5_000)]),
        session(),
        Arc::new(AutoApprove),
    )
    .with_config(TurnConfig::default().with_tool_timeout(Duration::from_millis(50)));

    let mut history = vec![Message::user("go")];
    conversation
        .run(&mut history, &mut NullEmitter, &CancellationToken::new())
        .await
        .unwrap();

    assert!(history[2].content.contains("timed out"));
}

#[tokio::test]
async fn test_plan_mode_blocks_destructive_tools_and_tracks_phase() {
    let dir = tempdir().unwrap();
    let plan_dir = dir.path().join(".codeloom/plans/p1");
    let session = Arc::new(Session::new(dir.path(), SessionMode::Normal));
    session.begin_plan("p1", &plan_dir).unwrap();

    let write = ScriptedTool::new("write_file", ToolRisk::Medium);
    let command = ScriptedTool::new("run_command", ToolRisk::High);
    let write_calls = write.counter();
    let command_calls = command.counter();
    let plan_doc = plan_dir.join("proposal.md");
    let llm = MockLlmClient::from_steps(
        "mock",
        vec![
            MockStep::tool_calls(vec![
                ToolCall::new("run_command", json!({"command": "cargo build"})),
                ToolCall::new("write_file", json!({"path": "src/lib.rs", "content": "x"})),
                ToolCall::new(
                    "write_file",
                    json!({"path": plan_doc.to_string_lossy(), "content": "# Proposal"}),
                ),
            ]),
            MockStep::text("Moving to the design phase. In summary, the proposal is written."),
        ],
    );
    let conversation = conversation(
        &llm,
        registry_with(vec![write, command]),
        Arc::clone(&session),
        Arc::new(AutoApprove),
    );

    let (tx, rx) = mpsc::channel(64);
    let mut emitter = ChannelEmitter::new(tx);
    let mut history = vec![Message::user("plan the refactor")];
    conversation
        .run(&mut history, &mut emitter, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(command_calls.load(Ordering::SeqCst), 0);
    assert_eq!(write_calls.load(Ordering::SeqCst), 1);
    assert!(history[2].content.contains("not available in plan mode"));
    assert!(history[3].content.starts_with("Error: Plan mode only allows"));
    assert_eq!(history[4].content, "ok");

    assert_eq!(session.plan_phase(), Some(PlanPhase::Design));
    let events = drain(rx);
    assert!(events.contains(&ConversationEvent::PhaseChanged {
        from: PlanPhase::Understanding,
        to: PlanPhase::Design,
    }));
}

#[tokio::test]
async fn test_narrated_intent_after_tools_is_nudged() {
    let llm = MockLlmClient::from_steps(
        "mock",
        vec![
            MockStep::tool_call("call_1", "list", json!({})),
            MockStep::text("Let me check the remaining files..."),
            MockStep::text("In summary, everything is in place."),
        ],
    );
    let conversation = conversation(
        &llm,
        registry_with(vec![ScriptedTool::new("list", ToolRisk::ReadOnly)]),
        session(),
        Arc::new(AutoApprove),
    );

    let mut history = vec![Message::user("audit the tree")];
    let outcome = conversation
        .run(&mut history, &mut NullEmitter, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.model_calls, 3);
    assert_eq!(outcome.continuations, 1);
    assert_eq!(outcome.final_answer, "In summary, everything is in place.");
    assert!(
        history
            .iter()
            .any(|m| m.role == Role::User && m.content == "Continue.")
    );
}

#[tokio::test]
async fn test_narration_without_tool_results_is_final() {
    let llm = MockLlmClient::from_steps(
        "mock",
        vec![MockStep::text("Let me check the remaining files...")],
    );
    let conversation = conversation(&llm, registry_with(vec![]), session(), Arc::new(AutoApprove));

    let mut history = vec![Message::user("hi")];
    let outcome = conversation
        .run(&mut history, &mut NullEmitter, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.model_calls, 1);
    assert_eq!(outcome.continuations, 0);
}

#[tokio::test]
async fn test_streamed_turn_emits_deltas_and_runs_tools() {
    let list = ScriptedTool::new("list", ToolRisk::ReadOnly).replying("a.rs");
    let llm = MockLlmClient::from_steps(
        "mock",
        vec![
            MockStep::tool_call("call_1", "list", json!({})),
            MockStep::text("In summary, there is one file."),
        ],
    )
    .streaming();
    let conversation = conversation(
        &llm,
        registry_with(vec![list]),
        session(),
        Arc::new(AutoApprove),
    );

    let (tx, rx) = mpsc::channel(64);
    let mut emitter = ChannelEmitter::new(tx);
    let mut history = vec![Message::user("list")];
    let outcome = conversation
        .run(&mut history, &mut emitter, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.final_answer, "In summary, there is one file.");
    assert_eq!(history[2].content, "a.rs");

    let events = drain(rx);
    let streamed: String = events
        .iter()
        .filter_map(|e| match e {
            ConversationEvent::TextDelta { content } => Some(content.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(streamed, "In summary, there is one file.");
    assert_eq!(events.last(), Some(&ConversationEvent::Complete));
}

#[tokio::test]
async fn test_model_error_propagates_and_keeps_completed_steps() {
    let llm = MockLlmClient::from_steps(
        "mock",
        vec![
            MockStep::tool_call("call_1", "list", json!({})),
            MockStep::error("upstream exploded"),
        ],
    );
    let conversation = conversation(
        &llm,
        registry_with(vec![ScriptedTool::new("list", ToolRisk::ReadOnly)]),
        session(),
        Arc::new(AutoApprove),
    );

    let mut history = vec![Message::user("list")];
    let err = conversation
        .run(&mut history, &mut NullEmitter, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, AiError::Llm(ref message) if message == "upstream exploded"));
    assert!(!err.is_cancelled());
    assert_eq!(history.len(), 3);
    assert_eq!(history[2].role, Role::Tool);
}

#[tokio::test]
async fn test_system_prompt_is_prepended_once() {
    let llm = MockLlmClient::from_steps("mock", vec![MockStep::text("Hello!")]);
    let conversation = conversation(&llm, registry_with(vec![]), session(), Arc::new(AutoApprove))
        .with_config(TurnConfig::default().with_system_prompt("You are a coding assistant."));

    let mut history = vec![Message::user("hi"), Message::user("are you there?")];
    conversation
        .run(&mut history, &mut NullEmitter, &CancellationToken::new())
        .await
        .unwrap();

    let request = &llm.requests().await[0];
    assert_eq!(request.messages.len(), 2);
    assert_eq!(request.messages[0].role, Role::System);
    assert_eq!(request.messages[1].content, "hi\n\nare you there?");
    // Stored history keeps both user messages.
    assert_eq!(history.len(), 3);
}
