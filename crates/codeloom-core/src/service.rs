//! The one conversation a process runs.
//!
//! [`ConversationService`] owns the [`ConversationLoop`] and its history on a
//! dedicated task. Everything else talks to it through a cloneable
//! [`SessionHandle`]; commands are handled one at a time, so interactive
//! input and scheduled jobs never drive the loop concurrently.

use std::sync::Arc;

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use codeloom_ai::agent::{ChannelEmitter, NullEmitter};
use codeloom_ai::{ConversationEvent, ConversationLoop, Message, Session, TurnOutcome};

use crate::scheduler::JobExecutor;

const COMMAND_BUFFER: usize = 32;

enum Command {
    Submit {
        text: String,
        /// Reset the conversation before this message is added.
        fresh: bool,
        cancel: CancellationToken,
        events: Option<mpsc::Sender<ConversationEvent>>,
        reply: oneshot::Sender<codeloom_ai::Result<TurnOutcome>>,
    },
    Clear {
        reply: oneshot::Sender<()>,
    },
    History {
        reply: oneshot::Sender<Vec<Message>>,
    },
}

/// Actor owning the conversation loop and its message history.
pub struct ConversationService {
    conversation: ConversationLoop,
    history: Vec<Message>,
    commands: mpsc::Receiver<Command>,
    current: Arc<Mutex<Option<CancellationToken>>>,
}

impl ConversationService {
    /// Move `conversation` onto its own task and return a handle to it.
    pub fn spawn(conversation: ConversationLoop) -> SessionHandle {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let current = Arc::new(Mutex::new(None));
        let session = Arc::clone(conversation.session());

        let service = Self {
            conversation,
            history: Vec::new(),
            commands: rx,
            current: Arc::clone(&current),
        };
        tokio::spawn(service.run());

        SessionHandle {
            commands: tx,
            current,
            session,
        }
    }

    async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            match command {
                Command::Submit {
                    text,
                    fresh,
                    cancel,
                    events,
                    reply,
                } => {
                    if fresh {
                        self.reset();
                    }
                    let outcome = self.submit(text, cancel, events).await;
                    let _ = reply.send(outcome);
                }
                Command::Clear { reply } => {
                    self.reset();
                    let _ = reply.send(());
                }
                Command::History { reply } => {
                    let _ = reply.send(self.history.clone());
                }
            }
        }
        debug!("Conversation service stopped");
    }

    /// Forget the history, any active plan and mode changes.
    fn reset(&mut self) {
        debug!(messages = self.history.len(), "Conversation reset");
        self.history.clear();
        self.conversation.session().reset();
    }

    async fn submit(
        &mut self,
        text: String,
        cancel: CancellationToken,
        events: Option<mpsc::Sender<ConversationEvent>>,
    ) -> codeloom_ai::Result<TurnOutcome> {
        *self.current.lock() = Some(cancel.clone());
        let kept = self.history.len();
        self.history.push(Message::user(text));

        let outcome = match events {
            Some(tx) => {
                let mut emitter = ChannelEmitter::new(tx);
                self.conversation
                    .run(&mut self.history, &mut emitter, &cancel)
                    .await
            }
            None => {
                self.conversation
                    .run(&mut self.history, &mut NullEmitter, &cancel)
                    .await
            }
        };

        *self.current.lock() = None;
        if let Err(e) = &outcome {
            debug!(
                error = %e,
                dropped = self.history.len() - kept,
                "Turn failed, history rolled back"
            );
            self.history.truncate(kept);
        }
        outcome
    }
}

/// Cloneable entry point to the [`ConversationService`].
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    current: Arc<Mutex<Option<CancellationToken>>>,
    session: Arc<Session>,
}

impl SessionHandle {
    /// Submit a user message and wait for the turn to end.
    pub async fn submit(&self, text: impl Into<String>) -> Result<TurnOutcome> {
        self.submit_with(text, CancellationToken::new(), None).await
    }

    /// Submit with an explicit token and an optional event sink.
    pub async fn submit_with(
        &self,
        text: impl Into<String>,
        cancel: CancellationToken,
        events: Option<mpsc::Sender<ConversationEvent>>,
    ) -> Result<TurnOutcome> {
        self.submit_command(text.into(), false, cancel, events).await
    }

    async fn submit_command(
        &self,
        text: String,
        fresh: bool,
        cancel: CancellationToken,
        events: Option<mpsc::Sender<ConversationEvent>>,
    ) -> Result<TurnOutcome> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Submit {
            text,
            fresh,
            cancel,
            events,
            reply,
        })
        .await?;
        let outcome = rx
            .await
            .map_err(|_| anyhow!("Conversation service dropped the turn"))??;
        Ok(outcome)
    }

    /// Drop the accumulated history, end any active plan and restore the
    /// session's starting mode.
    pub async fn clear(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Clear { reply }).await?;
        rx.await
            .map_err(|_| anyhow!("Conversation service stopped"))
    }

    pub async fn history(&self) -> Result<Vec<Message>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::History { reply }).await?;
        rx.await
            .map_err(|_| anyhow!("Conversation service stopped"))
    }

    /// Cancel the turn in flight, if any. Returns whether one was running.
    pub fn cancel(&self) -> bool {
        match self.current.lock().as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| anyhow!("Conversation service stopped"))
    }
}

#[async_trait]
impl JobExecutor for SessionHandle {
    /// Run a scheduled prompt in a fresh context. The reset and the submit
    /// are one command, so no other turn can slip in between.
    async fn execute(&self, prompt: String, cancel: CancellationToken) -> Result<String> {
        let outcome = self.submit_command(prompt, true, cancel, None).await?;
        if outcome.is_cancelled() {
            bail!("Conversation was cancelled");
        }
        info!(
            model_calls = outcome.model_calls,
            tool_calls = outcome.tool_calls_executed,
            "Scheduled conversation complete"
        );
        Ok(outcome.final_answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeloom_ai::{
        AutoDecline, MockLlmClient, MockStep, Role, ToolRegistry, TurnStatus,
    };
    use codeloom_traits::SessionMode;
    use std::time::Duration;

    fn last_user_is(request: &codeloom_ai::CompletionRequest, prompt: &str) -> bool {
        request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .is_some_and(|m| m.content == prompt)
    }

    fn spawn(steps: Vec<MockStep>) -> (SessionHandle, Arc<MockLlmClient>) {
        let llm = Arc::new(MockLlmClient::from_steps("mock", steps));
        let session = Arc::new(Session::new(std::env::temp_dir(), SessionMode::Normal));
        let conversation = ConversationLoop::new(
            llm.clone(),
            Arc::new(ToolRegistry::new()),
            session,
            Arc::new(AutoDecline::new("unattended")),
        );
        (ConversationService::spawn(conversation), llm)
    }

    #[tokio::test]
    async fn test_submit_keeps_history_across_turns() {
        let (handle, _llm) = spawn(vec![
            MockStep::text("Hello there."),
            MockStep::text("Still here."),
        ]);

        let first = handle.submit("hi").await.unwrap();
        assert_eq!(first.final_answer, "Hello there.");
        handle.submit("again").await.unwrap();

        let history = handle.history().await.unwrap();
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].role, Role::User);

        handle.clear().await.unwrap();
        assert!(handle.history().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_reaches_in_flight_turn() {
        let (handle, _llm) = spawn(vec![MockStep::hang()]);

        let runner = handle.clone();
        let turn = tokio::spawn(async move { runner.submit("wait forever").await });

        let mut cancelled = false;
        for _ in 0..100 {
            if handle.cancel() {
                cancelled = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(cancelled);

        let outcome = turn.await.unwrap().unwrap();
        assert_eq!(outcome.status, TurnStatus::Cancelled);
        assert!(!handle.cancel());
    }

    #[tokio::test]
    async fn test_job_executor_starts_from_clean_history() {
        let (handle, llm) = spawn(vec![
            MockStep::text("Interactive answer."),
            MockStep::text("Report written."),
        ]);
        handle.submit("interactive question").await.unwrap();

        let answer = handle
            .execute("Write the report".to_string(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(answer, "Report written.");

        let requests = llm.requests().await;
        let last = requests.last().unwrap();
        assert!(
            !last
                .messages
                .iter()
                .any(|m| m.content.contains("interactive question"))
        );
    }

    #[tokio::test]
    async fn test_job_executor_ends_left_over_plan() {
        let (handle, _llm) = spawn(vec![MockStep::text("Report written.")]);
        let session = Arc::clone(handle.session());
        session
            .begin_plan("left-over", std::env::temp_dir().join("left-over"))
            .unwrap();

        handle
            .execute("Write the report".to_string(), CancellationToken::new())
            .await
            .unwrap();

        assert!(session.active_plan().is_none());
        assert_eq!(session.mode(), SessionMode::Normal);
    }

    #[tokio::test]
    async fn test_job_context_is_reset_atomically() {
        let (handle, llm) = spawn(Vec::new());

        for _ in 0..20 {
            let other = handle.clone();
            let interactive = tokio::spawn(async move { other.submit("interactive").await });
            handle
                .execute("Write the report".to_string(), CancellationToken::new())
                .await
                .unwrap();
            interactive.await.unwrap().unwrap();
        }

        let jobs: Vec<_> = llm
            .requests()
            .await
            .into_iter()
            .filter(|request| last_user_is(request, "Write the report"))
            .collect();
        assert_eq!(jobs.len(), 20);
        for request in jobs {
            let users = request
                .messages
                .iter()
                .filter(|m| m.role == Role::User)
                .count();
            assert_eq!(users, 1, "job saw earlier messages: {:?}", request.messages);
        }
    }

    #[tokio::test]
    async fn test_job_executor_reports_cancellation_as_error() {
        let (handle, _llm) = spawn(vec![MockStep::hang()]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = handle
            .execute("anything".to_string(), cancel)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cancelled"));
    }

    #[tokio::test]
    async fn test_model_error_surfaces() {
        let (handle, _llm) = spawn(vec![MockStep::error("provider exploded")]);
        let err = handle.submit("hi").await.unwrap_err();
        assert!(err.to_string().contains("provider exploded"));
        assert!(handle.history().await.unwrap().is_empty());

        let outcome = handle.submit("hello").await.unwrap();
        assert_eq!(outcome.final_answer, "mock-echo: hello");
        assert_eq!(handle.history().await.unwrap().len(), 2);
    }
}
