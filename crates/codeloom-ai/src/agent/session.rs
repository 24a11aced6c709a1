//! Mutable state shared by one interactive or scheduled session.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value;

use codeloom_traits::{SessionMode, ToolRisk};

use crate::error::{AiError, Result};
use crate::plan::{
    PhaseTransition, PhaseTransitionDetector, PlanPhase, PlanStateMachine, RegexPhaseDetector,
    policy,
};

/// Snapshot of the active plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanInfo {
    pub slug: String,
    pub dir: PathBuf,
    pub phase: PlanPhase,
    pub previous_mode: SessionMode,
    pub started_at: DateTime<Utc>,
}

struct ActivePlan {
    slug: String,
    dir: PathBuf,
    machine: PlanStateMachine,
    previous_mode: SessionMode,
    started_at: DateTime<Utc>,
}

impl ActivePlan {
    fn info(&self) -> PlanInfo {
        PlanInfo {
            slug: self.slug.clone(),
            dir: self.dir.clone(),
            phase: self.machine.phase(),
            previous_mode: self.previous_mode,
            started_at: self.started_at,
        }
    }
}

struct SessionState {
    mode: SessionMode,
    always_allow: HashSet<String>,
    plan: Option<ActivePlan>,
}

/// Picks the mode to continue in once a plan is finished.
#[async_trait]
pub trait ModeSelector: Send + Sync {
    async fn select_mode(&self, plan: &PlanInfo) -> SessionMode;
}

/// Always returns the same follow-up mode.
pub struct FixedModeSelector(pub SessionMode);

impl Default for FixedModeSelector {
    fn default() -> Self {
        Self(SessionMode::Normal)
    }
}

#[async_trait]
impl ModeSelector for FixedModeSelector {
    async fn select_mode(&self, _plan: &PlanInfo) -> SessionMode {
        self.0
    }
}

/// Session mode, always-allow set and active plan.
///
/// Shared between the conversation loop, the tool supervisor and the plan
/// tools. Every method takes `&self`; state sits behind a lock that is never
/// held across an await.
pub struct Session {
    workdir: PathBuf,
    default_mode: SessionMode,
    detector: Arc<dyn PhaseTransitionDetector>,
    state: RwLock<SessionState>,
}

impl Session {
    pub fn new(workdir: impl Into<PathBuf>, mode: SessionMode) -> Self {
        let mode = match mode {
            SessionMode::Plan => SessionMode::Normal,
            other => other,
        };
        Self {
            workdir: workdir.into(),
            default_mode: mode,
            detector: Arc::new(RegexPhaseDetector::new()),
            state: RwLock::new(SessionState {
                mode,
                always_allow: HashSet::new(),
                plan: None,
            }),
        }
    }

    pub fn with_detector(mut self, detector: Arc<dyn PhaseTransitionDetector>) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_always_allow<I, S>(self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state
            .write()
            .always_allow
            .extend(tools.into_iter().map(Into::into));
        self
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn mode(&self) -> SessionMode {
        self.state.read().mode
    }

    /// Switch between normal and auto-accept. Plan mode has its own entry
    /// and exit path.
    pub fn set_mode(&self, mode: SessionMode) -> Result<()> {
        let mut state = self.state.write();
        if mode == SessionMode::Plan {
            return Err(AiError::PlanMode(
                "Plan mode is entered through enter_plan_mode".to_string(),
            ));
        }
        if state.plan.is_some() {
            return Err(AiError::PlanMode(
                "A plan is active; finish it with exit_plan_mode first".to_string(),
            ));
        }
        state.mode = mode;
        Ok(())
    }

    pub fn always_allow(&self) -> HashSet<String> {
        self.state.read().always_allow.clone()
    }

    pub fn allow_always(&self, tool_name: &str) {
        tracing::info!(tool = %tool_name, "Tool added to always-allow set");
        self.state.write().always_allow.insert(tool_name.to_string());
    }

    pub fn active_plan(&self) -> Option<PlanInfo> {
        self.state.read().plan.as_ref().map(ActivePlan::info)
    }

    pub fn plan_phase(&self) -> Option<PlanPhase> {
        self.state
            .read()
            .plan
            .as_ref()
            .map(|plan| plan.machine.phase())
    }

    /// Fails unless the session may start a plan right now.
    pub fn ensure_can_enter_plan(&self) -> Result<()> {
        check_plan_entry(&self.state.read())
    }

    /// Start a plan. The slug is fixed for the plan's lifetime.
    pub fn begin_plan(&self, slug: impl Into<String>, dir: impl Into<PathBuf>) -> Result<PlanInfo> {
        let mut state = self.state.write();
        check_plan_entry(&state)?;
        let plan = ActivePlan {
            slug: slug.into(),
            dir: dir.into(),
            machine: PlanStateMachine::new(Arc::clone(&self.detector)),
            previous_mode: state.mode,
            started_at: Utc::now(),
        };
        let info = plan.info();
        tracing::info!(slug = %info.slug, dir = %info.dir.display(), "Entered plan mode");
        state.plan = Some(plan);
        state.mode = SessionMode::Plan;
        Ok(info)
    }

    /// Close the active plan and switch to `next_mode`.
    pub fn finish_plan(&self, next_mode: SessionMode) -> Result<PlanInfo> {
        let mut state = self.state.write();
        let Some(mut plan) = state.plan.take() else {
            return Err(AiError::PlanMode("No plan is active".to_string()));
        };
        plan.machine.advance_to(PlanPhase::Exit);
        state.mode = match next_mode {
            SessionMode::Plan => SessionMode::Normal,
            other => other,
        };
        tracing::info!(slug = %plan.slug, mode = %state.mode, "Exited plan mode");
        Ok(plan.info())
    }

    /// Drop any active plan and return to the mode the session was created
    /// with. The always-allow set is kept.
    pub fn reset(&self) {
        let mut state = self.state.write();
        if let Some(plan) = state.plan.take() {
            tracing::info!(slug = %plan.slug, "Abandoned plan on session reset");
        }
        state.mode = self.default_mode;
    }

    /// Feed a model turn to the plan phase machine.
    pub fn observe(&self, text: &str) -> Option<PhaseTransition> {
        let mut state = self.state.write();
        state.plan.as_mut()?.machine.observe(text)
    }

    /// Plan-mode restriction for a tool call; `Ok` outside plan mode.
    pub fn check_tool(
        &self,
        tool_name: &str,
        risk: ToolRisk,
        arguments: &Value,
    ) -> std::result::Result<(), String> {
        let state = self.state.read();
        let Some(plan) = state.plan.as_ref() else {
            return Ok(());
        };
        policy::check_tool(
            plan.machine.phase(),
            &plan.dir,
            &self.workdir,
            tool_name,
            risk,
            arguments,
        )
    }
}

fn check_plan_entry(state: &SessionState) -> Result<()> {
    match (state.mode, &state.plan) {
        (_, Some(plan)) => Err(AiError::PlanMode(format!(
            "Plan {} is already active",
            plan.slug
        ))),
        (SessionMode::Normal | SessionMode::AutoAccept, None) => Ok(()),
        (mode, None) => Err(AiError::PlanMode(format!(
            "Cannot enter plan mode from {mode} mode"
        ))),
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("Session")
            .field("workdir", &self.workdir)
            .field("mode", &state.mode)
            .field("always_allow", &state.always_allow)
            .field("plan", &state.plan.as_ref().map(|plan| &plan.slug))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plan_entry_precondition() {
        let session = Session::new("/repo", SessionMode::AutoAccept);
        let info = session.begin_plan("slug-1", "/repo/.codeloom/plans/slug-1").unwrap();
        assert_eq!(info.phase, PlanPhase::Understanding);
        assert_eq!(info.previous_mode, SessionMode::AutoAccept);
        assert_eq!(session.mode(), SessionMode::Plan);

        let err = session.begin_plan("slug-2", "/tmp").unwrap_err();
        assert!(matches!(err, AiError::PlanMode(_)));
        assert_eq!(session.active_plan().unwrap().slug, "slug-1");
    }

    #[test]
    fn test_finish_plan_restores_chosen_mode() {
        let session = Session::new("/repo", SessionMode::Normal);
        session.begin_plan("s", "/repo/p").unwrap();
        let info = session.finish_plan(SessionMode::AutoAccept).unwrap();
        assert_eq!(info.phase, PlanPhase::Exit);
        assert_eq!(session.mode(), SessionMode::AutoAccept);
        assert!(session.active_plan().is_none());
        assert!(session.finish_plan(SessionMode::Normal).is_err());
    }

    #[test]
    fn test_set_mode_rejects_plan_and_active_plan() {
        let session = Session::new("/repo", SessionMode::Normal);
        assert!(session.set_mode(SessionMode::Plan).is_err());
        session.set_mode(SessionMode::AutoAccept).unwrap();
        session.begin_plan("s", "/repo/p").unwrap();
        assert!(session.set_mode(SessionMode::Normal).is_err());
    }

    #[test]
    fn test_observe_only_during_plan() {
        let session = Session::new("/repo", SessionMode::Normal);
        assert!(session.observe("Moving to the design phase").is_none());

        session.begin_plan("s", "/repo/p").unwrap();
        let transition = session.observe("Moving to the design phase").unwrap();
        assert_eq!(transition.to, PlanPhase::Design);
        assert_eq!(session.plan_phase(), Some(PlanPhase::Design));
    }

    #[test]
    fn test_check_tool_applies_plan_policy() {
        let session = Session::new("/repo", SessionMode::Normal);
        let args = json!({"command": "rm -rf target"});
        assert!(session.check_tool("run_command", ToolRisk::High, &args).is_ok());

        session.begin_plan("s", "/repo/.codeloom/plans/s").unwrap();
        assert!(session.check_tool("run_command", ToolRisk::High, &args).is_err());
        assert!(
            session
                .check_tool(
                    "write_file",
                    ToolRisk::Medium,
                    &json!({"path": ".codeloom/plans/s/proposal.md"})
                )
                .is_ok()
        );
    }

    #[test]
    fn test_exit_phrase_keeps_tasks_writable() {
        let session = Session::new("/repo", SessionMode::Normal);
        session.begin_plan("s", "/repo/.codeloom/plans/s").unwrap();
        session.observe("## Final Plan Phase").unwrap();
        assert_eq!(session.plan_phase(), Some(PlanPhase::Final));

        assert!(session.observe("I'm ready to exit plan mode.").is_none());
        assert_eq!(session.plan_phase(), Some(PlanPhase::Final));
        assert_eq!(session.mode(), SessionMode::Plan);
        assert!(
            session
                .check_tool(
                    "write_file",
                    ToolRisk::Medium,
                    &json!({"path": ".codeloom/plans/s/tasks.md"})
                )
                .is_ok()
        );
    }

    #[test]
    fn test_reset_drops_plan_and_restores_mode() {
        let session = Session::new("/repo", SessionMode::AutoAccept).with_always_allow(["write_file"]);
        session.begin_plan("s", "/repo/p").unwrap();
        session.reset();
        assert!(session.active_plan().is_none());
        assert_eq!(session.mode(), SessionMode::AutoAccept);
        assert!(session.always_allow().contains("write_file"));
        session.begin_plan("t", "/repo/q").unwrap();
    }

    #[test]
    fn test_always_allow_set() {
        let session = Session::new("/repo", SessionMode::Normal).with_always_allow(["write_file"]);
        session.allow_always("rename_file");
        let allowed = session.always_allow();
        assert!(allowed.contains("write_file"));
        assert!(allowed.contains("rename_file"));
    }

    #[tokio::test]
    async fn test_fixed_mode_selector() {
        let session = Session::new("/repo", SessionMode::Normal);
        let info = session.begin_plan("s", "/repo/p").unwrap();
        assert_eq!(
            FixedModeSelector::default().select_mode(&info).await,
            SessionMode::Normal
        );
    }
}
