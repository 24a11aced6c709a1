use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{PhaseTransitionDetector, PlanPhase};

/// A recorded phase change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: PlanPhase,
    pub to: PlanPhase,
    pub at: DateTime<Utc>,
}

/// Forward-only plan phase tracker.
///
/// Starts in [`PlanPhase::Understanding`]. Transitions to the same or an
/// earlier phase are ignored; any later phase is accepted, including skips.
pub struct PlanStateMachine {
    phase: PlanPhase,
    detector: Arc<dyn PhaseTransitionDetector>,
    history: Vec<PhaseTransition>,
}

impl PlanStateMachine {
    pub fn new(detector: Arc<dyn PhaseTransitionDetector>) -> Self {
        Self {
            phase: PlanPhase::Understanding,
            detector,
            history: Vec::new(),
        }
    }

    pub fn phase(&self) -> PlanPhase {
        self.phase
    }

    pub fn history(&self) -> &[PhaseTransition] {
        &self.history
    }

    pub fn is_exited(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Move to `target` if it lies ahead. Returns the applied transition.
    pub fn advance_to(&mut self, target: PlanPhase) -> Option<PhaseTransition> {
        if !self.phase.is_before(target) {
            tracing::debug!(
                current = %self.phase,
                requested = %target,
                "Ignoring non-forward plan phase transition"
            );
            return None;
        }

        let transition = PhaseTransition {
            from: self.phase,
            to: target,
            at: Utc::now(),
        };
        tracing::info!(from = %transition.from, to = %transition.to, "Plan phase changed");
        self.phase = target;
        self.history.push(transition.clone());
        Some(transition)
    }

    /// Scan a model turn for a phase announcement and apply it.
    ///
    /// Text never reaches [`PlanPhase::Exit`]; only `exit_plan_mode` does.
    pub fn observe(&mut self, text: &str) -> Option<PhaseTransition> {
        if self.is_exited() || text.trim().is_empty() {
            return None;
        }
        match self.detector.detect(text, self.phase)? {
            PlanPhase::Exit => {
                tracing::debug!(current = %self.phase, "Ignoring exit announcement in model text");
                None
            }
            target => self.advance_to(target),
        }
    }
}

impl std::fmt::Debug for PlanStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanStateMachine")
            .field("phase", &self.phase)
            .field("history", &self.history)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::RegexPhaseDetector;

    fn machine() -> PlanStateMachine {
        PlanStateMachine::new(Arc::new(RegexPhaseDetector::new()))
    }

    #[test]
    fn test_forward_only() {
        let mut machine = machine();
        assert!(machine.advance_to(PlanPhase::Review).is_some());
        assert!(machine.advance_to(PlanPhase::Design).is_none());
        assert!(machine.advance_to(PlanPhase::Review).is_none());
        assert_eq!(machine.phase(), PlanPhase::Review);
        assert_eq!(machine.history().len(), 1);
    }

    #[test]
    fn test_observe_can_skip_phases() {
        let mut machine = machine();
        let transition = machine
            .observe("Everything is clear, moving on to the final plan phase.")
            .unwrap();
        assert_eq!(transition.from, PlanPhase::Understanding);
        assert_eq!(transition.to, PlanPhase::Final);
    }

    #[test]
    fn test_observe_after_exit_is_noop() {
        let mut machine = machine();
        machine.advance_to(PlanPhase::Exit);
        assert!(machine.observe("Moving to the design phase").is_none());
        assert!(machine.is_exited());
    }

    struct AlwaysExit;

    impl PhaseTransitionDetector for AlwaysExit {
        fn detect(&self, _text: &str, _current: PlanPhase) -> Option<PlanPhase> {
            Some(PlanPhase::Exit)
        }
    }

    #[test]
    fn test_observe_never_reaches_exit() {
        let mut machine = PlanStateMachine::new(Arc::new(AlwaysExit));
        machine.advance_to(PlanPhase::Final);
        assert!(machine.observe("Exiting plan mode now.").is_none());
        assert_eq!(machine.phase(), PlanPhase::Final);
    }

    #[test]
    fn test_backward_phrase_is_ignored() {
        let mut machine = machine();
        machine.advance_to(PlanPhase::Review);
        assert!(machine.observe("Moving back to the design phase").is_none());
        assert_eq!(machine.phase(), PlanPhase::Review);
    }
}
