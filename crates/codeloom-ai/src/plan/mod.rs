//! Plan mode: a phase-gated workflow for producing planning documents.

mod detector;
mod machine;
mod phase;
pub mod policy;

pub use detector::{PhaseTransitionDetector, RegexPhaseDetector};
pub use machine::{PhaseTransition, PlanStateMachine};
pub use phase::PlanPhase;
pub use policy::PLAN_DOCUMENTS;
