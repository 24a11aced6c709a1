//! Plan-mode tools backed by the plan store.

mod tools;

use std::sync::Arc;

use codeloom_ai::{ModeSelector, Session, ToolRegistry};

use crate::storage::Storage;

pub use tools::{EnterPlanModeTool, ExitPlanModeTool};

/// Register `enter_plan_mode` and `exit_plan_mode`.
pub fn register_plan_tools(
    registry: &mut ToolRegistry,
    session: &Arc<Session>,
    storage: &Arc<Storage>,
    selector: Arc<dyn ModeSelector>,
) {
    registry.register(EnterPlanModeTool::new(
        Arc::clone(session),
        Arc::clone(storage),
    ));
    registry.register(ExitPlanModeTool::new(
        Arc::clone(session),
        Arc::clone(storage),
        selector,
    ));
}
