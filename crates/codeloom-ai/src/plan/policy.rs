//! Tool restrictions while a plan is active.

use std::path::Path;

use serde_json::Value;

use codeloom_traits::ToolRisk;

use super::PlanPhase;
use crate::tools::normalize_path;

/// Documents a plan directory may hold.
pub const PLAN_DOCUMENTS: [&str; 5] = ["proposal.md", "design.md", "spec.md", "tasks.md", "plan.md"];

/// Tools that may write plan documents.
pub const PLAN_WRITE_TOOLS: [&str; 1] = ["write_file"];

/// Tools that drive plan mode itself.
pub const PLAN_CONTROL_TOOLS: [&str; 2] = ["enter_plan_mode", "exit_plan_mode"];

/// Plan documents writable in `phase`.
pub fn writable_documents(phase: PlanPhase) -> &'static [&'static str] {
    match phase {
        PlanPhase::Understanding | PlanPhase::Design | PlanPhase::Review => {
            &["proposal.md", "design.md", "spec.md", "plan.md"]
        }
        PlanPhase::Final => &PLAN_DOCUMENTS,
        PlanPhase::Exit => &[],
    }
}

/// Check a tool call against the active plan.
///
/// `workdir` resolves relative paths in the call arguments. The error string
/// is handed back to the model as the tool result.
pub fn check_tool(
    phase: PlanPhase,
    plan_dir: &Path,
    workdir: &Path,
    tool_name: &str,
    risk: ToolRisk,
    arguments: &Value,
) -> Result<(), String> {
    if risk == ToolRisk::ReadOnly || PLAN_CONTROL_TOOLS.contains(&tool_name) {
        return Ok(());
    }

    if !PLAN_WRITE_TOOLS.contains(&tool_name) {
        return Err(format!(
            "`{tool_name}` is not available in plan mode ({phase} phase). Only read-only tools \
             and writes to the plan documents in {} are allowed until plan mode is exited.",
            plan_dir.display()
        ));
    }

    let Some(target) = ["path", "file_path"]
        .iter()
        .find_map(|key| arguments.get(*key).and_then(Value::as_str))
    else {
        return Err(format!("`{tool_name}` needs a `path` argument in plan mode."));
    };

    let resolved = normalize_path(&workdir.join(target));
    let plan_dir = normalize_path(&workdir.join(plan_dir));
    let allowed = writable_documents(phase);

    let in_plan_dir = resolved.parent() == Some(plan_dir.as_path());
    let file_name = resolved
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default();

    if in_plan_dir && allowed.contains(&file_name) {
        return Ok(());
    }

    if in_plan_dir && PLAN_DOCUMENTS.contains(&file_name) {
        return Err(format!(
            "`{file_name}` cannot be written in the {phase} phase. Writable now: {}.",
            allowed.join(", ")
        ));
    }

    Err(format!(
        "Plan mode only allows writing {} inside {}; `{target}` was rejected.",
        allowed.join(", "),
        plan_dir.display()
    ))
}
