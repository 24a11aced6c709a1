use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use codeloom_ai::plan::PLAN_DOCUMENTS;
use codeloom_ai::{ModeSelector, Session};
use codeloom_traits::{Tool, ToolOutput, ToolResult, ToolRisk};

use crate::storage::{Storage, generate_slug};

const ENTER_INSTRUCTIONS: &str = "Plan mode is active. Work through the phases in order and \
announce each one (\"## Design Phase\", \"moving to the review phase\", \"## Final Phase\"). \
Only read-only tools and writes to the plan documents are allowed. Write tasks.md in the \
final phase, then call exit_plan_mode.";

/// Starts a plan: validates and creates `.codeloom/plans/<slug>/`.
pub struct EnterPlanModeTool {
    session: Arc<Session>,
    storage: Arc<Storage>,
}

impl EnterPlanModeTool {
    pub fn new(session: Arc<Session>, storage: Arc<Storage>) -> Self {
        Self { session, storage }
    }
}

#[async_trait]
impl Tool for EnterPlanModeTool {
    fn name(&self) -> &str {
        "enter_plan_mode"
    }

    fn description(&self) -> &str {
        "Enter plan mode to research and write planning documents before changing code."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "skip_validation": {
                    "type": "boolean",
                    "description": "Skip the plan directory read/write check"
                }
            }
        })
    }

    fn risk(&self) -> ToolRisk {
        ToolRisk::ReadOnly
    }

    fn supports_parallel(&self) -> bool {
        false
    }

    async fn execute(&self, input: Value) -> ToolResult<ToolOutput> {
        let skip_validation = input
            .get("skip_validation")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        if let Err(e) = self.session.ensure_can_enter_plan() {
            return Ok(ToolOutput::error(e.to_string()));
        }

        let slug = generate_slug();
        let prepared = if skip_validation {
            self.storage.plans.create(&slug)
        } else {
            self.storage.plans.validate(&slug)
        };
        let dir = match prepared {
            Ok(dir) => dir,
            Err(e) => {
                return Ok(ToolOutput::error(format!(
                    "Cannot use plan directory: {e:#}"
                )));
            }
        };

        let plan = match self.session.begin_plan(&slug, &dir) {
            Ok(plan) => plan,
            Err(e) => return Ok(ToolOutput::error(e.to_string())),
        };

        Ok(ToolOutput::success(json!({
            "slug": plan.slug,
            "directory": plan.dir.display().to_string(),
            "phase": plan.phase.as_str(),
            "documents": PLAN_DOCUMENTS,
            "instructions": ENTER_INSTRUCTIONS,
        })))
    }
}

/// Ends the active plan, returning its documents to the model.
pub struct ExitPlanModeTool {
    session: Arc<Session>,
    storage: Arc<Storage>,
    selector: Arc<dyn ModeSelector>,
}

impl ExitPlanModeTool {
    pub fn new(
        session: Arc<Session>,
        storage: Arc<Storage>,
        selector: Arc<dyn ModeSelector>,
    ) -> Self {
        Self {
            session,
            storage,
            selector,
        }
    }
}

#[async_trait]
impl Tool for ExitPlanModeTool {
    fn name(&self) -> &str {
        "exit_plan_mode"
    }

    fn description(&self) -> &str {
        "Finish plan mode. Returns every plan document and switches to the follow-up mode."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    fn risk(&self) -> ToolRisk {
        ToolRisk::ReadOnly
    }

    fn supports_parallel(&self) -> bool {
        false
    }

    async fn execute(&self, _input: Value) -> ToolResult<ToolOutput> {
        let Some(plan) = self.session.active_plan() else {
            return Ok(ToolOutput::error("Plan mode is not active"));
        };

        let documents = match self.storage.plans.read_all(&plan.slug) {
            Ok(documents) => documents,
            Err(e) => {
                return Ok(ToolOutput::error(format!(
                    "Failed to read plan documents: {e:#}"
                )));
            }
        };

        let next_mode = self.selector.select_mode(&plan).await;
        let finished = match self.session.finish_plan(next_mode) {
            Ok(finished) => finished,
            Err(e) => return Ok(ToolOutput::error(e.to_string())),
        };

        let documents: Vec<Value> = documents
            .into_iter()
            .map(|doc| json!({ "name": doc.name, "content": doc.content }))
            .collect();

        Ok(ToolOutput::success(json!({
            "slug": finished.slug,
            "phase": finished.phase.as_str(),
            "mode": self.session.mode().as_str(),
            "documents": documents,
        })))
    }
}
