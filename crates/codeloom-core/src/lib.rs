//! Codeloom Core - scheduling, plan storage and the conversation service
//!
//! This crate provides:
//! - Schedule models and their JSON persistence with a capped run log
//! - Cron triggers feeding a single-flight, deduplicating job queue
//! - The conversation service that owns the one active conversation loop
//! - Plan document storage and the `enter_plan_mode` / `exit_plan_mode` tools

pub mod models;
pub mod plan;
pub mod scheduler;
pub mod service;
pub mod storage;

pub use models::{RunStatus, Schedule, ScheduleRun};
pub use plan::{EnterPlanModeTool, ExitPlanModeTool, register_plan_tools};
pub use scheduler::{CommandResolver, JobExecutor, RunnerConfig, ScheduleRunner};
pub use service::{ConversationService, SessionHandle};
pub use storage::{PlanStore, ScheduleStorage, Storage};
