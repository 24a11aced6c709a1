//! Cron-driven scheduled jobs.

mod command;
mod cron_scheduler;
mod runner;

pub use command::CommandResolver;
pub use cron_scheduler::{CronScheduler, next_fire, normalize_cron_expr};
pub use runner::{JobExecutor, RunnerConfig, ScheduleRunner};
