use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use colored::Colorize;

use codeloom_ai::{AutoDecline, FixedModeSelector};
use codeloom_core::{ConversationService, RunnerConfig, ScheduleRunner};

use crate::cli::DaemonArgs;
use crate::setup::AppContext;

const UNATTENDED_REASON: &str = "no one is present to approve this in a scheduled run";
/// How often schedule edits made by other `codeloom` invocations are picked up.
const SYNC_INTERVAL: Duration = Duration::from_secs(30);

pub async fn run(ctx: &AppContext, args: DaemonArgs) -> Result<()> {
    let conversation = ctx.conversation(
        ctx.config.default_mode(),
        Arc::new(AutoDecline::new(UNATTENDED_REASON)),
        Arc::new(FixedModeSelector::default()),
    )?;
    let handle = ConversationService::spawn(conversation);

    let mut config = RunnerConfig::default();
    if let Some(secs) = args.job_timeout {
        config = config.with_job_timeout(Duration::from_secs(secs));
    }

    let runner = Arc::new(
        ScheduleRunner::new(
            Arc::clone(&ctx.storage),
            Arc::new(handle.clone()),
            ctx.command_resolver(),
        )
        .with_config(config),
    );
    runner.start().await?;

    println!(
        "{} {} schedule(s) active. Press Ctrl-C to stop.",
        "codeloom daemon".bold(),
        runner.active_job_count().await
    );
    tracing::info!(data_dir = %ctx.data_dir().display(), "Daemon started");

    let mut sync = tokio::time::interval(SYNC_INTERVAL);
    sync.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    sync.tick().await;
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                break;
            }
            _ = sync.tick() => {
                if let Err(e) = runner.sync_schedules().await {
                    tracing::warn!(error = %e, "Failed to sync schedules");
                }
            }
        }
    }
    runner.stop().await?;
    if handle.cancel() {
        println!("{}", "Cancelled the running job.".yellow());
    }
    println!("Stopped.");
    Ok(())
}
