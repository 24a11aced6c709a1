use anyhow::Result;
use colored::Colorize;
use comfy_table::{Cell, Color, Table};

use codeloom_core::scheduler::next_fire;
use codeloom_core::{RunStatus, Schedule};

use crate::cli::{OutputFormat, ScheduleCommands};
use crate::output::{format_time, print_json, preview_text};
use crate::setup::AppContext;

pub fn run(ctx: &AppContext, command: ScheduleCommands, format: OutputFormat) -> Result<()> {
    match command {
        ScheduleCommands::List => list_schedules(ctx, format),
        ScheduleCommands::Add {
            cron,
            command,
            disabled,
        } => add_schedule(ctx, cron, command, disabled, format),
        ScheduleCommands::Remove { id } => remove_schedule(ctx, &id, format),
        ScheduleCommands::Enable { id } => set_enabled(ctx, &id, true, format),
        ScheduleCommands::Disable { id } => set_enabled(ctx, &id, false, format),
        ScheduleCommands::Runs { limit } => list_runs(ctx, limit, format),
    }
}

fn list_schedules(ctx: &AppContext, format: OutputFormat) -> Result<()> {
    let schedules = ctx.storage.schedules.list();

    if format.is_json() {
        return print_json(&schedules);
    }

    if schedules.is_empty() {
        println!("No schedules. Add one with `codeloom schedule add <cron> <command>`.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Cron", "Command", "Enabled", "Last run", "Next run"]);
    for schedule in &schedules {
        let next = if schedule.enabled {
            next_fire(&schedule.cron).ok().flatten()
        } else {
            None
        };
        table.add_row(vec![
            Cell::new(schedule.short_id()),
            Cell::new(&schedule.cron),
            Cell::new(&schedule.command),
            Cell::new(if schedule.enabled { "yes" } else { "no" }),
            Cell::new(format_time(schedule.last_run_at)),
            Cell::new(format_time(next)),
        ]);
    }
    println!("{table}");
    Ok(())
}

fn add_schedule(
    ctx: &AppContext,
    cron: String,
    command: String,
    disabled: bool,
    format: OutputFormat,
) -> Result<()> {
    let resolver = ctx.command_resolver();
    if resolver.resolve(&command).is_err() {
        eprintln!(
            "{} command file '{}' does not exist yet; runs will fail until it does.",
            "Warning:".yellow().bold(),
            command
        );
        let available = resolver.list();
        if !available.is_empty() {
            eprintln!("Available commands: {}", available.join(", "));
        }
    }

    let mut schedule = Schedule::new(cron, command);
    schedule.enabled = !disabled;
    let schedule = ctx.storage.schedules.add(schedule)?;

    if format.is_json() {
        return print_json(&schedule);
    }
    println!(
        "{} schedule {} ({} → {})",
        "Added".green().bold(),
        schedule.short_id(),
        schedule.cron,
        schedule.command
    );
    Ok(())
}

fn remove_schedule(ctx: &AppContext, id: &str, format: OutputFormat) -> Result<()> {
    let removed = ctx.storage.schedules.remove(id)?;
    if format.is_json() {
        return print_json(&serde_json::json!({ "removed": removed.id }));
    }
    println!("{} schedule {}", "Removed".green().bold(), removed.short_id());
    Ok(())
}

fn set_enabled(ctx: &AppContext, id: &str, enabled: bool, format: OutputFormat) -> Result<()> {
    let schedule = ctx.storage.schedules.set_enabled(id, enabled)?;
    if format.is_json() {
        return print_json(&schedule);
    }
    let verb = if enabled { "Enabled" } else { "Disabled" };
    println!("{} schedule {}", verb.green().bold(), schedule.short_id());
    Ok(())
}

fn list_runs(ctx: &AppContext, limit: usize, format: OutputFormat) -> Result<()> {
    let runs = ctx.storage.schedules.runs(limit);

    if format.is_json() {
        return print_json(&runs);
    }

    if runs.is_empty() {
        println!("No runs recorded yet.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Started", "Schedule", "Command", "Status", "Duration", "Error"]);
    for run in runs {
        let status = match run.status {
            RunStatus::Success => Cell::new("success").fg(Color::Green),
            RunStatus::Error => Cell::new("error").fg(Color::Red),
            RunStatus::Running => Cell::new("running").fg(Color::Yellow),
        };
        let duration = run
            .duration()
            .map(|d| format!("{:.1}s", d.num_milliseconds() as f64 / 1000.0))
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            Cell::new(format_time(Some(run.started_at))),
            Cell::new(run.schedule_id.get(..8).unwrap_or(&run.schedule_id)),
            Cell::new(&run.command),
            status,
            Cell::new(duration),
            Cell::new(preview_text(run.error.as_deref().unwrap_or(""), 60)),
        ]);
    }
    println!("{table}");
    Ok(())
}
