use colored::Colorize;

pub fn handle_error(err: anyhow::Error) -> ! {
    eprintln!("{} {:#}", "Error:".red().bold(), err);

    let msg = format!("{err:#}").to_lowercase();

    if msg.contains("api key") {
        eprintln!("\n{}", "Suggestion:".yellow().bold());
        eprintln!("  Export your API key:");
        eprintln!("  {} export CODELOOM_API_KEY=<value>", "$".dimmed());
    }

    if msg.contains("schedule") && msg.contains("not found") {
        eprintln!("\n{}", "Suggestion:".yellow().bold());
        eprintln!("  List schedules with:");
        eprintln!("  {} codeloom schedule list", "$".dimmed());
    }

    if msg.contains("invalid cron expression") {
        eprintln!("\n{}", "Suggestion:".yellow().bold());
        eprintln!("  Use 5 fields (\"*/15 * * * *\") or 6 with seconds (\"0 */15 * * * *\").");
    }

    if msg.contains("connection refused") || msg.contains("network") {
        eprintln!("\n{}", "Suggestion:".yellow().bold());
        eprintln!("  Check the [llm] base_url in your config and try again.");
    }

    std::process::exit(1);
}
