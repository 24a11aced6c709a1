mod cli;
mod commands;
mod completions;
mod config;
mod error;
mod output;
mod render;
mod setup;
mod terminal;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use codeloom_storage::paths;
use setup::AppContext;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error::handle_error(err);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        completions::generate_completions(shell);
        return Ok(());
    }

    let data_dir = paths::ensure_data_dir(&std::env::current_dir()?)?;
    let _guard = setup::init_logging(&data_dir, cli.verbose)?;

    let config = config::CliConfig::load(cli.config.as_deref());
    let ctx = AppContext::open(config)?;
    let format = cli.format;

    match cli.command {
        Commands::Run(args) => commands::run::run(&ctx, args, format).await,
        Commands::Chat(args) => commands::chat::run(&ctx, args).await,
        Commands::Schedule { command } => commands::schedule::run(&ctx, command, format),
        Commands::Daemon(args) => commands::daemon::run(&ctx, args).await,
        Commands::Plan { command } => commands::plan::run(&ctx, command, format),
        Commands::Completions { .. } => Ok(()),
    }
}
