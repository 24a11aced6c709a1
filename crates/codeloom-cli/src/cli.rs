use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

/// Output format for CLI commands
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl OutputFormat {
    pub fn is_json(self) -> bool {
        matches!(self, OutputFormat::Json)
    }
}

/// Session mode a conversation starts in
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModeArg {
    Normal,
    AutoAccept,
}

#[derive(Parser)]
#[command(name = "codeloom")]
#[command(version, about = "Codeloom - a tool-using coding assistant for your terminal")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (defaults to ~/.config/codeloom/config.toml)
    #[arg(long, global = true, env = "CODELOOM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Run a single prompt to completion
    Run(RunArgs),

    /// Start an interactive conversation
    Chat(ChatArgs),

    /// Scheduled command management
    Schedule {
        #[command(subcommand)]
        command: ScheduleCommands,
    },

    /// Run scheduled commands until interrupted
    Daemon(DaemonArgs),

    /// Inspect plans written in plan mode
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
}

#[derive(Args)]
pub struct RunArgs {
    /// Prompt to send
    pub prompt: String,

    /// Session mode (defaults to the configured mode)
    #[arg(short, long, value_enum)]
    pub mode: Option<ModeArg>,
}

#[derive(Args)]
pub struct ChatArgs {
    /// Session mode (defaults to the configured mode)
    #[arg(short, long, value_enum)]
    pub mode: Option<ModeArg>,
}

#[derive(Args)]
pub struct DaemonArgs {
    /// Give up on a scheduled job after this many seconds
    #[arg(long)]
    pub job_timeout: Option<u64>,
}

#[derive(Subcommand)]
pub enum ScheduleCommands {
    /// List schedules
    List,

    /// Add a schedule
    Add {
        /// Cron expression, 5-field (minute first) or 6/7-field (second first)
        cron: String,
        /// Command name under .codeloom/commands/ or a file path
        command: String,
        /// Create the schedule disabled
        #[arg(long)]
        disabled: bool,
    },

    /// Remove a schedule
    Remove {
        /// Schedule id or unique prefix
        id: String,
    },

    /// Enable a schedule
    Enable {
        /// Schedule id or unique prefix
        id: String,
    },

    /// Disable a schedule
    Disable {
        /// Schedule id or unique prefix
        id: String,
    },

    /// Show recent runs
    Runs {
        /// Number of runs to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Subcommand)]
pub enum PlanCommands {
    /// List plans
    List,

    /// Print the documents of a plan
    Show {
        /// Plan slug
        slug: String,
    },
}
