pub mod chat;
pub mod daemon;
pub mod plan;
pub mod run;
pub mod schedule;

use codeloom_traits::SessionMode;

use crate::cli::ModeArg;
use crate::config::CliConfig;

/// Mode from the flag, falling back to the configured default.
pub fn resolve_mode(flag: Option<ModeArg>, config: &CliConfig) -> SessionMode {
    match flag {
        Some(ModeArg::Normal) => SessionMode::Normal,
        Some(ModeArg::AutoAccept) => SessionMode::AutoAccept,
        None => config.default_mode(),
    }
}
