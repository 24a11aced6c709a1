//! CLI setup module
//!
//! Logging, project paths and the conversation stack shared by every
//! command.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use codeloom_ai::{
    ApprovalHandler, ConversationLoop, LlmClient, ModeSelector, OpenAIClient, Session,
    builtin_registry,
};
use codeloom_core::{CommandResolver, Storage, register_plan_tools};
use codeloom_storage::paths;
use codeloom_traits::SessionMode;

use crate::config::CliConfig;

const LOG_FILE: &str = "codeloom.log";

const SYSTEM_PROMPT: &str = "You are codeloom, a coding assistant working inside the user's \
project directory. Use the tools to inspect and change files instead of guessing. Call tools \
with a JSON object of arguments. When a task needs design work first, call enter_plan_mode, \
announce each phase you move to, write the plan documents, and call exit_plan_mode when the \
plan is complete. Finish with a short summary of what you did.";

/// Install the file logger. Keep the guard alive for the process lifetime.
///
/// Output goes to a daily rolling file under `<data_dir>/logs/` so it never
/// interleaves with terminal output.
pub fn init_logging(data_dir: &Path, verbose: bool) -> Result<WorkerGuard> {
    let log_dir = paths::logs_dir(data_dir);
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(false)
        .with_level(true)
        .init();

    Ok(guard)
}

/// Everything a command needs about the current project.
pub struct AppContext {
    pub config: CliConfig,
    pub workdir: PathBuf,
    pub storage: Arc<Storage>,
}

impl AppContext {
    pub fn open(config: CliConfig) -> Result<Self> {
        let workdir = std::env::current_dir().context("Failed to read working directory")?;
        let data_dir = paths::ensure_data_dir(&workdir)?;
        let storage = Arc::new(Storage::open(data_dir)?);
        Ok(Self {
            config,
            workdir,
            storage,
        })
    }

    pub fn data_dir(&self) -> &Path {
        self.storage.data_dir()
    }

    pub fn command_resolver(&self) -> CommandResolver {
        CommandResolver::new(paths::commands_dir(self.data_dir()), &self.workdir)
    }

    pub fn llm_client(&self) -> Result<Arc<dyn LlmClient>> {
        let Some(api_key) = self.config.api_key() else {
            bail!("API key not found: set CODELOOM_API_KEY or OPENAI_API_KEY");
        };

        let llm = &self.config.llm;
        let mut client = OpenAIClient::new(api_key).with_streaming(llm.stream);
        if let Some(model) = &llm.model {
            client = client.with_model(model);
        }
        if let Some(base_url) = &llm.base_url {
            client = client.with_base_url(base_url);
        }
        Ok(Arc::new(client))
    }

    /// Build the conversation loop with the built-in and plan tools.
    pub fn conversation(
        &self,
        mode: SessionMode,
        approvals: Arc<dyn ApprovalHandler>,
        selector: Arc<dyn ModeSelector>,
    ) -> Result<ConversationLoop> {
        let llm = self.llm_client()?;
        let session = Arc::new(
            Session::new(&self.workdir, mode)
                .with_always_allow(self.config.session.always_allow.iter().cloned()),
        );

        let mut registry =
            builtin_registry(&self.workdir, self.config.tools.command_timeout_secs);
        register_plan_tools(&mut registry, &session, &self.storage, selector);

        Ok(
            ConversationLoop::new(llm, Arc::new(registry), session, approvals)
                .with_config(self.config.turn_config(SYSTEM_PROMPT)),
        )
    }
}
