//! CLI configuration file support
//!
//! Loads configuration from ~/.config/codeloom/config.toml

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use codeloom_ai::TurnConfig;
use codeloom_ai::agent::ContinuationConfig;
use codeloom_storage::paths::default_config_path;
use codeloom_traits::SessionMode;

const DEFAULT_API_KEY_ENVS: [&str; 2] = ["CODELOOM_API_KEY", "OPENAI_API_KEY"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub continuation: ContinuationSection,
    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// OpenAI-compatible endpoint
    pub base_url: Option<String>,
    pub model: Option<String>,
    /// Environment variable holding the API key
    pub api_key_env: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    #[serde(default = "default_true")]
    pub stream: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            model: None,
            api_key_env: None,
            temperature: None,
            max_tokens: None,
            stream: default_true(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    /// `normal` or `auto-accept`
    #[serde(default)]
    pub default_mode: SessionMode,
    /// Tools that never ask for approval
    #[serde(default)]
    pub always_allow: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContinuationSection {
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub threshold: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_tool_timeout(),
            max_concurrency: default_max_concurrency(),
            command_timeout_secs: default_command_timeout(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_tool_timeout() -> u64 {
    300
}

fn default_max_concurrency() -> usize {
    codeloom_ai::agent::DEFAULT_MAX_TOOL_CONCURRENCY
}

fn default_command_timeout() -> u64 {
    codeloom_ai::tools::DEFAULT_COMMAND_TIMEOUT_SECS
}

impl CliConfig {
    /// Load from `path`, or the default location when `None`.
    ///
    /// A missing or unparsable file yields the defaults.
    pub fn load(path: Option<&Path>) -> Self {
        let path = path.map(Path::to_path_buf).or_else(default_config_path);
        Self::load_from_path(path)
    }

    pub fn load_from_path(path: Option<PathBuf>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => Self::parse(&content).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "Invalid config file, using defaults");
                Self::default()
            }),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Unreadable config file, using defaults");
                Self::default()
            }
        }
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// API key from the configured variable, then `CODELOOM_API_KEY`,
    /// then `OPENAI_API_KEY`.
    pub fn api_key(&self) -> Option<String> {
        self.llm
            .api_key_env
            .iter()
            .map(String::as_str)
            .chain(DEFAULT_API_KEY_ENVS)
            .find_map(|name| {
                std::env::var(name)
                    .ok()
                    .filter(|value| !value.trim().is_empty())
            })
    }

    /// Starting mode; plan mode is only reachable through its tool.
    pub fn default_mode(&self) -> SessionMode {
        match self.session.default_mode {
            SessionMode::Plan => SessionMode::Normal,
            mode => mode,
        }
    }

    pub fn continuation_config(&self) -> ContinuationConfig {
        let defaults = ContinuationConfig::default();
        let min_length = self.continuation.min_length.unwrap_or(defaults.min_length);
        let max_length = self.continuation.max_length.unwrap_or(defaults.max_length);
        let threshold = self.continuation.threshold.unwrap_or(defaults.threshold);
        defaults
            .with_lengths(min_length, max_length)
            .with_threshold(threshold)
    }

    pub fn turn_config(&self, system_prompt: &str) -> TurnConfig {
        let mut config = TurnConfig::default()
            .with_system_prompt(system_prompt)
            .with_streaming(self.llm.stream)
            .with_tool_timeout(Duration::from_secs(self.tools.timeout_secs))
            .with_max_tool_concurrency(self.tools.max_concurrency)
            .with_continuation(self.continuation_config());
        if let Some(temperature) = self.llm.temperature {
            config = config.with_temperature(temperature);
        }
        if let Some(max_tokens) = self.llm.max_tokens {
            config = config.with_max_tokens(max_tokens);
        }
        config
    }
}
