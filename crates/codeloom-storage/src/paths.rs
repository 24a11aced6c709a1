//! Path utilities for Codeloom directory resolution.

use anyhow::Result;
use std::path::{Path, PathBuf};

const CODELOOM_DIR: &str = ".codeloom";
const PLANS_DIR: &str = "plans";
const COMMANDS_DIR: &str = "commands";
const LOGS_DIR: &str = "logs";

/// Environment variable to override the Codeloom directory.
const CODELOOM_DIR_ENV: &str = "CODELOOM_DIR";

/// Resolve the project data directory.
/// Priority: CODELOOM_DIR env var > `<project_root>/.codeloom/`
pub fn resolve_data_dir(project_root: &Path) -> PathBuf {
    if let Ok(dir) = std::env::var(CODELOOM_DIR_ENV)
        && !dir.trim().is_empty()
    {
        return PathBuf::from(dir);
    }
    project_root.join(CODELOOM_DIR)
}

/// Resolve the data directory for the current working directory.
pub fn current_data_dir() -> Result<PathBuf> {
    let cwd = std::env::current_dir()?;
    Ok(resolve_data_dir(&cwd))
}

/// Ensure the data directory exists and return its path.
pub fn ensure_data_dir(project_root: &Path) -> Result<PathBuf> {
    let dir = resolve_data_dir(project_root);
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// `<data_dir>/plans`
pub fn plans_dir(data_dir: &Path) -> PathBuf {
    data_dir.join(PLANS_DIR)
}

/// `<data_dir>/commands`
pub fn commands_dir(data_dir: &Path) -> PathBuf {
    data_dir.join(COMMANDS_DIR)
}

/// `<data_dir>/logs`
pub fn logs_dir(data_dir: &Path) -> PathBuf {
    data_dir.join(LOGS_DIR)
}

/// Global config file: `~/.config/codeloom/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("codeloom").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subdirectories_hang_off_data_dir() {
        let data = Path::new("/tmp/project/.codeloom");
        assert_eq!(plans_dir(data), data.join("plans"));
        assert_eq!(commands_dir(data), data.join("commands"));
        assert_eq!(logs_dir(data), data.join("logs"));
    }
}
