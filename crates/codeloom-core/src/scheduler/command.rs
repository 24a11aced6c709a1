//! Command file lookup for scheduled jobs.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

const COMMAND_EXTENSION: &str = "md";

/// Resolves a schedule's command reference to a prompt file.
#[derive(Debug, Clone)]
pub struct CommandResolver {
    commands_dir: PathBuf,
    base_dir: PathBuf,
}

impl CommandResolver {
    /// `commands_dir` holds named commands; `base_dir` anchors relative paths.
    pub fn new(commands_dir: impl Into<PathBuf>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            commands_dir: commands_dir.into(),
            base_dir: base_dir.into(),
        }
    }

    pub fn commands_dir(&self) -> &Path {
        &self.commands_dir
    }

    /// Find the file for `command`.
    ///
    /// Tried in order: the reference as a path, then `<commands_dir>/<name>`,
    /// then `<commands_dir>/<name>.md`.
    pub fn resolve(&self, command: &str) -> Result<PathBuf> {
        let command = command.trim();
        if command.is_empty() {
            bail!("Command file not found: empty command reference");
        }

        let as_path = Path::new(command);
        let direct = if as_path.is_absolute() {
            as_path.to_path_buf()
        } else {
            self.base_dir.join(as_path)
        };

        let named = self.commands_dir.join(command);
        let with_extension = self
            .commands_dir
            .join(format!("{command}.{COMMAND_EXTENSION}"));

        [direct, named, with_extension]
            .into_iter()
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| anyhow::anyhow!("Command file not found: {}", command))
    }

    /// Resolve and read a command file. Empty files are an error.
    pub fn load(&self, command: &str) -> Result<String> {
        let path = self.resolve(command)?;
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read command file {}", path.display()))?;
        if content.trim().is_empty() {
            bail!("Command file {} is empty", path.display());
        }
        Ok(content)
    }

    /// Names of the commands under `commands_dir`, without extension.
    pub fn list(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.commands_dir) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter_map(|path| {
                let stem = path.file_stem()?.to_str()?.to_string();
                Some(stem)
            })
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn setup() -> (tempfile::TempDir, CommandResolver) {
        let dir = tempdir().unwrap();
        let commands = dir.path().join("commands");
        std::fs::create_dir_all(&commands).unwrap();
        std::fs::write(commands.join("report.md"), "Summarize today's commits").unwrap();
        std::fs::write(commands.join("blank.md"), "  \n").unwrap();
        let resolver = CommandResolver::new(commands, dir.path());
        (dir, resolver)
    }

    #[test]
    fn test_resolves_with_and_without_extension() {
        let (_dir, resolver) = setup();
        assert!(resolver.resolve("report").unwrap().ends_with("report.md"));
        assert!(resolver.resolve("report.md").unwrap().ends_with("report.md"));
        assert_eq!(resolver.load("report").unwrap(), "Summarize today's commits");
    }

    #[test]
    fn test_resolves_relative_path() {
        let (dir, resolver) = setup();
        std::fs::write(dir.path().join("adhoc.txt"), "do the thing").unwrap();
        assert_eq!(resolver.load("adhoc.txt").unwrap(), "do the thing");
    }

    #[test]
    fn test_missing_and_empty_files() {
        let (_dir, resolver) = setup();
        let err = resolver.load("nope").unwrap_err();
        assert!(err.to_string().contains("not found"));
        assert!(resolver.load("blank").is_err());
    }

    #[test]
    fn test_list_commands() {
        let (_dir, resolver) = setup();
        assert_eq!(resolver.list(), vec!["blank", "report"]);
    }
}
