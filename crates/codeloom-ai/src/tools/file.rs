//! File tools scoped to the session working directory.
//!
//! Reads, listings and name searches are read-only. Writes and renames are
//! medium risk and go through the atomic temp-then-rename writer.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::fs;
use walkdir::WalkDir;

use codeloom_storage::write_atomic;
use codeloom_traits::{Tool, ToolError, ToolOutput, ToolResult, ToolRisk};

/// Maximum file size to read (1MB)
const DEFAULT_MAX_READ_BYTES: u64 = 1_000_000;

/// Maximum entries returned by listings and searches
const MAX_ENTRIES: usize = 1000;

/// Directories never descended into by `find_files`
const SKIP_DIRS: &[&str] = &[".git", "node_modules", "target", ".codeloom"];

/// Resolve `path` against `workdir`, rejecting anything that escapes it.
pub(crate) fn resolve_in(workdir: &Path, path: &str) -> Result<PathBuf, String> {
    let candidate = Path::new(path);
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        workdir.join(candidate)
    };
    let normalized = normalize_path(&joined);
    if !normalized.starts_with(normalize_path(workdir)) {
        return Err(format!(
            "Path '{}' escapes the working directory '{}'",
            path,
            workdir.display()
        ));
    }
    Ok(normalized)
}

/// Normalize a path without touching the filesystem
pub(crate) fn normalize_path(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                result.pop();
            }
            Component::CurDir => {}
            c => result.push(c),
        }
    }
    result
}

fn relative_display(workdir: &Path, path: &Path) -> String {
    path.strip_prefix(workdir)
        .unwrap_or(path)
        .to_string_lossy()
        .replace(std::path::MAIN_SEPARATOR, "/")
}

fn parse_input<T: for<'de> Deserialize<'de>>(input: Value) -> ToolResult<T> {
    serde_json::from_value(input).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

#[derive(Debug, Deserialize)]
struct PathInput {
    #[serde(alias = "file_path")]
    path: String,
}

/// Read a UTF-8 file.
#[derive(Debug, Clone)]
pub struct ReadFileTool {
    workdir: PathBuf,
    max_read_bytes: u64,
}

impl ReadFileTool {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            max_read_bytes: DEFAULT_MAX_READ_BYTES,
        }
    }

    pub fn with_max_read(mut self, bytes: u64) -> Self {
        self.max_read_bytes = bytes;
        self
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a text file relative to the working directory."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "File path to read" }
            },
            "required": ["path"]
        })
    }

    fn risk(&self) -> ToolRisk {
        ToolRisk::ReadOnly
    }

    async fn execute(&self, input: Value) -> ToolResult<ToolOutput> {
        let input: PathInput = parse_input(input)?;
        let path = match resolve_in(&self.workdir, &input.path) {
            Ok(path) => path,
            Err(e) => return Ok(ToolOutput::error(e)),
        };

        let metadata = match fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) => return Ok(ToolOutput::error(format!("{}: {}", input.path, e))),
        };
        if !metadata.is_file() {
            return Ok(ToolOutput::error(format!("{} is not a file", input.path)));
        }
        if metadata.len() > self.max_read_bytes {
            return Ok(ToolOutput::error(format!(
                "{} is too large to read ({} bytes, limit {})",
                input.path,
                metadata.len(),
                self.max_read_bytes
            )));
        }

        match fs::read(&path).await {
            Ok(bytes) => Ok(ToolOutput::text(String::from_utf8_lossy(&bytes))),
            Err(e) => Ok(ToolOutput::error(format!("{}: {}", input.path, e))),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ListInput {
    #[serde(default)]
    path: Option<String>,
}

/// List one directory level. Directories carry a trailing `/`.
#[derive(Debug, Clone)]
pub struct ListFilesTool {
    workdir: PathBuf,
}

impl ListFilesTool {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }
}

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List the entries of a directory. Defaults to the working directory."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Directory to list" }
            }
        })
    }

    fn risk(&self) -> ToolRisk {
        ToolRisk::ReadOnly
    }

    async fn execute(&self, input: Value) -> ToolResult<ToolOutput> {
        let input: ListInput = if input.is_null() {
            ListInput::default()
        } else {
            parse_input(input)?
        };
        let target = input.path.as_deref().unwrap_or(".");
        let dir = match resolve_in(&self.workdir, target) {
            Ok(dir) => dir,
            Err(e) => return Ok(ToolOutput::error(e)),
        };

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) => return Ok(ToolOutput::error(format!("{}: {}", target, e))),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let mut name = entry.file_name().to_string_lossy().to_string();
            if entry.file_type().await?.is_dir() {
                name.push('/');
            }
            names.push(name);
        }
        names.sort();
        names.truncate(MAX_ENTRIES);
        Ok(ToolOutput::text(names.join("\n")))
    }
}

#[derive(Debug, Deserialize)]
struct FindInput {
    #[serde(alias = "query", alias = "name")]
    pattern: String,
    #[serde(default)]
    path: Option<String>,
}

/// Recursive, case-insensitive substring search over file names.
#[derive(Debug, Clone)]
pub struct FindFilesTool {
    workdir: PathBuf,
}

impl FindFilesTool {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }
}

fn find_matching(workdir: &Path, root: &Path, pattern: &str) -> Vec<String> {
    let needle = pattern.to_lowercase();
    let mut found: Vec<String> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !entry.file_type().is_dir()
                || !SKIP_DIRS.contains(&entry.file_name().to_string_lossy().as_ref())
        })
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .file_name()
                .to_string_lossy()
                .to_lowercase()
                .contains(&needle)
        })
        .map(|entry| relative_display(workdir, entry.path()))
        .collect();
    found.sort();
    found.truncate(MAX_ENTRIES);
    found
}

#[async_trait]
impl Tool for FindFilesTool {
    fn name(&self) -> &str {
        "find_files"
    }

    fn description(&self) -> &str {
        "Find files whose name contains the given text, searching recursively."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string", "description": "Text the file name must contain" },
                "path": { "type": "string", "description": "Directory to search (default: working directory)" }
            },
            "required": ["pattern"]
        })
    }

    fn risk(&self) -> ToolRisk {
        ToolRisk::ReadOnly
    }

    async fn execute(&self, input: Value) -> ToolResult<ToolOutput> {
        let input: FindInput = parse_input(input)?;
        let root = match resolve_in(&self.workdir, input.path.as_deref().unwrap_or(".")) {
            Ok(root) => root,
            Err(e) => return Ok(ToolOutput::error(e)),
        };

        let workdir = self.workdir.clone();
        let pattern = input.pattern.clone();
        let found = tokio::task::spawn_blocking(move || find_matching(&workdir, &root, &pattern))
            .await
            .map_err(|e| ToolError::Tool(format!("find_files worker failed: {}", e)))?;

        if found.is_empty() {
            return Ok(ToolOutput::text(format!(
                "No files matching '{}'",
                input.pattern
            )));
        }
        Ok(ToolOutput::text(found.join("\n")))
    }
}

#[derive(Debug, Deserialize)]
struct WriteInput {
    #[serde(alias = "file_path")]
    path: String,
    content: String,
}

/// Replace a file's content atomically, creating parent directories.
#[derive(Debug, Clone)]
pub struct WriteFileTool {
    workdir: PathBuf,
}

impl WriteFileTool {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write text to a file, replacing any existing content."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "File path to write" },
                "content": { "type": "string", "description": "Full file content" }
            },
            "required": ["path", "content"]
        })
    }

    fn risk(&self) -> ToolRisk {
        ToolRisk::Medium
    }

    async fn execute(&self, input: Value) -> ToolResult<ToolOutput> {
        let input: WriteInput = parse_input(input)?;
        let path = match resolve_in(&self.workdir, &input.path) {
            Ok(path) => path,
            Err(e) => return Ok(ToolOutput::error(e)),
        };

        let bytes = input.content.into_bytes();
        let len = bytes.len();
        let target = path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&target, &bytes))
            .await
            .map_err(|e| ToolError::Tool(format!("write_file worker failed: {}", e)))??;

        tracing::debug!(path = %path.display(), bytes = len, "File written");
        Ok(ToolOutput::text(format!(
            "Wrote {} bytes to {}",
            len, input.path
        )))
    }
}

#[derive(Debug, Deserialize)]
struct RenameInput {
    #[serde(alias = "source", alias = "old_path")]
    from: String,
    #[serde(alias = "destination", alias = "new_path")]
    to: String,
}

/// Rename or move a file inside the working directory.
#[derive(Debug, Clone)]
pub struct RenameFileTool {
    workdir: PathBuf,
}

impl RenameFileTool {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }
}

#[async_trait]
impl Tool for RenameFileTool {
    fn name(&self) -> &str {
        "rename_file"
    }

    fn description(&self) -> &str {
        "Rename or move a file within the working directory."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "from": { "type": "string", "description": "Existing path" },
                "to": { "type": "string", "description": "New path" }
            },
            "required": ["from", "to"]
        })
    }

    fn risk(&self) -> ToolRisk {
        ToolRisk::Medium
    }

    async fn execute(&self, input: Value) -> ToolResult<ToolOutput> {
        let input: RenameInput = parse_input(input)?;
        let (from, to) = match (
            resolve_in(&self.workdir, &input.from),
            resolve_in(&self.workdir, &input.to),
        ) {
            (Ok(from), Ok(to)) => (from, to),
            (Err(e), _) | (_, Err(e)) => return Ok(ToolOutput::error(e)),
        };

        if fs::try_exists(&to).await? {
            return Ok(ToolOutput::error(format!("{} already exists", input.to)));
        }
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).await?;
        }
        match fs::rename(&from, &to).await {
            Ok(()) => Ok(ToolOutput::text(format!(
                "Renamed {} to {}",
                input.from, input.to
            ))),
            Err(e) => Ok(ToolOutput::error(format!("{}: {}", input.from, e))),
        }
    }
}
