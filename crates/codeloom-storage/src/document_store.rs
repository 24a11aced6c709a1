//! File-backed document store.

use std::io::Write;
use std::path::{Component, Path, PathBuf};

use codeloom_traits::{DocumentStore, ToolError, ToolResult};
use tempfile::NamedTempFile;

/// Stores each document as a file below a root directory.
#[derive(Debug, Clone)]
pub struct FileDocumentStore {
    root: PathBuf,
}

impl FileDocumentStore {
    /// Create a store rooted at `root`. The directory is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a key to a path, rejecting keys that escape the root.
    pub fn path_for(&self, key: &str) -> ToolResult<PathBuf> {
        let relative = Path::new(key);
        let escapes = relative.components().any(|component| {
            !matches!(component, Component::Normal(_) | Component::CurDir)
        });
        if key.trim().is_empty() || escapes {
            return Err(ToolError::Storage(format!("Invalid document key: {key}")));
        }
        Ok(self.root.join(relative))
    }
}

/// Write `content` to `path` through a sibling temp file and a rename.
pub fn write_atomic(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;
    let mut temp = NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

impl DocumentStore for FileDocumentStore {
    fn read(&self, key: &str) -> ToolResult<Option<String>> {
        let path = self.path_for(key)?;
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, key: &str, content: &str) -> ToolResult<()> {
        let path = self.path_for(key)?;
        write_atomic(&path, content.as_bytes())?;
        tracing::debug!(key = %key, bytes = content.len(), "Document written");
        Ok(())
    }

    fn remove(&self, key: &str) -> ToolResult<bool> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self, prefix: &str) -> ToolResult<Vec<String>> {
        let dir = if prefix.trim().is_empty() {
            self.root.clone()
        } else {
            self.path_for(prefix)?
        };

        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            // Leftover temp files from interrupted writes.
            if name.starts_with(".tmp") {
                continue;
            }
            if prefix.trim().is_empty() {
                keys.push(name);
            } else {
                keys.push(format!("{}/{}", prefix.trim_end_matches('/'), name));
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_read_missing_returns_none() {
        let dir = tempdir().unwrap();
        let store = FileDocumentStore::new(dir.path());
        assert!(store.read("nope.md").unwrap().is_none());
    }

    #[test]
    fn test_write_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let store = FileDocumentStore::new(dir.path());
        store.write("plans/abc/proposal.md", "# Proposal").unwrap();
        assert_eq!(
            store.read("plans/abc/proposal.md").unwrap().as_deref(),
            Some("# Proposal")
        );
    }

    #[test]
    fn test_write_replaces_existing_content() {
        let dir = tempdir().unwrap();
        let store = FileDocumentStore::new(dir.path());
        store.write("a.json", "{\"v\":1}").unwrap();
        store.write("a.json", "{\"v\":2}").unwrap();
        assert_eq!(store.read("a.json").unwrap().as_deref(), Some("{\"v\":2}"));
    }

    #[test]
    fn test_rejects_escaping_keys() {
        let dir = tempdir().unwrap();
        let store = FileDocumentStore::new(dir.path());
        assert!(store.write("../outside.md", "x").is_err());
        assert!(store.read("/etc/passwd").is_err());
    }

    #[test]
    fn test_list_and_remove() {
        let dir = tempdir().unwrap();
        let store = FileDocumentStore::new(dir.path());
        store.write("plans/one/plan.md", "1").unwrap();
        store.write("plans/two/plan.md", "2").unwrap();

        assert_eq!(
            store.list("plans").unwrap(),
            vec!["plans/one".to_string(), "plans/two".to_string()]
        );
        assert!(store.remove("plans/one/plan.md").unwrap());
        assert!(!store.remove("plans/one/plan.md").unwrap());
        assert!(store.list("missing").unwrap().is_empty());
    }
}
