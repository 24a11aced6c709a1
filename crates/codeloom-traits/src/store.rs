//! Persistence collaborator shared by plans, tasks and schedules.

use crate::error::Result;

/// Key-value document store. Keys are `/`-separated relative paths.
///
/// Reads of a missing key return `Ok(None)`; implementations never fail a
/// read because a document is absent.
pub trait DocumentStore: Send + Sync {
    /// Read a document, `None` when it does not exist.
    fn read(&self, key: &str) -> Result<Option<String>>;

    /// Replace a document atomically.
    fn write(&self, key: &str, content: &str) -> Result<()>;

    /// Remove a document. Returns whether it existed.
    fn remove(&self, key: &str) -> Result<bool>;

    /// List keys directly under `prefix` (non-recursive).
    fn list(&self, prefix: &str) -> Result<Vec<String>>;
}
