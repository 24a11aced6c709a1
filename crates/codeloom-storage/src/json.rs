//! JSON document helpers with the corrupt-read-yields-default contract.

use codeloom_traits::{DocumentStore, ToolResult};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Read and deserialize a JSON document.
///
/// A missing document, an unreadable document, or malformed JSON all yield
/// `T::default()`. First-run behavior depends on this never failing.
pub fn read_json_or_default<T>(store: &dyn DocumentStore, key: &str) -> T
where
    T: DeserializeOwned + Default,
{
    let content = match store.read(key) {
        Ok(Some(content)) => content,
        Ok(None) => return T::default(),
        Err(error) => {
            tracing::warn!(key = %key, error = %error, "Failed to read document, using default");
            return T::default();
        }
    };

    if content.trim().is_empty() {
        return T::default();
    }

    match serde_json::from_str(&content) {
        Ok(value) => value,
        Err(error) => {
            tracing::warn!(key = %key, error = %error, "Malformed JSON document, using default");
            T::default()
        }
    }
}

/// Serialize and write a JSON document (pretty-printed).
pub fn write_json<T: Serialize>(store: &dyn DocumentStore, key: &str, value: &T) -> ToolResult<()> {
    let content = serde_json::to_string_pretty(value)?;
    store.write(key, &content)
}
