//! Plan document directories under `.codeloom/plans/`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::Utc;

use codeloom_ai::plan::PLAN_DOCUMENTS;
use codeloom_storage::paths::plans_dir;
use codeloom_traits::DocumentStore;

const PLANS_PREFIX: &str = "plans";
const CHECK_FILE: &str = ".codeloom-check";

/// A plan document read back from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanDocument {
    pub name: String,
    pub content: String,
}

/// Reads and writes the Markdown documents of each plan.
pub struct PlanStore {
    store: Arc<dyn DocumentStore>,
    data_dir: PathBuf,
}

impl PlanStore {
    pub fn new(store: Arc<dyn DocumentStore>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            data_dir: data_dir.into(),
        }
    }

    pub fn plans_root(&self) -> PathBuf {
        plans_dir(&self.data_dir)
    }

    pub fn plan_dir(&self, slug: &str) -> PathBuf {
        self.plans_root().join(slug)
    }

    /// Plan slugs, oldest first (slugs sort by creation time).
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = self.store.list(PLANS_PREFIX)?;
        Ok(entries
            .into_iter()
            .filter_map(|entry| {
                entry
                    .strip_prefix(PLANS_PREFIX)
                    .map(|rest| rest.trim_start_matches('/').to_string())
            })
            .filter(|slug| !slug.is_empty() && !slug.starts_with('.'))
            .collect())
    }

    pub fn exists(&self, slug: &str) -> bool {
        is_valid_slug(slug) && self.plan_dir(slug).is_dir()
    }

    pub fn read_document(&self, slug: &str, name: &str) -> Result<Option<String>> {
        let key = document_key(slug, name)?;
        Ok(self.store.read(&key)?)
    }

    /// Atomically write one of the plan documents.
    pub fn write_document(&self, slug: &str, name: &str, content: &str) -> Result<()> {
        let key = document_key(slug, name)?;
        self.store
            .write(&key, content)
            .with_context(|| format!("Failed to write plan document {key}"))?;
        tracing::debug!(slug = %slug, document = %name, "Plan document written");
        Ok(())
    }

    /// Every existing document of a plan, in canonical order.
    pub fn read_all(&self, slug: &str) -> Result<Vec<PlanDocument>> {
        let mut documents = Vec::new();
        for name in PLAN_DOCUMENTS {
            if let Some(content) = self.read_document(slug, name)? {
                documents.push(PlanDocument {
                    name: name.to_string(),
                    content,
                });
            }
        }
        Ok(documents)
    }

    /// Create the plan directory and prove it is writable and readable.
    pub fn validate(&self, slug: &str) -> Result<PathBuf> {
        if !is_valid_slug(slug) {
            bail!("Invalid plan slug '{}'", slug);
        }
        let key = format!("{PLANS_PREFIX}/{slug}/{CHECK_FILE}");
        let marker = Utc::now().to_rfc3339();

        self.store
            .write(&key, &marker)
            .with_context(|| {
                format!(
                    "Plan directory {} is not writable",
                    self.plan_dir(slug).display()
                )
            })?;
        let read_back = self.store.read(&key)?;
        self.store.remove(&key)?;
        if read_back.as_deref() != Some(marker.as_str()) {
            bail!(
                "Plan directory {} did not return what was written",
                self.plan_dir(slug).display()
            );
        }
        Ok(self.plan_dir(slug))
    }

    /// Create the plan directory without the write check.
    pub fn create(&self, slug: &str) -> Result<PathBuf> {
        if !is_valid_slug(slug) {
            bail!("Invalid plan slug '{}'", slug);
        }
        let dir = self.plan_dir(slug);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create plan directory {}", dir.display()))?;
        Ok(dir)
    }
}

/// Slug of the form `YYYYMMDD-HHMMSS-xxxxxx`.
pub fn generate_slug() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", Utc::now().format("%Y%m%d-%H%M%S"), &suffix[..6])
}

fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && !slug.starts_with('.')
        && slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn document_key(slug: &str, name: &str) -> Result<String> {
    if !is_valid_slug(slug) {
        bail!("Invalid plan slug '{}'", slug);
    }
    if !PLAN_DOCUMENTS.contains(&name) {
        bail!(
            "Unknown plan document '{}'. Expected one of: {}",
            name,
            PLAN_DOCUMENTS.join(", ")
        );
    }
    Ok(format!("{PLANS_PREFIX}/{slug}/{name}"))
}
