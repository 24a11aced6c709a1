//! Storage layer with typed wrappers around codeloom-storage.
//!
//! Every subsystem shares one [`DocumentStore`] rooted at the project data
//! directory (`.codeloom/` by default).

pub mod plan;
pub mod schedule;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use codeloom_storage::FileDocumentStore;
use codeloom_traits::DocumentStore;

pub use plan::{PlanDocument, PlanStore, generate_slug};
pub use schedule::ScheduleStorage;

/// Central storage manager that initializes all storage subsystems.
pub struct Storage {
    data_dir: PathBuf,
    pub schedules: ScheduleStorage,
    pub plans: PlanStore,
}

impl Storage {
    /// Open (creating if needed) the data directory at `data_dir`.
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

        let store: Arc<dyn DocumentStore> = Arc::new(FileDocumentStore::new(&data_dir));
        Ok(Self::with_store(store, data_dir))
    }

    /// Build on an existing store; `data_dir` is where the store is rooted.
    pub fn with_store(store: Arc<dyn DocumentStore>, data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            schedules: ScheduleStorage::new(Arc::clone(&store)),
            plans: PlanStore::new(store, data_dir.clone()),
            data_dir,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}
