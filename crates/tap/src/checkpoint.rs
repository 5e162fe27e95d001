//! Checkpoint backends
//!
//! - [`MemoryCheckpoint`]: shared in-process slot
//! - [`FileCheckpoint`]: one file per `<schema>-<table>` under a prefix directory

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use contracts::{CheckpointStore, ContractError};
use tracing::debug;

/// In-memory checkpoint; clones share the same slot
#[derive(Debug, Clone, Default)]
pub struct MemoryCheckpoint {
    slot: Arc<Mutex<Option<String>>>,
}

impl MemoryCheckpoint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a stored position
    pub fn with_value(value: impl Into<String>) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(value.into()))),
        }
    }

    /// Stored position, if any
    pub fn get(&self) -> Option<String> {
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpoint {
    async fn pull(&self) -> Result<String, ContractError> {
        self.get()
            .ok_or_else(|| ContractError::checkpoint("no checkpoint stored"))
    }

    async fn push(&self, value: &str) -> Result<(), ContractError> {
        *self
            .slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(value.to_string());
        Ok(())
    }
}

/// Checkpoint kept in a plain file
#[derive(Debug, Clone)]
pub struct FileCheckpoint {
    path: PathBuf,
}

impl FileCheckpoint {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<prefix>/<schema>-<table>`
    pub fn under(prefix: impl AsRef<Path>, schema: &str, table: &str) -> Self {
        Self::new(prefix.as_ref().join(format!("{schema}-{table}")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpoint {
    async fn pull(&self) -> Result<String, ContractError> {
        tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            ContractError::checkpoint(format!("read {}: {e}", self.path.display()))
        })
    }

    async fn push(&self, value: &str) -> Result<(), ContractError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut staging = self.path.clone().into_os_string();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);

        tokio::fs::write(&staging, value).await?;
        tokio::fs::rename(&staging, &self.path).await?;
        debug!(path = %self.path.display(), value, "Checkpoint stored");
        Ok(())
    }
}
