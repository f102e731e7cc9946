//! Repository storage backend
//!
//! Layout under the base directory:
//!
//! ```text
//! repository.json          reserved names and the list of history ids
//! histories/<id>.json      one file per version history
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::error::{Result, VersionControlError};
use crate::history::VersionHistory;
use crate::ids::HistoryId;
use crate::names::NameRegistry;
use crate::repository::{Repository, RepositoryConfig};

const MANIFEST_FILE: &str = "repository.json";
const HISTORIES_DIR: &str = "histories";

/// Repository-level record
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Manifest {
    names: NameRegistry,
    histories: Vec<HistoryId>,
}

/// Storage backend for a repository
pub struct RepositoryStore {
    /// Base directory for repository storage
    base_dir: PathBuf,
}

impl RepositoryStore {
    /// Create a new storage backend
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Store rooted at the configured storage directory
    pub fn from_config(config: &RepositoryConfig) -> Self {
        Self::new(config.storage_dir.clone())
    }

    /// Initialize storage directories
    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(self.base_dir.join(HISTORIES_DIR))
            .await
            .map_err(|e| {
                VersionControlError::StorageError(format!("Failed to create storage directory: {}", e))
            })?;

        debug!(dir = %self.base_dir.display(), "Initialized repository storage");
        Ok(())
    }

    /// Write every history and the manifest. Returns bytes written.
    pub async fn save(&self, repository: &Repository) -> Result<u64> {
        self.init().await?;

        let mut total = 0u64;
        let mut ids = Vec::new();
        for history in repository.histories() {
            total += self.save_history(history).await?;
            ids.push(history.id().clone());
        }

        let manifest = Manifest {
            names: repository.names().clone(),
            histories: ids,
        };
        let json = serde_json::to_string_pretty(&manifest).map_err(|e| {
            VersionControlError::StorageError(format!("Failed to serialize manifest: {}", e))
        })?;
        total += json.len() as u64;

        fs::write(self.manifest_path(), &json).await.map_err(|e| {
            VersionControlError::StorageError(format!("Failed to write manifest: {}", e))
        })?;

        info!(
            dir = %self.base_dir.display(),
            histories = manifest.histories.len(),
            size = total,
            "Saved repository"
        );
        Ok(total)
    }

    /// Write one history. Returns bytes written.
    pub async fn save_history(&self, history: &VersionHistory) -> Result<u64> {
        let path = self.history_path(history.id());

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                VersionControlError::StorageError(format!("Failed to create directory: {}", e))
            })?;
        }

        let json = serde_json::to_string_pretty(history).map_err(|e| {
            VersionControlError::StorageError(format!("Failed to serialize history: {}", e))
        })?;
        let size = json.len() as u64;

        fs::write(&path, &json).await.map_err(|e| {
            VersionControlError::StorageError(format!("Failed to write history: {}", e))
        })?;

        debug!(
            history_id = %history.id(),
            path = %path.display(),
            size = size,
            "Saved history to storage"
        );
        Ok(size)
    }

    /// Load the repository recorded by the manifest
    pub async fn load(&self, config: RepositoryConfig) -> Result<Repository> {
        let json = fs::read_to_string(self.manifest_path()).await.map_err(|e| {
            VersionControlError::StorageError(format!("Failed to read manifest: {}", e))
        })?;
        let manifest: Manifest = serde_json::from_str(&json).map_err(|e| {
            VersionControlError::StorageError(format!("Failed to deserialize manifest: {}", e))
        })?;

        let mut histories = Vec::with_capacity(manifest.histories.len());
        for id in &manifest.histories {
            histories.push(self.load_history(id).await?);
        }

        info!(
            dir = %self.base_dir.display(),
            histories = histories.len(),
            "Loaded repository"
        );
        Ok(Repository::from_parts(config, manifest.names, histories))
    }

    /// Load and check one history
    pub async fn load_history(&self, id: &HistoryId) -> Result<VersionHistory> {
        let path = self.history_path(id);

        let json = fs::read_to_string(&path).await.map_err(|e| {
            VersionControlError::StorageError(format!("Failed to read history {}: {}", id, e))
        })?;
        let history: VersionHistory = serde_json::from_str(&json).map_err(|e| {
            VersionControlError::StorageError(format!("Failed to deserialize history {}: {}", id, e))
        })?;

        if history.id() != id {
            return Err(VersionControlError::StorageError(format!(
                "history file {} holds history {}",
                path.display(),
                history.id()
            )));
        }
        history.validate()?;

        debug!(history_id = %id, versions = history.version_count(), "Loaded history from storage");
        Ok(history)
    }

    /// Whether a saved repository exists
    pub async fn exists(&self) -> bool {
        fs::try_exists(self.manifest_path()).await.unwrap_or(false)
    }

    /// Remove a history file
    pub async fn delete_history(&self, id: &HistoryId) -> Result<()> {
        let path = self.history_path(id);

        if fs::try_exists(&path).await.unwrap_or(false) {
            fs::remove_file(&path).await.map_err(|e| {
                VersionControlError::StorageError(format!("Failed to delete history: {}", e))
            })?;
        } else {
            warn!(history_id = %id, "Deleting history that is not in storage");
        }

        debug!(history_id = %id, "Deleted history from storage");
        Ok(())
    }

    /// List ids of all history files in storage
    pub async fn list_history_ids(&self) -> Result<Vec<HistoryId>> {
        let mut ids = Vec::new();

        let mut entries = fs::read_dir(self.base_dir.join(HISTORIES_DIR)).await.map_err(|e| {
            VersionControlError::StorageError(format!("Failed to read storage directory: {}", e))
        })?;

        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            VersionControlError::StorageError(format!("Failed to read entry: {}", e))
        })? {
            let path = entry.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                if let Some(stem) = path.file_stem() {
                    ids.push(HistoryId::from(stem.to_string_lossy().into_owned()));
                }
            }
        }

        ids.sort();
        Ok(ids)
    }

    // Private helpers
    fn manifest_path(&self) -> PathBuf {
        self.base_dir.join(MANIFEST_FILE)
    }

    fn history_path(&self, id: &HistoryId) -> PathBuf {
        self.base_dir.join(HISTORIES_DIR).join(format!("{}.json", id))
    }
}
