//! Versioned on-disk state
//!
//! State is stored as a JSON envelope carrying a schema version and an md5
//! checksum of the payload. Writes go through a temp file and a rename so a
//! crash mid-write never leaves a truncated file behind.
//!
//! No backups are kept. `clear` must leave nothing on disk.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

/// Persistence error types
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// State not initialized
    #[error("State not initialized")]
    NotInitialized,

    /// Corruption detected
    #[error("Corruption detected: {0}")]
    Corruption(String),

    /// Version mismatch
    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Expected version
        expected: u32,
        /// Found version
        found: u32,
    },
}

impl PersistenceError {
    /// Whether the stored file is unusable and should be discarded rather than reported
    pub fn is_recoverable_by_reset(&self) -> bool {
        matches!(
            self,
            PersistenceError::Serialization(_)
                | PersistenceError::Corruption(_)
                | PersistenceError::VersionMismatch { .. }
        )
    }
}

/// Result type for persistence operations
pub type Result<T> = std::result::Result<T, PersistenceError>;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope<T> {
    version: u32,
    checksum: String,
    data: T,
}

fn checksum_of<T: Serialize>(data: &T) -> Result<String> {
    let json = serde_json::to_string(data)?;
    Ok(format!("{:x}", md5::compute(json)))
}

/// Persistence configuration
#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    /// Path to the persistence file
    pub path: PathBuf,
    /// Current schema version
    pub version: u32,
    /// Write through a temp file and rename
    pub atomic_writes: bool,
    /// Drop unreadable files (bad checksum, old version) instead of failing `init`
    pub reset_on_corruption: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("state.json"),
            version: 1,
            atomic_writes: true,
            reset_on_corruption: true,
        }
    }
}

impl PersistenceConfig {
    /// Create a new configuration
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), ..Default::default() }
    }

    /// Set schema version
    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Enable or disable atomic writes
    pub fn atomic_writes(mut self, enabled: bool) -> Self {
        self.atomic_writes = enabled;
        self
    }

    /// Enable or disable discarding of unreadable files
    pub fn reset_on_corruption(mut self, enabled: bool) -> Self {
        self.reset_on_corruption = enabled;
        self
    }
}

/// A value of type `T` mirrored to a file
///
/// `init` must be called before any read or write.
pub struct PersistedState<T> {
    config: PersistenceConfig,
    state: RwLock<Option<T>>,
}

impl<T> PersistedState<T>
where
    T: Serialize + DeserializeOwned + Clone + Default,
{
    /// Create a new persisted state manager
    pub fn new(config: PersistenceConfig) -> Self {
        Self { config, state: RwLock::new(None) }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Load from disk, falling back to `T::default()` when there is no file
    pub async fn init(&self) -> Result<()> {
        let loaded = match self.load_from_disk().await {
            Ok(data) => data,
            Err(PersistenceError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                T::default()
            }
            Err(e) if self.config.reset_on_corruption && e.is_recoverable_by_reset() => {
                tracing::warn!(
                    path = %self.config.path.display(),
                    error = %e,
                    "discarding unreadable state file"
                );
                self.remove_files().await?;
                T::default()
            }
            Err(e) => return Err(e),
        };

        *self.state.write().await = Some(loaded);
        Ok(())
    }

    /// Get the current state
    pub async fn get(&self) -> Result<T> {
        self.state.read().await.clone().ok_or(PersistenceError::NotInitialized)
    }

    /// Replace the state and persist it
    pub async fn set(&self, new_state: T) -> Result<()> {
        let mut state = self.state.write().await;
        if state.is_none() {
            return Err(PersistenceError::NotInitialized);
        }
        self.write_to_disk(&new_state).await?;
        *state = Some(new_state);
        Ok(())
    }

    /// Reset to `T::default()` and delete the backing file
    pub async fn clear(&self) -> Result<()> {
        let mut state = self.state.write().await;
        self.remove_files().await?;
        *state = Some(T::default());
        Ok(())
    }

    async fn remove_files(&self) -> Result<()> {
        for path in [self.config.path.clone(), self.temp_path()] {
            match fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn load_from_disk(&self) -> Result<T> {
        let contents = fs::read_to_string(&self.config.path).await?;
        let envelope: Envelope<T> = serde_json::from_str(&contents)?;

        if envelope.version != self.config.version {
            return Err(PersistenceError::VersionMismatch {
                expected: self.config.version,
                found: envelope.version,
            });
        }

        let computed = checksum_of(&envelope.data)?;
        if computed != envelope.checksum {
            return Err(PersistenceError::Corruption(format!(
                "checksum mismatch: stored {}, computed {}",
                envelope.checksum, computed
            )));
        }

        Ok(envelope.data)
    }

    async fn write_to_disk(&self, data: &T) -> Result<()> {
        let envelope = Envelope {
            version: self.config.version,
            checksum: checksum_of(data)?,
            data,
        };
        let json = serde_json::to_string_pretty(&envelope)?;

        if let Some(parent) = self.config.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        if self.config.atomic_writes {
            let temp_path = self.temp_path();
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(json.as_bytes()).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&temp_path, &self.config.path).await?;
        } else {
            fs::write(&self.config.path, json).await?;
        }

        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        self.config.path.with_extension("tmp")
    }
}
