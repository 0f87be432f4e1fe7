use chrono::{DateTime, Utc};
use fd_lock::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, info};

use super::types::WorkflowState;

/// Schema version written into every persisted record
pub const SCHEMA_VERSION: u32 = 1;

/// Errors that can occur during state persistence operations
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("State corruption detected: {reason}")]
    StateCorruption { reason: String },

    #[error("Lock acquisition failed: {reason}")]
    LockError { reason: String },
}

/// Envelope around the workflow state as it sits in durable storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedRecord {
    pub version: u32,
    pub key: String,
    pub last_persisted: DateTime<Utc>,
    pub state: WorkflowState,
}

impl PersistedRecord {
    pub fn new(key: &str, state: WorkflowState) -> Self {
        Self {
            version: SCHEMA_VERSION,
            key: key.to_string(),
            last_persisted: Utc::now(),
            state,
        }
    }
}

/// Configuration for state persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Directory holding the state record and its lock file
    pub directory: PathBuf,
    /// Fixed identifier of the workflow record
    pub state_key: String,
    /// Oldest history entries beyond this many are dropped. Unbounded when unset.
    pub max_history_entries: Option<usize>,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(".eda-family"),
            state_key: "eda_workflow_state".to_string(),
            max_history_entries: None,
        }
    }
}

/// Durable storage for the workflow record.
///
/// Writes are synchronous: when `save` returns `Ok`, the record survives a
/// process restart.
pub trait StatePersistence: Send + Sync {
    /// Load the record stored under `key`, if any
    fn load(&self, key: &str) -> Result<Option<PersistedRecord>, PersistenceError>;

    /// Replace the record stored under `record.key`
    fn save(&self, record: &PersistedRecord) -> Result<(), PersistenceError>;
}

/// File system implementation of state persistence
#[derive(Debug, Clone)]
pub struct FileSystemPersistence {
    directory: PathBuf,
}

impl FileSystemPersistence {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn from_config(config: &PersistenceConfig) -> Self {
        Self::new(config.directory.clone())
    }

    /// Get the state file path for a record key
    pub fn state_file_path(&self, key: &str) -> PathBuf {
        self.directory.join(format!("{}.json", key))
    }

    fn lock_file_path(&self, key: &str) -> PathBuf {
        self.directory.join(format!("{}.lock", key))
    }
}

impl StatePersistence for FileSystemPersistence {
    fn load(&self, key: &str) -> Result<Option<PersistedRecord>, PersistenceError> {
        let state_file = self.state_file_path(key);

        if !state_file.exists() {
            debug!(key = %key, file = ?state_file, "No existing state file found");
            return Ok(None);
        }

        let contents = fs::read_to_string(&state_file)?;
        let record: PersistedRecord = serde_json::from_str(&contents)?;

        if record.version != SCHEMA_VERSION {
            return Err(PersistenceError::VersionMismatch {
                expected: SCHEMA_VERSION,
                found: record.version,
            });
        }

        if record.key != key {
            return Err(PersistenceError::StateCorruption {
                reason: format!("record key '{}' stored under '{}'", record.key, key),
            });
        }

        info!(
            key = %key,
            stage = %record.state.current_stage,
            last_persisted = %record.last_persisted,
            "State loaded successfully"
        );

        Ok(Some(record))
    }

    fn save(&self, record: &PersistedRecord) -> Result<(), PersistenceError> {
        fs::create_dir_all(&self.directory)?;

        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lock_file_path(&record.key))?;
        let mut lock = RwLock::new(lock_file);
        let _guard = lock.try_write().map_err(|e| PersistenceError::LockError {
            reason: format!("another writer holds the '{}' record: {}", record.key, e),
        })?;

        let state_file = self.state_file_path(&record.key);
        let serialized = serde_json::to_string_pretty(record)?;

        // Write to temporary file first, then rename
        let temp_file = self.directory.join(format!("{}.json.tmp", record.key));
        fs::write(&temp_file, serialized)?;
        fs::rename(&temp_file, &state_file)?;

        debug!(
            key = %record.key,
            stage = %record.state.current_stage,
            file = ?state_file,
            "State saved"
        );

        Ok(())
    }
}

/// Process-local storage, used for tests and embedding
#[derive(Debug, Default)]
pub struct InMemoryPersistence {
    records: Mutex<HashMap<String, PersistedRecord>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, PersistedRecord>>, PersistenceError> {
        self.records.lock().map_err(|_| PersistenceError::LockError {
            reason: "in-memory record map poisoned".to_string(),
        })
    }
}

impl StatePersistence for InMemoryPersistence {
    fn load(&self, key: &str) -> Result<Option<PersistedRecord>, PersistenceError> {
        Ok(self.records()?.get(key).cloned())
    }

    fn save(&self, record: &PersistedRecord) -> Result<(), PersistenceError> {
        self.records()?.insert(record.key.clone(), record.clone());
        Ok(())
    }
}

impl<T: StatePersistence + ?Sized> StatePersistence for std::sync::Arc<T> {
    fn load(&self, key: &str) -> Result<Option<PersistedRecord>, PersistenceError> {
        (**self).load(key)
    }

    fn save(&self, record: &PersistedRecord) -> Result<(), PersistenceError> {
        (**self).save(record)
    }
}
