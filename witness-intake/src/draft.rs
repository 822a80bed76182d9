//! Draft persistence for in-progress reports
//!
//! One JSON record lives in one well-known key-value slot. Storage trouble is
//! logged and swallowed: the form stays usable without persistence.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

use crate::config::{DRAFT_STORAGE_KEY, DRAFT_TTL_HOURS};
use crate::error::PersistenceError;
use crate::types::{DraftRecord, FileMeta, FormSnapshot};

/// Local key-value storage, string values, atomic per key
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError>;
    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError>;
    fn remove(&self, key: &str) -> Result<(), PersistenceError>;
}

/// In-process store
#[derive(Debug, Default)]
pub struct MemoryStore {
    slots: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, PersistenceError> {
        self.slots
            .lock()
            .map_err(|_| PersistenceError::Unavailable("memory store poisoned".into()))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        Ok(self.slots()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        self.slots()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), PersistenceError> {
        self.slots()?.remove(key);
        Ok(())
    }
}

/// One file per key under a directory
///
/// Writes land in a sibling temp file and are renamed into place.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        let bytes = match fs::read(self.path_for(key)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        String::from_utf8(bytes)
            .map(Some)
            .map_err(|e| PersistenceError::Corrupt(e.to_string()))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        fs::create_dir_all(&self.dir)?;
        let target = self.path_for(key);
        let staging = self.dir.join(format!("{}.json.tmp", key));
        fs::write(&staging, value)?;
        fs::rename(&staging, &target)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), PersistenceError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Autosave slot for the current report
#[derive(Clone)]
pub struct DraftStore {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
}

impl DraftStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_ttl(store, Duration::hours(DRAFT_TTL_HOURS))
    }

    /// Drafts older than `ttl` are discarded on restore
    pub fn with_ttl(store: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Overwrite the draft with `snapshot` and the attachment listing
    pub fn save(&self, snapshot: &FormSnapshot, file_meta: &[FileMeta]) {
        self.save_at(snapshot, file_meta, Utc::now())
    }

    pub fn save_at(&self, snapshot: &FormSnapshot, file_meta: &[FileMeta], now: DateTime<Utc>) {
        let record = DraftRecord {
            snapshot: snapshot.clone(),
            captured_at: now,
            attached_file_meta: file_meta.to_vec(),
        };

        let raw = match serde_json::to_string(&record) {
            Ok(raw) => raw,
            Err(e) => {
                error!("Error saving form data: {}", e);
                return;
            }
        };

        match self.store.set(DRAFT_STORAGE_KEY, &raw) {
            Ok(()) => debug!("Draft saved ({} fields)", snapshot.len()),
            Err(e) => error!("Error saving form data: {}", e),
        }
    }

    /// Load the draft if one exists and is fresh
    pub fn restore(&self) -> Option<DraftRecord> {
        self.restore_at(Utc::now())
    }

    pub fn restore_at(&self, now: DateTime<Utc>) -> Option<DraftRecord> {
        let raw = match self.store.get(DRAFT_STORAGE_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(PersistenceError::Corrupt(e)) => {
                error!("Error restoring form data: {}", e);
                self.discard();
                return None;
            }
            Err(e) => {
                warn!("Draft storage unavailable: {}", e);
                return None;
            }
        };

        let record: DraftRecord = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(e) => {
                error!("Error restoring form data: {}", e);
                self.discard();
                return None;
            }
        };

        if now - record.captured_at > self.ttl {
            info!("Discarding draft captured at {}", record.captured_at.to_rfc3339());
            self.discard();
            return None;
        }

        Some(record)
    }

    /// Delete the draft; no-op when there is none
    pub fn clear(&self) {
        self.discard();
    }

    fn discard(&self) {
        if let Err(e) = self.store.remove(DRAFT_STORAGE_KEY) {
            warn!("Failed to remove draft: {}", e);
        }
    }
}
