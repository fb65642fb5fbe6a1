//! Durable storage for the scan history and quota.
//!
//! History and quota are always written together as one document, so a
//! reader never sees a history entry without its matching quota charge.

use super::history::ScanHistoryItem;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors that can occur while loading or saving the ledger.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("stored ledger is malformed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// What a store holds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredLedger {
    #[serde(default)]
    pub history: Vec<ScanHistoryItem>,
    /// `None` until the quota has been written for the first time.
    #[serde(default)]
    pub remaining: Option<u32>,
}

#[derive(Serialize)]
struct LedgerDocument<'a> {
    history: &'a [ScanHistoryItem],
    remaining: u32,
}

/// Persistence collaborator for the entitlement ledger.
///
/// Implementations must offer read-your-writes consistency.
pub trait LedgerStore: Send {
    fn load(&self) -> Result<StoredLedger, StoreError>;

    /// Replaces the stored history and quota in a single write.
    fn save(&mut self, history: &[ScanHistoryItem], remaining: u32) -> Result<(), StoreError>;
}

/// Reads a JSON document, returning `None` if the file does not exist.
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Writes a JSON document through a temporary file and a rename.
pub(crate) fn write_json_atomic<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Ledger store backed by a JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LedgerStore for JsonFileStore {
    fn load(&self) -> Result<StoredLedger, StoreError> {
        let stored = read_json(&self.path)?.unwrap_or_default();
        tracing::debug!(path = %self.path.display(), "Ledger loaded");
        Ok(stored)
    }

    fn save(&mut self, history: &[ScanHistoryItem], remaining: u32) -> Result<(), StoreError> {
        write_json_atomic(&self.path, &LedgerDocument { history, remaining })?;
        tracing::trace!(
            path = %self.path.display(),
            entries = history.len(),
            remaining,
            "Ledger saved"
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    stored: StoredLedger,
    fail_saves: bool,
    saves: u64,
}

/// In-memory store for testing. Clones share the same contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that already holds `stored`.
    pub fn with_contents(stored: StoredLedger) -> Self {
        let store = Self::default();
        store.lock().stored = stored;
        store
    }

    /// Makes subsequent saves fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.lock().fail_saves = failing;
    }

    /// Returns what has been durably saved so far.
    pub fn contents(&self) -> StoredLedger {
        self.lock().stored.clone()
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> u64 {
        self.lock().saves
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        // The lock only guards plain data, so a poisoned guard is still usable.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl LedgerStore for MemoryStore {
    fn load(&self) -> Result<StoredLedger, StoreError> {
        Ok(self.contents())
    }

    fn save(&mut self, history: &[ScanHistoryItem], remaining: u32) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if inner.fail_saves {
            return Err(StoreError::Unavailable("memory store set to fail".to_string()));
        }
        inner.stored = StoredLedger {
            history: history.to_vec(),
            remaining: Some(remaining),
        };
        inner.saves += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::ResolvedCountry;
    use chrono::Utc;

    fn temp_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("origin-scan-{}", uuid::Uuid::new_v4()))
            .join("ledger.json")
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let store = JsonFileStore::new(temp_path());
        let stored = store.load().unwrap();
        assert!(stored.history.is_empty());
        assert_eq!(stored.remaining, None);
    }

    #[test]
    fn test_json_store_persists_history_and_quota_together() {
        let path = temp_path();
        let mut store = JsonFileStore::new(&path);
        let item = ScanHistoryItem::new("123", &ResolvedCountry::from_code("US"), Utc::now());

        store.save(std::slice::from_ref(&item), 4).unwrap();

        let reopened = JsonFileStore::new(&path).load().unwrap();
        assert_eq!(reopened.history, vec![item]);
        assert_eq!(reopened.remaining, Some(4));
        assert!(!path.with_extension("json.tmp").exists());

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_corrupt_file_reports_serialization_error() {
        let path = temp_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"not json").unwrap();

        let result = JsonFileStore::new(&path).load();
        assert!(matches!(result, Err(StoreError::Serialization(_))));

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_memory_store_failure_keeps_previous_contents() {
        let mut store = MemoryStore::new();
        store.save(&[], 5).unwrap();
        store.set_failing(true);

        assert!(store.save(&[], 4).is_err());
        assert_eq!(store.contents().remaining, Some(5));
        assert_eq!(store.save_count(), 1);
    }
}
