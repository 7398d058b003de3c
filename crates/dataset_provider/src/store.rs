use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use core_types::{DurableStore, StorageError, StoredDataset};
use infra_clock::Clock;
use parking_lot::Mutex;

/// Single JSON file holding the last installed dataset and its expiry.
pub struct FileStore {
    path: PathBuf,
    clock: Arc<dyn Clock>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            path: path.into(),
            clock,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_atomic(&self, entry: &StoredDataset) -> Result<(), StorageError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let payload = serde_json::to_vec(entry)?;

        {
            let mut file = File::create(&tmp)?;
            file.write_all(&payload)?;
            file.sync_all()?;
        }

        if let Err(err) = fs::rename(&tmp, &self.path) {
            if self.path.exists() {
                let _ = fs::remove_file(&self.path);
                fs::rename(&tmp, &self.path)?;
            } else {
                return Err(err.into());
            }
        }
        Ok(())
    }

    fn read(&self) -> Result<Option<StoredDataset>, StorageError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == "null" || trimmed == "undefined" {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(trimmed)?))
    }
}

impl DurableStore for FileStore {
    fn save(&self, entry: &StoredDataset) -> bool {
        match self.write_atomic(entry) {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), range = %entry.range, "dataset persisted");
                true
            }
            Err(err) => {
                tracing::warn!(?err, path = %self.path.display(), "dataset persist failed");
                false
            }
        }
    }

    fn load(&self) -> Option<StoredDataset> {
        let entry = match self.read() {
            Ok(entry) => entry?,
            Err(err) => {
                tracing::warn!(?err, path = %self.path.display(), "dataset store unreadable");
                return None;
            }
        };
        if self.clock.now_ms() >= entry.expires_at_ms {
            tracing::info!(range = %entry.range, "stored dataset expired");
            self.clear();
            return None;
        }
        Some(entry)
    }

    fn clear(&self) {
        if let Err(err) = fs::remove_file(&self.path) {
            if err.kind() != ErrorKind::NotFound {
                tracing::warn!(?err, path = %self.path.display(), "dataset store clear failed");
            }
        }
    }
}

/// In-process store, for tests and for running without a writable disk.
pub struct MemoryStore {
    slot: Mutex<Option<StoredDataset>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            slot: Mutex::new(None),
            clock,
        }
    }
}

impl DurableStore for MemoryStore {
    fn save(&self, entry: &StoredDataset) -> bool {
        *self.slot.lock() = Some(entry.clone());
        true
    }

    fn load(&self) -> Option<StoredDataset> {
        let mut slot = self.slot.lock();
        if slot
            .as_ref()
            .is_some_and(|e| self.clock.now_ms() >= e.expires_at_ms)
        {
            *slot = None;
        }
        slot.clone()
    }

    fn clear(&self) {
        *self.slot.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use core_types::{Dataset, RangeKey};
    use infra_clock::ManualClock;

    use super::*;

    fn entry(expires_at_ms: i64) -> StoredDataset {
        StoredDataset {
            range: RangeKey::new("2024-10-01", "2024-10-31"),
            dataset: Dataset::from_json_str(r#"{"accountCost":{"clicks":5}}"#).expect("dataset"),
            fetched_at_ms: 0,
            expires_at_ms,
        }
    }

    #[test]
    fn file_store_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let clock = Arc::new(ManualClock::at(10));
        let store = FileStore::new(dir.path().join("nested/cache.json"), clock);
        assert!(store.load().is_none());
        assert!(store.save(&entry(1_000)));
        assert_eq!(store.load(), Some(entry(1_000)));
    }

    #[test]
    fn file_store_drops_expired_entry() {
        let dir = tempfile::tempdir().expect("tempdir");
        let clock = Arc::new(ManualClock::at(10));
        let store = FileStore::new(dir.path().join("cache.json"), clock.clone());
        assert!(store.save(&entry(100)));
        clock.advance(Duration::from_millis(200));
        assert!(store.load().is_none());
        assert!(!store.path().exists());
    }

    #[test]
    fn file_store_treats_blank_null_and_garbage_as_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cache.json");
        let store = FileStore::new(&path, Arc::new(ManualClock::at(0)));
        for raw in ["", "  \n", "null", "undefined", "{not json", r#"{"range":1}"#] {
            fs::write(&path, raw).expect("write");
            assert!(store.load().is_none(), "{raw:?}");
        }
    }

    #[test]
    fn file_store_clear_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::new(dir.path().join("cache.json"), Arc::new(ManualClock::at(0)));
        assert!(store.save(&entry(50)));
        store.clear();
        store.clear();
        assert!(store.load().is_none());
    }

    #[test]
    fn memory_store_honours_expiry() {
        let clock = Arc::new(ManualClock::at(0));
        let store = MemoryStore::new(clock.clone());
        assert!(store.save(&entry(5)));
        assert!(store.load().is_some());
        clock.advance(Duration::from_millis(5));
        assert!(store.load().is_none());
    }
}
