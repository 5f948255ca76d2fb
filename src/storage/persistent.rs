//! Persistent Tier
//!
//! Stores entries as JSON records under namespaced keys of a
//! [`KeyValueBackend`]. Keys outside the namespace belong to other users of
//! the backend and are never touched.

use parking_lot::Mutex;
use tracing::warn;

use super::{KeyValueBackend, StorageTier};
use crate::cache::{CacheEntry, PersistedEntry};
use crate::error::{StorageError, StorageResult};

/// Prefix for every record this tier writes.
pub const NAMESPACE: &str = "cache_";

// == Persistent Tier ==
#[derive(Debug)]
pub struct PersistentTier<B> {
    backend: Mutex<B>,
}

impl<B: KeyValueBackend> PersistentTier<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend: Mutex::new(backend),
        }
    }

    /// Runs `f` against the backend under the tier's lock.
    pub fn with_backend<R>(&self, f: impl FnOnce(&mut B) -> R) -> R {
        let mut backend = self.backend.lock();
        f(&mut *backend)
    }

    /// Reads and decodes one record. A record that fails to decode is
    /// deleted before the error is returned.
    fn read(backend: &mut B, key: &str) -> StorageResult<Option<CacheEntry>> {
        let storage_key = namespaced(key);
        let Some(raw) = backend.get_item(&storage_key)? else {
            return Ok(None);
        };

        match serde_json::from_str::<PersistedEntry>(&raw) {
            Ok(persisted) => Ok(Some(persisted.into_entry(key))),
            Err(err) => {
                if let Err(remove_err) = backend.remove_item(&storage_key) {
                    warn!(%key, error = %remove_err, "failed to delete corrupt record");
                }
                Err(StorageError::Corrupt {
                    key: key.to_string(),
                    reason: err.to_string(),
                })
            }
        }
    }

    fn namespaced_keys(backend: &B) -> StorageResult<Vec<String>> {
        Ok(backend
            .keys()?
            .into_iter()
            .filter_map(|k| k.strip_prefix(NAMESPACE).map(str::to_string))
            .collect())
    }
}

fn namespaced(key: &str) -> String {
    format!("{}{}", NAMESPACE, key)
}

impl<B: KeyValueBackend> StorageTier for PersistentTier<B> {
    fn name(&self) -> &'static str {
        "persistent"
    }

    fn get(&self, key: &str) -> StorageResult<Option<CacheEntry>> {
        Self::read(&mut self.backend.lock(), key)
    }

    fn set(&self, entry: CacheEntry) -> StorageResult<()> {
        let raw = serde_json::to_string(&PersistedEntry::from(&entry))
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        self.backend.lock().set_item(&namespaced(&entry.key), raw)
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        self.backend.lock().remove_item(&namespaced(key))
    }

    fn scan(&self) -> StorageResult<Vec<String>> {
        Self::namespaced_keys(&self.backend.lock())
    }

    fn remove_if_expired(&self, key: &str, now_ms: u64) -> StorageResult<bool> {
        let mut backend = self.backend.lock();
        match Self::read(&mut backend, key) {
            Ok(Some(entry)) if entry.is_expired_at(now_ms) => {
                backend.remove_item(&namespaced(key))
            }
            Ok(_) => Ok(false),
            // `read` already deleted it
            Err(StorageError::Corrupt { .. }) => Ok(true),
            Err(err) => Err(err),
        }
    }

    fn clear(&self) -> StorageResult<usize> {
        let mut backend = self.backend.lock();
        let keys: Vec<String> = Self::namespaced_keys(&backend)?
            .into_iter()
            .map(|key| namespaced(&key))
            .collect();
        backend.remove_items(&keys)
    }

    fn len(&self) -> usize {
        Self::namespaced_keys(&self.backend.lock()).map_or(0, |keys| keys.len())
    }

    /// Collects stale and unreadable records under one lock and removes
    /// them in a single backend mutation.
    fn purge_expired(&self, now_ms: u64) -> StorageResult<usize> {
        let mut backend = self.backend.lock();
        let mut doomed = Vec::new();

        for key in Self::namespaced_keys(&backend)? {
            let storage_key = namespaced(&key);
            let raw = match backend.get_item(&storage_key) {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(err) => {
                    warn!(%key, error = %err, "purge skipped entry");
                    continue;
                }
            };
            let stale = serde_json::from_str::<PersistedEntry>(&raw)
                .map_or(true, |persisted| persisted.into_entry(&key).is_expired_at(now_ms));
            if stale {
                doomed.push(storage_key);
            }
        }

        backend.remove_items(&doomed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FileBackend, InMemoryBackend};
    use serde_json::json;

    fn entry(key: &str, created_at: u64, ttl_ms: u64) -> CacheEntry {
        CacheEntry::new(key, json!({"v": key}), created_at, ttl_ms)
    }

    #[test]
    fn test_records_are_namespaced_json() {
        let tier = PersistentTier::new(InMemoryBackend::new());
        tier.set(entry("weather", 1_000, 500)).unwrap();

        let raw = tier
            .with_backend(|b| b.get_item("cache_weather"))
            .unwrap()
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value, json!({"data": {"v": "weather"}, "timestamp": 1_000, "ttl": 500}));

        assert_eq!(tier.get("weather").unwrap(), Some(entry("weather", 1_000, 500)));
    }

    #[test]
    fn test_corrupt_record_is_deleted() {
        let tier = PersistentTier::new(InMemoryBackend::new());
        tier.with_backend(|b| b.insert_raw("cache_bad", "{truncated"));

        let err = tier.get("bad").unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { ref key, .. } if key == "bad"));
        assert!(tier.get("bad").unwrap().is_none());
    }

    #[test]
    fn test_foreign_keys_are_left_alone() {
        let tier = PersistentTier::new(InMemoryBackend::new());
        tier.with_backend(|b| b.insert_raw("pastpeek_saved_searches", "[]"));
        tier.set(entry("a", 0, 100)).unwrap();

        assert_eq!(tier.scan().unwrap(), vec!["a"]);
        assert_eq!(tier.len(), 1);
        assert_eq!(tier.clear().unwrap(), 1);

        let foreign = tier.with_backend(|b| b.get_item("pastpeek_saved_searches")).unwrap();
        assert_eq!(foreign, Some("[]".to_string()));
    }

    #[test]
    fn test_purge_removes_expired_and_corrupt() {
        let tier = PersistentTier::new(InMemoryBackend::new());
        tier.set(entry("old", 0, 10)).unwrap();
        tier.set(entry("fresh", 0, 10_000)).unwrap();
        tier.with_backend(|b| b.insert_raw("cache_junk", "not json"));

        assert_eq!(tier.purge_expired(100).unwrap(), 2);
        assert_eq!(tier.scan().unwrap(), vec!["fresh"]);
    }

    /// Counts backend mutations.
    #[derive(Default)]
    struct CountingBackend {
        inner: InMemoryBackend,
        single_removals: usize,
        batch_removals: usize,
    }

    impl KeyValueBackend for CountingBackend {
        fn get_item(&self, key: &str) -> StorageResult<Option<String>> {
            self.inner.get_item(key)
        }

        fn set_item(&mut self, key: &str, value: String) -> StorageResult<()> {
            self.inner.set_item(key, value)
        }

        fn remove_item(&mut self, key: &str) -> StorageResult<bool> {
            self.single_removals += 1;
            self.inner.remove_item(key)
        }

        fn keys(&self) -> StorageResult<Vec<String>> {
            self.inner.keys()
        }

        fn remove_items(&mut self, keys: &[String]) -> StorageResult<usize> {
            self.batch_removals += 1;
            self.inner.remove_items(keys)
        }
    }

    #[test]
    fn test_purge_and_clear_remove_in_one_batch() {
        let tier = PersistentTier::new(CountingBackend::default());
        for i in 0..10 {
            tier.set(entry(&format!("old{}", i), 0, 10)).unwrap();
        }
        tier.set(entry("fresh", 0, 10_000)).unwrap();
        tier.with_backend(|b| b.inner.insert_raw("cache_junk", "not json"));

        assert_eq!(tier.purge_expired(100).unwrap(), 11);
        assert_eq!(tier.with_backend(|b| (b.single_removals, b.batch_removals)), (0, 1));

        assert_eq!(tier.clear().unwrap(), 1);
        assert_eq!(tier.with_backend(|b| (b.single_removals, b.batch_removals)), (0, 2));
        assert!(tier.is_empty());
    }

    #[test]
    fn test_file_backed_purge_writes_once() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path().join("store.json"), None).unwrap();
        let tier = PersistentTier::new(backend);
        for i in 0..20 {
            tier.set(entry(&format!("k{}", i), 0, 10)).unwrap();
        }
        let before = tier.with_backend(|b| b.writes());

        assert_eq!(tier.purge_expired(100).unwrap(), 20);
        assert_eq!(tier.with_backend(|b| b.writes()), before + 1);
    }

    #[test]
    fn test_quota_failure_surfaces() {
        let tier = PersistentTier::new(InMemoryBackend::with_quota(16));
        let err = tier.set(entry("big", 0, 100)).unwrap_err();
        assert!(matches!(err, StorageError::QuotaExceeded { .. }));
        assert!(tier.is_empty());
    }
}
