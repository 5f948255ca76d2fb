//! Key/Value Backends
//!
//! String key/value stores underneath [`PersistentTier`](super::PersistentTier),
//! shaped like browser local storage: flat string keys, string values, an
//! optional byte quota.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{StorageError, StorageResult};

// == Key Value Backend ==
/// Flat string store. Mutations take `&mut self`; the owning tier locks.
pub trait KeyValueBackend: Send {
    fn get_item(&self, key: &str) -> StorageResult<Option<String>>;
    fn set_item(&mut self, key: &str, value: String) -> StorageResult<()>;
    fn remove_item(&mut self, key: &str) -> StorageResult<bool>;
    fn keys(&self) -> StorageResult<Vec<String>>;

    /// Removes several keys as one mutation, returning how many existed.
    fn remove_items(&mut self, keys: &[String]) -> StorageResult<usize> {
        let mut removed = 0;
        for key in keys {
            if self.remove_item(key)? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

// == Shared Backend ==
/// One backend used by several stores, such as the persistent cache tier and
/// the activity log writing to the same file.
pub type SharedBackend = Arc<Mutex<dyn KeyValueBackend>>;

pub fn shared(backend: impl KeyValueBackend + 'static) -> SharedBackend {
    Arc::new(Mutex::new(backend))
}

impl<B: KeyValueBackend + ?Sized> KeyValueBackend for Arc<Mutex<B>> {
    fn get_item(&self, key: &str) -> StorageResult<Option<String>> {
        self.lock().get_item(key)
    }

    fn set_item(&mut self, key: &str, value: String) -> StorageResult<()> {
        self.lock().set_item(key, value)
    }

    fn remove_item(&mut self, key: &str) -> StorageResult<bool> {
        self.lock().remove_item(key)
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        self.lock().keys()
    }

    fn remove_items(&mut self, keys: &[String]) -> StorageResult<usize> {
        self.lock().remove_items(keys)
    }
}

// == In-Memory Backend ==
/// Volatile backend with an optional quota counted as key + value bytes.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    items: BTreeMap<String, String>,
    quota: Option<usize>,
    used: usize,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota: usize) -> Self {
        Self {
            quota: Some(quota),
            ..Self::default()
        }
    }

    fn from_items(items: BTreeMap<String, String>, quota: Option<usize>) -> Self {
        let used = items.iter().map(|(k, v)| k.len() + v.len()).sum();
        Self { items, quota, used }
    }

    /// Bytes currently counted against the quota.
    pub fn used_bytes(&self) -> usize {
        self.used
    }

    /// Stores a raw value, bypassing any encoding. Lets tests plant damaged records.
    pub fn insert_raw(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        let old = self.items.get(&key).map_or(0, |v| key.len() + v.len());
        self.used = self.used - old + key.len() + value.len();
        self.items.insert(key, value);
    }
}

impl KeyValueBackend for InMemoryBackend {
    fn get_item(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.items.get(key).cloned())
    }

    fn set_item(&mut self, key: &str, value: String) -> StorageResult<()> {
        let old = self.items.get(key).map_or(0, |v| key.len() + v.len());
        let needed = self.used - old + key.len() + value.len();

        if let Some(quota) = self.quota {
            if needed > quota {
                return Err(StorageError::QuotaExceeded { needed, quota });
            }
        }

        self.items.insert(key.to_string(), value);
        self.used = needed;
        Ok(())
    }

    fn remove_item(&mut self, key: &str) -> StorageResult<bool> {
        match self.items.remove(key) {
            Some(value) => {
                self.used -= key.len() + value.len();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.items.keys().cloned().collect())
    }
}

// == File Backend ==
/// Backend persisted as one JSON object on disk.
///
/// Every mutation rewrites the file through a temporary sibling and a rename,
/// so a crash leaves either the old or the new document. A mutation whose
/// write fails is rolled back in memory.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    inner: InMemoryBackend,
    writes: usize,
}

impl FileBackend {
    /// Opens (or starts) the store at `path`.
    ///
    /// An unreadable document is logged and replaced by an empty store.
    pub fn open(path: impl AsRef<Path>, quota: Option<usize>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();

        let items = match fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<BTreeMap<String, String>>(&text) {
                Ok(items) => items,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "discarding unreadable storage file");
                    BTreeMap::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(err.into()),
        };

        debug!(path = %path.display(), records = items.len(), "opened file storage");
        Ok(Self {
            path,
            inner: InMemoryBackend::from_items(items, quota),
            writes: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Document writes completed since the store was opened.
    pub fn writes(&self) -> usize {
        self.writes
    }

    fn flush(&mut self) -> StorageResult<()> {
        let text = serde_json::to_string(&self.inner.items)
            .map_err(|err| StorageError::Serialization(err.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, text)?;
        fs::rename(&tmp, &self.path)?;
        self.writes += 1;
        Ok(())
    }
}

impl KeyValueBackend for FileBackend {
    fn get_item(&self, key: &str) -> StorageResult<Option<String>> {
        self.inner.get_item(key)
    }

    fn set_item(&mut self, key: &str, value: String) -> StorageResult<()> {
        let previous = self.inner.get_item(key)?;
        self.inner.set_item(key, value)?;

        if let Err(err) = self.flush() {
            match previous {
                Some(old) => self.inner.insert_raw(key, old),
                None => {
                    self.inner.remove_item(key)?;
                }
            }
            return Err(err);
        }
        Ok(())
    }

    fn remove_item(&mut self, key: &str) -> StorageResult<bool> {
        let Some(previous) = self.inner.get_item(key)? else {
            return Ok(false);
        };
        self.inner.remove_item(key)?;

        if let Err(err) = self.flush() {
            self.inner.insert_raw(key, previous);
            return Err(err);
        }
        Ok(true)
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        self.inner.keys()
    }

    fn remove_items(&mut self, keys: &[String]) -> StorageResult<usize> {
        let mut removed = Vec::new();
        for key in keys {
            if let Some(previous) = self.inner.get_item(key)? {
                self.inner.remove_item(key)?;
                removed.push((key, previous));
            }
        }
        if removed.is_empty() {
            return Ok(0);
        }

        if let Err(err) = self.flush() {
            for (key, previous) in removed {
                self.inner.insert_raw(key.as_str(), previous);
            }
            return Err(err);
        }
        Ok(removed.len())
    }
}
