//! Storage Tier Module
//!
//! The capability set every cache tier provides, and its implementations:
//! - [`MemoryTier`]: process-local map owned by one cache
//! - [`PersistentTier`]: JSON records over a string key/value backend
//!   ([`InMemoryBackend`] or [`FileBackend`], optionally behind a
//!   [`SharedBackend`] handle)

mod backend;
mod memory;
mod persistent;

pub use backend::{shared, FileBackend, InMemoryBackend, KeyValueBackend, SharedBackend};
pub use memory::MemoryTier;
pub use persistent::{PersistentTier, NAMESPACE};

use tracing::warn;

use crate::cache::CacheEntry;
use crate::error::StorageResult;

// == Storage Tier ==
/// One storage backend of the tiered cache.
///
/// Tiers store entries as given and never judge validity on `get`; the cache
/// decides what is stale. Every method takes `&self` and synchronizes
/// internally.
pub trait StorageTier: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn get(&self, key: &str) -> StorageResult<Option<CacheEntry>>;

    /// Inserts or replaces the entry under `entry.key`.
    fn set(&self, entry: CacheEntry) -> StorageResult<()>;

    /// Removes `key`, returning whether anything was there.
    fn delete(&self, key: &str) -> StorageResult<bool>;

    /// Lists every key currently stored.
    fn scan(&self) -> StorageResult<Vec<String>>;

    /// Removes `key` only if its entry is stale at `now_ms` or unreadable.
    ///
    /// The check and the removal happen under the tier's lock, so an entry
    /// refreshed concurrently is left alone.
    fn remove_if_expired(&self, key: &str, now_ms: u64) -> StorageResult<bool>;

    /// Removes every entry, returning how many were removed.
    fn clear(&self) -> StorageResult<usize>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes all entries stale at `now_ms`.
    ///
    /// A failure on one key is logged and skipped; only a failed scan
    /// aborts the pass.
    fn purge_expired(&self, now_ms: u64) -> StorageResult<usize> {
        let mut removed = 0;
        for key in self.scan()? {
            match self.remove_if_expired(&key, now_ms) {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(err) => warn!(tier = self.name(), %key, error = %err, "purge skipped entry"),
            }
        }
        Ok(removed)
    }
}
