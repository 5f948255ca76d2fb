//! Memory Tier
//!
//! HashMap storage plus write-order tracking for capacity eviction.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::StorageTier;
use crate::cache::{CacheEntry, InsertionOrder};
use crate::error::StorageResult;

#[derive(Debug, Default)]
struct MemoryState {
    entries: HashMap<String, CacheEntry>,
    order: InsertionOrder,
}

// == Memory Tier ==
/// In-process tier. Never fails.
#[derive(Debug, Default)]
pub struct MemoryTier {
    state: Mutex<MemoryState>,
}

impl MemoryTier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(&self, key: &str) -> Option<CacheEntry> {
        self.state.lock().entries.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.state.lock().entries.contains_key(key)
    }

    pub fn insert(&self, entry: CacheEntry) {
        let mut state = self.state.lock();
        state.order.record_write(&entry.key);
        state.entries.insert(entry.key.clone(), entry);
    }

    pub fn remove(&self, key: &str) -> bool {
        let mut state = self.state.lock();
        state.order.remove(key);
        state.entries.remove(key).is_some()
    }

    /// Removes `key` if it is stale at `now_ms`, checked under the lock.
    pub fn remove_if_stale(&self, key: &str, now_ms: u64) -> bool {
        let mut state = self.state.lock();
        let stale = state
            .entries
            .get(key)
            .is_some_and(|entry| entry.is_expired_at(now_ms));
        if stale {
            state.entries.remove(key);
            state.order.remove(key);
        }
        stale
    }

    /// Removes every entry stale at `now_ms` in one pass.
    pub fn purge_stale(&self, now_ms: u64) -> usize {
        let mut state = self.state.lock();
        let expired: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now_ms))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            state.entries.remove(key);
            state.order.remove(key);
        }
        expired.len()
    }

    pub fn remove_all(&self) -> usize {
        let mut state = self.state.lock();
        let count = state.entries.len();
        state.entries.clear();
        state.order.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // == Evict Oldest ==
    /// Removes the entry written longest ago, returning its key.
    pub fn evict_oldest(&self) -> Option<String> {
        let mut state = self.state.lock();
        let key = state.order.pop_oldest()?;
        state.entries.remove(&key);
        Some(key)
    }
}

impl StorageTier for MemoryTier {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn get(&self, key: &str) -> StorageResult<Option<CacheEntry>> {
        Ok(self.entry(key))
    }

    fn set(&self, entry: CacheEntry) -> StorageResult<()> {
        self.insert(entry);
        Ok(())
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        Ok(self.remove(key))
    }

    fn scan(&self) -> StorageResult<Vec<String>> {
        Ok(self.state.lock().entries.keys().cloned().collect())
    }

    fn remove_if_expired(&self, key: &str, now_ms: u64) -> StorageResult<bool> {
        Ok(self.remove_if_stale(key, now_ms))
    }

    fn clear(&self) -> StorageResult<usize> {
        Ok(self.remove_all())
    }

    fn len(&self) -> usize {
        MemoryTier::len(self)
    }

    fn purge_expired(&self, now_ms: u64) -> StorageResult<usize> {
        Ok(self.purge_stale(now_ms))
    }
}
