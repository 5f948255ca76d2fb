//! Cache Entry Module
//!
//! Defines individual cache entries, their validity rule, and the form they
//! take in persistent storage.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// == Cache Entry ==
/// A single cached payload and its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Derived key (base key plus canonical params)
    pub key: String,
    /// The cached payload, opaque to the cache
    pub data: Value,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Time to live in milliseconds
    pub ttl_ms: u64,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates an entry stamped at `now_ms`.
    pub fn new(key: impl Into<String>, data: Value, now_ms: u64, ttl_ms: u64) -> Self {
        Self {
            key: key.into(),
            data,
            created_at: now_ms,
            ttl_ms,
        }
    }

    // == Validity ==
    /// An entry is valid while `now - created_at < ttl`.
    ///
    /// At exactly `ttl` elapsed the entry is already stale. A clock that went
    /// backwards counts as zero elapsed.
    pub fn is_valid_at(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.created_at) < self.ttl_ms
    }

    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        !self.is_valid_at(now_ms)
    }

    // == Time To Live ==
    /// Remaining lifetime in milliseconds, 0 once stale.
    pub fn ttl_remaining_ms(&self, now_ms: u64) -> u64 {
        let expires = self.created_at.saturating_add(self.ttl_ms);
        expires.saturating_sub(now_ms)
    }
}

// == Persisted Entry ==
/// Serialized shape of an entry in the persistent tier:
/// `{ "data": <json>, "timestamp": <epoch-ms>, "ttl": <ms> }`.
///
/// The key is not stored; it is the storage key itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedEntry {
    pub data: Value,
    pub timestamp: u64,
    pub ttl: u64,
}

impl PersistedEntry {
    pub fn into_entry(self, key: impl Into<String>) -> CacheEntry {
        CacheEntry {
            key: key.into(),
            data: self.data,
            created_at: self.timestamp,
            ttl_ms: self.ttl,
        }
    }
}

impl From<&CacheEntry> for PersistedEntry {
    fn from(entry: &CacheEntry) -> Self {
        Self {
            data: entry.data.clone(),
            timestamp: entry.created_at,
            ttl: entry.ttl_ms,
        }
    }
}
