//! Cache Statistics Module
//!
//! Diagnostic counters for the tiered cache.

use serde::Serialize;

use crate::config::CacheConfig;

// == Cache Stats ==
/// Running counters, updated by the cache under its stats lock.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct CacheStats {
    /// Valid entries served from the memory tier
    pub memory_hits: u64,
    /// Valid entries served from the persistent tier (and promoted)
    pub persisted_hits: u64,
    /// Lookups that found nothing valid in the tier consulted
    pub misses: u64,
    /// Stale entries removed on read or by a sweep
    pub expirations: u64,
    /// Producer invocations started by `get_or_fetch`
    pub fetches: u64,
    /// Producer invocations that failed
    pub fetch_failures: u64,
    /// Callers that joined an already running fetch
    pub joined_fetches: u64,
    /// Live entries dropped because the memory tier was full
    pub evictions: u64,
    /// Absorbed storage tier failures
    pub storage_failures: u64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Returns hits / (hits + misses) over both tiers, or 0.0 before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.memory_hits + self.persisted_hits;
        let total = hits + self.misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    pub fn record_memory_hit(&mut self) {
        self.memory_hits += 1;
    }

    pub fn record_persisted_hit(&mut self) {
        self.persisted_hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_expirations(&mut self, count: usize) {
        self.expirations += count as u64;
    }

    pub fn record_fetch(&mut self) {
        self.fetches += 1;
    }

    pub fn record_fetch_failure(&mut self) {
        self.fetch_failures += 1;
    }

    pub fn record_join(&mut self) {
        self.joined_fetches += 1;
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    pub fn record_storage_failure(&mut self) {
        self.storage_failures += 1;
    }
}

// == Stats Snapshot ==
/// Point-in-time view returned by `TieredCache::stats`.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub memory_entries: usize,
    pub persisted_entries: usize,
    pub in_flight: usize,
    pub hit_rate: f64,
    #[serde(flatten)]
    pub counters: CacheStats,
    pub config: CacheConfig,
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let stats = CacheStats::new();
        assert_eq!(stats.memory_hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.evictions, 0);
    }

    #[test]
    fn test_hit_rate_no_requests() {
        assert_eq!(CacheStats::new().hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate_counts_both_tiers() {
        let mut stats = CacheStats::new();
        stats.record_memory_hit();
        stats.record_persisted_hit();
        stats.record_miss();
        stats.record_miss();
        assert_eq!(stats.hit_rate(), 0.5);
    }

    #[test]
    fn test_fetch_counters() {
        let mut stats = CacheStats::new();
        stats.record_fetch();
        stats.record_fetch();
        stats.record_fetch_failure();
        stats.record_join();

        assert_eq!(stats.fetches, 2);
        assert_eq!(stats.fetch_failures, 1);
        assert_eq!(stats.joined_fetches, 1);
    }

    #[test]
    fn test_record_expirations_accumulates() {
        let mut stats = CacheStats::new();
        stats.record_expirations(3);
        stats.record_expirations(0);
        stats.record_expirations(2);
        assert_eq!(stats.expirations, 5);
    }
}
