//! Tiered Cache Module
//!
//! Memory tier in front of a persistent tier, with per-entry TTL and a
//! single-flight get-or-fetch.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{derive_key, CacheEntry, CacheStats, Clock, Params, StatsSnapshot, SystemClock};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result, StorageError};
use crate::storage::{InMemoryBackend, MemoryTier, PersistentTier, StorageTier};

/// A producer run shared by every caller waiting on the same key.
type Flight = Shared<BoxFuture<'static, Result<Value>>>;

// == Set Outcome ==
/// What a `set` managed to store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetOutcome {
    /// Written to both tiers
    Stored,
    /// Written to memory only; the persistent write failed
    MemoryOnly(StorageError),
    /// Nothing written; the value could not be encoded
    NotStored(StorageError),
}

impl SetOutcome {
    pub fn is_persisted(&self) -> bool {
        matches!(self, SetOutcome::Stored)
    }

    pub fn is_cached(&self) -> bool {
        !matches!(self, SetOutcome::NotStored(_))
    }
}

// == Sweep Report ==
/// Result of one cleanup pass over both tiers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub memory_removed: usize,
    pub persisted_removed: usize,
    /// Set when the persistent tier could not be scanned
    pub storage_error: Option<StorageError>,
}

impl SweepReport {
    pub fn total_removed(&self) -> usize {
        self.memory_removed + self.persisted_removed
    }
}

struct Inner {
    config: CacheConfig,
    memory: MemoryTier,
    persistent: Box<dyn StorageTier>,
    clock: Arc<dyn Clock>,
    stats: Mutex<CacheStats>,
    in_flight: Mutex<HashMap<String, Flight>>,
    cleanup_task: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(handle) = self.cleanup_task.get_mut().take() {
            handle.abort();
        }
    }
}

// == Tiered Cache ==
/// Handle to a two-tier cache. Clones share the same cache.
///
/// Construct one at startup and hand clones to every fetching function; call
/// [`shutdown`](Self::shutdown) to stop the background sweep.
#[derive(Clone)]
pub struct TieredCache {
    inner: Arc<Inner>,
}

/// Non-owning handle, used by the background sweep.
#[derive(Clone)]
pub struct WeakTieredCache {
    inner: Weak<Inner>,
}

impl WeakTieredCache {
    pub fn upgrade(&self) -> Option<TieredCache> {
        self.inner.upgrade().map(|inner| TieredCache { inner })
    }
}

impl std::fmt::Debug for TieredCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredCache")
            .field("config", &self.inner.config)
            .field("memory_entries", &self.inner.memory.len())
            .field("persistent", &self.inner.persistent.name())
            .finish()
    }
}

impl TieredCache {
    // == Constructors ==
    /// Creates a cache over `persistent` using wall-clock time.
    pub fn new(config: CacheConfig, persistent: impl StorageTier + 'static) -> Self {
        Self::with_clock(config, persistent, SystemClock)
    }

    /// Creates a cache with a custom clock (useful for testing).
    pub fn with_clock(
        config: CacheConfig,
        persistent: impl StorageTier + 'static,
        clock: impl Clock + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                memory: MemoryTier::new(),
                persistent: Box::new(persistent),
                clock: Arc::new(clock),
                stats: Mutex::new(CacheStats::new()),
                in_flight: Mutex::new(HashMap::new()),
                cleanup_task: Mutex::new(None),
            }),
        }
    }

    /// Creates a cache whose persistent tier lives in process memory.
    pub fn in_memory(config: CacheConfig) -> Self {
        Self::new(config, PersistentTier::new(InMemoryBackend::new()))
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    pub fn downgrade(&self) -> WeakTieredCache {
        WeakTieredCache {
            inner: Arc::downgrade(&self.inner),
        }
    }

    // == Get ==
    /// Looks up the memory tier only.
    ///
    /// A stale entry is removed and reported as absent.
    pub fn get<T: DeserializeOwned>(&self, base_key: &str, params: &Params) -> Option<T> {
        let key = derive_key(base_key, params);
        let value = self.inner.memory_lookup(&key)?;
        decode(&key, value)
    }

    // == Get Persisted ==
    /// Looks up the persistent tier only. Storage failures read as a miss.
    pub fn get_persisted<T: DeserializeOwned>(&self, base_key: &str, params: &Params) -> Option<T> {
        match self.try_get_persisted(base_key, params) {
            Ok(found) => found,
            Err(err) => {
                warn!(base_key, error = %err, "persistent read failed, treating as miss");
                None
            }
        }
    }

    /// Like [`get_persisted`](Self::get_persisted) but reports storage failures.
    pub fn try_get_persisted<T: DeserializeOwned>(
        &self,
        base_key: &str,
        params: &Params,
    ) -> std::result::Result<Option<T>, StorageError> {
        let key = derive_key(base_key, params);
        Ok(self
            .inner
            .persisted_lookup(&key)?
            .and_then(|value| decode(&key, value)))
    }

    // == Set ==
    /// Stores `data` in both tiers, timestamped now.
    ///
    /// `ttl` of `None` (or zero) uses the configured default.
    pub fn set<T: Serialize + ?Sized>(
        &self,
        base_key: &str,
        data: &T,
        params: &Params,
        ttl: Option<Duration>,
    ) -> SetOutcome {
        let key = derive_key(base_key, params);
        match serde_json::to_value(data) {
            Ok(value) => self.inner.store(&key, value, ttl),
            Err(err) => {
                let err = StorageError::Serialization(err.to_string());
                warn!(%key, error = %err, "value not cacheable");
                self.inner.stats.lock().record_storage_failure();
                SetOutcome::NotStored(err)
            }
        }
    }

    // == Get Or Fetch ==
    /// Returns the cached value, or runs `producer` and caches its result.
    ///
    /// Lookup order is memory, then persistent (a hit there is promoted into
    /// memory), then the producer. Concurrent callers missing on the same key
    /// share one producer run and all settle with its outcome. A failed run
    /// caches nothing and surfaces as [`CacheError::Upstream`].
    ///
    /// The producer's future runs on a spawned task, so this must be called
    /// from within a Tokio runtime. Dropping the returned future does not
    /// cancel the fetch; its result is still cached.
    pub async fn get_or_fetch<T, F, Fut, E>(
        &self,
        base_key: &str,
        params: &Params,
        ttl: Option<Duration>,
        producer: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        E: Into<Box<dyn StdError + Send + Sync + 'static>> + Send + 'static,
    {
        let key = derive_key(base_key, params);

        if let Some(value) = self.inner.memory_lookup(&key) {
            if let Some(data) = decode(&key, value) {
                return Ok(data);
            }
        }

        match self.inner.persisted_lookup(&key) {
            Ok(Some(value)) => {
                if let Some(data) = decode::<T>(&key, value.clone()) {
                    debug!(%key, "promoting persisted entry to memory");
                    let _ = self.inner.store(&key, value, ttl);
                    return Ok(data);
                }
            }
            Ok(None) => {}
            Err(err) => warn!(%key, error = %err, "persistent read failed, fetching fresh"),
        }

        let flight = self.inner.join_or_start(&key, ttl, producer);
        let value = flight.await?;
        serde_json::from_value(value).map_err(|err| CacheError::Serialization {
            key,
            reason: err.to_string(),
        })
    }

    // == Invalidate ==
    /// Removes the entry from both tiers regardless of validity.
    ///
    /// Returns whether either tier held it.
    pub fn invalidate(&self, base_key: &str, params: &Params) -> bool {
        let key = derive_key(base_key, params);
        let in_memory = self.inner.memory.remove(&key);
        let persisted = match self.inner.persistent.delete(&key) {
            Ok(found) => found,
            Err(err) => {
                self.inner.storage_failure(&key, &err);
                false
            }
        };
        debug!(%key, "cache INVALIDATED");
        in_memory || persisted
    }

    // == Clear ==
    /// Removes every entry from both tiers, returning how many were removed.
    pub fn clear(&self) -> usize {
        let mut removed = self.inner.memory.remove_all();
        match self.inner.persistent.clear() {
            Ok(count) => removed += count,
            Err(err) => self.inner.storage_failure("*", &err),
        }
        info!(removed, "cache cleared");
        removed
    }

    // == Cleanup Expired ==
    /// Removes stale entries from both tiers.
    pub fn cleanup_expired(&self) -> SweepReport {
        self.inner.sweep()
    }

    // == Stats ==
    /// Returns a point-in-time view of the cache. No side effects.
    pub fn stats(&self) -> StatsSnapshot {
        let counters = self.inner.stats.lock().clone();
        StatsSnapshot {
            memory_entries: self.inner.memory.len(),
            persisted_entries: self.inner.persistent.len(),
            in_flight: self.inner.in_flight.lock().len(),
            hit_rate: counters.hit_rate(),
            counters,
            config: self.inner.config.clone(),
        }
    }

    // == Lifecycle ==
    /// Starts the periodic sweep. Returns false if it is already running.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_cleanup(&self) -> bool {
        let mut slot = self.inner.cleanup_task.lock();
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return false;
        }
        *slot = Some(crate::tasks::spawn_cleanup_task(
            self.downgrade(),
            self.inner.config.cleanup_interval,
        ));
        true
    }

    pub fn is_cleanup_running(&self) -> bool {
        self.inner
            .cleanup_task
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stops the periodic sweep. Cached entries are kept.
    pub fn shutdown(&self) {
        if let Some(handle) = self.inner.cleanup_task.lock().take() {
            handle.abort();
            info!("cache cleanup task stopped");
        }
    }
}

impl Inner {
    fn now(&self) -> u64 {
        self.clock.now_ms()
    }

    fn effective_ttl_ms(&self, ttl: Option<Duration>) -> u64 {
        ttl.filter(|ttl| !ttl.is_zero())
            .unwrap_or(self.config.default_ttl)
            .as_millis() as u64
    }

    fn storage_failure(&self, key: &str, err: &StorageError) {
        self.stats.lock().record_storage_failure();
        warn!(%key, error = %err, "persistent tier failure absorbed");
    }

    fn memory_lookup(&self, key: &str) -> Option<Value> {
        let now = self.now();
        match self.memory.entry(key) {
            Some(entry) if entry.is_valid_at(now) => {
                self.stats.lock().record_memory_hit();
                debug!(%key, "cache HIT");
                Some(entry.data)
            }
            Some(_) => {
                let removed = self.memory.remove_if_stale(key, now);
                let mut stats = self.stats.lock();
                stats.record_expirations(usize::from(removed));
                stats.record_miss();
                debug!(%key, "cache EXPIRED");
                None
            }
            None => {
                self.stats.lock().record_miss();
                None
            }
        }
    }

    fn persisted_lookup(&self, key: &str) -> std::result::Result<Option<Value>, StorageError> {
        let now = self.now();
        let found = self.persistent.get(key).map_err(|err| {
            self.storage_failure(key, &err);
            err
        })?;

        match found {
            Some(entry) if entry.is_valid_at(now) => {
                self.stats.lock().record_persisted_hit();
                debug!(%key, "persistent HIT");
                Ok(Some(entry.data))
            }
            Some(_) => {
                let removed = match self.persistent.remove_if_expired(key, now) {
                    Ok(removed) => removed,
                    Err(err) => {
                        self.storage_failure(key, &err);
                        false
                    }
                };
                let mut stats = self.stats.lock();
                stats.record_expirations(usize::from(removed));
                stats.record_miss();
                debug!(%key, "persistent EXPIRED");
                Ok(None)
            }
            None => {
                self.stats.lock().record_miss();
                Ok(None)
            }
        }
    }

    fn store(&self, key: &str, value: Value, ttl: Option<Duration>) -> SetOutcome {
        let entry = CacheEntry::new(key, value, self.now(), self.effective_ttl_ms(ttl));

        self.make_room(key);
        self.memory.insert(entry.clone());

        match self.persistent.set(entry) {
            Ok(()) => {
                debug!(%key, "cache SET");
                SetOutcome::Stored
            }
            Err(err) => {
                self.storage_failure(key, &err);
                SetOutcome::MemoryOnly(err)
            }
        }
    }

    /// Frees a memory slot for a new key: sweep first, then drop the
    /// oldest-written entries until under the cap.
    fn make_room(&self, key: &str) {
        let max = self.config.max_entries.max(1);
        if self.memory.contains(key) || self.memory.len() < max {
            return;
        }

        let report = self.sweep();
        debug!(removed = report.total_removed(), "capacity sweep");

        while self.memory.len() >= max {
            match self.memory.evict_oldest() {
                Some(evicted) => {
                    self.stats.lock().record_eviction();
                    debug!(key = %evicted, "evicted oldest entry");
                }
                None => break,
            }
        }
    }

    fn sweep(&self) -> SweepReport {
        let now = self.now();
        let memory_removed = self.memory.purge_stale(now);

        let (persisted_removed, storage_error) = match self.persistent.purge_expired(now) {
            Ok(count) => (count, None),
            Err(err) => {
                self.storage_failure("*", &err);
                (0, Some(err))
            }
        };

        let report = SweepReport {
            memory_removed,
            persisted_removed,
            storage_error,
        };
        self.stats.lock().record_expirations(report.total_removed());
        report
    }

    fn joinable(&self, key: &str) -> Option<Flight> {
        let flight = self.in_flight.lock().get(key).cloned()?;
        self.stats.lock().record_join();
        debug!(%key, "joining in-flight fetch");
        Some(flight)
    }

    /// Returns the running flight for `key`, or starts one with `producer`.
    ///
    /// The producer is invoked without any cache lock held. Its future runs
    /// on its own task, so the result is stored and the in-flight slot freed
    /// even when every caller stops waiting.
    fn join_or_start<T, F, Fut, E>(
        self: &Arc<Self>,
        key: &str,
        ttl: Option<Duration>,
        producer: F,
    ) -> Flight
    where
        T: Serialize + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        E: Into<Box<dyn StdError + Send + Sync + 'static>> + Send + 'static,
    {
        if let Some(flight) = self.joinable(key) {
            return flight;
        }

        let fetch = producer();

        let mut in_flight = self.in_flight.lock();
        if let Some(flight) = in_flight.get(key) {
            // Another caller registered first; ours is dropped unpolled.
            self.stats.lock().record_join();
            debug!(%key, "joining in-flight fetch");
            return flight.clone();
        }

        debug!(%key, "cache MISS, fetching fresh data");
        self.stats.lock().record_fetch();

        let slot = FlightSlot {
            inner: Arc::clone(self),
            key: key.to_string(),
        };
        let task = tokio::spawn(async move {
            let outcome = match fetch.await {
                Ok(data) => serde_json::to_value(&data).map_err(|err| CacheError::Serialization {
                    key: slot.key.clone(),
                    reason: err.to_string(),
                }),
                Err(err) => Err(CacheError::upstream(slot.key.clone(), err)),
            };

            match &outcome {
                Ok(value) => {
                    let _ = slot.inner.store(&slot.key, value.clone(), ttl);
                }
                Err(err) => {
                    slot.inner.stats.lock().record_fetch_failure();
                    warn!(key = %slot.key, error = %err, "fetch failed, nothing cached");
                }
            }

            drop(slot);
            outcome
        });

        let owned_key = key.to_string();
        let flight = async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(err) => Err(CacheError::upstream(owned_key, err)),
            }
        }
        .boxed()
        .shared();

        in_flight.insert(key.to_string(), flight.clone());
        flight
    }
}

/// Frees a key's in-flight slot when its fetch task ends, including by
/// panic or abort.
struct FlightSlot {
    inner: Arc<Inner>,
    key: String,
}

impl Drop for FlightSlot {
    fn drop(&mut self) {
        self.inner.in_flight.lock().remove(&self.key);
    }
}

fn decode<T: DeserializeOwned>(key: &str, value: Value) -> Option<T> {
    match serde_json::from_value(value) {
        Ok(data) => Some(data),
        Err(err) => {
            warn!(%key, error = %err, "cached value has an unexpected shape");
            None
        }
    }
}
