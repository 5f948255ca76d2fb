//! API Handlers
//!
//! HTTP request handlers for each cache service endpoint.

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde_json::Value;
use tracing::info;

use crate::activity::{ActivityStore, NewSearch, SavedSearch, UsageEvent};
use crate::cache::{derive_key, Params, SetOutcome, StatsSnapshot, TieredCache};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::models::{
    params_from_query, validate_base_key, ClearResponse, DeleteResponse, EntryResponse,
    EntrySource, FetchRequest, FetchResponse, HealthResponse, PutEntryRequest, SetResponse,
    TrackUsageRequest, TrackUsageResponse,
};
use crate::storage::{shared, FileBackend, InMemoryBackend, PersistentTier, SharedBackend};
use crate::upstream::HttpFetcher;

/// Application state shared across all handlers.
///
/// Every field is a cheap handle; cloning the state shares the cache.
#[derive(Debug, Clone)]
pub struct AppState {
    pub cache: TieredCache,
    pub fetcher: HttpFetcher,
    pub activity: ActivityStore,
}

impl AppState {
    /// State with an activity store of its own, held in process memory.
    pub fn new(cache: TieredCache, fetcher: HttpFetcher) -> Self {
        Self {
            cache,
            fetcher,
            activity: ActivityStore::default(),
        }
    }

    pub fn with_activity(mut self, activity: ActivityStore) -> Self {
        self.activity = activity;
        self
    }

    /// Creates a new AppState from configuration.
    ///
    /// The persistent tier and the activity store share one backend. It is
    /// file-backed when `storage_path` is set and lives in process memory
    /// otherwise.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let backend: SharedBackend = match &config.storage_path {
            Some(path) => {
                let backend = FileBackend::open(path, config.storage_quota_bytes)?;
                info!(path = %path.display(), "persistent tier backed by file");
                shared(backend)
            }
            None => match config.storage_quota_bytes {
                Some(quota) => shared(InMemoryBackend::with_quota(quota)),
                None => shared(InMemoryBackend::new()),
            },
        };

        let cache = TieredCache::new(config.cache.clone(), PersistentTier::new(backend.clone()));
        let fetcher = HttpFetcher::from_config(config)?;
        Ok(Self::new(cache, fetcher).with_activity(ActivityStore::new(backend)))
    }
}

fn checked_base_key(base_key: &str) -> Result<()> {
    match validate_base_key(base_key) {
        Some(msg) => Err(CacheError::InvalidRequest(msg)),
        None => Ok(()),
    }
}

/// Handler for GET /cache/:base_key
///
/// Query-string pairs form the parameter bag. Memory is checked before the
/// persistent tier; the response names which one answered.
pub async fn get_entry_handler(
    State(state): State<AppState>,
    Path(base_key): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<EntryResponse>> {
    checked_base_key(&base_key)?;
    let params = params_from_query(query);
    let key = derive_key(&base_key, &params);

    if let Some(data) = state.cache.get::<Value>(&base_key, &params) {
        return Ok(Json(EntryResponse {
            key,
            source: EntrySource::Memory,
            data,
        }));
    }

    match state.cache.get_persisted::<Value>(&base_key, &params) {
        Some(data) => Ok(Json(EntryResponse {
            key,
            source: EntrySource::Persistent,
            data,
        })),
        None => Err(CacheError::NotFound(key)),
    }
}

/// Handler for PUT /cache/:base_key
///
/// Stores the body's `data` under the base key and parameter bag. A failed
/// persistent write still caches in memory and reports `persisted: false`.
pub async fn put_entry_handler(
    State(state): State<AppState>,
    Path(base_key): Path<String>,
    Json(req): Json<PutEntryRequest>,
) -> Result<Json<SetResponse>> {
    checked_base_key(&base_key)?;
    let key = derive_key(&base_key, &req.params);

    match state
        .cache
        .set(&base_key, &req.data, &req.params, req.ttl(&base_key))
    {
        SetOutcome::NotStored(err) => Err(CacheError::Storage(err)),
        outcome => Ok(Json(SetResponse::new(key, outcome.is_persisted()))),
    }
}

/// Handler for DELETE /cache/:base_key
pub async fn invalidate_handler(
    State(state): State<AppState>,
    Path(base_key): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<DeleteResponse>> {
    checked_base_key(&base_key)?;
    let params = params_from_query(query);
    let removed = state.cache.invalidate(&base_key, &params);

    Ok(Json(DeleteResponse::new(derive_key(&base_key, &params), removed)))
}

/// Handler for DELETE /cache
pub async fn clear_handler(State(state): State<AppState>) -> Json<ClearResponse> {
    Json(ClearResponse::new(state.cache.clear()))
}

/// Handler for POST /fetch
///
/// Serves the entry from cache or fetches `url` once, no matter how many
/// requests for the same key arrive while that fetch is running.
pub async fn fetch_handler(
    State(state): State<AppState>,
    Json(req): Json<FetchRequest>,
) -> Result<Json<FetchResponse>> {
    if let Some(msg) = req.validate() {
        return Err(CacheError::InvalidRequest(msg));
    }
    state
        .fetcher
        .check_url(&req.url)
        .map_err(|err| CacheError::InvalidRequest(err.to_string()))?;

    let fetcher = state.fetcher.clone();
    let url = req.url.clone();
    let data: Value = state
        .cache
        .get_or_fetch(&req.base_key, &req.params, req.ttl(), move || async move {
            fetcher.fetch_json(&url).await
        })
        .await?;

    Ok(Json(FetchResponse {
        key: derive_key(&req.base_key, &req.params),
        data,
    }))
}

/// Handler for GET /searches
pub async fn list_searches_handler(State(state): State<AppState>) -> Json<Vec<SavedSearch>> {
    Json(state.activity.saved_searches())
}

/// Handler for POST /searches
pub async fn save_search_handler(
    State(state): State<AppState>,
    Json(req): Json<NewSearch>,
) -> Result<Json<SavedSearch>> {
    if let Some(msg) = req.validate() {
        return Err(CacheError::InvalidRequest(msg));
    }
    Ok(Json(state.activity.save_search(req)?))
}

/// Handler for DELETE /searches/:index
pub async fn delete_search_handler(
    State(state): State<AppState>,
    Path(index): Path<usize>,
) -> Result<Json<SavedSearch>> {
    state
        .activity
        .delete_saved_search(index)?
        .map(Json)
        .ok_or_else(|| CacheError::NotFound(format!("saved search {}", index)))
}

/// Handler for GET /usage
pub async fn usage_handler(State(state): State<AppState>) -> Json<Vec<UsageEvent>> {
    Json(state.activity.usage_events())
}

/// Handler for POST /usage
pub async fn track_usage_handler(
    State(state): State<AppState>,
    Json(req): Json<TrackUsageRequest>,
) -> Result<Json<TrackUsageResponse>> {
    if let Some(msg) = req.validate() {
        return Err(CacheError::InvalidRequest(msg));
    }
    let retained = state.activity.track_usage(req.event.clone(), req.data)?;
    Ok(Json(TrackUsageResponse {
        event: req.event,
        retained,
    }))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsSnapshot> {
    Json(state.cache.stats())
}

/// Handler for GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::healthy(state.cache.is_cleanup_running()))
}
