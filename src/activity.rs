//! Activity Store
//!
//! Saved searches and a bounded usage log, kept as JSON lists under fixed
//! keys of the same key/value backend the persistent cache tier uses. The
//! keys sit outside the cache namespace, so clearing the cache leaves them
//! alone.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{StorageError, StorageResult};
use crate::storage::{shared, InMemoryBackend, KeyValueBackend, SharedBackend};

pub const SAVED_SEARCHES_KEY: &str = "pastpeek_saved_searches";
pub const USAGE_KEY: &str = "pastpeek_usage";

/// The usage log keeps only this many of the most recent events.
pub const MAX_USAGE_EVENTS: usize = 100;

// == Records ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
    pub start: i32,
    pub end: i32,
}

/// A search as submitted, before it is stamped and named.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSearch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub city: String,
    pub year_range: YearRange,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl NewSearch {
    pub fn validate(&self) -> Option<String> {
        if self.city.trim().is_empty() {
            return Some("City cannot be empty".to_string());
        }
        if self.year_range.start > self.year_range.end {
            return Some(format!(
                "Year range start {} is after end {}",
                self.year_range.start, self.year_range.end
            ));
        }
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedSearch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub city: String,
    pub year_range: YearRange,
    pub saved_at: DateTime<Utc>,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEvent {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

// == Activity Store ==
/// Handle to the activity lists. Clones share the same backend.
///
/// Every operation is one read-modify-write under the backend's lock.
#[derive(Clone)]
pub struct ActivityStore {
    backend: SharedBackend,
}

impl fmt::Debug for ActivityStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityStore").finish_non_exhaustive()
    }
}

impl Default for ActivityStore {
    fn default() -> Self {
        Self::new(shared(InMemoryBackend::new()))
    }
}

impl ActivityStore {
    pub fn new(backend: SharedBackend) -> Self {
        Self { backend }
    }

    // == Saved Searches ==
    /// Appends a search, naming it `"{city} ({start}-{end})"` when no name
    /// is given.
    pub fn save_search(&self, search: NewSearch) -> StorageResult<SavedSearch> {
        let name = search.name.unwrap_or_else(|| {
            format!(
                "{} ({}-{})",
                search.city, search.year_range.start, search.year_range.end
            )
        });
        let saved = SavedSearch {
            user_id: search.user_id,
            city: search.city,
            year_range: search.year_range,
            saved_at: Utc::now(),
            name,
        };

        let mut backend = self.backend.lock();
        let mut searches: Vec<SavedSearch> = read_list(&*backend, SAVED_SEARCHES_KEY);
        searches.push(saved.clone());
        write_list(&mut *backend, SAVED_SEARCHES_KEY, &searches)?;

        debug!(name = %saved.name, total = searches.len(), "search saved");
        Ok(saved)
    }

    /// Lists saved searches, oldest first.
    pub fn saved_searches(&self) -> Vec<SavedSearch> {
        read_list(&*self.backend.lock(), SAVED_SEARCHES_KEY)
    }

    /// Removes the search at `index`. An index past the end removes nothing.
    pub fn delete_saved_search(&self, index: usize) -> StorageResult<Option<SavedSearch>> {
        let mut backend = self.backend.lock();
        let mut searches: Vec<SavedSearch> = read_list(&*backend, SAVED_SEARCHES_KEY);
        if index >= searches.len() {
            return Ok(None);
        }

        let removed = searches.remove(index);
        write_list(&mut *backend, SAVED_SEARCHES_KEY, &searches)?;
        Ok(Some(removed))
    }

    // == Usage ==
    /// Records an event, dropping the oldest beyond [`MAX_USAGE_EVENTS`].
    /// Returns how many events the log now holds.
    pub fn track_usage(
        &self,
        event: impl Into<String>,
        data: Option<Value>,
    ) -> StorageResult<usize> {
        let event = UsageEvent {
            event: event.into(),
            data,
            timestamp: Utc::now(),
        };

        let mut backend = self.backend.lock();
        let mut events: Vec<UsageEvent> = read_list(&*backend, USAGE_KEY);
        events.push(event);
        if events.len() > MAX_USAGE_EVENTS {
            let excess = events.len() - MAX_USAGE_EVENTS;
            events.drain(..excess);
        }
        write_list(&mut *backend, USAGE_KEY, &events)?;
        Ok(events.len())
    }

    /// Lists recorded events, oldest first.
    pub fn usage_events(&self) -> Vec<UsageEvent> {
        read_list(&*self.backend.lock(), USAGE_KEY)
    }
}

/// Reads a JSON list. A missing, unreadable or malformed list reads as empty.
fn read_list<T: DeserializeOwned>(backend: &dyn KeyValueBackend, key: &str) -> Vec<T> {
    let raw = match backend.get_item(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Vec::new(),
        Err(err) => {
            warn!(%key, error = %err, "activity list unreadable");
            return Vec::new();
        }
    };

    serde_json::from_str(&raw).unwrap_or_else(|err| {
        warn!(%key, error = %err, "discarding malformed activity list");
        Vec::new()
    })
}

fn write_list<T: Serialize>(
    backend: &mut dyn KeyValueBackend,
    key: &str,
    items: &[T],
) -> StorageResult<()> {
    let raw =
        serde_json::to_string(items).map_err(|err| StorageError::Serialization(err.to_string()))?;
    backend.set_item(key, raw)
}
