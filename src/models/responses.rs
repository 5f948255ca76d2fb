//! Response DTOs for the cache service API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;
use serde_json::Value;

/// Which tier answered a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntrySource {
    Memory,
    Persistent,
}

/// Response body for a lookup (GET /cache/:base_key)
#[derive(Debug, Clone, Serialize)]
pub struct EntryResponse {
    /// Derived cache key
    pub key: String,
    pub source: EntrySource,
    pub data: Value,
}

/// Response body for a store (PUT /cache/:base_key)
#[derive(Debug, Clone, Serialize)]
pub struct SetResponse {
    /// Success message
    pub message: String,
    /// Derived cache key
    pub key: String,
    /// Whether the persistent tier accepted the write
    pub persisted: bool,
}

impl SetResponse {
    pub fn new(key: impl Into<String>, persisted: bool) -> Self {
        let key = key.into();
        let message = if persisted {
            format!("Key '{}' cached", key)
        } else {
            format!("Key '{}' cached in memory only", key)
        };
        Self {
            message,
            key,
            persisted,
        }
    }
}

/// Response body for an invalidation (DELETE /cache/:base_key)
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    pub message: String,
    pub key: String,
    /// Whether either tier held the entry
    pub removed: bool,
}

impl DeleteResponse {
    pub fn new(key: impl Into<String>, removed: bool) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' invalidated", key),
            key,
            removed,
        }
    }
}

/// Response body for a full reset (DELETE /cache)
#[derive(Debug, Clone, Serialize)]
pub struct ClearResponse {
    pub message: String,
    /// Entries removed across both tiers
    pub removed: usize,
}

impl ClearResponse {
    pub fn new(removed: usize) -> Self {
        Self {
            message: "Cache cleared".to_string(),
            removed,
        }
    }
}

/// Response body for a fetch-through (POST /fetch)
#[derive(Debug, Clone, Serialize)]
pub struct FetchResponse {
    pub key: String,
    pub data: Value,
}

/// Response body for recording a usage event (POST /usage)
#[derive(Debug, Clone, Serialize)]
pub struct TrackUsageResponse {
    pub event: String,
    /// Events held after this one was recorded
    pub retained: usize,
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Whether the background sweep is running
    pub cleanup_running: bool,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy(cleanup_running: bool) -> Self {
        Self {
            status: "healthy".to_string(),
            cleanup_running,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
