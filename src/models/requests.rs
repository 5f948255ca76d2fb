//! Request DTOs for the cache service API
//!
//! Defines the structure of incoming HTTP request bodies and query strings.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::cache::{Params, TtlTier};

/// Longest accepted base key.
pub const MAX_BASE_KEY_LENGTH: usize = 128;

/// Request body for storing an entry (PUT /cache/:base_key)
///
/// # Fields
/// - `params`: Parameter bag identifying the entry
/// - `data`: The payload to cache
/// - `ttl_ms`: Explicit TTL in milliseconds
/// - `tier`: TTL preset, used when `ttl_ms` is absent
#[derive(Debug, Clone, Deserialize)]
pub struct PutEntryRequest {
    #[serde(default)]
    pub params: Params,
    pub data: Value,
    #[serde(default)]
    pub ttl_ms: Option<u64>,
    #[serde(default)]
    pub tier: Option<TtlTier>,
}

impl PutEntryRequest {
    /// TTL for `base_key`, or `None` for the cache default.
    pub fn ttl(&self, base_key: &str) -> Option<Duration> {
        resolve_ttl(base_key, self.ttl_ms, self.tier)
    }
}

/// Request body for a fetch-through (POST /fetch)
#[derive(Debug, Clone, Deserialize)]
pub struct FetchRequest {
    pub base_key: String,
    #[serde(default)]
    pub params: Params,
    /// Upstream JSON endpoint; its host must be allow-listed
    pub url: String,
    #[serde(default)]
    pub ttl_ms: Option<u64>,
    #[serde(default)]
    pub tier: Option<TtlTier>,
}

impl FetchRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if let Some(msg) = validate_base_key(&self.base_key) {
            return Some(msg);
        }
        if self.url.trim().is_empty() {
            return Some("URL cannot be empty".to_string());
        }
        None
    }

    pub fn ttl(&self) -> Option<Duration> {
        resolve_ttl(&self.base_key, self.ttl_ms, self.tier)
    }
}

/// Request body for recording a usage event (POST /usage)
#[derive(Debug, Clone, Deserialize)]
pub struct TrackUsageRequest {
    pub event: String,
    #[serde(default)]
    pub data: Option<Value>,
}

impl TrackUsageRequest {
    pub fn validate(&self) -> Option<String> {
        if self.event.trim().is_empty() {
            return Some("Event name cannot be empty".to_string());
        }
        None
    }
}

/// Precedence: explicit milliseconds, then the requested tier, then the
/// tier known for the base key.
fn resolve_ttl(base_key: &str, ttl_ms: Option<u64>, tier: Option<TtlTier>) -> Option<Duration> {
    ttl_ms
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
        .or_else(|| tier.or_else(|| TtlTier::for_base_key(base_key)).map(TtlTier::duration))
}

/// Checks a base key: non-empty, bounded, and limited to `[A-Za-z0-9_.-]`.
pub fn validate_base_key(base_key: &str) -> Option<String> {
    if base_key.is_empty() {
        return Some("Base key cannot be empty".to_string());
    }
    if base_key.len() > MAX_BASE_KEY_LENGTH {
        return Some(format!(
            "Base key exceeds maximum length of {} characters",
            MAX_BASE_KEY_LENGTH
        ));
    }
    if !base_key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Some("Base key may only contain letters, digits, '_', '-' and '.'".to_string());
    }
    None
}

/// Builds a parameter bag from query-string pairs.
///
/// Values that parse as JSON scalars (`1900`, `true`, `48.85`) keep their
/// type; everything else is a string.
pub fn params_from_query(query: HashMap<String, String>) -> Params {
    query
        .into_iter()
        .map(|(name, raw)| {
            let value = match serde_json::from_str::<Value>(&raw) {
                Ok(v @ (Value::Number(_) | Value::Bool(_))) => v,
                _ => Value::String(raw),
            };
            (name, value)
        })
        .collect()
}
