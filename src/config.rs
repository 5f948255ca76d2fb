//! Configuration Module
//!
//! Handles loading cache and service configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Serialize, Serializer};

/// Hosts the fetch-through endpoint may reach by default.
pub const DEFAULT_ALLOWED_HOSTS: &[&str] = &[
    "en.wikipedia.org",
    "www.wikidata.org",
    "query.wikidata.org",
    "secure.geonames.org",
    "api.geonames.org",
    "api.openverse.org",
    "collectionapi.metmuseum.org",
    "overpass-api.de",
    "api.open-meteo.com",
    "archive-api.open-meteo.com",
    "gutendex.com",
];

// == Cache Config ==
/// Tuning for a [`TieredCache`](crate::cache::TieredCache).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheConfig {
    /// TTL applied when a caller does not pick one
    #[serde(rename = "default_ttl_ms", serialize_with = "as_millis")]
    pub default_ttl: Duration,
    /// Soft cap on the memory tier
    pub max_entries: usize,
    /// Period of the background sweep
    #[serde(rename = "cleanup_interval_ms", serialize_with = "as_millis")]
    pub cleanup_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(30 * 60),
            max_entries: 500,
            cleanup_interval: Duration::from_secs(10 * 60),
        }
    }
}

fn as_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

// == Service Config ==
/// Service configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub cache: CacheConfig,
    /// HTTP server port
    pub server_port: u16,
    /// File backing the persistent tier; `None` keeps it in memory
    pub storage_path: Option<PathBuf>,
    /// Byte quota for the persistent tier; `None` is unlimited
    pub storage_quota_bytes: Option<usize>,
    /// Per-request timeout for upstream fetches
    pub upstream_timeout: Duration,
    /// Hosts the fetch-through endpoint may contact
    pub allowed_hosts: Vec<String>,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `MAX_ENTRIES` - Memory tier soft cap (default: 500)
    /// - `DEFAULT_TTL_SECS` - Default TTL in seconds (default: 1800)
    /// - `CLEANUP_INTERVAL_SECS` - Sweep period in seconds (default: 600)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `STORAGE_PATH` - Persistent tier file (default: unset, in-memory)
    /// - `STORAGE_QUOTA_BYTES` - Persistent tier quota (default: unset)
    /// - `UPSTREAM_TIMEOUT_SECS` - Upstream request timeout (default: 10)
    /// - `ALLOWED_HOSTS` - Comma-separated upstream hosts (default: PastPeek's public APIs)
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a Config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let secs = |name: &str| parsed::<_, u64>(&lookup, name);

        Self {
            cache: CacheConfig {
                default_ttl: secs("DEFAULT_TTL_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.cache.default_ttl),
                max_entries: parsed(&lookup, "MAX_ENTRIES").unwrap_or(defaults.cache.max_entries),
                cleanup_interval: secs("CLEANUP_INTERVAL_SECS")
                    .filter(|secs| *secs > 0)
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.cache.cleanup_interval),
            },
            server_port: parsed(&lookup, "SERVER_PORT").unwrap_or(defaults.server_port),
            storage_path: lookup("STORAGE_PATH")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            storage_quota_bytes: parsed(&lookup, "STORAGE_QUOTA_BYTES"),
            upstream_timeout: secs("UPSTREAM_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.upstream_timeout),
            allowed_hosts: lookup("ALLOWED_HOSTS")
                .map(|v| {
                    v.split(',')
                        .map(|h| h.trim().to_ascii_lowercase())
                        .filter(|h| !h.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.allowed_hosts),
        }
    }
}

fn parsed<F, T>(lookup: &F, name: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(name).and_then(|v| v.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            server_port: 3000,
            storage_path: None,
            storage_quota_bytes: None,
            upstream_timeout: Duration::from_secs(10),
            allowed_hosts: DEFAULT_ALLOWED_HOSTS.iter().map(|h| h.to_string()).collect(),
        }
    }
}
