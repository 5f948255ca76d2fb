//! PastPeek Cache - two-tier TTL cache for upstream API responses
//!
//! A memory tier in front of a persistent tier, keyed by a base key plus a
//! parameter bag, with single-flight fetch-through and a periodic sweep.
//! Saved searches and a bounded usage log share the persistent backend.
//! Also ships a small HTTP service exposing both.

pub mod activity;
pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod storage;
pub mod tasks;
pub mod upstream;

pub use activity::ActivityStore;
pub use api::{create_router, AppState};
pub use cache::{Params, SetOutcome, TieredCache, TtlTier};
pub use config::{CacheConfig, Config};
pub use error::{CacheError, StorageError, UpstreamError};
pub use tasks::spawn_cleanup_task;
pub use upstream::HttpFetcher;
