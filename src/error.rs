//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use std::error::Error as StdError;
use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

/// Boxed producer error shared between every caller joined on one fetch.
pub type SharedError = Arc<dyn StdError + Send + Sync + 'static>;

// == Storage Error Enum ==
/// Failure inside a storage tier.
///
/// These never escape the cache's read/write paths: they are logged and
/// absorbed, and only surface through typed outcomes such as
/// [`SetOutcome`](crate::cache::SetOutcome).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Writing the record would exceed the backend's byte quota
    #[error("storage quota exceeded: need {needed} bytes, quota is {quota} bytes")]
    QuotaExceeded { needed: usize, quota: usize },

    /// The entry could not be serialized for storage
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// A stored record could not be decoded
    #[error("corrupt record under {key}: {reason}")]
    Corrupt { key: String, reason: String },

    /// The underlying medium failed
    #[error("storage I/O failed: {0}")]
    Io(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

/// Convenience Result type for storage tiers.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// == Upstream Error Enum ==
/// Failure of an upstream HTTP fetch performed by [`HttpFetcher`](crate::upstream::HttpFetcher).
#[derive(Error, Debug)]
pub enum UpstreamError {
    /// The URL's host is not on the allow-list
    #[error("host not allowed: {0}")]
    HostNotAllowed(String),

    /// The URL could not be parsed
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// Transport-level failure (connect, timeout, body read)
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Upstream answered with a non-success status
    #[error("upstream returned {status} for {url}")]
    Status { status: u16, url: String },

    /// Body was not valid JSON
    #[error("malformed body from {0}")]
    Malformed(String),

    /// Body was valid but carried no data
    #[error("empty result from {0}")]
    Empty(String),
}

// == Cache Error Enum ==
/// Unified error type for the cache.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// No valid entry for the derived key
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The producer failed; nothing was cached
    #[error("Upstream fetch failed for {key}: {source}")]
    Upstream {
        key: String,
        #[source]
        source: SharedError,
    },

    /// A storage tier failed
    #[error("Storage failure: {0}")]
    Storage(#[from] StorageError),

    /// A value could not be converted to or from its cached JSON form
    #[error("Serialization failed for {key}: {reason}")]
    Serialization { key: String, reason: String },
}

impl CacheError {
    /// Wraps a producer failure for `key`.
    pub fn upstream<E>(key: impl Into<String>, err: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        CacheError::Upstream {
            key: key.into(),
            source: Arc::from(err.into()),
        }
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CacheError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            CacheError::Storage(_) | CacheError::Serialization { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(ErrorResponse::new(self.to_string()));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
