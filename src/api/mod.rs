//! API Module
//!
//! HTTP handlers and routing for the cache service REST API.
//!
//! # Endpoints
//! - `GET|PUT|DELETE /cache/:base_key` - Entry lookup, store, invalidation
//! - `DELETE /cache` - Clear both tiers
//! - `POST /fetch` - Cached fetch-through
//! - `GET|POST /searches`, `DELETE /searches/:index` - Saved searches
//! - `GET|POST /usage` - Usage log
//! - `GET /stats` - Cache statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
