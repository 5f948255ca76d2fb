//! Request and Response models for the cache service API
//!
//! This module defines the DTOs (Data Transfer Objects) used for
//! serializing/deserializing HTTP request and response bodies.

pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use requests::{
    params_from_query, validate_base_key, FetchRequest, PutEntryRequest, TrackUsageRequest,
};
pub use responses::{
    ClearResponse, DeleteResponse, EntryResponse, EntrySource, ErrorResponse, FetchResponse,
    HealthResponse, SetResponse, TrackUsageResponse,
};
