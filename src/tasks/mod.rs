//! Background Tasks Module
//!
//! Contains background tasks that run for the lifetime of a cache.
//!
//! # Tasks
//! - Cleanup: Sweeps expired entries out of both tiers at a fixed interval

mod cleanup;

pub use cleanup::spawn_cleanup_task;
