//! Cache Module
//!
//! Two-tier TTL cache: a memory tier in front of a persistent tier, keyed by
//! a base key plus a parameter bag.

mod clock;
mod entry;
mod key;
mod order;
pub mod policy;
mod stats;
mod tiered;


// Re-export public types
pub use clock::{current_timestamp_ms, Clock, ManualClock, SystemClock};
pub use entry::{CacheEntry, PersistedEntry};
pub use key::{derive_key, Params};
pub use order::InsertionOrder;
pub use policy::TtlTier;
pub use stats::{CacheStats, StatsSnapshot};
pub use tiered::{SetOutcome, SweepReport, TieredCache, WeakTieredCache};
