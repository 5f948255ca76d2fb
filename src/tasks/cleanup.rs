//! Cleanup Task
//!
//! Background task that periodically sweeps expired entries out of both
//! cache tiers.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::WeakTieredCache;

/// Spawns a background task that periodically removes expired entries.
///
/// The task sleeps for `interval` between sweeps. It holds only a weak
/// handle and exits on its own once every [`TieredCache`](crate::cache::TieredCache)
/// clone is dropped.
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during shutdown.
///
/// # Example
/// ```ignore
/// let cache = TieredCache::in_memory(CacheConfig::default());
/// let handle = spawn_cleanup_task(cache.downgrade(), Duration::from_secs(600));
/// // Later, during shutdown:
/// handle.abort();
/// ```
pub fn spawn_cleanup_task(cache: WeakTieredCache, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "Starting cache cleanup task with interval of {} ms",
            interval.as_millis()
        );

        loop {
            tokio::time::sleep(interval).await;

            let Some(cache) = cache.upgrade() else {
                debug!("cache dropped, cleanup task exiting");
                break;
            };

            let report = cache.cleanup_expired();
            if let Some(err) = &report.storage_error {
                warn!(error = %err, "cleanup could not scan the persistent tier");
            }

            if report.total_removed() > 0 {
                info!(
                    memory = report.memory_removed,
                    persisted = report.persisted_removed,
                    "cache cleanup: removed expired entries"
                );
            } else {
                debug!("cache cleanup: no expired entries found");
            }
        }
    })
}
