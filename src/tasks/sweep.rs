//! Expired-Entry Sweep
//!
//! Optional storage hygiene: periodically purges live entries whose TTL has
//! run out. Reads never depend on it.

use std::sync::Weak;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::replica::Core;

/// Spawns a background task that periodically purges expired entries.
///
/// # Example
/// ```ignore
/// let config = CacheConfig {
///     sweep_interval: Some(Duration::from_secs(60)),
///     ..CacheConfig::default()
/// };
/// let cache = ReplicaCache::builder(config).build()?;
/// // The sweep stops with cache.dispose()
/// ```
pub(crate) fn spawn_sweep_task(
    runtime: &Handle,
    core: Weak<Core>,
    every: Duration,
) -> JoinHandle<()> {
    runtime.spawn(async move {
        info!("Starting expiry sweep with interval of {:?}", every);

        loop {
            tokio::time::sleep(every).await;

            let Some(core) = core.upgrade() else {
                break;
            };
            let removed = core.sweep_expired();

            if removed > 0 {
                info!("Expiry sweep: removed {} expired entries", removed);
            } else {
                debug!("Expiry sweep: no expired entries found");
            }
        }
    })
}
