//! Periodic Sync Ticker
//!
//! Triggers a sync pass every `sync_interval`. A tick that lands while a pass
//! is running is dropped by the coordinator, not queued.

use std::sync::Weak;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::replica::Core;
use crate::sync::SyncOutcome;

/// Spawns the ticker. The first pass runs one interval after start.
pub(crate) fn spawn_sync_ticker(
    runtime: &Handle,
    core: Weak<Core>,
    every: Duration,
) -> JoinHandle<()> {
    runtime.spawn(async move {
        info!("Starting sync ticker with interval of {:?}", every);

        let mut ticker = interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            let Some(core) = core.upgrade() else {
                break;
            };
            if core.is_disposed() {
                break;
            }

            match core.run_sync().await {
                Ok(SyncOutcome::Completed(_)) => {}
                Ok(SyncOutcome::Skipped(reason)) => debug!(?reason, "periodic sync skipped"),
                Err(err) => debug!(error = %err, "periodic sync failed, changes stay queued"),
            }
        }
    })
}
