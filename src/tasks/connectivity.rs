//! Connectivity Watcher
//!
//! Flushes queued changes as soon as the host comes back online instead of
//! waiting for the next tick.

use std::sync::Weak;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::replica::Core;

pub(crate) fn spawn_connectivity_watcher(
    runtime: &Handle,
    core: Weak<Core>,
    mut online: watch::Receiver<bool>,
) -> JoinHandle<()> {
    // Only changes after build count
    online.borrow_and_update();

    runtime.spawn(async move {
        // An offline->online flap between polls arrives as one change
        while online.changed().await.is_ok() {
            if !*online.borrow_and_update() {
                info!("connectivity lost, backend sync paused");
                continue;
            }

            let Some(core) = core.upgrade() else {
                break;
            };
            info!("back online, syncing");
            if let Err(err) = core.run_sync().await {
                debug!(error = %err, "sync after reconnect failed");
            }
        }
    })
}
