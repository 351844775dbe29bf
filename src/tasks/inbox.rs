//! Broadcast Inbox Pump
//!
//! Delivers sibling messages one at a time on the runtime's task queue.

use std::sync::Weak;

use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::platform::BroadcastMessage;
use crate::replica::Core;

pub(crate) fn spawn_inbox_pump(
    runtime: &Handle,
    core: Weak<Core>,
    mut inbox: UnboundedReceiver<BroadcastMessage>,
) -> JoinHandle<()> {
    runtime.spawn(async move {
        while let Some(message) = inbox.recv().await {
            let Some(core) = core.upgrade() else {
                break;
            };
            core.apply_broadcast(message);
        }
        debug!("broadcast inbox closed");
    })
}
