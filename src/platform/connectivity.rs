//! Online/offline monitor

use std::sync::Arc;

use tokio::sync::watch;

/// Observes connectivity. Watchers see every `offline -> online` transition.
pub trait ConnectivityMonitor: Send + Sync + 'static {
    fn is_online(&self) -> bool;
    fn watch(&self) -> watch::Receiver<bool>;
}

/// Connectivity flipped by hand, for hosts that learn about the network from
/// elsewhere and for tests. Clones share the same state.
#[derive(Debug, Clone)]
pub struct ManualConnectivity {
    state: Arc<watch::Sender<bool>>,
}

impl ManualConnectivity {
    pub fn new(online: bool) -> Self {
        let (state, _) = watch::channel(online);
        Self {
            state: Arc::new(state),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.state.send_if_modified(|current| {
            let changed = *current != online;
            *current = online;
            changed
        });
    }

    pub fn go_online(&self) {
        self.set_online(true);
    }

    pub fn go_offline(&self) {
        self.set_online(false);
    }
}

impl Default for ManualConnectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ConnectivityMonitor for ManualConnectivity {
    fn is_online(&self) -> bool {
        *self.state.borrow()
    }

    fn watch(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }
}
