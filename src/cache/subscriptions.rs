//! Subscription Registry
//!
//! Per-key listener sets notified on local or remote mutation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;

/// Callback invoked with the key's current value (None when absent).
pub type Listener = Arc<dyn Fn(Option<&Value>) + Send + Sync>;

#[derive(Default)]
struct RegistryInner {
    listeners: HashMap<String, HashMap<u64, Listener>>,
    next_id: u64,
}

/// Key to listener-set map.
#[derive(Default)]
pub struct SubscriptionRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` for `key`.
    pub fn subscribe<F>(&self, key: &str, listener: F) -> Subscription
    where
        F: Fn(Option<&Value>) + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(listener);
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner
            .listeners
            .entry(key.to_string())
            .or_default()
            .insert(id, listener);

        Subscription {
            key: key.to_string(),
            id,
            registry: Arc::downgrade(&self.inner),
            active: AtomicBool::new(true),
        }
    }

    /// Invokes every listener of `key` with `value`.
    ///
    /// Listeners run on a snapshot taken before the first call, outside the
    /// registry lock, so they may subscribe or unsubscribe freely.
    pub fn notify(&self, key: &str, value: Option<&Value>) -> usize {
        let snapshot: Vec<Listener> = match self.inner.lock().listeners.get(key) {
            Some(set) => set.values().cloned().collect(),
            None => return 0,
        };

        for listener in &snapshot {
            listener(value);
        }
        snapshot.len()
    }

    /// Keys that currently have at least one listener.
    pub fn subscribed_keys(&self) -> Vec<String> {
        self.inner.lock().listeners.keys().cloned().collect()
    }

    pub fn listener_count(&self, key: &str) -> usize {
        self.inner
            .lock()
            .listeners
            .get(key)
            .map_or(0, HashMap::len)
    }

    /// Number of keys with listeners.
    pub fn len(&self) -> usize {
        self.inner.lock().listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every listener.
    pub fn clear(&self) {
        self.inner.lock().listeners.clear();
    }
}

// == Subscription ==
/// Handle returned by [`SubscriptionRegistry::subscribe`].
///
/// Dropping the handle does not unsubscribe.
pub struct Subscription {
    key: String,
    id: u64,
    registry: Weak<Mutex<RegistryInner>>,
    active: AtomicBool,
}

impl Subscription {
    /// A handle bound to no registry; never active.
    pub fn detached(key: &str) -> Self {
        Self {
            key: key.to_string(),
            id: 0,
            registry: Weak::new(),
            active: AtomicBool::new(false),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Removes the listener. Idempotent; prunes the key once its set is empty.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        let Some(registry) = self.registry.upgrade() else {
            return;
        };

        let mut inner = registry.lock();
        if let Some(set) = inner.listeners.get_mut(&self.key) {
            set.remove(&self.id);
            if set.is_empty() {
                inner.listeners.remove(&self.key);
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst) && self.registry.strong_count() > 0
    }
}
