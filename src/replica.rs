//! Replica Cache
//!
//! The public façade. Composes the store adapter, subscription registry,
//! broadcaster, connectivity monitor and sync coordinator, and owns the
//! background tasks that drive them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{
    resolve_against, CacheEntry, CacheStats, Origin, StoreAdapter, Subscription,
    SubscriptionRegistry,
};
use crate::clock::{Clock, Stamper, SystemClock};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::models::{validate_key, ClearRequest, RemoveRequest, SetRequest};
use crate::platform::{
    BroadcastHub, BroadcastMessage, Broadcaster, ConnectivityMonitor, KeyValueStore,
    ManualConnectivity, MemoryStore,
};
use crate::sync::{
    Backend, HttpBackend, Push, RetryPolicy, SyncCoordinator, SyncEvent, SyncOutcome, SyncState,
    SyncTarget,
};
use crate::tasks;

/// Result of applying a remote entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Applied {
    /// Incoming won and was written
    Written,
    /// Storage already holds exactly this entry (a same-origin sibling wrote it)
    AlreadyCurrent,
    /// Local copy won
    Rejected,
}

// == Core ==
pub(crate) struct Core {
    config: CacheConfig,
    store: StoreAdapter,
    registry: SubscriptionRegistry,
    broadcaster: Arc<dyn Broadcaster>,
    connectivity: Arc<dyn ConnectivityMonitor>,
    clock: Arc<dyn Clock>,
    stamper: Stamper,
    sync: SyncCoordinator,
    stats: Arc<Mutex<CacheStats>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    disposed: AtomicBool,
}

impl Core {
    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    pub(crate) async fn run_sync(&self) -> Result<SyncOutcome> {
        self.sync.run(self).await
    }

    /// Value `get` would return, without touching statistics.
    fn peek(&self, key: &str) -> Option<Value> {
        let now = self.clock.now_ms();
        self.store
            .read(key)
            .filter(|entry| entry.is_visible_at(now))
            .map(|entry| entry.value)
    }

    fn notify(&self, key: &str) {
        let value = self.peek(key);
        self.registry.notify(key, value.as_ref());
    }

    fn write(&self, entry: &CacheEntry) -> Result<()> {
        self.store.write(entry).inspect_err(|_| {
            self.stats.lock().record_storage_failure();
        })
    }

    fn post(&self, message: &BroadcastMessage) {
        if let Err(err) = self.broadcaster.post(message) {
            debug!(error = %err, "broadcast not delivered");
        }
    }

    // == Local Mutation ==
    /// Write-through, fan-out, best-effort push, then notify.
    fn commit_local(&self, entry: CacheEntry, push: Push) -> Result<()> {
        let written = self.write(&entry);
        self.post(&BroadcastMessage::from_entry(&entry));
        self.sync.push_in_background(push);
        self.notify(&entry.key);
        written
    }

    // == Remote Mutation ==
    pub(crate) fn apply_remote(&self, incoming: CacheEntry, origin: Origin) -> Applied {
        let local = self.store.read(&incoming.key);
        if local.as_ref() == Some(&incoming) {
            self.stamper.observe(incoming.timestamp);
            self.notify(&incoming.key);
            return Applied::AlreadyCurrent;
        }

        if !resolve_against(local.as_ref(), &incoming, origin).incoming_wins() {
            debug!(key = %incoming.key, ?origin, "stale remote entry discarded");
            return Applied::Rejected;
        }
        self.stamper.observe(incoming.timestamp);

        // A failed write keeps the entry in the adapter's overlay
        let _ = self.write(&incoming);
        self.notify(&incoming.key);
        Applied::Written
    }

    pub(crate) fn apply_broadcast(&self, message: BroadcastMessage) {
        if self.is_disposed() {
            return;
        }
        debug!(?message, "inbound broadcast");

        match message {
            BroadcastMessage::Set {
                key,
                value,
                ttl,
                timestamp,
            } => {
                self.apply_remote(CacheEntry::live(key, value, ttl, timestamp), Origin::Peer);
            }
            BroadcastMessage::Remove { key, timestamp } => {
                self.apply_remote(CacheEntry::tombstone(key, timestamp), Origin::Peer);
            }
            BroadcastMessage::Clear { timestamp } => {
                self.stamper.observe(timestamp);
                for key in self.store.enumerate_keys() {
                    self.apply_remote(CacheEntry::tombstone(key, timestamp), Origin::Peer);
                }
            }
        }
    }

    // == Maintenance ==
    /// Physically drops expired live entries. Tombstones are kept.
    pub(crate) fn sweep_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let mut removed = 0;
        for key in self.store.enumerate_keys() {
            let Some(entry) = self.store.read(&key) else {
                continue;
            };
            if entry.deleted || !entry.is_expired_at(now) {
                continue;
            }
            match self.store.purge(&key) {
                Ok(()) => removed += 1,
                Err(err) => warn!(key, error = %err, "could not purge expired entry"),
            }
        }
        removed
    }

    fn shutdown(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.sync.dispose();
        for handle in self.tasks.lock().drain(..) {
            handle.abort();
        }
        self.broadcaster.close();
        self.registry.clear();
        info!(prefix = %self.config.prefix, "replica cache disposed");
    }
}

impl SyncTarget for Core {
    fn last_sync(&self) -> u64 {
        self.store.last_sync()
    }

    fn changes_since(&self, since: u64) -> Vec<CacheEntry> {
        self.store.entries_since(since)
    }

    fn apply_update(&self, update: CacheEntry) -> bool {
        let message = BroadcastMessage::from_entry(&update);
        if self.apply_remote(update, Origin::Authority) != Applied::Written {
            return false;
        }
        self.post(&message);
        true
    }

    fn commit_last_sync(&self, timestamp: u64) -> Result<()> {
        self.store.set_last_sync(timestamp)
    }
}

impl Drop for Core {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// == Builder ==
/// Composition root for a [`ReplicaCache`].
///
/// Anything not injected gets an in-process default: a private memory store,
/// a broadcaster with no siblings, always-online connectivity and the system
/// clock. The backend comes from `config.backend_url` unless injected.
pub struct CacheBuilder {
    config: CacheConfig,
    storage: Option<Arc<dyn KeyValueStore>>,
    broadcaster: Option<Arc<dyn Broadcaster>>,
    connectivity: Option<Arc<dyn ConnectivityMonitor>>,
    clock: Option<Arc<dyn Clock>>,
    backend: Option<Arc<dyn Backend>>,
}

impl CacheBuilder {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            storage: None,
            broadcaster: None,
            connectivity: None,
            clock: None,
            backend: None,
        }
    }

    pub fn storage(mut self, storage: impl KeyValueStore) -> Self {
        self.storage = Some(Arc::new(storage));
        self
    }

    pub fn broadcaster(mut self, broadcaster: impl Broadcaster) -> Self {
        self.broadcaster = Some(Arc::new(broadcaster));
        self
    }

    pub fn connectivity(mut self, connectivity: impl ConnectivityMonitor) -> Self {
        self.connectivity = Some(Arc::new(connectivity));
        self
    }

    pub fn clock(mut self, clock: impl Clock) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    pub fn backend(mut self, backend: impl Backend) -> Self {
        self.backend = Some(Arc::new(backend));
        self
    }

    /// Starts the cache. Must run inside a tokio runtime.
    ///
    /// Fails with `InvalidRequest` outside a runtime or when a configured
    /// interval is zero.
    pub fn build(self) -> Result<ReplicaCache> {
        let runtime = Handle::try_current().map_err(|_| {
            CacheError::InvalidRequest("cache must be built inside a tokio runtime".to_string())
        })?;

        let config = self.config;
        if config.sync_interval.is_zero() {
            return Err(CacheError::InvalidRequest(
                "sync_interval must be non-zero".to_string(),
            ));
        }
        if config.sweep_interval.is_some_and(|every| every.is_zero()) {
            return Err(CacheError::InvalidRequest(
                "sweep_interval must be non-zero".to_string(),
            ));
        }
        let backend = match (self.backend, &config.backend_url) {
            (Some(backend), _) => Some(backend),
            (None, Some(url)) => Some(Arc::new(HttpBackend::new(url.clone(), config.request_timeout)?)
                as Arc<dyn Backend>),
            (None, None) => None,
        };
        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let broadcaster = self
            .broadcaster
            .unwrap_or_else(|| Arc::new(BroadcastHub::new().connect()));
        let connectivity = self
            .connectivity
            .unwrap_or_else(|| Arc::new(ManualConnectivity::new(true)));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let stats = Arc::new(Mutex::new(CacheStats::new()));

        let sync = SyncCoordinator::new(
            backend,
            Arc::clone(&connectivity),
            Arc::clone(&clock),
            RetryPolicy::from(&config),
            Arc::clone(&stats),
        );

        let core = Arc::new(Core {
            store: StoreAdapter::new(storage, config.prefix.clone()),
            registry: SubscriptionRegistry::new(),
            stamper: Stamper::new(Arc::clone(&clock)),
            broadcaster,
            connectivity,
            clock,
            sync,
            stats,
            tasks: Mutex::new(Vec::new()),
            disposed: AtomicBool::new(false),
            config,
        });

        let weak = Arc::downgrade(&core);
        let mut handles = Vec::new();
        if let Some(inbox) = core.broadcaster.take_inbox() {
            handles.push(tasks::spawn_inbox_pump(&runtime, weak.clone(), inbox));
        }
        handles.push(tasks::spawn_connectivity_watcher(
            &runtime,
            weak.clone(),
            core.connectivity.watch(),
        ));
        if core.sync.has_backend() {
            handles.push(tasks::spawn_sync_ticker(
                &runtime,
                weak.clone(),
                core.config.sync_interval,
            ));
        }
        if let Some(interval) = core.config.sweep_interval {
            handles.push(tasks::spawn_sweep_task(&runtime, weak, interval));
        }
        *core.tasks.lock() = handles;

        info!(
            prefix = %core.config.prefix,
            backend = core.sync.has_backend(),
            "replica cache started"
        );
        Ok(ReplicaCache { core })
    }
}

// == Replica Cache ==
/// A replicated, TTL-aware cache handle. Clones share the same instance.
#[derive(Clone)]
pub struct ReplicaCache {
    core: Arc<Core>,
}

impl ReplicaCache {
    pub fn builder(config: CacheConfig) -> CacheBuilder {
        CacheBuilder::new(config)
    }

    fn ensure_live(&self) -> Result<()> {
        if self.core.is_disposed() {
            Err(CacheError::Disposed)
        } else {
            Ok(())
        }
    }

    fn ensure_key(key: &str) -> Result<()> {
        match validate_key(key) {
            Some(message) => Err(CacheError::InvalidRequest(message)),
            None => Ok(()),
        }
    }

    // == Set ==
    /// Stores `value` under `key`, stamped now.
    ///
    /// `ttl` falls back to the configured default. A `StorageFailure` means
    /// the value lives in memory only, but it is still visible, broadcast and
    /// pushed.
    pub fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()> {
        self.ensure_live()?;
        Self::ensure_key(key)?;

        let ttl_ms = ttl
            .map(|ttl| ttl.as_millis() as u64)
            .unwrap_or_else(|| self.core.config.default_ttl_ms());
        let entry = CacheEntry::live(key, value, ttl_ms, self.core.stamper.next());
        debug!(key, timestamp = entry.timestamp, "set");

        let push = Push::Set(SetRequest::from_entry(&entry));
        self.core.commit_local(entry, push)
    }

    // == Get ==
    /// Current value, or None for missing, tombstoned or expired keys.
    pub fn get(&self, key: &str) -> Option<Value> {
        if self.core.is_disposed() {
            return None;
        }
        let now = self.core.clock.now_ms();
        let entry = self.core.store.read(key);

        let mut stats = self.core.stats.lock();
        match entry {
            Some(entry) if entry.deleted => {
                stats.record_miss();
                None
            }
            Some(entry) if entry.is_expired_at(now) => {
                stats.record_expired();
                None
            }
            Some(entry) => {
                stats.record_hit();
                Some(entry.value)
            }
            None => {
                stats.record_miss();
                None
            }
        }
    }

    /// Typed read.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.get(key)
            .map(|value| {
                serde_json::from_value(value).map_err(|err| {
                    CacheError::InvalidRequest(format!("value of '{}': {}", key, err))
                })
            })
            .transpose()
    }

    // == Remove ==
    /// Tombstones `key`, stamped now.
    pub fn remove(&self, key: &str) -> Result<()> {
        self.ensure_live()?;
        Self::ensure_key(key)?;

        let entry = CacheEntry::tombstone(key, self.core.stamper.next());
        debug!(key, timestamp = entry.timestamp, "remove");

        let push = Push::Remove(RemoveRequest {
            key: key.to_string(),
            timestamp: entry.timestamp,
        });
        self.core.commit_local(entry, push)
    }

    // == Clear ==
    /// Tombstones every known key with one shared timestamp.
    ///
    /// Returns the first storage failure, after every key has been attempted.
    pub fn clear(&self) -> Result<()> {
        self.ensure_live()?;
        let core = &self.core;
        let timestamp = core.stamper.next();

        let keys = core.store.enumerate_keys();
        let mut first_failure = None;
        for key in &keys {
            if let Err(err) = core.write(&CacheEntry::tombstone(key.clone(), timestamp)) {
                first_failure.get_or_insert(err);
            }
        }
        info!(keys = keys.len(), timestamp, "clear");

        core.post(&BroadcastMessage::Clear { timestamp });
        core.sync
            .push_in_background(Push::Clear(ClearRequest { timestamp }));

        let mut notified = keys;
        notified.extend(core.registry.subscribed_keys());
        notified.sort();
        notified.dedup();
        for key in &notified {
            core.notify(key);
        }

        first_failure.map_or(Ok(()), Err)
    }

    // == Subscribe ==
    /// Calls `listener` with the key's current value after every local or
    /// remote mutation of `key`.
    pub fn subscribe<F>(&self, key: &str, listener: F) -> Subscription
    where
        F: Fn(Option<&Value>) + Send + Sync + 'static,
    {
        if self.core.is_disposed() {
            return Subscription::detached(key);
        }
        self.core.registry.subscribe(key, listener)
    }

    // == Keys ==
    /// Live (non-tombstoned) keys. Expired entries are still listed.
    pub fn keys(&self) -> Keys {
        let names = if self.core.is_disposed() {
            Vec::new()
        } else {
            self.core.store.enumerate_keys()
        };
        Keys {
            core: Arc::clone(&self.core),
            names: names.into_iter(),
        }
    }

    // == Sync ==
    /// Runs a sync pass now, unless one is already running.
    pub async fn sync_now(&self) -> Result<SyncOutcome> {
        self.core.run_sync().await
    }

    pub fn sync_state(&self) -> SyncState {
        self.core.sync.state()
    }

    /// Observable sync channel, for "sync degraded" indicators.
    pub fn sync_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.core.sync.subscribe_events()
    }

    pub fn is_online(&self) -> bool {
        self.core.connectivity.is_online()
    }

    pub fn stats(&self) -> CacheStats {
        self.core.stats.lock().clone()
    }

    /// Purges expired live entries from storage now.
    pub fn sweep_expired(&self) -> usize {
        if self.core.is_disposed() {
            return 0;
        }
        self.core.sweep_expired()
    }

    // == Dispose ==
    /// Stops timers, leaves the broadcast channel, drops every listener and
    /// connectivity watcher. Idempotent, safe mid-sync.
    pub fn dispose(&self) {
        self.core.shutdown();
    }

    pub fn is_disposed(&self) -> bool {
        self.core.is_disposed()
    }
}

/// Lazy iterator returned by [`ReplicaCache::keys`].
pub struct Keys {
    core: Arc<Core>,
    names: std::vec::IntoIter<String>,
}

impl Iterator for Keys {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.names.by_ref().find(|name| {
            self.core
                .store
                .read(name)
                .is_some_and(|entry| !entry.deleted)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::platform::MemoryStore;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn local_cache(clock: &ManualClock, storage: &MemoryStore) -> ReplicaCache {
        ReplicaCache::builder(CacheConfig::default())
            .clock(clock.clone())
            .storage(storage.clone())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let clock = ManualClock::new(1_000);
        let cache = local_cache(&clock, &MemoryStore::new());

        cache.set("user", json!({"name": "ada"}), None).unwrap();
        assert_eq!(cache.get("user"), Some(json!({"name": "ada"})));
        assert!(cache.get("missing").is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_get_as_typed() {
        let cache = local_cache(&ManualClock::new(1), &MemoryStore::new());
        cache.set("n", json!(42), None).unwrap();

        assert_eq!(cache.get_as::<u32>("n").unwrap(), Some(42));
        assert_eq!(cache.get_as::<u32>("absent").unwrap(), None);
        assert!(cache.get_as::<String>("n").is_err());
    }

    #[tokio::test]
    async fn test_ttl_transparency_is_lazy() {
        let clock = ManualClock::new(1_000);
        let storage = MemoryStore::new();
        let cache = local_cache(&clock, &storage);

        cache.set("k", json!("v"), Some(Duration::from_millis(1))).unwrap();
        assert!(cache.get("k").is_some());

        clock.advance(2);
        assert!(cache.get("k").is_none());
        // Still physically present
        assert!(storage.raw("replica:k").is_some());
        assert_eq!(cache.stats().expired, 1);
        // keys() does not filter on expiry
        assert_eq!(cache.keys().collect::<Vec<_>>(), vec!["k".to_string()]);
    }

    #[tokio::test]
    async fn test_default_ttl_from_config() {
        let clock = ManualClock::new(0);
        let cache = ReplicaCache::builder(CacheConfig {
            default_ttl: 1,
            ..CacheConfig::default()
        })
        .clock(clock.clone())
        .build()
        .unwrap();

        cache.set("k", json!(1), None).unwrap();
        clock.advance(1_000);
        assert!(cache.get("k").is_some());
        clock.advance(1);
        assert!(cache.get("k").is_none());
    }

    #[tokio::test]
    async fn test_remove_writes_tombstone() {
        let clock = ManualClock::new(1_000);
        let storage = MemoryStore::new();
        let cache = local_cache(&clock, &storage);

        cache.set("k", json!(1), None).unwrap();
        cache.remove("k").unwrap();

        assert!(cache.get("k").is_none());
        let raw: CacheEntry = serde_json::from_str(&storage.raw("replica:k").unwrap()).unwrap();
        assert!(raw.deleted);
        assert_eq!(raw.timestamp, 1_001);
        assert_eq!(cache.keys().count(), 0);
    }

    #[tokio::test]
    async fn test_clear_twice_second_timestamp_wins() {
        let clock = ManualClock::new(1_000);
        let storage = MemoryStore::new();
        let cache = local_cache(&clock, &storage);
        cache.set("a", json!(1), None).unwrap();
        cache.set("b", json!(2), None).unwrap();

        cache.clear().unwrap();
        clock.advance(10);
        cache.clear().unwrap();

        for key in ["replica:a", "replica:b"] {
            let entry: CacheEntry = serde_json::from_str(&storage.raw(key).unwrap()).unwrap();
            assert!(entry.deleted);
            assert_eq!(entry.timestamp, 1_010);
        }
        assert_eq!(cache.keys().count(), 0);
    }

    #[tokio::test]
    async fn test_subscribers_notified_synchronously() {
        let cache = local_cache(&ManualClock::new(1), &MemoryStore::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = cache.subscribe("k", move |value: Option<&Value>| {
            sink.lock().push(value.cloned())
        });

        cache.set("k", json!("a"), None).unwrap();
        cache.remove("k").unwrap();
        cache.set("k", json!("b"), None).unwrap();
        cache.clear().unwrap();
        sub.unsubscribe();
        cache.set("k", json!("c"), None).unwrap();

        assert_eq!(
            *seen.lock(),
            vec![Some(json!("a")), None, Some(json!("b")), None]
        );
    }

    #[tokio::test]
    async fn test_clear_notifies_subscribers_of_unknown_keys() {
        let cache = local_cache(&ManualClock::new(1), &MemoryStore::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        cache.subscribe("never-set", move |_: Option<&Value>| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        cache.clear().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_storage_failure_degrades_to_memory() {
        let storage = MemoryStore::with_quota(128);
        let cache = local_cache(&ManualClock::new(1), &storage);

        let err = cache
            .set("big", json!("x".repeat(500)), None)
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::StorageFailure);

        // Still usable locally
        assert_eq!(cache.get("big"), Some(json!("x".repeat(500))));
        assert!(storage.is_empty());
        assert_eq!(cache.stats().storage_failures, 1);
    }

    #[tokio::test]
    async fn test_invalid_key_rejected() {
        let cache = local_cache(&ManualClock::new(1), &MemoryStore::new());
        assert!(matches!(
            cache.set("", json!(1), None),
            Err(CacheError::InvalidRequest(_))
        ));
        assert!(cache.remove("").is_err());
    }

    #[tokio::test]
    async fn test_remote_apply_respects_lww() {
        let clock = ManualClock::new(1_000);
        let cache = local_cache(&clock, &MemoryStore::new());
        cache.set("k", json!("local"), None).unwrap();

        let stale = CacheEntry::live("k", json!("stale"), 60_000, 999);
        assert_eq!(cache.core.apply_remote(stale, Origin::Peer), Applied::Rejected);
        assert_eq!(cache.get("k"), Some(json!("local")));

        let tie_delete = CacheEntry::tombstone("k", 1_000);
        assert_eq!(
            cache.core.apply_remote(tie_delete, Origin::Peer),
            Applied::Written
        );
        assert!(cache.get("k").is_none());

        // A tombstone blocks resurrection by an equal-timestamp write
        let tie_set = CacheEntry::live("k", json!("again"), 60_000, 1_000);
        assert_eq!(
            cache.core.apply_remote(tie_set, Origin::Authority),
            Applied::Rejected
        );
    }

    #[tokio::test]
    async fn test_sweep_purges_expired_live_entries_only() {
        let clock = ManualClock::new(1_000);
        let storage = MemoryStore::new();
        let cache = local_cache(&clock, &storage);
        cache.set("short", json!(1), Some(Duration::from_millis(10))).unwrap();
        cache.set("long", json!(2), Some(Duration::from_secs(60))).unwrap();
        cache.set("gone", json!(3), Some(Duration::from_millis(10))).unwrap();
        cache.remove("gone").unwrap();

        clock.advance(100);
        assert_eq!(cache.sweep_expired(), 1);

        assert!(storage.raw("replica:short").is_none());
        assert!(storage.raw("replica:long").is_some());
        assert!(storage.raw("replica:gone").is_some());
    }

    #[tokio::test]
    async fn test_sync_without_backend_is_skipped() {
        let cache = local_cache(&ManualClock::new(1), &MemoryStore::new());
        assert_eq!(
            cache.sync_now().await.unwrap(),
            SyncOutcome::Skipped(crate::sync::SkipReason::NoBackend)
        );
    }

    #[tokio::test]
    async fn test_dispose_is_idempotent_and_final() {
        let cache = local_cache(&ManualClock::new(1), &MemoryStore::new());
        cache.set("k", json!(1), None).unwrap();
        let _sub = cache.subscribe("k", |_: Option<&Value>| {});

        cache.dispose();
        cache.dispose();

        assert!(cache.is_disposed());
        assert!(cache.core.registry.is_empty());
        assert_eq!(cache.set("k", json!(2), None), Err(CacheError::Disposed));
        assert_eq!(cache.clear(), Err(CacheError::Disposed));
        assert!(cache.get("k").is_none());
        assert_eq!(cache.keys().count(), 0);
        assert_eq!(
            cache.sync_now().await.unwrap(),
            SyncOutcome::Skipped(crate::sync::SkipReason::Disposed)
        );
    }

    #[tokio::test]
    async fn test_long_keys_accepted_locally() {
        let cache = local_cache(&ManualClock::new(1), &MemoryStore::new());
        let key = "k".repeat(300);

        cache.set(&key, json!(1), None).unwrap();
        assert_eq!(cache.get(&key), Some(json!(1)));
        cache.remove(&key).unwrap();
        assert!(cache.get(&key).is_none());
    }

    #[tokio::test]
    async fn test_skewed_sibling_delete_converges() {
        let hub = BroadcastHub::new();
        let a = ReplicaCache::builder(CacheConfig::default())
            .clock(ManualClock::new(1_000))
            .broadcaster(hub.connect())
            .build()
            .unwrap();
        let b = ReplicaCache::builder(CacheConfig::default())
            .clock(ManualClock::new(5_000))
            .broadcaster(hub.connect())
            .build()
            .unwrap();

        b.set("k", json!("b@5000"), None).unwrap();
        while a.get("k").is_none() {
            tokio::task::yield_now().await;
        }

        // a's clock is behind, but its delete still supersedes what it saw
        a.remove("k").unwrap();
        while b.get("k").is_some() {
            tokio::task::yield_now().await;
        }

        assert!(a.get("k").is_none());
        assert!(b.get("k").is_none());
    }

    #[tokio::test]
    async fn test_zero_intervals_rejected() {
        let result = ReplicaCache::builder(CacheConfig {
            sync_interval: Duration::ZERO,
            ..CacheConfig::default()
        })
        .build();
        assert!(matches!(result, Err(CacheError::InvalidRequest(_))));

        let result = ReplicaCache::builder(CacheConfig {
            sweep_interval: Some(Duration::ZERO),
            ..CacheConfig::default()
        })
        .build();
        assert!(matches!(result, Err(CacheError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_subscribe_after_dispose_is_inert() {
        let cache = local_cache(&ManualClock::new(1), &MemoryStore::new());
        cache.dispose();

        let sub = cache.subscribe("k", |_: Option<&Value>| {});
        assert!(!sub.is_active());
        assert!(cache.core.registry.is_empty());
        sub.unsubscribe();
    }

    #[test]
    fn test_build_outside_runtime_fails() {
        let result = ReplicaCache::builder(CacheConfig::default()).build();
        assert!(matches!(result, Err(CacheError::InvalidRequest(_))));
    }
}
