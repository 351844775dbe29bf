//! Integration Tests for Replication
//!
//! Cross-context broadcast, offline durability, convergence through the
//! authority, the retry bound, and a real HTTP round trip.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use replica_cache::api::{create_router, Authority};
use replica_cache::models::{SyncRequest, SyncResponse};
use replica_cache::platform::{BroadcastHub, ManualConnectivity, MemoryStore};
use replica_cache::sync::{Backend, Push};
use replica_cache::{
    CacheConfig, CacheError, ManualClock, ReplicaCache, SyncEvent, SyncOutcome, SyncState,
};
use serde_json::{json, Value};
use tokio_test::{assert_err, assert_ok};

// == Helper Functions ==

fn config() -> CacheConfig {
    CacheConfig {
        sync_interval: Duration::from_secs(3600),
        retry_delay: Duration::from_millis(100),
        ..CacheConfig::default()
    }
}

/// Polls `check` until it holds or two seconds pass.
async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

async fn authority_has(authority: &Authority, key: &str) -> bool {
    for _ in 0..200 {
        if authority.entry(key).await.is_some() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

// == Cross-Context Broadcast Tests ==

#[tokio::test]
async fn test_broadcast_reaches_sibling_with_own_storage() {
    let hub = BroadcastHub::new();
    let a = ReplicaCache::builder(config())
        .broadcaster(hub.connect())
        .build()
        .unwrap();
    let b = ReplicaCache::builder(config())
        .broadcaster(hub.connect())
        .build()
        .unwrap();

    a.set("user", json!({"name": "ada"}), None).unwrap();
    assert!(eventually(|| b.get("user") == Some(json!({"name": "ada"}))).await);

    b.remove("user").unwrap();
    assert!(eventually(|| a.get("user").is_none()).await);
}

#[tokio::test]
async fn test_broadcast_notifies_sibling_sharing_storage() {
    let hub = BroadcastHub::new();
    let storage = MemoryStore::new();
    let a = ReplicaCache::builder(config())
        .storage(storage.clone())
        .broadcaster(hub.connect())
        .build()
        .unwrap();
    let b = ReplicaCache::builder(config())
        .storage(storage.clone())
        .broadcaster(hub.connect())
        .build()
        .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let _sub = b.subscribe("shared", move |value: Option<&Value>| {
        if value == Some(&json!(7)) {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    a.set("shared", json!(7), None).unwrap();
    // b sees the write through storage at once, and its listener fires
    // when the broadcast arrives
    assert_eq!(b.get("shared"), Some(json!(7)));
    assert!(eventually(|| calls.load(Ordering::SeqCst) == 1).await);
}

#[tokio::test]
async fn test_disposed_sibling_stops_receiving() {
    let hub = BroadcastHub::new();
    let a = ReplicaCache::builder(config())
        .broadcaster(hub.connect())
        .build()
        .unwrap();
    let b = ReplicaCache::builder(config())
        .broadcaster(hub.connect())
        .build()
        .unwrap();

    b.dispose();
    a.set("k", json!(1), None).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(b.get("k").is_none());
    assert_eq!(hub.peer_count(), 1);
}

// == Offline Durability Tests ==

#[tokio::test]
async fn test_offline_write_reaches_backend_after_reconnect() {
    let authority = Authority::new();
    let connectivity = ManualConnectivity::new(false);
    let cache = ReplicaCache::builder(config())
        .connectivity(connectivity.clone())
        .backend(authority.clone())
        .build()
        .unwrap();

    cache.set("draft", json!("offline edit"), None).unwrap();
    assert_eq!(
        cache.sync_now().await.unwrap(),
        SyncOutcome::Skipped(replica_cache::SkipReason::Offline)
    );
    assert!(authority.entry("draft").await.is_none());
    // Readable locally the whole time
    assert_eq!(cache.get("draft"), Some(json!("offline edit")));

    connectivity.go_online();
    assert!(authority_has(&authority, "draft").await);
    assert_eq!(
        authority.entry("draft").await.unwrap().value,
        json!("offline edit")
    );
}

// == Convergence Tests ==

#[tokio::test]
async fn test_contexts_converge_through_authority() {
    let authority = Authority::with_clock(ManualClock::new(50_000));
    let a = ReplicaCache::builder(config())
        .clock(ManualClock::new(1_000))
        .backend(authority.clone())
        .build()
        .unwrap();
    let b = ReplicaCache::builder(config())
        .clock(ManualClock::new(2_000))
        .backend(authority.clone())
        .build()
        .unwrap();

    a.set("k", json!("from a"), None).unwrap();
    b.set("k", json!("from b"), None).unwrap();

    for cache in [&a, &b, &a, &b] {
        let outcome = assert_ok!(cache.sync_now().await);
        assert!(outcome.is_completed());
    }

    assert_eq!(a.get("k"), Some(json!("from b")));
    assert_eq!(b.get("k"), Some(json!("from b")));
    assert_eq!(authority.entry("k").await.unwrap().timestamp, 2_000);
}

#[tokio::test]
async fn test_clear_twice_converges_on_authority() {
    let authority = Authority::with_clock(ManualClock::new(50_000));
    let clock = ManualClock::new(1_000);
    let cache = ReplicaCache::builder(config())
        .clock(clock.clone())
        .backend(authority.clone())
        .build()
        .unwrap();

    cache.set("a", json!(1), None).unwrap();
    cache.set("b", json!(2), None).unwrap();
    assert_ok!(cache.clear());
    clock.advance(100);
    assert_ok!(cache.clear());
    assert_ok!(cache.sync_now().await);

    for key in ["a", "b"] {
        let held = authority.entry(key).await.unwrap();
        assert!(held.deleted);
    }
    assert_eq!(cache.keys().count(), 0);
}

// == Retry Bound Tests ==

#[derive(Clone, Default)]
struct DownBackend {
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl Backend for DownBackend {
    async fn sync(&self, _request: SyncRequest) -> replica_cache::Result<SyncResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::NetworkFailure("connection refused".to_string()))
    }

    async fn push(&self, _push: Push) -> replica_cache::Result<()> {
        Err(CacheError::NetworkFailure("connection refused".to_string()))
    }
}

#[tokio::test(start_paused = true)]
async fn test_retries_are_bounded_and_observable() {
    let backend = DownBackend::default();
    let cache = ReplicaCache::builder(CacheConfig {
        max_retries: 3,
        retry_delay: Duration::from_secs(5),
        ..config()
    })
    .backend(backend.clone())
    .build()
    .unwrap();
    let mut events = cache.sync_events();

    let err = cache.sync_now().await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(backend.calls.load(Ordering::SeqCst), 4);
    assert_eq!(cache.sync_state(), SyncState::Idle);

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert_eq!(seen.first(), Some(&SyncEvent::Started));
    assert!(matches!(
        seen.last(),
        Some(SyncEvent::Exhausted { attempts: 4, .. })
    ));

    let stats = cache.stats();
    assert_eq!(stats.sync_failures, 1);
    assert!(stats.sync_degraded());
}

// == HTTP Round Trip Tests ==

#[tokio::test]
async fn test_http_backend_round_trip() {
    let authority = Authority::new();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_router(authority.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let remote = CacheConfig {
        backend_url: Some(format!("http://{}", addr)),
        ..config()
    };
    let writer = ReplicaCache::builder(remote.clone()).build().unwrap();
    let reader = ReplicaCache::builder(remote).build().unwrap();

    writer.set("greeting", json!("hello"), None).unwrap();
    let outcome = writer.sync_now().await.unwrap();
    assert!(outcome.is_completed());
    assert!(authority.entry("greeting").await.is_some());

    let outcome = reader.sync_now().await.unwrap();
    assert!(outcome.is_completed());
    assert_eq!(reader.get("greeting"), Some(json!("hello")));
}

#[tokio::test]
async fn test_unreachable_backend_is_network_failure() {
    let cache = ReplicaCache::builder(CacheConfig {
        backend_url: Some("http://127.0.0.1:9".to_string()),
        max_retries: 0,
        ..config()
    })
    .build()
    .unwrap();

    let err = assert_err!(cache.sync_now().await);
    assert_eq!(err.kind(), replica_cache::ErrorKind::NetworkFailure);
}
