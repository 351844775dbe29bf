//! API Handlers
//!
//! A reference authority: the server side of the sync wire contract, holding
//! the authoritative copy of every key and resolving client writes by
//! last-writer-wins.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{extract::State, Json};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::cache::{resolve_against, CacheEntry, Origin};
use crate::clock::{Clock, SystemClock};
use crate::error::{CacheError, Result};
use crate::models::{
    AckResponse, ClearRequest, HealthResponse, RemoveRequest, SetRequest, SyncRequest,
    SyncResponse,
};
use crate::sync::{Backend, Push};

// == Authority ==
/// Application state shared across all handlers.
///
/// Clones share the same entry map. Also usable in-process as a [`Backend`].
#[derive(Clone)]
pub struct Authority {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    clock: Arc<dyn Clock>,
}

impl Authority {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    pub fn with_clock(clock: impl Clock) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            clock: Arc::new(clock),
        }
    }

    /// Keys held, tombstones included.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn entry(&self, key: &str) -> Option<CacheEntry> {
        self.entries.read().await.get(key).cloned()
    }

    /// Inserts `entry` unless the held copy wins. Returns whether it was taken.
    pub async fn apply(&self, entry: CacheEntry) -> bool {
        let mut entries = self.entries.write().await;
        Self::apply_locked(&mut entries, entry)
    }

    fn apply_locked(entries: &mut HashMap<String, CacheEntry>, entry: CacheEntry) -> bool {
        let wins = resolve_against(entries.get(&entry.key), &entry, Origin::Peer).incoming_wins();
        if wins {
            entries.insert(entry.key.clone(), entry);
        } else {
            debug!(key = %entry.key, timestamp = entry.timestamp, "stale client write discarded");
        }
        wins
    }

    // == Sync ==
    /// Applies the client's changes, then answers with everything changed
    /// after its `lastSync` that it did not just send.
    pub async fn sync(&self, request: SyncRequest) -> SyncResponse {
        let mut entries = self.entries.write().await;
        let received = request.changes.len();

        for change in &request.changes {
            Self::apply_locked(&mut entries, change.clone());
        }

        let mut updates: Vec<CacheEntry> = entries
            .values()
            .filter(|entry| entry.timestamp > request.last_sync)
            .filter(|entry| !request.changes.contains(entry))
            .cloned()
            .collect();
        updates.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.key.cmp(&b.key)));

        let timestamp = self.clock.now_ms();
        info!(
            last_sync = request.last_sync,
            received,
            returned = updates.len(),
            "sync served"
        );
        SyncResponse { updates, timestamp }
    }

    /// Tombstones every held key at `timestamp`. Returns the number taken.
    pub async fn clear(&self, timestamp: u64) -> usize {
        let mut entries = self.entries.write().await;
        let keys: Vec<String> = entries.keys().cloned().collect();
        keys.into_iter()
            .filter(|key| Self::apply_locked(&mut entries, CacheEntry::tombstone(key.clone(), timestamp)))
            .count()
    }
}

impl Default for Authority {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for Authority {
    async fn sync(&self, request: SyncRequest) -> Result<SyncResponse> {
        Ok(Authority::sync(self, request).await)
    }

    async fn push(&self, push: Push) -> Result<()> {
        match push {
            Push::Set(req) => {
                self.apply(req.into_entry()).await;
            }
            Push::Remove(req) => {
                self.apply(CacheEntry::tombstone(req.key, req.timestamp)).await;
            }
            Push::Clear(req) => {
                self.clear(req.timestamp).await;
            }
        }
        Ok(())
    }
}

// == Handlers ==
/// Handler for POST /sync
pub async fn sync_handler(
    State(state): State<Authority>,
    Json(req): Json<SyncRequest>,
) -> Result<Json<SyncResponse>> {
    if let Some(error_msg) = req
        .changes
        .iter()
        .find_map(|change| crate::models::validate_key(&change.key))
    {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    Ok(Json(state.sync(req).await))
}

/// Handler for POST /set
///
/// Stores a client's write if it is newer than the held copy.
pub async fn set_handler(
    State(state): State<Authority>,
    Json(req): Json<SetRequest>,
) -> Result<Json<AckResponse>> {
    // Validate request
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let applied = state.apply(req.into_entry()).await;
    Ok(Json(AckResponse::new(applied)))
}

/// Handler for POST /remove
pub async fn remove_handler(
    State(state): State<Authority>,
    Json(req): Json<RemoveRequest>,
) -> Result<Json<AckResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let applied = state
        .apply(CacheEntry::tombstone(req.key, req.timestamp))
        .await;
    Ok(Json(AckResponse::new(applied)))
}

/// Handler for POST /clear
pub async fn clear_handler(
    State(state): State<Authority>,
    Json(req): Json<ClearRequest>,
) -> Json<AckResponse> {
    let cleared = state.clear(req.timestamp).await;
    Json(AckResponse::new(cleared > 0))
}

/// Handler for GET /health
pub async fn health_handler(State(state): State<Authority>) -> Json<HealthResponse> {
    Json(HealthResponse::healthy(state.len().await))
}
