//! Response DTOs for the backend wire contract

use serde::{Deserialize, Serialize};

use crate::cache::CacheEntry;

/// Body answering `POST /sync`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResponse {
    /// Entries the authority holds that changed after the request's `lastSync`
    #[serde(default)]
    pub updates: Vec<CacheEntry>,
    /// Authority time the pass was served at
    pub timestamp: u64,
}

/// Acknowledgement for the single-item pushes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckResponse {
    pub ok: bool,
    /// Whether the pushed mutation won against the authority's copy
    #[serde(default)]
    pub applied: bool,
}

impl AckResponse {
    pub fn new(applied: bool) -> Self {
        Self { ok: true, applied }
    }
}

/// Response body for the health check endpoint (GET /health)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    /// RFC 3339 time of the check
    pub timestamp: String,
    /// Keys held by the authority, tombstones included
    pub entries: usize,
}

impl HealthResponse {
    pub fn healthy(entries: usize) -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            entries,
        }
    }
}
