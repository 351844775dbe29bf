//! Request DTOs for the backend wire contract
//!
//! Bodies the cache POSTs to the authority.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::CacheEntry;

/// Body of `POST /sync`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    /// Server timestamp of the last successful pass
    pub last_sync: u64,
    /// Local entries mutated after `last_sync`
    #[serde(default)]
    pub changes: Vec<CacheEntry>,
}

/// Body of `POST /set`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetRequest {
    pub key: String,
    #[serde(default)]
    pub value: Value,
    /// TTL in milliseconds
    #[serde(default)]
    pub ttl: u64,
    pub timestamp: u64,
}

impl SetRequest {
    pub fn from_entry(entry: &CacheEntry) -> Self {
        Self {
            key: entry.key.clone(),
            value: entry.value.clone(),
            ttl: entry.ttl_ms,
            timestamp: entry.timestamp,
        }
    }

    pub fn into_entry(self) -> CacheEntry {
        CacheEntry::live(self.key, self.value, self.ttl, self.timestamp)
    }

    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        validate_key(&self.key)
    }
}

/// Body of `POST /remove`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoveRequest {
    pub key: String,
    pub timestamp: u64,
}

impl RemoveRequest {
    pub fn validate(&self) -> Option<String> {
        validate_key(&self.key)
    }
}

/// Body of `POST /clear`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearRequest {
    pub timestamp: u64,
}

/// Shared key rule: any non-empty string.
pub fn validate_key(key: &str) -> Option<String> {
    if key.is_empty() {
        return Some("Key cannot be empty".to_string());
    }
    None
}
