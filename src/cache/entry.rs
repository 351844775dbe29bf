//! Cache Entry Module
//!
//! Defines the unit of replication: a timestamped, TTL-bound, possibly
//! tombstoned value.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// == Cache Entry ==
/// Represents a single replicated cache entry.
///
/// The serialized form is also the wire form of a sync change:
/// `{key, value, ttl, timestamp, deleted}` with `ttl` in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Key, unique within the namespace
    pub key: String,
    /// Opaque payload, null for tombstones
    #[serde(default)]
    pub value: Value,
    /// Wall-clock milliseconds of the last mutation
    pub timestamp: u64,
    /// Validity window in milliseconds, counted from `timestamp`
    #[serde(rename = "ttl", default)]
    pub ttl_ms: u64,
    /// Tombstone flag
    #[serde(default)]
    pub deleted: bool,
}

impl CacheEntry {
    // == Constructors ==
    /// Creates a live entry.
    pub fn live(key: impl Into<String>, value: Value, ttl_ms: u64, timestamp: u64) -> Self {
        Self {
            key: key.into(),
            value,
            timestamp,
            ttl_ms,
            deleted: false,
        }
    }

    /// Creates a tombstone. The timestamp is kept so the delete can still win
    /// or lose against concurrent writes.
    pub fn tombstone(key: impl Into<String>, timestamp: u64) -> Self {
        Self {
            key: key.into(),
            value: Value::Null,
            timestamp,
            ttl_ms: 0,
            deleted: true,
        }
    }

    /// Turns this entry into a tombstone stamped at `timestamp`.
    pub fn into_tombstone(self, timestamp: u64) -> Self {
        Self::tombstone(self.key, timestamp)
    }

    // == Is Expired ==
    /// An entry is expired once strictly more than `ttl_ms` has elapsed since
    /// its timestamp.
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.timestamp) > self.ttl_ms
    }

    /// Whether `get` may return this entry's value at `now_ms`.
    pub fn is_visible_at(&self, now_ms: u64) -> bool {
        !self.deleted && !self.is_expired_at(now_ms)
    }
}
