//! Cache Statistics Module
//!
//! Tracks read outcomes, storage degradation and sync health.

use serde::Serialize;

// == Cache Stats ==
/// Counters for one cache instance.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads that returned a value
    pub hits: u64,
    /// Reads of missing or tombstoned keys
    pub misses: u64,
    /// Reads that found only an expired entry
    pub expired: u64,
    /// Local writes the medium rejected
    pub storage_failures: u64,
    /// Sync passes that completed
    pub sync_passes: u64,
    /// Sync passes that exhausted their retries
    pub sync_failures: u64,
    /// Failed passes since the last success
    pub consecutive_sync_failures: u64,
    /// Server timestamp of the last successful pass
    pub last_sync: Option<u64>,
}

impl CacheStats {
    // == Constructor ==
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Returns hits / all reads, or 0.0 if nothing has been read.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses + self.expired;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// True once a sync pass has given up since the last success.
    pub fn sync_degraded(&self) -> bool {
        self.consecutive_sync_failures > 0
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_expired(&mut self) {
        self.expired += 1;
    }

    pub fn record_storage_failure(&mut self) {
        self.storage_failures += 1;
    }

    pub fn record_sync_success(&mut self, server_timestamp: u64) {
        self.sync_passes += 1;
        self.consecutive_sync_failures = 0;
        self.last_sync = Some(server_timestamp);
    }

    pub fn record_sync_failure(&mut self) {
        self.sync_failures += 1;
        self.consecutive_sync_failures += 1;
    }
}
