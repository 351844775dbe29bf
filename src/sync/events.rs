//! Sync state and the observable event channel.

use serde::Serialize;

use crate::error::CacheError;

/// Coordinator state machine: `Idle -> Syncing -> {Idle, Retrying} -> Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncState {
    Idle,
    Syncing,
    Retrying,
}

/// Why a sync request did not start a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another pass holds the mutual-exclusion flag
    AlreadySyncing,
    Offline,
    /// No backend configured
    NoBackend,
    Disposed,
}

/// Summary of a completed pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Local changes sent
    pub sent: usize,
    /// Authority updates that won locally
    pub applied: usize,
    /// Authority timestamp of the response
    pub server_timestamp: u64,
    /// Attempts used, 1 when the first one succeeded
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed(SyncReport),
    Skipped(SkipReason),
}

impl SyncOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, SyncOutcome::Completed(_))
    }
}

/// Published on the cache's event channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    Started,
    Completed(SyncReport),
    /// An attempt failed and a retry is scheduled
    AttemptFailed { attempt: u32, error: CacheError },
    /// Retries are exhausted; local changes stay queued
    Exhausted { attempts: u32, error: CacheError },
    /// A fire-and-forget push failed
    PushFailed {
        key: Option<String>,
        error: CacheError,
    },
}
