//! Clock Module
//!
//! Wall-clock source for mutation timestamps and TTL checks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;

/// Source of wall-clock milliseconds.
pub trait Clock: Send + Sync + 'static {
    /// Current Unix timestamp in milliseconds.
    fn now_ms(&self) -> u64;
}

/// The host's real clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        Utc::now().timestamp_millis().max(0) as u64
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

// == Stamper ==
/// Issues strictly increasing mutation timestamps for one context.
///
/// Two local mutations in the same millisecond would otherwise tie, and a
/// sibling keeps its local copy on a tie.
pub struct Stamper {
    clock: Arc<dyn Clock>,
    last: Mutex<u64>,
}

impl Stamper {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            last: Mutex::new(0),
        }
    }

    /// Current wall-clock time, without reserving a stamp.
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Reserves the next mutation timestamp.
    pub fn next(&self) -> u64 {
        let mut last = self.last.lock();
        let stamp = self.clock.now_ms().max(*last + 1);
        *last = stamp;
        stamp
    }

    /// Raises the floor to a timestamp seen from another context, so the
    /// next local mutation supersedes it even under clock skew.
    pub fn observe(&self, timestamp: u64) {
        let mut last = self.last.lock();
        *last = (*last).max(timestamp);
    }
}
