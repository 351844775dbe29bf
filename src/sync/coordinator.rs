//! Sync Coordinator
//!
//! Reconciles local changes with the backend authority: one pass at a time,
//! bounded retries with a fixed delay, nothing attempted while offline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use crate::cache::{CacheEntry, CacheStats};
use crate::clock::Clock;
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::models::SyncRequest;
use crate::platform::ConnectivityMonitor;
use crate::sync::{Backend, Push, SkipReason, SyncEvent, SyncOutcome, SyncReport, SyncState};

const EVENT_CAPACITY: usize = 64;

/// What a sync pass reads from and writes to.
pub trait SyncTarget: Send + Sync {
    /// Persisted lower bound of the next pass, 0 before the first success.
    fn last_sync(&self) -> u64;
    /// Local entries mutated strictly after `since`.
    fn changes_since(&self, since: u64) -> Vec<CacheEntry>;
    /// Resolves an authority update against local state; true if it won.
    fn apply_update(&self, update: CacheEntry) -> bool;
    fn commit_last_sync(&self, timestamp: u64) -> Result<()>;
}

/// Retry and timeout knobs.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub retry_delay: Duration,
    /// Additional attempts after the first failure
    pub max_retries: u32,
    pub request_timeout: Duration,
}

impl From<&CacheConfig> for RetryPolicy {
    fn from(config: &CacheConfig) -> Self {
        Self {
            retry_delay: config.retry_delay,
            max_retries: config.max_retries,
            request_timeout: config.request_timeout,
        }
    }
}

// == Sync Coordinator ==
pub struct SyncCoordinator {
    backend: Option<Arc<dyn Backend>>,
    connectivity: Arc<dyn ConnectivityMonitor>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
    runtime: Option<Handle>,
    stats: Arc<Mutex<CacheStats>>,
    state: Mutex<SyncState>,
    /// The only explicit lock: guards against overlapping passes
    in_flight: AtomicBool,
    shutdown: watch::Sender<bool>,
    events: broadcast::Sender<SyncEvent>,
}

/// Releases the mutual-exclusion flag however the pass ends, including when
/// its future is dropped.
struct PassGuard<'a>(&'a SyncCoordinator);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        *self.0.state.lock() = SyncState::Idle;
        self.0.in_flight.store(false, Ordering::SeqCst);
    }
}

impl SyncCoordinator {
    /// Pushes are spawned on the runtime current at construction, if any.
    pub fn new(
        backend: Option<Arc<dyn Backend>>,
        connectivity: Arc<dyn ConnectivityMonitor>,
        clock: Arc<dyn Clock>,
        policy: RetryPolicy,
        stats: Arc<Mutex<CacheStats>>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            backend,
            connectivity,
            clock,
            policy,
            runtime: Handle::try_current().ok(),
            stats,
            state: Mutex::new(SyncState::Idle),
            in_flight: AtomicBool::new(false),
            shutdown,
            events,
        }
    }

    pub fn state(&self) -> SyncState {
        *self.state.lock()
    }

    pub fn is_syncing(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn is_disposed(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: SyncEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }

    /// Stops future passes and interrupts a pending retry delay. Idempotent.
    pub fn dispose(&self) {
        self.shutdown.send_replace(true);
    }

    // == Run Pass ==
    /// Runs one sync pass, retrying per policy.
    ///
    /// Returns the final error once retries are exhausted; it is also
    /// published as [`SyncEvent::Exhausted`].
    pub async fn run(&self, target: &dyn SyncTarget) -> Result<SyncOutcome> {
        if self.is_disposed() {
            return Ok(SyncOutcome::Skipped(SkipReason::Disposed));
        }
        let Some(backend) = self.backend.clone() else {
            return Ok(SyncOutcome::Skipped(SkipReason::NoBackend));
        };
        if !self.connectivity.is_online() {
            debug!("offline, sync pass skipped");
            return Ok(SyncOutcome::Skipped(SkipReason::Offline));
        }
        if self.in_flight.swap(true, Ordering::SeqCst) {
            debug!("sync already in progress, trigger dropped");
            return Ok(SyncOutcome::Skipped(SkipReason::AlreadySyncing));
        }
        let _guard = PassGuard(self);

        *self.state.lock() = SyncState::Syncing;
        self.emit(SyncEvent::Started);

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let error = match self.attempt(backend.as_ref(), target).await {
                Ok(mut report) => {
                    report.attempts = attempt;
                    self.stats.lock().record_sync_success(report.server_timestamp);
                    info!(
                        sent = report.sent,
                        applied = report.applied,
                        attempts = attempt,
                        "sync pass completed"
                    );
                    self.emit(SyncEvent::Completed(report.clone()));
                    return Ok(SyncOutcome::Completed(report));
                }
                Err(_) if self.is_disposed() => {
                    return Ok(SyncOutcome::Skipped(SkipReason::Disposed));
                }
                Err(error) => error,
            };

            if !error.is_retryable() || attempt > self.policy.max_retries {
                self.stats.lock().record_sync_failure();
                error!(attempts = attempt, error = %error, "sync pass gave up");
                self.emit(SyncEvent::Exhausted {
                    attempts: attempt,
                    error: error.clone(),
                });
                return Err(error);
            }

            warn!(attempt, error = %error, "sync attempt failed, retrying");
            self.emit(SyncEvent::AttemptFailed { attempt, error });
            *self.state.lock() = SyncState::Retrying;

            if !self.wait_retry_delay().await {
                return Ok(SyncOutcome::Skipped(SkipReason::Disposed));
            }
            if !self.connectivity.is_online() {
                debug!("went offline while retrying, pass abandoned");
                return Ok(SyncOutcome::Skipped(SkipReason::Offline));
            }
            *self.state.lock() = SyncState::Syncing;
        }
    }

    /// Sleeps for the retry delay; false if disposed meanwhile.
    async fn wait_retry_delay(&self) -> bool {
        let mut shutdown = self.shutdown.subscribe();
        let disposed = async move {
            let _ = shutdown.wait_for(|disposed| *disposed).await;
        };
        tokio::select! {
            _ = tokio::time::sleep(self.policy.retry_delay) => !self.is_disposed(),
            _ = disposed => false,
        }
    }

    async fn attempt(&self, backend: &dyn Backend, target: &dyn SyncTarget) -> Result<SyncReport> {
        let started = self.clock.now_ms();
        let last_sync = target.last_sync();
        let changes = target.changes_since(last_sync);
        let sent = changes.len();
        debug!(last_sync, sent, "sync attempt");

        let request = SyncRequest { last_sync, changes };
        let response = tokio::time::timeout(self.policy.request_timeout, backend.sync(request))
            .await
            .map_err(|_| {
                CacheError::NetworkFailure(format!(
                    "sync timed out after {:?}",
                    self.policy.request_timeout
                ))
            })??;

        if self.is_disposed() {
            return Err(CacheError::Disposed);
        }

        let server_timestamp = response.timestamp;
        let applied = response
            .updates
            .into_iter()
            .filter(|update| target.apply_update(update.clone()))
            .count();

        // Writes stamped while the request was in flight must stay above the
        // committed bound.
        let committed = server_timestamp.min(started.saturating_sub(1));
        if let Err(err) = target.commit_last_sync(committed) {
            warn!(error = %err, "could not persist last sync, next pass resends");
        }

        Ok(SyncReport {
            sent,
            applied,
            server_timestamp,
            attempts: 0,
        })
    }

    // == Push ==
    /// Fire-and-forget single-item propagation. Failures are logged and
    /// published, never returned.
    pub fn push_in_background(&self, push: Push) {
        let (Some(backend), Some(runtime)) = (self.backend.clone(), self.runtime.as_ref()) else {
            return;
        };
        if self.is_disposed() || !self.connectivity.is_online() {
            debug!(key = ?push.key(), "push skipped");
            return;
        }

        let timeout = self.policy.request_timeout;
        let events = self.events.clone();
        let shutdown = self.shutdown.subscribe();
        runtime.spawn(async move {
            let key = push.key().map(str::to_string);
            let outcome = tokio::time::timeout(timeout, backend.push(push))
                .await
                .unwrap_or_else(|_| {
                    Err(CacheError::NetworkFailure(format!(
                        "push timed out after {:?}",
                        timeout
                    )))
                });

            match outcome {
                Ok(()) => debug!(?key, "push acknowledged"),
                Err(_) if *shutdown.borrow() => {}
                Err(error) => {
                    warn!(?key, error = %error, "push failed, next sync pass carries it");
                    let _ = events.send(SyncEvent::PushFailed { key, error });
                }
            }
        });
    }
}
