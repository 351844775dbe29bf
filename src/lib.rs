//! Replica Cache - A replicated client-side key-value cache
//!
//! Write-through persistence, TTL expiry, cross-context broadcast with
//! last-writer-wins reconciliation, and periodic sync with a backend
//! authority. The `api` module holds a reference authority server.

pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod platform;
pub mod sync;

mod replica;
mod tasks;

pub use cache::{CacheEntry, CacheStats, Origin, Subscription};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CacheConfig, ServerConfig};
pub use error::{CacheError, ErrorKind, Result};
pub use replica::{CacheBuilder, Keys, ReplicaCache};
pub use sync::{SkipReason, SyncEvent, SyncOutcome, SyncReport, SyncState};
