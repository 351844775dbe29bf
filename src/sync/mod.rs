//! Sync Module
//!
//! Reconciliation with the backend authority.

mod backend;
mod coordinator;
mod events;

pub use backend::{Backend, HttpBackend, Push};
pub use coordinator::{RetryPolicy, SyncCoordinator, SyncTarget};
pub use events::{SkipReason, SyncEvent, SyncOutcome, SyncReport, SyncState};
