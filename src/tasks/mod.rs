//! Background Tasks Module
//!
//! Long-running tokio tasks owned by a replica cache:
//! - periodic sync ticker
//! - broadcast inbox pump
//! - connectivity watcher
//! - optional expired-entry sweep
//!
//! Each task holds only a weak reference to the cache and exits once the
//! cache is gone; dispose aborts them outright.

mod connectivity;
mod inbox;
mod sweep;
mod ticker;

pub(crate) use connectivity::spawn_connectivity_watcher;
pub(crate) use inbox::spawn_inbox_pump;
pub(crate) use sweep::spawn_sweep_task;
pub(crate) use ticker::spawn_sync_ticker;
