//! Platform Module
//!
//! Capability interfaces over the host environment: the shared key-value
//! medium, the cross-context channel and connectivity events. Each ships with
//! an in-process implementation.

mod broadcast;
mod connectivity;
mod storage;

pub use broadcast::{BroadcastHub, BroadcastMessage, Broadcaster, HubBroadcaster};
pub use connectivity::{ConnectivityMonitor, ManualConnectivity};
pub use storage::{KeyValueStore, MemoryStore};
