//! Cache Module
//!
//! Entries, conflict resolution, the storage adapter and subscriptions.

mod adapter;
mod entry;
mod resolver;
mod stats;
mod subscriptions;


// Re-export public types
pub use adapter::StoreAdapter;
pub use entry::CacheEntry;
pub use resolver::{resolve, resolve_against, Origin, Resolution};
pub use stats::CacheStats;
pub use subscriptions::{Listener, Subscription, SubscriptionRegistry};
