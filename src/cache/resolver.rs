//! Conflict Resolver
//!
//! Last-write-wins by timestamp, applied identically to broadcast messages and
//! backend sync updates.

use crate::cache::CacheEntry;

/// Where an incoming entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// The backend authority
    Authority,
    /// A sibling context (or, on the authority, a client)
    Peer,
}

/// Outcome of [`resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    KeepLocal,
    TakeIncoming,
}

impl Resolution {
    pub fn incoming_wins(self) -> bool {
        self == Resolution::TakeIncoming
    }
}

/// Decides which of two versions of the same key survives.
///
/// Ties: a tombstone beats a live entry; otherwise an entry from the
/// authority beats the local copy, and a peer's entry loses to it.
pub fn resolve(local: &CacheEntry, incoming: &CacheEntry, origin: Origin) -> Resolution {
    use std::cmp::Ordering;

    match incoming.timestamp.cmp(&local.timestamp) {
        Ordering::Greater => Resolution::TakeIncoming,
        Ordering::Less => Resolution::KeepLocal,
        Ordering::Equal => match (local.deleted, incoming.deleted) {
            (false, true) => Resolution::TakeIncoming,
            (true, false) => Resolution::KeepLocal,
            _ if origin == Origin::Authority => Resolution::TakeIncoming,
            _ => Resolution::KeepLocal,
        },
    }
}

/// Resolves against an optional local entry; absence always loses.
pub fn resolve_against(
    local: Option<&CacheEntry>,
    incoming: &CacheEntry,
    origin: Origin,
) -> Resolution {
    match local {
        Some(local) => resolve(local, incoming, origin),
        None => Resolution::TakeIncoming,
    }
}
