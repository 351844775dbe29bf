//! Cross-context broadcast channel
//!
//! Same-origin publish/subscribe. A message posted by one context reaches
//! every other connected context and is never echoed back to the sender.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use crate::cache::CacheEntry;
use crate::error::{CacheError, Result};

// == Broadcast Message ==
/// Mutation event exchanged between sibling contexts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BroadcastMessage {
    Set {
        key: String,
        value: Value,
        ttl: u64,
        timestamp: u64,
    },
    Remove {
        key: String,
        timestamp: u64,
    },
    Clear {
        timestamp: u64,
    },
}

impl BroadcastMessage {
    /// Message announcing `entry`'s current state.
    pub fn from_entry(entry: &CacheEntry) -> Self {
        if entry.deleted {
            BroadcastMessage::Remove {
                key: entry.key.clone(),
                timestamp: entry.timestamp,
            }
        } else {
            BroadcastMessage::Set {
                key: entry.key.clone(),
                value: entry.value.clone(),
                ttl: entry.ttl_ms,
                timestamp: entry.timestamp,
            }
        }
    }

    pub fn timestamp(&self) -> u64 {
        match self {
            BroadcastMessage::Set { timestamp, .. }
            | BroadcastMessage::Remove { timestamp, .. }
            | BroadcastMessage::Clear { timestamp } => *timestamp,
        }
    }
}

/// Handle on the cross-context channel owned by one cache instance.
pub trait Broadcaster: Send + Sync + 'static {
    /// Sends to every other context.
    fn post(&self, message: &BroadcastMessage) -> Result<()>;

    /// Takes the inbound queue. Returns None after the first call.
    fn take_inbox(&self) -> Option<mpsc::UnboundedReceiver<BroadcastMessage>>;

    /// Leaves the channel. Idempotent.
    fn close(&self);
}

// == Broadcast Hub ==
struct Peer {
    id: u64,
    sender: mpsc::UnboundedSender<BroadcastMessage>,
}

/// In-process channel joining every context of one origin.
#[derive(Clone, Default)]
pub struct BroadcastHub {
    peers: Arc<Mutex<Vec<Peer>>>,
    next_id: Arc<AtomicU64>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Joins the channel as a new context.
    pub fn connect(&self) -> HubBroadcaster {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();
        self.peers.lock().push(Peer { id, sender });

        HubBroadcaster {
            id,
            peers: Arc::clone(&self.peers),
            inbox: Mutex::new(Some(receiver)),
        }
    }

    /// Number of connected contexts.
    pub fn peer_count(&self) -> usize {
        self.peers.lock().len()
    }
}

/// One context's connection to a [`BroadcastHub`].
pub struct HubBroadcaster {
    id: u64,
    peers: Arc<Mutex<Vec<Peer>>>,
    inbox: Mutex<Option<mpsc::UnboundedReceiver<BroadcastMessage>>>,
}

impl Broadcaster for HubBroadcaster {
    fn post(&self, message: &BroadcastMessage) -> Result<()> {
        let mut peers = self.peers.lock();
        if !peers.iter().any(|peer| peer.id == self.id) {
            return Err(CacheError::Disposed);
        }

        // Drop peers whose receiving side is gone
        peers.retain(|peer| {
            peer.id == self.id || peer.sender.send(message.clone()).is_ok()
        });
        debug!(sender = self.id, recipients = peers.len() - 1, "broadcast posted");
        Ok(())
    }

    fn take_inbox(&self) -> Option<mpsc::UnboundedReceiver<BroadcastMessage>> {
        self.inbox.lock().take()
    }

    fn close(&self) {
        self.peers.lock().retain(|peer| peer.id != self.id);
        self.inbox.lock().take();
    }
}

impl Drop for HubBroadcaster {
    fn drop(&mut self) {
        self.close();
    }
}
