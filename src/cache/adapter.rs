//! Store Adapter Module
//!
//! Namespaced, serializing wrapper over the shared key-value medium.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use crate::cache::CacheEntry;
use crate::error::{CacheError, Result};
use crate::platform::KeyValueStore;

const LAST_SYNC_SUFFIX: &str = "#lastSync";

// == Store Adapter ==
/// Reads and writes [`CacheEntry`] records under `"{prefix}:{key}"`.
///
/// A failed write keeps the entry in an in-memory overlay so the key keeps
/// working locally until the medium accepts a write for it again.
pub struct StoreAdapter {
    medium: Arc<dyn KeyValueStore>,
    prefix: String,
    overlay: Mutex<HashMap<String, CacheEntry>>,
}

impl StoreAdapter {
    pub fn new(medium: Arc<dyn KeyValueStore>, prefix: impl Into<String>) -> Self {
        Self {
            medium,
            prefix: prefix.into(),
            overlay: Mutex::new(HashMap::new()),
        }
    }

    fn storage_key(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }

    fn last_sync_key(&self) -> String {
        format!("{}{}", self.prefix, LAST_SYNC_SUFFIX)
    }

    // == Read ==
    /// Returns the stored entry, or None if missing or unreadable.
    pub fn read(&self, key: &str) -> Option<CacheEntry> {
        if let Some(entry) = self.overlay.lock().get(key) {
            return Some(entry.clone());
        }

        match self.medium.get_item(&self.storage_key(key)) {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(entry) => Some(entry),
                Err(err) => {
                    warn!(key, error = %err, "discarding unreadable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                warn!(key, error = %err, "storage read failed");
                None
            }
        }
    }

    // == Write ==
    /// Full-entry replace.
    pub fn write(&self, entry: &CacheEntry) -> Result<()> {
        let outcome = serde_json::to_string(entry)
            .map_err(CacheError::from)
            .and_then(|raw| self.medium.set_item(&self.storage_key(&entry.key), raw));

        let mut overlay = self.overlay.lock();
        match outcome {
            Ok(()) => {
                overlay.remove(&entry.key);
                Ok(())
            }
            Err(err) => {
                warn!(key = %entry.key, error = %err, "storage write failed, keeping entry in memory");
                overlay.insert(entry.key.clone(), entry.clone());
                Err(err)
            }
        }
    }

    /// Physically removes a key from the medium and the overlay.
    pub fn purge(&self, key: &str) -> Result<()> {
        self.overlay.lock().remove(key);
        self.medium.remove_item(&self.storage_key(key))
    }

    // == Enumerate ==
    /// Every key in this namespace, tombstones included, in sorted order.
    pub fn enumerate_keys(&self) -> Vec<String> {
        let namespace = format!("{}:", self.prefix);
        let mut keys: BTreeSet<String> = match self.medium.keys() {
            Ok(raw_keys) => raw_keys
                .into_iter()
                .filter_map(|raw| raw.strip_prefix(&namespace).map(str::to_string))
                .collect(),
            Err(err) => {
                warn!(error = %err, "storage enumeration failed");
                BTreeSet::new()
            }
        };
        keys.extend(self.overlay.lock().keys().cloned());
        keys.into_iter().collect()
    }

    /// Entries mutated strictly after `since`.
    pub fn entries_since(&self, since: u64) -> Vec<CacheEntry> {
        self.enumerate_keys()
            .iter()
            .filter_map(|key| self.read(key))
            .filter(|entry| entry.timestamp > since)
            .collect()
    }

    // == Sync Bookkeeping ==
    /// Timestamp of the last successful sync pass, 0 if none.
    pub fn last_sync(&self) -> u64 {
        match self.medium.get_item(&self.last_sync_key()) {
            Ok(raw) => raw.and_then(|v| v.parse().ok()).unwrap_or(0),
            Err(err) => {
                warn!(error = %err, "could not read last sync timestamp");
                0
            }
        }
    }

    pub fn set_last_sync(&self, timestamp: u64) -> Result<()> {
        self.medium
            .set_item(&self.last_sync_key(), timestamp.to_string())
    }
}
