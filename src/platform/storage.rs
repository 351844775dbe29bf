//! Key-value medium
//!
//! The persistent store shared by every context of one origin. Synchronous,
//! string-valued, enumerable.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{CacheError, Result};

/// Synchronous get/set/enumerate medium.
pub trait KeyValueStore: Send + Sync + 'static {
    fn get_item(&self, key: &str) -> Result<Option<String>>;
    fn set_item(&self, key: &str, value: String) -> Result<()>;
    fn remove_item(&self, key: &str) -> Result<()>;
    /// Snapshot of every key currently in the medium.
    fn keys(&self) -> Result<Vec<String>>;
}

#[derive(Debug, Default)]
struct MemoryInner {
    items: HashMap<String, String>,
    used_bytes: usize,
}

/// In-memory medium. Clones share the same data, like two tabs sharing one
/// origin's storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryInner>>,
    quota_bytes: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that rejects writes once keys plus values exceed `quota_bytes`.
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            inner: Arc::default(),
            quota_bytes: Some(quota_bytes),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw stored string, bypassing any adapter.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.inner.read().items.get(key).cloned()
    }
}

impl KeyValueStore for MemoryStore {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.inner.read().items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: String) -> Result<()> {
        let mut inner = self.inner.write();
        let previous = inner
            .items
            .get(key)
            .map(|old| key.len() + old.len())
            .unwrap_or(0);
        let projected = inner.used_bytes - previous + key.len() + value.len();

        if let Some(quota) = self.quota_bytes {
            if projected > quota {
                return Err(CacheError::StorageFailure(format!(
                    "quota of {} bytes exceeded writing '{}'",
                    quota, key
                )));
            }
        }

        inner.used_bytes = projected;
        inner.items.insert(key.to_string(), value);
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        let mut inner = self.inner.write();
        if let Some(old) = inner.items.remove(key) {
            inner.used_bytes -= key.len() + old.len();
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.inner.read().items.keys().cloned().collect())
    }
}
