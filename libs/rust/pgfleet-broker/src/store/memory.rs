//! In-memory [`ConfigStore`].
//!
//! Ordered map behind an async lock. Used by tests and by hosts that embed the
//! engine without durable storage. A kill switch lets tests simulate an
//! unavailable backend.

use super::{ConfigStore, StoreError};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail (or succeed again).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of stored keys.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the store holds no keys.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("memory store is unavailable".to_string()));
        }
        Ok(())
    }
}

fn validate_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty() || key.ends_with('/') {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.check()?;
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        self.check()?;
        validate_key(key)?;
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.check()?;
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.check()?;
        let entries = self.entries.read().await;

        let mut children = BTreeSet::new();
        for key in entries.range(prefix.to_string()..).map(|(k, _)| k) {
            let Some(rest) = key.strip_prefix(prefix) else {
                break;
            };
            match rest.find('/') {
                Some(idx) => children.insert(rest[..=idx].to_string()),
                None => children.insert(rest.to_string()),
            };
        }

        Ok(children.into_iter().collect())
    }
}
