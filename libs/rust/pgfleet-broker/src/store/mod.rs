//! Config store adapter.
//!
//! The broker persists every Cluster, Database, Role and Metadata record
//! through [`ConfigStore`], an opaque versioned key-value store supplied by
//! the host. Keys are hierarchical and built from the templates in [`keys`].
//! Absence of a key is `Ok(None)`, never an error.

pub mod memory;

use crate::error::BrokerResult;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

pub use memory::MemoryStore;

/// Errors raised by a store implementation.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backend failed to serve the request
    #[error("Storage error: {0}")]
    Backend(String),

    /// The backend rejected the key
    #[error("Invalid storage key: {0}")]
    InvalidKey(String),
}

/// Key-value storage supplied by the host.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Fetch the raw value stored at `key`.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Write `value` at `key`, replacing any previous value.
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError>;

    /// Remove `key`. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// List the immediate children of `prefix` in ascending order.
    ///
    /// Children that have descendants of their own are returned once with a
    /// trailing `/`, and once more without it when a value is stored at the
    /// child itself.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

/// Storage key templates.
pub mod keys {
    /// Prefix under which every cluster record lives.
    pub const CLUSTER_PREFIX: &str = "config/cluster/";
    /// Prefix under which every role record lives.
    pub const ROLE_PREFIX: &str = "config/role/";
    /// Prefix under which every metadata record lives.
    pub const METADATA_PREFIX: &str = "meta/";

    /// `config/cluster/{cluster}`
    #[must_use]
    pub fn cluster(name: &str) -> String {
        format!("{CLUSTER_PREFIX}{name}")
    }

    /// `config/cluster/{cluster}/database/{database}`
    #[must_use]
    pub fn database(cluster: &str, database: &str) -> String {
        format!("{}{database}", database_prefix(cluster))
    }

    /// `config/cluster/{cluster}/database/`
    #[must_use]
    pub fn database_prefix(cluster: &str) -> String {
        format!("{CLUSTER_PREFIX}{cluster}/database/")
    }

    /// `config/role/{role}`
    #[must_use]
    pub fn role(name: &str) -> String {
        format!("{ROLE_PREFIX}{name}")
    }

    /// `meta/{id}`
    #[must_use]
    pub fn metadata(id: &str) -> String {
        format!("{METADATA_PREFIX}{id}")
    }
}

/// Drop the subtree markers from a [`ConfigStore::list`] result.
#[must_use]
pub fn leaf_names(entries: Vec<String>) -> Vec<String> {
    entries
        .into_iter()
        .filter(|e| !e.ends_with('/'))
        .collect()
}

/// Load and decode the JSON record at `key`.
pub async fn load_json<T: DeserializeOwned>(
    store: &dyn ConfigStore,
    key: &str,
) -> BrokerResult<Option<T>> {
    match store.get(key).await? {
        Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
        None => Ok(None),
    }
}

/// Encode `value` as JSON and store it at `key`.
pub async fn store_json<T: Serialize + ?Sized>(
    store: &dyn ConfigStore,
    key: &str,
    value: &T,
) -> BrokerResult<()> {
    let raw = serde_json::to_vec(value)?;
    store.put(key, raw).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_templates() {
        assert_eq!(keys::cluster("c1"), "config/cluster/c1");
        assert_eq!(keys::database("c1", "d1"), "config/cluster/c1/database/d1");
        assert_eq!(keys::database_prefix("c1"), "config/cluster/c1/database/");
        assert_eq!(keys::role("r"), "config/role/r");
        assert_eq!(keys::metadata("cluster/c1"), "meta/cluster/c1");
    }

    #[test]
    fn test_leaf_names_drops_subtrees() {
        let entries = vec!["c1".to_string(), "c1/".to_string(), "c2".to_string()];
        assert_eq!(leaf_names(entries), vec!["c1", "c2"]);
    }
}
