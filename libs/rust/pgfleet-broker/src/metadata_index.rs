//! Free-form tags on clusters and databases.

use crate::broker::Broker;
use crate::error::{BrokerError, BrokerResult};
use crate::model::metadata::validate_pairs;
use crate::model::{MetadataRecord, MetadataTarget};
use crate::store::{keys, leaf_names, load_json, store_json};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

/// Tags keyed by composite id.
pub type MetadataListing = BTreeMap<String, BTreeMap<String, String>>;

impl Broker {
    /// Attach `data` to a cluster, or to one of its databases, replacing any
    /// previous tags. Returns the composite id.
    #[instrument(skip(self, data))]
    pub async fn write_metadata(
        &self,
        cluster: &str,
        database: Option<&str>,
        data: BTreeMap<String, String>,
    ) -> BrokerResult<String> {
        if self.load_cluster(cluster).await?.is_none() {
            return Err(BrokerError::not_found(format!(
                "Cluster with name {cluster} is not registered"
            )));
        }

        if let Some(db) = database {
            if self.load_database(cluster, db).await?.is_none() {
                return Err(BrokerError::not_found(format!(
                    "Database {db:?} is not registered in cluster {cluster:?}"
                )));
            }
        }

        validate_pairs(&data)?;

        let record = MetadataRecord {
            cluster: cluster.to_string(),
            database: database.map(str::to_string),
            data,
        };
        let id = record.id();
        store_json(self.store.as_ref(), &keys::metadata(&id), &record).await?;

        info!(id = %id, pairs = record.data.len(), "Metadata written");
        Ok(id)
    }

    /// Names of every `target` object whose tags contain all of `matcher`.
    #[instrument(skip(self, matcher))]
    pub async fn lookup_metadata(
        &self,
        target: MetadataTarget,
        matcher: &BTreeMap<String, String>,
    ) -> BrokerResult<Vec<String>> {
        validate_pairs(matcher)?;

        let mut names = Vec::new();
        for record in self.load_metadata(target).await? {
            if record.matches(matcher) {
                names.push(record.name());
            }
        }

        debug!(matches = names.len(), "Metadata lookup finished");
        Ok(names)
    }

    /// Every tag set, cluster and database ones alike.
    #[instrument(skip(self))]
    pub async fn list_metadata(&self) -> BrokerResult<MetadataListing> {
        let mut listing = MetadataListing::new();
        for target in [MetadataTarget::Cluster, MetadataTarget::Database] {
            for record in self.load_metadata(target).await? {
                listing.insert(record.id(), record.data);
            }
        }
        Ok(listing)
    }

    /// Remove a tag set. Removing an unknown id is not an error.
    #[instrument(skip(self))]
    pub async fn delete_metadata(&self, id: &str) -> BrokerResult<()> {
        if id.is_empty() {
            return Err(BrokerError::validation("'id' is required to delete metadata"));
        }
        self.store.delete(&keys::metadata(id)).await?;
        Ok(())
    }

    async fn load_metadata(&self, target: MetadataTarget) -> BrokerResult<Vec<MetadataRecord>> {
        let prefix = format!("{target}/");
        let mut records = Vec::new();
        for entry in leaf_names(self.store.list(&keys::metadata(&prefix)).await?) {
            let key = keys::metadata(&format!("{prefix}{entry}"));
            if let Some(record) = load_json::<MetadataRecord>(self.store.as_ref(), &key).await? {
                records.push(record);
            }
        }
        Ok(records)
    }
}
