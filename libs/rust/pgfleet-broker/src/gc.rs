//! Garbage collection of soft-deleted clusters and databases.
//!
//! Purging only removes bookkeeping records. Nothing is dropped on the target
//! server, and purging a cluster leaves its database records in place.

use crate::broker::Broker;
use crate::error::{BrokerError, BrokerResult};
use crate::model::{ClusterConfig, DatabaseConfig, Outcome};
use crate::registry::database_missing;
use crate::store::{keys, leaf_names};
use tracing::{info, instrument, warn};

impl Broker {
    /// Names of soft-deleted clusters.
    #[instrument(skip(self))]
    pub async fn gc_list_clusters(&self) -> BrokerResult<Vec<String>> {
        let mut disabled = Vec::new();
        for name in leaf_names(self.store.list(keys::CLUSTER_PREFIX).await?) {
            if self.load_cluster(&name).await?.is_some_and(|c| c.is_disabled()) {
                disabled.push(name);
            }
        }
        Ok(disabled)
    }

    /// Read a soft-deleted cluster.
    #[instrument(skip(self))]
    pub async fn gc_read_cluster(&self, name: &str) -> BrokerResult<ClusterConfig> {
        let cluster = self.load_cluster(name).await?.ok_or_else(|| {
            BrokerError::not_found(format!("Cluster with name {name} is not registered"))
        })?;

        if !cluster.is_disabled() {
            return Err(BrokerError::conflict(format!(
                "Cluster {name} is not marked for GC. Delete the cluster before invoking GC operations on it"
            )));
        }

        Ok(cluster)
    }

    /// Names of soft-deleted databases under `cluster`.
    #[instrument(skip(self))]
    pub async fn gc_list_databases(&self, cluster: &str) -> BrokerResult<Vec<String>> {
        let mut disabled = Vec::new();
        for name in leaf_names(self.store.list(&keys::database_prefix(cluster)).await?) {
            if self
                .load_database(cluster, &name)
                .await?
                .is_some_and(|d| d.is_disabled())
            {
                disabled.push(name);
            }
        }
        Ok(disabled)
    }

    /// Remove a soft-deleted cluster record.
    #[instrument(skip(self))]
    pub async fn gc_purge_cluster(&self, name: &str) -> BrokerResult<Outcome<()>> {
        self.gc_read_cluster(name).await?;
        self.store.delete(&keys::cluster(name)).await?;

        let mut outcome = Outcome::new(());
        if let Err(e) = self.connections.invalidate_cluster(name).await {
            warn!(cluster = name, error = %e, "Failed to close connections of purged cluster");
            outcome.warn(format!("Failed to revoke active connections. error: {e}"));
        }

        info!(cluster = name, "Cluster purged");
        Ok(outcome)
    }

    /// Read a soft-deleted database.
    #[instrument(skip(self))]
    pub async fn gc_read_database(&self, cluster: &str, database: &str) -> BrokerResult<DatabaseConfig> {
        let db = self
            .load_database(cluster, database)
            .await?
            .ok_or_else(|| database_missing(cluster, database))?;

        if !db.is_disabled() {
            return Err(BrokerError::conflict(format!(
                "Database {database} is not marked for GC. Delete the database before invoking GC operations on it"
            )));
        }

        Ok(db)
    }

    /// Remove a soft-deleted database record.
    #[instrument(skip(self))]
    pub async fn gc_purge_database(&self, cluster: &str, database: &str) -> BrokerResult<Outcome<()>> {
        self.gc_read_database(cluster, database).await?;
        self.store.delete(&keys::database(cluster, database)).await?;

        let mut outcome = Outcome::new(());
        if let Err(e) = self.connections.invalidate_database(cluster, database).await {
            outcome.warn(format!("Failed to revoke active connections. error: {e}"));
        }

        info!(cluster, database, "Database purged");
        Ok(outcome)
    }
}
