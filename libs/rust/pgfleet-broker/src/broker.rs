//! The engine instance shared by every operation.

use crate::config::BrokerConfig;
use crate::connection::{ConnectionCache, ConnectionKind};
use crate::error::BrokerResult;
use crate::model::{ClusterConfig, DatabaseConfig, RoleConfig};
use crate::sql::{PgConnector, SqlConnection, SqlConnector, SqlError, SqlTransaction};
use crate::store::{ConfigStore, keys, load_json};
use pgfleet_common::Counter;
use std::sync::Arc;
use tracing::{debug, info};

/// Credential lifecycle counters.
#[derive(Debug)]
pub struct CredentialMetrics {
    /// Credentials issued
    pub issued: Counter,
    /// Leases renewed
    pub renewed: Counter,
    /// Leases revoked
    pub revoked: Counter,
}

impl Default for CredentialMetrics {
    fn default() -> Self {
        Self {
            issued: Counter::new("pgfleet_credentials_issued_total", "Credentials issued"),
            renewed: Counter::new("pgfleet_credentials_renewed_total", "Leases renewed"),
            revoked: Counter::new("pgfleet_credentials_revoked_total", "Leases revoked"),
        }
    }
}

/// Credential broker for a fleet of PostgreSQL clusters.
///
/// Operations are grouped by concern in the `registry`, `clone`, `roles`,
/// `creds`, `gc` and `metadata_index` modules. Each call runs to completion
/// on the caller's task; dropping the future cancels outstanding statements.
pub struct Broker {
    pub(crate) store: Arc<dyn ConfigStore>,
    pub(crate) connections: ConnectionCache,
    pub(crate) config: BrokerConfig,
    pub(crate) metrics: CredentialMetrics,
}

impl std::fmt::Debug for Broker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("connections", &self.connections)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Broker {
    /// Create a broker using `connector` to reach target clusters.
    #[must_use]
    pub fn new(store: Arc<dyn ConfigStore>, connector: Arc<dyn SqlConnector>, config: BrokerConfig) -> Self {
        info!(
            default_lease_ttl = config.lease.default_ttl.as_secs(),
            max_lease_ttl = config.lease.max_ttl.as_secs(),
            "Broker initialized"
        );
        Self {
            store,
            connections: ConnectionCache::new(connector),
            config,
            metrics: CredentialMetrics::default(),
        }
    }

    /// Create a broker talking to PostgreSQL through `sqlx`.
    #[must_use]
    pub fn postgres(store: Arc<dyn ConfigStore>, config: BrokerConfig) -> Self {
        let connector = PgConnector::new(config.connect_timeout, config.statement_timeout);
        Self::new(store, Arc::new(connector), config)
    }

    /// Engine configuration.
    #[must_use]
    pub const fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// The connection cache.
    #[must_use]
    pub const fn connections(&self) -> &ConnectionCache {
        &self.connections
    }

    /// Credential counters.
    #[must_use]
    pub const fn metrics(&self) -> &CredentialMetrics {
        &self.metrics
    }

    /// Close every cached connection.
    pub async fn shutdown(&self) -> Result<usize, SqlError> {
        self.connections.clear().await
    }

    pub(crate) async fn load_cluster(&self, name: &str) -> BrokerResult<Option<ClusterConfig>> {
        load_json(self.store.as_ref(), &keys::cluster(name)).await
    }

    pub(crate) async fn load_database(&self, cluster: &str, database: &str) -> BrokerResult<Option<DatabaseConfig>> {
        load_json(self.store.as_ref(), &keys::database(cluster, database)).await
    }

    pub(crate) async fn load_role(&self, name: &str) -> BrokerResult<Option<RoleConfig>> {
        load_json(self.store.as_ref(), &keys::role(name)).await
    }

    pub(crate) async fn connection(
        &self,
        kind: ConnectionKind,
        cluster: &str,
        database: Option<&str>,
    ) -> BrokerResult<Arc<dyn SqlConnection>> {
        self.connections.get(self.store.as_ref(), kind, cluster, database).await
    }

    /// Begin a transaction on the management connection of `database`.
    ///
    /// A cached handle closed by a concurrent invalidation is replaced once.
    pub(crate) async fn begin_management(&self, cluster: &str, database: &str) -> BrokerResult<Box<dyn SqlTransaction>> {
        let conn = self.connection(ConnectionKind::Management, cluster, Some(database)).await?;
        match conn.begin().await {
            Err(SqlError::Closed) => {
                debug!(cluster, database, "Cached connection was closed, reopening");
                let conn = self.connection(ConnectionKind::Management, cluster, Some(database)).await?;
                Ok(conn.begin().await?)
            }
            other => Ok(other?),
        }
    }

    /// Run one statement on the management connection of `database`.
    pub(crate) async fn execute_management(&self, cluster: &str, database: &str, sql: &str) -> BrokerResult<()> {
        let conn = self.connection(ConnectionKind::Management, cluster, Some(database)).await?;
        match conn.execute(sql).await {
            Err(SqlError::Closed) => {
                debug!(cluster, database, "Cached connection was closed, reopening");
                let conn = self.connection(ConnectionKind::Management, cluster, Some(database)).await?;
                Ok(conn.execute(sql).await?)
            }
            other => Ok(other?),
        }
    }
}
