//! Test fixtures with sample data.
//!
//! This module stands up a [`Broker`] over a [`MemoryStore`] and a
//! [`FakeConnector`], and provides pre-built requests.

use crate::mocks::FakeConnector;
use pgfleet_broker::{
    Backend, Broker, BrokerConfig, ClusterRequest, DatabaseRequest, RoleRequest,
};
use pgfleet_broker::store::MemoryStore;
use std::sync::Arc;
use std::time::Duration;

/// Root password submitted by [`cluster_request`].
pub const INITIAL_ROOT_PASSWORD: &str = "initial-root-password";

/// A broker wired to in-memory doubles, with handles on both.
#[derive(Debug, Clone)]
pub struct TestBroker {
    /// The engine
    pub broker: Arc<Broker>,
    /// Config store behind it
    pub store: Arc<MemoryStore>,
    /// Connector behind it
    pub connector: FakeConnector,
}

impl TestBroker {
    /// Broker with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(BrokerConfig::default())
    }

    /// Broker with `config`.
    #[must_use]
    pub fn with_config(config: BrokerConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let connector = FakeConnector::new();
        let broker = Arc::new(Broker::new(
            Arc::clone(&store) as _,
            Arc::new(connector.clone()),
            config,
        ));
        Self {
            broker,
            store,
            connector,
        }
    }

    /// Router over the same broker.
    #[must_use]
    pub fn backend(&self) -> Backend {
        Backend::new(Arc::clone(&self.broker))
    }

    /// Register `cluster` and initialize `database` in it, then clear the
    /// statement log.
    ///
    /// # Panics
    ///
    /// Panics when either registration fails.
    pub async fn with_database(&self, cluster: &str, database: &str) {
        self.broker
            .register_cluster(cluster, &cluster_request())
            .await
            .unwrap_or_else(|e| panic!("register cluster {cluster}: {e}"));
        self.broker
            .register_database(cluster, database, &DatabaseRequest::default())
            .await
            .unwrap_or_else(|e| panic!("register database {database}: {e}"));
        self.connector.reset_log().await;
    }
}

impl Default for TestBroker {
    fn default() -> Self {
        Self::new()
    }
}

/// Cluster registration request for `db.internal`.
#[must_use]
pub fn cluster_request() -> ClusterRequest {
    ClusterRequest::new("db.internal", "postgres", INITIAL_ROOT_PASSWORD)
}

/// Role with the built-in statements and the given TTLs.
#[must_use]
pub fn role_request(default_ttl: Duration, max_ttl: Duration) -> RoleRequest {
    RoleRequest::default().with_ttls(default_ttl, max_ttl)
}

/// Engine configuration with the given system lease limits.
#[must_use]
pub fn broker_config(default_ttl: Duration, max_ttl: Duration) -> BrokerConfig {
    BrokerConfig::default().with_lease_limits(default_ttl, max_ttl)
}
