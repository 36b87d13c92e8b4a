//! Administrative connection cache.
//!
//! Connections are opened lazily from the stored cluster record and kept per
//! `(kind, cluster, database)`. Every invalidation bumps a per-cluster
//! generation; a connection opened while its cluster was invalidated is closed
//! instead of cached, and the lookup starts over with the fresh record.
//!
//! The map lock is never held across I/O. Evicted handles are closed after
//! the lock is released, and closing lets statements already running on them
//! finish.

use crate::error::{BrokerError, BrokerResult};
use crate::model::ClusterConfig;
use crate::sql::{SqlConnection, SqlConnector, SqlError};
use crate::store::{ConfigStore, keys, load_json};
use pgfleet_common::{Counter, Gauge};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

const MAX_OPEN_ATTEMPTS: usize = 3;

/// Which credentials a connection authenticates with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionKind {
    /// The cluster's root login
    Root,
    /// The broker-generated management role
    Management,
}

impl ConnectionKind {
    /// Label used in logs and cache keys.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Management => "management",
        }
    }
}

impl fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cache key. `database` is `None` for the cluster's maintenance database.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    /// Credentials used
    pub kind: ConnectionKind,
    /// Cluster name
    pub cluster: String,
    /// Database name
    pub database: Option<String>,
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.database {
            Some(db) => write!(f, "{}/{}/{db}", self.kind, self.cluster),
            None => write!(f, "{}/{}", self.kind, self.cluster),
        }
    }
}

/// Cache counters.
#[derive(Debug)]
pub struct CacheMetrics {
    /// Connections opened
    pub opened: Counter,
    /// Connections evicted by invalidation
    pub evicted: Counter,
    /// Connections currently cached
    pub cached: Gauge,
}

impl Default for CacheMetrics {
    fn default() -> Self {
        Self {
            opened: Counter::new("pgfleet_connections_opened_total", "Connections opened to target clusters"),
            evicted: Counter::new("pgfleet_connections_evicted_total", "Cached connections evicted by invalidation"),
            cached: Gauge::new("pgfleet_connections_cached", "Connections currently cached"),
        }
    }
}

#[derive(Default)]
struct CacheState {
    conns: HashMap<ConnectionKey, Arc<dyn SqlConnection>>,
    generations: HashMap<String, u64>,
}

impl CacheState {
    fn generation(&self, cluster: &str) -> u64 {
        self.generations.get(cluster).copied().unwrap_or(0)
    }

    fn bump(&mut self, cluster: &str) {
        *self.generations.entry(cluster.to_string()).or_insert(0) += 1;
    }

    fn take(&mut self, pred: impl Fn(&ConnectionKey) -> bool) -> Vec<(ConnectionKey, Arc<dyn SqlConnection>)> {
        let keys: Vec<ConnectionKey> = self.conns.keys().filter(|k| pred(k)).cloned().collect();
        keys.into_iter()
            .filter_map(|k| self.conns.remove(&k).map(|c| (k, c)))
            .collect()
    }
}

/// Keyed cache of pooled administrative connections.
pub struct ConnectionCache {
    connector: Arc<dyn SqlConnector>,
    state: Mutex<CacheState>,
    metrics: CacheMetrics,
}

impl fmt::Debug for ConnectionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionCache")
            .field("cached", &self.metrics.cached.get())
            .finish_non_exhaustive()
    }
}

impl ConnectionCache {
    /// Create an empty cache opening connections through `connector`.
    #[must_use]
    pub fn new(connector: Arc<dyn SqlConnector>) -> Self {
        Self {
            connector,
            state: Mutex::new(CacheState::default()),
            metrics: CacheMetrics::default(),
        }
    }

    /// Cache counters.
    #[must_use]
    pub const fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    /// Number of cached connections.
    pub async fn len(&self) -> usize {
        self.state.lock().await.conns.len()
    }

    /// Whether nothing is cached.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Open a connection outside the cache, for credentials that are not
    /// stored yet. The caller closes it.
    pub async fn open_direct(
        &self,
        cluster: &ClusterConfig,
        kind: ConnectionKind,
    ) -> Result<Arc<dyn SqlConnection>, SqlError> {
        self.open_uncached(cluster, kind, &cluster.database).await
    }

    /// Open a connection to `database` that is never cached, for records
    /// that are soft-deleted and must not repopulate the cache. The caller
    /// closes it.
    pub async fn open_uncached(
        &self,
        cluster: &ClusterConfig,
        kind: ConnectionKind,
        database: &str,
    ) -> Result<Arc<dyn SqlConnection>, SqlError> {
        let conn = self
            .connector
            .connect(&cluster.connect_target(kind, database))
            .await?;
        self.metrics.opened.inc();
        Ok(conn)
    }

    /// Get the cached connection for `(kind, cluster, database)`, opening it
    /// from the stored cluster record when absent.
    #[instrument(skip(self, store))]
    pub async fn get(
        &self,
        store: &dyn ConfigStore,
        kind: ConnectionKind,
        cluster: &str,
        database: Option<&str>,
    ) -> BrokerResult<Arc<dyn SqlConnection>> {
        let key = ConnectionKey {
            kind,
            cluster: cluster.to_string(),
            database: database.map(str::to_string),
        };

        for _ in 0..MAX_OPEN_ATTEMPTS {
            let generation = {
                let state = self.state.lock().await;
                if let Some(conn) = state.conns.get(&key) {
                    return Ok(Arc::clone(conn));
                }
                state.generation(cluster)
            };

            let config: ClusterConfig = load_json(store, &keys::cluster(cluster))
                .await?
                .ok_or_else(|| {
                    BrokerError::not_found(format!("configuration for {cluster} cluster does not exist"))
                })?;

            let db_name = database.unwrap_or(&config.database);
            let conn = self
                .connector
                .connect(&config.connect_target(kind, db_name))
                .await?;
            self.metrics.opened.inc();

            let mut state = self.state.lock().await;
            if state.generation(cluster) != generation {
                drop(state);
                debug!(key = %key, "Cluster invalidated while connecting, discarding connection");
                close_quietly(conn.as_ref()).await;
                continue;
            }

            if let Some(existing) = state.conns.get(&key) {
                let existing = Arc::clone(existing);
                drop(state);
                close_quietly(conn.as_ref()).await;
                return Ok(existing);
            }

            state.conns.insert(key.clone(), Arc::clone(&conn));
            self.metrics.cached.inc();
            debug!(key = %key, "Cached new connection");
            return Ok(conn);
        }

        Err(BrokerError::internal(format!(
            "connection for {key} was invalidated {MAX_OPEN_ATTEMPTS} times while opening"
        )))
    }

    /// Close and evict every connection of `cluster`, root and management.
    ///
    /// Eviction always happens; close failures are reported joined together.
    #[instrument(skip(self))]
    pub async fn invalidate_cluster(&self, cluster: &str) -> Result<usize, SqlError> {
        let evicted = {
            let mut state = self.state.lock().await;
            state.bump(cluster);
            state.take(|k| k.cluster == cluster)
        };
        self.close_evicted(evicted).await
    }

    /// Close and evict the connections opened for one database of `cluster`.
    #[instrument(skip(self))]
    pub async fn invalidate_database(&self, cluster: &str, database: &str) -> Result<usize, SqlError> {
        let evicted = {
            let mut state = self.state.lock().await;
            state.bump(cluster);
            state.take(|k| k.cluster == cluster && k.database.as_deref() == Some(database))
        };
        self.close_evicted(evicted).await
    }

    /// Close and evict everything.
    pub async fn clear(&self) -> Result<usize, SqlError> {
        let evicted = {
            let mut state = self.state.lock().await;
            let clusters: Vec<String> = state.conns.keys().map(|k| k.cluster.clone()).collect();
            for cluster in &clusters {
                state.bump(cluster);
            }
            state.take(|_| true)
        };
        self.close_evicted(evicted).await
    }

    async fn close_evicted(&self, evicted: Vec<(ConnectionKey, Arc<dyn SqlConnection>)>) -> Result<usize, SqlError> {
        let count = evicted.len();
        let mut failures = Vec::new();

        for (key, conn) in evicted {
            self.metrics.evicted.inc();
            self.metrics.cached.dec();
            if let Err(e) = conn.close().await {
                warn!(key = %key, error = %e, "Failed to close evicted connection");
                failures.push(e.to_string());
            }
        }

        if count > 0 {
            info!(count, "Evicted cached connections");
        }

        if failures.is_empty() {
            Ok(count)
        } else {
            Err(SqlError::Close(failures.join("\n")))
        }
    }
}

async fn close_quietly(conn: &dyn SqlConnection) {
    if let Err(e) = conn.close().await {
        debug!(error = %e, "Failed to close discarded connection");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ClusterRequest;
    use crate::sql::{ConnectTarget, SqlTransaction};
    use crate::store::{MemoryStore, store_json};
    use async_trait::async_trait;
    use secrecy::{ExposeSecret, SecretString};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    #[derive(Default)]
    struct CountingConn {
        closed: AtomicUsize,
    }

    #[async_trait]
    impl SqlConnection for CountingConn {
        async fn execute(&self, _sql: &str) -> Result<(), SqlError> {
            Ok(())
        }

        async fn begin(&self) -> Result<Box<dyn SqlTransaction>, SqlError> {
            Err(SqlError::Closed)
        }

        async fn close(&self) -> Result<(), SqlError> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingConnector {
        opened: AtomicUsize,
        last_user: std::sync::Mutex<String>,
    }

    #[async_trait]
    impl SqlConnector for CountingConnector {
        async fn connect(&self, target: &ConnectTarget) -> Result<Arc<dyn SqlConnection>, SqlError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut user) = self.last_user.lock() {
                user.clone_from(&target.username);
            }
            Ok(Arc::new(CountingConn::default()))
        }
    }

    async fn setup() -> (MemoryStore, Arc<CountingConnector>, ConnectionCache) {
        let store = MemoryStore::new();
        let mut cfg = ClusterRequest::new("h", "root", "pw").validate().unwrap();
        cfg.management_role = "v-manage-x".into();
        store_json(&store, &keys::cluster("c1"), &cfg).await.unwrap();

        let connector = Arc::new(CountingConnector::default());
        let cache = ConnectionCache::new(connector.clone());
        (store, connector, cache)
    }

    #[tokio::test]
    async fn test_get_reuses_cached_connection() {
        let (store, connector, cache) = setup().await;

        cache.get(&store, ConnectionKind::Root, "c1", None).await.unwrap();
        cache.get(&store, ConnectionKind::Root, "c1", None).await.unwrap();
        assert_eq!(connector.opened.load(Ordering::SeqCst), 1);

        cache.get(&store, ConnectionKind::Management, "c1", Some("d1")).await.unwrap();
        assert_eq!(connector.opened.load(Ordering::SeqCst), 2);
        assert_eq!(*connector.last_user.lock().unwrap(), "v-manage-x");
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test]
    async fn test_missing_cluster_is_not_found() {
        let (store, _, cache) = setup().await;
        let err = cache.get(&store, ConnectionKind::Root, "nope", None).await.err().unwrap();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_invalidate_cluster_evicts_both_kinds() {
        let (store, connector, cache) = setup().await;
        cache.get(&store, ConnectionKind::Root, "c1", None).await.unwrap();
        cache.get(&store, ConnectionKind::Management, "c1", Some("d1")).await.unwrap();

        assert_eq!(cache.invalidate_cluster("c1").await.unwrap(), 2);
        assert!(cache.is_empty().await);
        assert_eq!(cache.metrics().evicted.get(), 2);
        assert_eq!(cache.metrics().cached.get(), 0);

        cache.get(&store, ConnectionKind::Root, "c1", None).await.unwrap();
        assert_eq!(connector.opened.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_invalidate_does_not_touch_prefix_siblings() {
        let (store, _, cache) = setup().await;
        let cfg: ClusterConfig = load_json(&store, &keys::cluster("c1")).await.unwrap().unwrap();
        store_json(&store, &keys::cluster("c10"), &cfg).await.unwrap();

        cache.get(&store, ConnectionKind::Root, "c1", None).await.unwrap();
        cache.get(&store, ConnectionKind::Root, "c10", None).await.unwrap();

        assert_eq!(cache.invalidate_cluster("c1").await.unwrap(), 1);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_invalidate_database_only() {
        let (store, _, cache) = setup().await;
        cache.get(&store, ConnectionKind::Root, "c1", None).await.unwrap();
        cache.get(&store, ConnectionKind::Management, "c1", Some("d1")).await.unwrap();

        assert_eq!(cache.invalidate_database("c1", "d1").await.unwrap(), 1);
        assert_eq!(cache.len().await, 1);
    }

    /// Parks inside `connect` until released, for the first `parks` calls.
    #[derive(Default)]
    struct ParkingConnector {
        parks: AtomicUsize,
        entered: Notify,
        release: Notify,
        passwords: std::sync::Mutex<Vec<String>>,
        conns: std::sync::Mutex<Vec<Arc<CountingConn>>>,
    }

    impl ParkingConnector {
        fn parking(parks: usize) -> Self {
            Self {
                parks: AtomicUsize::new(parks),
                ..Self::default()
            }
        }

        fn passwords(&self) -> Vec<String> {
            self.passwords.lock().unwrap().clone()
        }

        fn closed(&self) -> Vec<usize> {
            self.conns
                .lock()
                .unwrap()
                .iter()
                .map(|c| c.closed.load(Ordering::SeqCst))
                .collect()
        }
    }

    #[async_trait]
    impl SqlConnector for ParkingConnector {
        async fn connect(&self, target: &ConnectTarget) -> Result<Arc<dyn SqlConnection>, SqlError> {
            self.passwords
                .lock()
                .unwrap()
                .push(target.password.expose_secret().to_string());
            let conn = Arc::new(CountingConn::default());
            self.conns.lock().unwrap().push(Arc::clone(&conn));

            let park = self
                .parks
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if park {
                self.entered.notify_one();
                self.release.notified().await;
            }
            Ok(conn)
        }
    }

    async fn rotate_while_parked(
        store: &MemoryStore,
        connector: &ParkingConnector,
        cache: &ConnectionCache,
        rounds: usize,
    ) {
        for round in 0..rounds {
            connector.entered.notified().await;
            let mut cfg: ClusterConfig = load_json(store, &keys::cluster("c1")).await.unwrap().unwrap();
            cfg.password = SecretString::from(format!("rotated-{round}"));
            store_json(store, &keys::cluster("c1"), &cfg).await.unwrap();
            cache.invalidate_cluster("c1").await.unwrap();
            connector.release.notify_one();
        }
    }

    #[tokio::test]
    async fn test_connection_opened_during_invalidation_is_discarded() {
        let (store, _, _) = setup().await;
        let connector = Arc::new(ParkingConnector::parking(1));
        let cache = ConnectionCache::new(connector.clone());

        let (result, ()) = tokio::join!(
            cache.get(&store, ConnectionKind::Root, "c1", None),
            rotate_while_parked(&store, &connector, &cache, 1),
        );
        result.unwrap();

        // The stale handle was closed and the retry used the rotated record
        assert_eq!(connector.passwords(), vec!["pw", "rotated-0"]);
        assert_eq!(connector.closed(), vec![1, 0]);
        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.metrics().cached.get(), 1);
        assert_eq!(cache.metrics().opened.get(), 2);

        cache.get(&store, ConnectionKind::Root, "c1", None).await.unwrap();
        assert_eq!(connector.passwords().len(), 2);
    }

    #[tokio::test]
    async fn test_repeated_invalidation_gives_up() {
        let (store, _, _) = setup().await;
        let connector = Arc::new(ParkingConnector::parking(MAX_OPEN_ATTEMPTS));
        let cache = ConnectionCache::new(connector.clone());

        let (result, ()) = tokio::join!(
            cache.get(&store, ConnectionKind::Root, "c1", None),
            rotate_while_parked(&store, &connector, &cache, MAX_OPEN_ATTEMPTS),
        );

        let err = result.err().unwrap();
        assert!(err.to_string().contains("invalidated 3 times while opening"));
        assert_eq!(connector.closed(), vec![1; MAX_OPEN_ATTEMPTS]);
        assert!(cache.is_empty().await);
        assert_eq!(cache.metrics().cached.get(), 0);
    }
}
