//! Cloning a cluster registration onto a new endpoint.

use crate::broker::Broker;
use crate::connection::ConnectionKind;
use crate::error::{BrokerError, BrokerResult};
use crate::model::{DatabaseConfig, Outcome, Status, naming};
use crate::registry::rotate_password;
use crate::store::{keys, leaf_names, load_json, store_json};
use tracing::{info, instrument, warn};

/// Fields accepted by a clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneRequest {
    /// Name for the new cluster
    pub target: String,
    /// Host of the cloned server
    pub host: String,
    /// Port of the cloned server
    pub port: i64,
    /// Also copy databases that were soft-deleted in the source
    pub inherit_deleted_db: bool,
}

impl CloneRequest {
    /// Clone onto `host` on the default port, skipping deleted databases.
    #[must_use]
    pub fn new(target: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            host: host.into(),
            port: 5432,
            inherit_deleted_db: false,
        }
    }
}

impl Broker {
    /// Register `request.target` as a copy of `source` living on a new host.
    ///
    /// The cloned server must accept the source's management and root
    /// credentials; both are rotated there before the new record is stored.
    /// Database records are copied one by one and failures are reported as
    /// warnings.
    #[instrument(skip(self, request), fields(target = %request.target, host = %request.host))]
    pub async fn clone_cluster(&self, source: &str, request: &CloneRequest) -> BrokerResult<Outcome<()>> {
        if request.host.is_empty() {
            return Err(BrokerError::validation("Invalid host value"));
        }

        let port = u16::try_from(request.port)
            .ok()
            .filter(|p| *p >= 1)
            .ok_or_else(|| {
                BrokerError::validation(format!(
                    "Invalid port number {}, a valid port number between 1 and 65535 is required",
                    request.port
                ))
            })?;

        let mut cluster = self.load_cluster(source).await?.ok_or_else(|| {
            BrokerError::not_found(format!(
                "Source cluster {source} is not configured. Use cluster/{source} to configure it first"
            ))
        })?;

        if cluster.is_disabled() {
            return Err(BrokerError::conflict(format!(
                "Deleted source cluster {source} cannot be cloned"
            )));
        }

        let target = request.target.as_str();
        if target.is_empty() {
            return Err(BrokerError::validation("target cluster name cannot be empty"));
        }
        naming::validate_name("cluster", target)?;

        if self.load_cluster(target).await?.is_some() {
            return Err(BrokerError::validation(format!(
                "Duplicate value for target cluster {target}. A cluster with name {target} is already configured"
            )));
        }

        cluster.host.clone_from(&request.host);
        cluster.port = port;
        cluster.disabled = Status::Active;
        let mut outcome = Outcome::new(());

        let mgmt = self
            .connections
            .open_direct(&cluster, ConnectionKind::Management)
            .await
            .map_err(|e| BrokerError::from(e).context("failed to connect with clone as existing management user"))?;
        if let Err(e) = mgmt.close().await {
            outcome.warn(format!("failed to close old management user connection. {e}"));
        }

        let root = self
            .connections
            .open_direct(&cluster, ConnectionKind::Root)
            .await
            .map_err(|e| BrokerError::from(e).context("failed to connect with clone as existing root user"))?;

        let rotated = async {
            let mgmt_password = rotate_password(root.as_ref(), &cluster.management_role)
                .await
                .map_err(|e| e.context("failed to rotate the password for management user"))?;
            let root_password = rotate_password(root.as_ref(), &cluster.username)
                .await
                .map_err(|e| e.context("failed to rotate the password for root user"))?;
            Ok::<_, BrokerError>((mgmt_password, root_password))
        }
        .await;
        if let Err(e) = root.close().await {
            warn!(error = %e, "Failed to close clone root connection");
        }
        let (mgmt_password, root_password) = rotated?;

        cluster.management_password = mgmt_password;
        cluster.password = root_password;

        store_json(self.store.as_ref(), &keys::cluster(target), &cluster)
            .await
            .map_err(|e| e.context("failed to store the configuration for clone cluster"))?;

        let (total, copied) = self
            .copy_databases(source, target, request.inherit_deleted_db, &mut outcome)
            .await;
        outcome.warn(format!("{copied} of {total} databases inherited successfully"));

        info!(source, target, copied, total, "Cluster cloned");
        Ok(outcome)
    }

    async fn copy_databases(
        &self,
        source: &str,
        target: &str,
        inherit_deleted: bool,
        outcome: &mut Outcome<()>,
    ) -> (usize, usize) {
        let names = match self.store.list(&keys::database_prefix(source)).await {
            Ok(entries) => leaf_names(entries),
            Err(e) => {
                outcome.warn(format!("failed to list databases in existing cluster. {e}"));
                return (0, 0);
            }
        };

        let total = names.len();
        let mut copied = 0;

        for name in names {
            let loaded: BrokerResult<Option<DatabaseConfig>> =
                load_json(self.store.as_ref(), &keys::database(source, &name)).await;
            let mut db = match loaded {
                Ok(Some(db)) => db,
                Ok(None) => {
                    outcome.warn(format!(
                        "failed to load configuration for existing database {name}. record disappeared"
                    ));
                    continue;
                }
                Err(e) => {
                    outcome.warn(format!("failed to load configuration for existing database {name}. {e}"));
                    continue;
                }
            };

            if db.is_disabled() && !inherit_deleted {
                continue;
            }

            db.cluster = target.to_string();
            if let Err(e) = store_json(self.store.as_ref(), &keys::database(target, &name), &db).await {
                outcome.warn(format!("failed to store configuration for cloned database {name}. {e}"));
                continue;
            }
            copied += 1;
        }

        (total, copied)
    }
}
