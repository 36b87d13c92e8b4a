//! Cluster and database registration with soft-delete.

use crate::broker::Broker;
use crate::connection::ConnectionKind;
use crate::error::{BrokerError, BrokerResult};
use crate::model::naming::{self, MAX_IDENTIFIER_LEN};
use crate::model::{ClusterConfig, ClusterRequest, DatabaseConfig, DatabaseRequest, Outcome};
use crate::sql::{Bindings, SqlConnection, execute_template, execute_template_tx};
use crate::statements;
use crate::store::{keys, leaf_names, store_json};
use secrecy::SecretString;
use tracing::{info, instrument, warn};

/// Rotate the password of `user` over `conn` and return the new one.
pub(crate) async fn rotate_password(conn: &dyn SqlConnection, user: &str) -> BrokerResult<SecretString> {
    let password = naming::generate_password();
    let bindings = Bindings::new()
        .identifier("user", user)
        .literal("password", &password);
    execute_template(conn, &bindings, statements::UPDATE_PASSWORD).await?;
    Ok(SecretString::from(password))
}

async fn create_management_role(conn: &dyn SqlConnection) -> BrokerResult<(String, SecretString)> {
    let role = naming::management_role_name();
    let password = naming::generate_password();
    let bindings = Bindings::new()
        .identifier("user", &role)
        .literal("password", &password);
    execute_template(conn, &bindings, statements::CREATE_MANAGEMENT_ROLE).await?;
    Ok((role, SecretString::from(password)))
}

fn cluster_deleted(name: &str) -> BrokerError {
    BrokerError::conflict(format!(
        "Cluster {name} is deleted. Use gc/cluster to manage deleted clusters"
    ))
}

fn cluster_not_registered(name: &str) -> BrokerError {
    BrokerError::not_found(format!("Cluster with name {name} is not registered"))
}

impl Broker {
    /// Register a cluster, or re-register an active one.
    ///
    /// The submitted root password is rotated and a fresh management role is
    /// created on every call. The returned warnings say so.
    #[instrument(skip(self, request), fields(host = %request.host))]
    pub async fn register_cluster(&self, name: &str, request: &ClusterRequest) -> BrokerResult<Outcome<()>> {
        naming::validate_name("cluster", name)?;

        if self.load_cluster(name).await?.is_some_and(|c| c.is_disabled()) {
            return Err(cluster_deleted(name));
        }

        let mut config = request.validate()?;

        let conn = self.connections.open_direct(&config, ConnectionKind::Root).await?;
        let provisioned = async {
            let (role, role_password) = create_management_role(conn.as_ref())
                .await
                .map_err(|e| e.context("failed to create management role"))?;
            let root_password = rotate_password(conn.as_ref(), &config.username)
                .await
                .map_err(|e| e.context("failed to rotate root password"))?;
            Ok::<_, BrokerError>((role, role_password, root_password))
        }
        .await;
        if let Err(e) = conn.close().await {
            warn!(error = %e, "Failed to close registration connection");
        }
        let (role, role_password, root_password) = provisioned?;

        config.management_role.clone_from(&role);
        config.management_password = role_password;
        config.password = root_password;
        store_json(self.store.as_ref(), &keys::cluster(name), &config).await?;

        let mut outcome = Outcome::new(())
            .with_warning("The root password has been rotated. Old password will no longer work")
            .with_warning(format!("A management role with name '{role}' has been created"));

        if let Err(e) = self.connections.invalidate_cluster(name).await {
            outcome.warn(format!(
                "Failed to flush existing connections after update. error: {e}"
            ));
        }

        info!(cluster = name, management_role = %role, "Cluster registered");
        Ok(outcome)
    }

    /// Read an active cluster, credentials included.
    #[instrument(skip(self))]
    pub async fn read_cluster(&self, name: &str) -> BrokerResult<ClusterConfig> {
        let cluster = self
            .load_cluster(name)
            .await?
            .ok_or_else(|| cluster_not_registered(name))?;

        if cluster.is_disabled() {
            return Err(cluster_deleted(name));
        }

        Ok(cluster)
    }

    /// Soft-delete a cluster and drop its cached connections.
    #[instrument(skip(self))]
    pub async fn delete_cluster(&self, name: &str) -> BrokerResult<Outcome<()>> {
        let mut cluster = self.read_cluster(name).await?;
        cluster.disable();
        store_json(self.store.as_ref(), &keys::cluster(name), &cluster).await?;

        let mut outcome = Outcome::new(()).with_warning("Use gc/cluster to manage deleted clusters");
        if let Err(e) = self.connections.invalidate_cluster(name).await {
            warn!(cluster = name, error = %e, "Failed to close connections of deleted cluster");
            outcome.warn(format!("Failed to revoke active connections. error: {e}"));
        }

        info!(cluster = name, "Cluster marked as deleted");
        Ok(outcome)
    }

    /// Every registered cluster name, deleted ones included.
    #[instrument(skip(self))]
    pub async fn list_clusters(&self) -> BrokerResult<Vec<String>> {
        Ok(leaf_names(self.store.list(keys::CLUSTER_PREFIX).await?))
    }

    /// Register a database inside an active cluster, optionally creating it
    /// and its objects owner role on the server.
    #[instrument(skip(self))]
    pub async fn register_database(
        &self,
        cluster: &str,
        database: &str,
        request: &DatabaseRequest,
    ) -> BrokerResult<Outcome<DatabaseConfig>> {
        naming::validate_name("cluster", cluster)?;
        naming::validate_name("database", database)?;

        let cluster_cfg = self
            .load_cluster(cluster)
            .await?
            .ok_or_else(|| cluster_not_registered(cluster))?;

        if cluster_cfg.is_disabled() {
            return Err(BrokerError::conflict(format!(
                "Cluster {cluster} is deleted. Cannot register new databases in deleted cluster"
            )));
        }

        if self.load_database(cluster, database).await?.is_some() {
            return Err(BrokerError::validation(format!(
                "Database {database} is already registered in cluster {cluster}"
            )));
        }

        let objects_owner = if request.objects_owner_role.is_empty() {
            naming::objects_owner_name(database)
        } else {
            naming::truncate(&request.objects_owner_role, MAX_IDENTIFIER_LEN).to_string()
        };

        if request.initialize {
            self.initialize_database(&cluster_cfg, cluster, database, &objects_owner, request.create_db)
                .await?;
        }

        let record = DatabaseConfig {
            cluster: cluster.to_string(),
            database: database.to_string(),
            objects_owner,
            disabled: crate::model::Status::Active,
        };
        store_json(self.store.as_ref(), &keys::database(cluster, database), &record).await?;

        info!(cluster, database, objects_owner = %record.objects_owner, "Database registered");
        Ok(Outcome::new(record))
    }

    async fn initialize_database(
        &self,
        cluster_cfg: &ClusterConfig,
        cluster: &str,
        database: &str,
        objects_owner: &str,
        create_db: bool,
    ) -> BrokerResult<()> {
        if create_db {
            let root = self.connection(ConnectionKind::Root, cluster, None).await?;
            let bindings = Bindings::new().identifier("database", database);
            execute_template(root.as_ref(), &bindings, statements::CREATE_DATABASE)
                .await
                .map_err(|e| BrokerError::from(e).context("failed to create database"))?;
        }

        let bindings = Bindings::new()
            .identifier("role_name", objects_owner)
            .identifier("role_group_management", &cluster_cfg.management_role)
            .identifier("role_group_root", &cluster_cfg.username);

        let mut tx = self.begin_management(cluster, database).await?;
        for template in [statements::CREATE_OBJECTS_OWNER, statements::GRANT_ALL_TO_OWNER] {
            if let Err(e) = execute_template_tx(tx.as_mut(), &bindings, template).await {
                if let Err(rb) = tx.rollback().await {
                    warn!(error = %rb, "Rollback failed");
                }
                return Err(BrokerError::from(e).context("failed to set up objects owner role"));
            }
        }
        tx.commit().await?;
        Ok(())
    }

    /// Read an active database of an active cluster.
    #[instrument(skip(self))]
    pub async fn read_database(&self, cluster: &str, database: &str) -> BrokerResult<DatabaseConfig> {
        let cluster_cfg = self
            .load_cluster(cluster)
            .await?
            .ok_or_else(|| cluster_not_registered(cluster))?;

        if cluster_cfg.is_disabled() {
            return Err(BrokerError::conflict(format!(
                "Database {database} in deleted cluster {cluster} is marked as deleted"
            )));
        }

        let db = self
            .load_database(cluster, database)
            .await?
            .ok_or_else(|| database_missing(cluster, database))?;

        if db.is_disabled() {
            return Err(BrokerError::conflict(format!(
                "Database {database} is deleted. Use gc/ to manage deleted databases"
            )));
        }

        Ok(db)
    }

    /// Soft-delete a database. The parent cluster is left untouched.
    #[instrument(skip(self))]
    pub async fn delete_database(&self, cluster: &str, database: &str) -> BrokerResult<Outcome<()>> {
        let cluster_cfg = self
            .load_cluster(cluster)
            .await?
            .ok_or_else(|| cluster_not_registered(cluster))?;

        if cluster_cfg.is_disabled() {
            return Err(BrokerError::conflict(format!(
                "Cluster {cluster} is deleted. Database {database} is automatically marked as deleted"
            )));
        }

        let mut db = self
            .load_database(cluster, database)
            .await?
            .ok_or_else(|| database_missing(cluster, database))?;

        if db.is_disabled() {
            return Err(BrokerError::conflict(format!("Database {database} is already deleted")));
        }

        db.disable();
        store_json(self.store.as_ref(), &keys::database(cluster, database), &db).await?;

        let mut outcome = Outcome::new(());
        if let Err(e) = self.connections.invalidate_database(cluster, database).await {
            outcome.warn(format!("Failed to revoke active connections. error: {e}"));
        }

        info!(cluster, database, "Database marked as deleted");
        Ok(outcome)
    }

    /// Every registered database name of `cluster`, deleted ones included.
    #[instrument(skip(self))]
    pub async fn list_databases(&self, cluster: &str) -> BrokerResult<Vec<String>> {
        Ok(leaf_names(self.store.list(&keys::database_prefix(cluster)).await?))
    }
}

pub(crate) fn database_missing(cluster: &str, database: &str) -> BrokerError {
    BrokerError::not_found(format!("Database {database} does not exist in cluster {cluster}"))
}
