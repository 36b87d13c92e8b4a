//! Cluster records.

use super::{Status, secret};
use crate::connection::ConnectionKind;
use crate::error::{BrokerError, BrokerResult};
use crate::sql::{ConnectTarget, PoolTuning, SslMode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A registered PostgreSQL server endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Writer host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Root login
    pub username: String,
    /// Root password, rotated by the broker on registration
    #[serde(with = "secret")]
    pub password: SecretString,
    /// Generated management role
    #[serde(default)]
    pub management_role: String,
    /// Password of the management role
    #[serde(with = "secret", default = "empty_secret")]
    pub management_password: SecretString,
    /// Pool size cap
    pub max_open_connections: u32,
    /// Idle pool cap
    pub max_idle_connections: u32,
    /// Connection lifetime in seconds
    pub max_connection_lifetime: u64,
    /// Maintenance database
    pub database: String,
    /// TLS policy
    pub ssl_mode: SslMode,
    /// Soft-delete flag
    #[serde(default)]
    pub disabled: Status,
}

fn empty_secret() -> SecretString {
    SecretString::from(String::new())
}

impl ClusterConfig {
    /// Returns true once the cluster has been soft-deleted.
    #[must_use]
    pub const fn is_disabled(&self) -> bool {
        self.disabled.is_disabled()
    }

    /// Mark the cluster as soft-deleted.
    pub fn disable(&mut self) {
        self.disabled = Status::Disabled;
    }

    /// Pool tuning for every connection to this cluster.
    #[must_use]
    pub const fn pool_tuning(&self) -> PoolTuning {
        PoolTuning {
            max_open: self.max_open_connections,
            max_idle: self.max_idle_connections,
            max_lifetime: Duration::from_secs(self.max_connection_lifetime),
        }
    }

    /// Connection parameters for `database` using root or management credentials.
    #[must_use]
    pub fn connect_target(&self, kind: ConnectionKind, database: &str) -> ConnectTarget {
        let (username, password) = match kind {
            ConnectionKind::Root => (&self.username, &self.password),
            ConnectionKind::Management => (&self.management_role, &self.management_password),
        };

        ConnectTarget {
            host: self.host.clone(),
            port: self.port,
            username: username.clone(),
            password: password.clone(),
            database: database.to_string(),
            ssl_mode: self.ssl_mode,
            pool: self.pool_tuning(),
        }
    }

    /// The record as returned by read endpoints, credentials included.
    #[must_use]
    pub fn to_data(&self) -> serde_json::Value {
        serde_json::json!({
            "host": self.host,
            "port": self.port,
            "username": self.username,
            "password": self.password.expose_secret(),
            "management_role": self.management_role,
            "management_password": self.management_password.expose_secret(),
            "max_open_connections": self.max_open_connections,
            "max_idle_connections": self.max_idle_connections,
            "max_connection_lifetime": self.max_connection_lifetime,
            "database": self.database,
            "ssl_mode": self.ssl_mode.as_str(),
            "disabled": self.is_disabled(),
        })
    }
}

/// Fields accepted when registering or updating a cluster.
#[derive(Debug, Clone)]
pub struct ClusterRequest {
    /// Writer host
    pub host: String,
    /// Server port
    pub port: i64,
    /// Root login
    pub username: String,
    /// Current root password
    pub password: SecretString,
    /// Pool size cap
    pub max_open_connections: u32,
    /// Idle pool cap
    pub max_idle_connections: u32,
    /// Connection lifetime in seconds
    pub max_connection_lifetime: u64,
    /// Maintenance database
    pub database: String,
    /// TLS policy, libpq spelling
    pub ssl_mode: String,
}

impl ClusterRequest {
    /// Request with the default port, pool tuning, database and TLS policy.
    #[must_use]
    pub fn new(host: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 5432,
            username: username.into(),
            password: SecretString::from(password.into()),
            max_open_connections: 5,
            max_idle_connections: 5,
            max_connection_lifetime: 300,
            database: "postgres".to_string(),
            ssl_mode: SslMode::Require.as_str().to_string(),
        }
    }

    /// Check the request and build an active record without management credentials.
    pub fn validate(&self) -> BrokerResult<ClusterConfig> {
        if self.host.is_empty() {
            return Err(BrokerError::validation("Invalid host value"));
        }

        let port = u16::try_from(self.port)
            .ok()
            .filter(|p| *p >= 1)
            .ok_or_else(|| BrokerError::validation(format!("Invalid port number {}", self.port)))?;

        if self.username.is_empty() {
            return Err(BrokerError::validation("Username must be set"));
        }

        if self.database.is_empty() {
            return Err(BrokerError::validation("Maintenance database must be set"));
        }

        let ssl_mode = SslMode::parse(&self.ssl_mode).ok_or_else(|| {
            BrokerError::validation(format!(
                "Invalid ssl_mode {}, valid options are 'disable', 'require', 'verify-ca', or 'verify-full'",
                self.ssl_mode
            ))
        })?;

        Ok(ClusterConfig {
            host: self.host.clone(),
            port,
            username: self.username.clone(),
            password: self.password.clone(),
            management_role: String::new(),
            management_password: empty_secret(),
            max_open_connections: self.max_open_connections,
            max_idle_connections: self.max_idle_connections,
            max_connection_lifetime: self.max_connection_lifetime,
            database: self.database.clone(),
            ssl_mode,
            disabled: Status::Active,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ClusterRequest {
        ClusterRequest::new("db.internal", "postgres", "initial")
    }

    #[test]
    fn test_defaults() {
        let cfg = request().validate().unwrap();
        assert_eq!(cfg.port, 5432);
        assert_eq!(cfg.database, "postgres");
        assert_eq!(cfg.ssl_mode, SslMode::Require);
        assert_eq!(cfg.pool_tuning().max_lifetime, Duration::from_secs(300));
        assert!(!cfg.is_disabled());
    }

    #[test]
    fn test_validation_messages() {
        let mut r = request();
        r.host = String::new();
        assert_eq!(r.validate().unwrap_err().to_string(), "Invalid host value");

        let mut r = request();
        r.port = 70000;
        assert_eq!(r.validate().unwrap_err().to_string(), "Invalid port number 70000");
        r.port = 0;
        assert!(r.validate().is_err());

        let mut r = request();
        r.username = String::new();
        assert_eq!(r.validate().unwrap_err().to_string(), "Username must be set");

        let mut r = request();
        r.database = String::new();
        assert_eq!(r.validate().unwrap_err().to_string(), "Maintenance database must be set");

        let mut r = request();
        r.ssl_mode = "prefer".into();
        assert!(r.validate().unwrap_err().to_string().starts_with("Invalid ssl_mode prefer"));
    }

    #[test]
    fn test_connect_target_picks_credentials() {
        let mut cfg = request().validate().unwrap();
        cfg.management_role = "v-manage-1".into();
        cfg.management_password = SecretString::from("mgmt".to_string());

        let root = cfg.connect_target(ConnectionKind::Root, "postgres");
        assert_eq!(root.username, "postgres");
        assert_eq!(root.password.expose_secret(), "initial");

        let mgmt = cfg.connect_target(ConnectionKind::Management, "d1");
        assert_eq!(mgmt.username, "v-manage-1");
        assert_eq!(mgmt.password.expose_secret(), "mgmt");
        assert_eq!(mgmt.database, "d1");
    }

    #[test]
    fn test_stored_record_round_trips_credentials() {
        let mut cfg = request().validate().unwrap();
        cfg.disable();
        let raw = serde_json::to_vec(&cfg).unwrap();
        let back: ClusterConfig = serde_json::from_slice(&raw).unwrap();
        assert_eq!(back.password.expose_secret(), "initial");
        assert!(back.is_disabled());
        assert_eq!(cfg.to_data()["disabled"], true);
    }
}
