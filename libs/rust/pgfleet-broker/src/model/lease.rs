//! Lease bookkeeping exchanged with the host.
//!
//! The broker never stores leases. It hands [`LeaseSecret`] to the host at
//! issuance and gets it back on every renew and revoke.

use crate::error::{BrokerError, BrokerResult};
use secrecy::SecretString;
use serde_json::{Map, Value};
use std::time::Duration;

/// Internal data carried by the host's lease record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseSecret {
    /// Role template the credential was issued from
    pub role: String,
    /// Generated login
    pub username: String,
    /// Cluster holding the login
    pub cluster: String,
    /// Database the login was issued for
    pub database: String,
}

impl LeaseSecret {
    /// Decode the internal data map returned by [`LeaseSecret::to_internal`].
    pub fn from_internal(data: &Map<String, Value>) -> BrokerResult<Self> {
        Ok(Self {
            role: internal_str(data, "role")?,
            username: internal_str(data, "username")?,
            cluster: internal_str(data, "cluster")?,
            database: internal_str(data, "database")?,
        })
    }

    /// Encode as the internal data map stored by the host.
    #[must_use]
    pub fn to_internal(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("role".into(), Value::String(self.role.clone()));
        map.insert("username".into(), Value::String(self.username.clone()));
        map.insert("cluster".into(), Value::String(self.cluster.clone()));
        map.insert("database".into(), Value::String(self.database.clone()));
        map
    }
}

fn internal_str(data: &Map<String, Value>, key: &str) -> BrokerResult<String> {
    match data.get(key) {
        None => Err(BrokerError::validation(format!(
            "secret is missing internal data: {key}"
        ))),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(BrokerError::validation(format!(
            "raw value for {key} internal data is not a string"
        ))),
    }
}

/// A freshly issued credential.
#[derive(Debug, Clone)]
pub struct IssuedCredential {
    /// Login name
    pub username: String,
    /// Login password
    pub password: SecretString,
    /// Bookkeeping for renew and revoke
    pub secret: LeaseSecret,
    /// Lease TTL
    pub ttl: Duration,
    /// Lease max TTL
    pub max_ttl: Duration,
}

/// Result of a renewal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenewedLease {
    /// New TTL, zero when the lease is past its max
    pub ttl: Duration,
    /// Max TTL of the role
    pub max_ttl: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret() -> LeaseSecret {
        LeaseSecret {
            role: "readonly".into(),
            username: "app-123".into(),
            cluster: "c1".into(),
            database: "d1".into(),
        }
    }

    #[test]
    fn test_internal_round_trip() {
        let map = secret().to_internal();
        assert_eq!(LeaseSecret::from_internal(&map).unwrap(), secret());
    }

    #[test]
    fn test_missing_key() {
        let mut map = secret().to_internal();
        map.remove("cluster");
        let err = LeaseSecret::from_internal(&map).unwrap_err();
        assert_eq!(err.to_string(), "secret is missing internal data: cluster");
    }

    #[test]
    fn test_non_string_value() {
        let mut map = secret().to_internal();
        map.insert("role".into(), Value::from(5));
        let err = LeaseSecret::from_internal(&map).unwrap_err();
        assert_eq!(err.to_string(), "raw value for role internal data is not a string");
    }
}
