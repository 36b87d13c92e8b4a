//! Path based request router.
//!
//! Translates `(operation, path, data)` requests from the host into engine
//! calls. Caller errors (not found, validation, state conflict) come back as
//! a [`Response`] carrying the message in `error`; upstream failures are
//! returned as `Err` so the host can treat them as fatal.

pub mod fields;

use crate::broker::Broker;
use crate::clone::CloneRequest;
use crate::error::{BrokerError, BrokerResult};
use crate::model::naming::is_valid_name;
use crate::model::{ClusterRequest, DatabaseRequest, LeaseSecret, MetadataTarget, Outcome, RoleRequest};
use chrono::{DateTime, Utc};
use pgfleet_common::Classify;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// Request operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Read a record or run a lookup
    Read,
    /// Create or replace
    Update,
    /// Delete or purge
    Delete,
    /// List children
    List,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::List => "list",
        })
    }
}

/// A request from the host.
#[derive(Debug, Clone)]
pub struct Request {
    /// Operation
    pub operation: Operation,
    /// Path relative to the mount
    pub path: String,
    /// Request fields
    pub data: Map<String, Value>,
    /// Caller display name, prefixes issued usernames
    pub display_name: String,
}

impl Request {
    /// Request with no fields.
    #[must_use]
    pub fn new(operation: Operation, path: impl Into<String>) -> Self {
        Self {
            operation,
            path: path.into(),
            data: Map::new(),
            display_name: "token".to_string(),
        }
    }

    /// Set the request fields. Non-object values are ignored.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        if let Value::Object(map) = data {
            self.data = map;
        }
        self
    }

    /// Set the caller display name.
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }
}

/// Lease attached to a response.
#[derive(Debug, Clone, Serialize)]
pub struct LeaseInfo {
    /// Lease TTL in seconds
    pub ttl: u64,
    /// Lease max TTL in seconds
    pub max_ttl: u64,
    /// Bookkeeping the host must hand back on renew and revoke
    pub internal: Map<String, Value>,
}

/// Response to the host.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Response {
    /// Response payload
    pub data: Map<String, Value>,
    /// Caller-visible warnings
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    /// Caller error message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Lease for issued or renewed credentials
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lease: Option<LeaseInfo>,
}

impl Response {
    /// Response carrying `data`.
    #[must_use]
    pub fn with_data(data: Value) -> Self {
        Self {
            data: match data {
                Value::Object(map) => map,
                _ => Map::new(),
            },
            ..Self::default()
        }
    }

    /// List response: `{"keys": [...]}`.
    #[must_use]
    pub fn list(keys: Vec<String>) -> Self {
        Self::with_data(json!({ "keys": keys }))
    }

    /// Error response.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }

    /// Returns true for an error response.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Keys of a list response.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.data
            .get("keys")
            .and_then(Value::as_array)
            .map(|keys| keys.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default()
    }

    fn from_outcome<T>(outcome: Outcome<T>) -> Self {
        Self {
            warnings: outcome.warnings,
            ..Self::default()
        }
    }
}

fn unsupported(operation: Operation, path: &str) -> BrokerError {
    BrokerError::validation(format!("unsupported path: {operation} {path}"))
}

/// Routes host requests to a [`Broker`].
#[derive(Debug, Clone)]
pub struct Backend {
    broker: Arc<Broker>,
}

impl Backend {
    /// Route requests to `broker`.
    #[must_use]
    pub const fn new(broker: Arc<Broker>) -> Self {
        Self { broker }
    }

    /// The engine behind this router.
    #[must_use]
    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    /// Handle one request.
    #[instrument(skip(self, request), fields(operation = %request.operation, path = %request.path))]
    pub async fn handle(&self, request: &Request) -> BrokerResult<Response> {
        let result = self.dispatch(request).await;
        caller_errors_as_response(result)
    }

    /// Renew a lease from the bookkeeping returned at issuance.
    #[instrument(skip(self, internal))]
    pub async fn renew(
        &self,
        internal: &Map<String, Value>,
        increment: Duration,
        issue_time: DateTime<Utc>,
    ) -> BrokerResult<Response> {
        caller_errors_as_response(self.renew_lease(internal, increment, issue_time).await)
    }

    /// Revoke a lease from the bookkeeping returned at issuance.
    #[instrument(skip(self, internal))]
    pub async fn revoke(&self, internal: &Map<String, Value>) -> BrokerResult<Response> {
        caller_errors_as_response(self.revoke_lease(internal).await)
    }

    async fn renew_lease(
        &self,
        internal: &Map<String, Value>,
        increment: Duration,
        issue_time: DateTime<Utc>,
    ) -> BrokerResult<Response> {
        let secret = LeaseSecret::from_internal(internal)?;
        let outcome = self.broker.renew_credential(&secret, increment, issue_time).await?;
        Ok(Response {
            lease: Some(LeaseInfo {
                ttl: outcome.value.ttl.as_secs(),
                max_ttl: outcome.value.max_ttl.as_secs(),
                internal: internal.clone(),
            }),
            warnings: outcome.warnings,
            ..Response::default()
        })
    }

    async fn revoke_lease(&self, internal: &Map<String, Value>) -> BrokerResult<Response> {
        let secret = LeaseSecret::from_internal(internal)?;
        Ok(Response::from_outcome(self.broker.revoke_credential(&secret).await?))
    }

    async fn dispatch(&self, request: &Request) -> BrokerResult<Response> {
        use Operation::{Delete, List, Read, Update};

        let path = request.path.trim_matches('/');
        let segments: Vec<&str> = if path.is_empty() {
            Vec::new()
        } else {
            path.split('/').collect()
        };

        // `metadata/{id}` ids contain slashes and are not names
        if let ["metadata", id @ ..] = segments.as_slice() {
            if !id.is_empty() {
                return match request.operation {
                    Delete => {
                        self.broker.delete_metadata(&id.join("/")).await?;
                        Ok(Response::default())
                    }
                    _ => Err(unsupported(request.operation, &request.path)),
                };
            }
        }

        let names_valid = match segments.as_slice() {
            ["cluster" | "clone" | "roles", rest @ ..] | ["creds", rest @ ..] => rest.iter().all(|s| is_valid_name(s)),
            ["gc", "cluster", rest @ ..] => rest.iter().all(|s| is_valid_name(s)),
            _ => true,
        };
        if !names_valid {
            return Err(unsupported(request.operation, &request.path));
        }

        let data = &request.data;
        debug!(segments = segments.len(), "Dispatching request");

        match (segments.as_slice(), request.operation) {
            (["info"], Read) => {
                let info = self.broker.info();
                Ok(Response::with_data(serde_json::to_value(info)?))
            }

            (["metadata"], Update) => self.metadata_write(data).await,
            (["metadata"], Read) => self.metadata_lookup(data).await,
            (["metadata"], List) => {
                let listing = self.broker.list_metadata().await?;
                let keys: Vec<String> = listing.keys().cloned().collect();
                Ok(Response::with_data(json!({ "keys": keys, "key_info": listing })))
            }

            (["cluster"], List) => Ok(Response::list(self.broker.list_clusters().await?)),
            (["cluster", cluster], Read) => {
                Ok(Response::with_data(self.broker.read_cluster(cluster).await?.to_data()))
            }
            (["cluster", cluster], Update) => {
                let req = cluster_request(data)?;
                Ok(Response::from_outcome(self.broker.register_cluster(cluster, &req).await?))
            }
            (["cluster", cluster], Delete) => Ok(Response::from_outcome(self.broker.delete_cluster(cluster).await?)),
            (["cluster", cluster], List) => Ok(Response::list(self.broker.list_databases(cluster).await?)),

            (["clone", cluster], Update) => {
                let req = CloneRequest {
                    target: fields::string_or(data, "target", "")?,
                    host: fields::string_or(data, "host", "")?,
                    port: fields::int_or(data, "port", 5432)?,
                    inherit_deleted_db: fields::bool_or(data, "inherit_deleted_db", false)?,
                };
                Ok(Response::from_outcome(self.broker.clone_cluster(cluster, &req).await?))
            }

            (["cluster", cluster, database], Update) => {
                let req = DatabaseRequest {
                    objects_owner_role: fields::string_or(data, "objects_owner_role", "")?,
                    initialize: fields::bool_or(data, "initialize", true)?,
                    create_db: fields::bool_or(data, "create_db", true)?,
                };
                let outcome = self.broker.register_database(cluster, database, &req).await?;
                Ok(Response::from_outcome(outcome))
            }
            (["cluster", cluster, database], Read) => Ok(Response::with_data(
                self.broker.read_database(cluster, database).await?.to_data(),
            )),
            (["cluster", cluster, database], Delete) => {
                Ok(Response::from_outcome(self.broker.delete_database(cluster, database).await?))
            }

            (["roles"], List) => Ok(Response::list(self.broker.list_roles().await?)),
            (["roles", name], Read) => Ok(Response::with_data(self.broker.read_role(name).await?.to_data())),
            (["roles", name], Update) => {
                let req = RoleRequest {
                    default_ttl: fields::duration(data, "default_ttl")?,
                    max_ttl: fields::duration(data, "max_ttl")?,
                    creation_statement: fields::string_list(data, "creation_statement")?,
                    revocation_statement: fields::string_list(data, "revocation_statement")?,
                };
                self.broker.write_role(name, &req).await?;
                Ok(Response::default())
            }
            (["roles", name], Delete) => {
                self.broker.delete_role(name).await?;
                Ok(Response::default())
            }

            (["creds", cluster, database, role], Read) => {
                let cred = self
                    .broker
                    .issue_credential(cluster, database, role, &request.display_name)
                    .await?;
                Ok(Response {
                    lease: Some(LeaseInfo {
                        ttl: cred.ttl.as_secs(),
                        max_ttl: cred.max_ttl.as_secs(),
                        internal: cred.secret.to_internal(),
                    }),
                    ..Response::with_data(json!({
                        "username": cred.username,
                        "password": cred.password.expose_secret(),
                    }))
                })
            }

            (["gc", "clusters"], List | Read) => Ok(Response::list(self.broker.gc_list_clusters().await?)),
            (["gc", "cluster", cluster], Read) => {
                Ok(Response::with_data(self.broker.gc_read_cluster(cluster).await?.to_data()))
            }
            (["gc", "cluster", cluster], List) => {
                Ok(Response::list(self.broker.gc_list_databases(cluster).await?))
            }
            (["gc", "cluster", cluster], Delete) => {
                Ok(Response::from_outcome(self.broker.gc_purge_cluster(cluster).await?))
            }
            (["gc", "cluster", cluster, database], Read) => Ok(Response::with_data(
                self.broker.gc_read_database(cluster, database).await?.to_data(),
            )),
            (["gc", "cluster", cluster, database], Delete) => {
                Ok(Response::from_outcome(self.broker.gc_purge_database(cluster, database).await?))
            }

            _ => Err(unsupported(request.operation, &request.path)),
        }
    }

    async fn metadata_write(&self, data: &Map<String, Value>) -> BrokerResult<Response> {
        let cluster = fields::string(data, "cluster")?
            .ok_or_else(|| BrokerError::validation("'cluster' attribute is required"))?;
        let database = fields::string(data, "database")?;
        let pairs = fields::kv_pairs(data, "data")?
            .ok_or_else(|| BrokerError::validation("'data' attribute is required"))?;

        let id = self
            .broker
            .write_metadata(&cluster, database.as_deref(), pairs)
            .await?;
        Ok(Response::with_data(json!({ "id": id })))
    }

    async fn metadata_lookup(&self, data: &Map<String, Value>) -> BrokerResult<Response> {
        for key in ["database", "cluster"] {
            if data.get(key).is_some_and(|v| !v.is_null()) {
                return Err(BrokerError::validation(format!(
                    "attribute {key:?} is not supported on lookup"
                )));
            }
        }

        let target = fields::string(data, "type")?
            .ok_or_else(|| BrokerError::validation("'type' attribute is required to perform lookup"))?;
        let target = MetadataTarget::parse(&target)?;
        let matcher = fields::kv_pairs(data, "data")?
            .ok_or_else(|| BrokerError::validation("'data' attribute is required"))?;

        Ok(Response::list(self.broker.lookup_metadata(target, &matcher).await?))
    }
}

fn cluster_request(data: &Map<String, Value>) -> BrokerResult<ClusterRequest> {
    Ok(ClusterRequest {
        host: fields::string_or(data, "host", "")?,
        port: fields::int_or(data, "port", 5432)?,
        username: fields::string_or(data, "username", "")?,
        password: SecretString::from(fields::string_or(data, "password", "")?),
        max_open_connections: fields::uint_or(data, "max_open_connections", 5)?,
        max_idle_connections: fields::uint_or(data, "max_idle_connections", 5)?,
        max_connection_lifetime: fields::duration(data, "max_connection_lifetime")?
            .map_or(300, |d| d.as_secs()),
        database: fields::string_or(data, "database", "postgres")?,
        ssl_mode: fields::string_or(data, "ssl_mode", "require")?,
    })
}

fn caller_errors_as_response(result: BrokerResult<Response>) -> BrokerResult<Response> {
    match result {
        Ok(response) => Ok(response),
        Err(e) if e.is_caller_error() => {
            debug!(class = %e.class(), error = %e, "Request rejected");
            Ok(Response::error(e.to_string()))
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_request_defaults() {
        let req = cluster_request(&Map::new()).unwrap();
        assert_eq!(req.port, 5432);
        assert_eq!(req.max_open_connections, 5);
        assert_eq!(req.max_idle_connections, 5);
        assert_eq!(req.max_connection_lifetime, 300);
        assert_eq!(req.database, "postgres");
        assert_eq!(req.ssl_mode, "require");
    }

    #[test]
    fn test_caller_errors_become_responses() {
        let resp = caller_errors_as_response(Err(BrokerError::not_found("gone"))).unwrap();
        assert!(resp.is_error());
        assert_eq!(resp.error.as_deref(), Some("gone"));

        let err = caller_errors_as_response(Err(BrokerError::internal("boom")));
        assert!(err.is_err());
    }

    #[test]
    fn test_response_keys() {
        let resp = Response::list(vec!["a".into(), "b".into()]);
        assert_eq!(resp.keys(), vec!["a", "b"]);
        assert!(Response::default().keys().is_empty());
    }
}
