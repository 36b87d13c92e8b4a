//! Dynamic credential broker for fleets of PostgreSQL clusters.
//!
//! This crate provides:
//! - Cluster and database registration with root password rotation and
//!   soft-delete
//! - Role templates and short-lived login credentials with TTL leases
//! - Cluster cloning onto new endpoints
//! - Garbage collection of soft-deleted records
//! - Metadata tags with subset lookup
//! - A path based [`Backend`] router for the hosting secrets manager

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod broker;
pub mod clone;
pub mod config;
pub mod connection;
pub mod creds;
pub mod error;
pub mod gc;
pub mod info;
pub mod metadata_index;
pub mod model;
pub mod registry;
pub mod roles;
pub mod sql;
pub mod statements;
pub mod store;
pub mod ttl;

pub use backend::{Backend, LeaseInfo, Operation, Request, Response};
pub use broker::{Broker, CredentialMetrics};
pub use clone::CloneRequest;
pub use config::{BrokerConfig, ConfigError, LeaseLimits};
pub use connection::{ConnectionCache, ConnectionKey, ConnectionKind};
pub use error::{BrokerError, BrokerResult};
pub use info::BrokerInfo;
pub use metadata_index::MetadataListing;
pub use model::{
    ClusterConfig, ClusterRequest, DatabaseConfig, DatabaseRequest, IssuedCredential, LeaseSecret,
    MetadataRecord, MetadataTarget, Outcome, RenewedLease, RoleConfig, RoleRequest, Status,
};
pub use sql::{PgConnector, SqlConnection, SqlConnector, SqlError, SqlTransaction};
pub use store::{ConfigStore, MemoryStore, StoreError};
pub use ttl::{TtlRequest, calculate_ttl};
