//! Templated SQL execution against target clusters.
//!
//! The broker never talks to a driver directly. It goes through three small
//! traits so the registry and credential engine can be exercised without a
//! live server:
//!
//! - [`SqlConnector`] opens and validates a pooled connection
//! - [`SqlConnection`] executes single statements and begins transactions
//! - [`SqlTransaction`] executes statements inside one transaction
//!
//! Statements are produced by [`template::render`] from templates and
//! pre-quoted values.

pub mod postgres;
pub mod template;

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use postgres::PgConnector;
pub use template::{Bindings, quote_identifier, quote_literal, render};

/// Errors raised while connecting or executing statements.
#[derive(Error, Debug, Clone)]
pub enum SqlError {
    /// Connection could not be opened or failed its ping
    #[error("Error validating connection. Error: {0}")]
    Connect(String),

    /// A statement was rejected by the server
    #[error("{0}")]
    Statement(String),

    /// Begin, commit or rollback failed
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// A statement exceeded the configured timeout
    #[error("Statement timed out after {0:?}")]
    Timeout(Duration),

    /// The connection was closed by an invalidation
    #[error("Connection is closed")]
    Closed,

    /// One or more evicted connections failed to close
    #[error("{0}")]
    Close(String),
}

impl SqlError {
    /// Create a statement error.
    #[must_use]
    pub fn statement(msg: impl Into<String>) -> Self {
        Self::Statement(msg.into())
    }

    /// Prefix the message with what was being attempted.
    #[must_use]
    pub fn context(self, what: &str) -> Self {
        match self {
            Self::Connect(m) => Self::Connect(format!("{what}. {m}")),
            Self::Statement(m) => Self::Statement(format!("{what}. {m}")),
            Self::Transaction(m) => Self::Transaction(format!("{what}. {m}")),
            other => other,
        }
    }
}

/// TLS policy for a connection, mirroring libpq `sslmode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    /// No TLS
    Disable,
    /// TLS without certificate verification
    #[default]
    Require,
    /// TLS, verify the server certificate chain
    VerifyCa,
    /// TLS, verify the chain and the host name
    VerifyFull,
}

impl SslMode {
    /// Parse the libpq spelling.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "disable" => Some(Self::Disable),
            "require" => Some(Self::Require),
            "verify-ca" => Some(Self::VerifyCa),
            "verify-full" => Some(Self::VerifyFull),
            _ => None,
        }
    }

    /// The libpq spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disable => "disable",
            Self::Require => "require",
            Self::VerifyCa => "verify-ca",
            Self::VerifyFull => "verify-full",
        }
    }
}

impl fmt::Display for SslMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pool tuning applied to every connection opened for a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolTuning {
    /// Maximum open connections
    pub max_open: u32,
    /// Maximum idle connections
    pub max_idle: u32,
    /// Maximum lifetime of a pooled connection
    pub max_lifetime: Duration,
}

/// Everything needed to open a connection to one database of a cluster.
#[derive(Clone)]
pub struct ConnectTarget {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Login role
    pub username: String,
    /// Login password
    pub password: secrecy::SecretString,
    /// Database to connect to
    pub database: String,
    /// TLS policy
    pub ssl_mode: SslMode,
    /// Pool tuning
    pub pool: PoolTuning,
}

impl fmt::Debug for ConnectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectTarget")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("database", &self.database)
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// Opens validated connections.
#[async_trait]
pub trait SqlConnector: Send + Sync {
    /// Open a connection to `target` and ping it.
    async fn connect(&self, target: &ConnectTarget) -> Result<Arc<dyn SqlConnection>, SqlError>;
}

/// A pooled connection handle. Safe to share; each call checks out its own
/// physical connection.
#[async_trait]
pub trait SqlConnection: Send + Sync {
    /// Execute one statement outside a transaction.
    async fn execute(&self, sql: &str) -> Result<(), SqlError>;

    /// Begin a transaction.
    async fn begin(&self) -> Result<Box<dyn SqlTransaction>, SqlError>;

    /// Close the handle. Statements already running are allowed to finish.
    async fn close(&self) -> Result<(), SqlError>;
}

/// An open transaction. Dropping it without commit rolls it back.
#[async_trait]
pub trait SqlTransaction: Send {
    /// Execute one statement inside the transaction.
    async fn execute(&mut self, sql: &str) -> Result<(), SqlError>;

    /// Commit the transaction.
    async fn commit(self: Box<Self>) -> Result<(), SqlError>;

    /// Roll the transaction back.
    async fn rollback(self: Box<Self>) -> Result<(), SqlError>;
}

/// Render `template` with `bindings` and execute it on `conn`.
pub async fn execute_template(
    conn: &dyn SqlConnection,
    bindings: &Bindings,
    template: &str,
) -> Result<(), SqlError> {
    conn.execute(&render(template, bindings)).await
}

/// Render `template` with `bindings` and execute it inside `tx`.
pub async fn execute_template_tx(
    tx: &mut dyn SqlTransaction,
    bindings: &Bindings,
    template: &str,
) -> Result<(), SqlError> {
    tx.execute(&render(template, bindings)).await
}
