//! PostgreSQL implementation of the SQL traits, backed by `sqlx`.
//!
//! Statements are sent with the simple query protocol (`sqlx::raw_sql`) since
//! the broker only runs DDL and role management, never parameterized queries.

use super::{ConnectTarget, SqlConnection, SqlConnector, SqlError, SqlTransaction, SslMode};
use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::{Connection, PgPool, Postgres, Transaction};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Opens `sqlx` pools.
#[derive(Debug, Clone)]
pub struct PgConnector {
    connect_timeout: Duration,
    statement_timeout: Duration,
}

impl PgConnector {
    /// Create a connector with the given timeouts.
    #[must_use]
    pub const fn new(connect_timeout: Duration, statement_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            statement_timeout,
        }
    }

    fn options(target: &ConnectTarget) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&target.host)
            .port(target.port)
            .username(&target.username)
            .password(target.password.expose_secret())
            .database(&target.database)
            .ssl_mode(ssl_mode(target.ssl_mode))
            .options([("timezone", "UTC")])
    }
}

const fn ssl_mode(mode: SslMode) -> PgSslMode {
    match mode {
        SslMode::Disable => PgSslMode::Disable,
        SslMode::Require => PgSslMode::Require,
        SslMode::VerifyCa => PgSslMode::VerifyCa,
        SslMode::VerifyFull => PgSslMode::VerifyFull,
    }
}

fn connect_error(err: &sqlx::Error) -> SqlError {
    SqlError::Connect(err.to_string())
}

fn statement_error(err: &sqlx::Error) -> SqlError {
    match err {
        sqlx::Error::PoolClosed => SqlError::Closed,
        other => SqlError::Statement(other.to_string()),
    }
}

async fn bounded<T, F>(limit: Duration, fut: F) -> Result<T, SqlError>
where
    F: Future<Output = Result<T, SqlError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| SqlError::Timeout(limit))?
}

#[async_trait]
impl SqlConnector for PgConnector {
    async fn connect(&self, target: &ConnectTarget) -> Result<Arc<dyn SqlConnection>, SqlError> {
        debug!(host = %target.host, port = target.port, database = %target.database, user = %target.username, "Opening connection pool");

        // sqlx has no idle cap; idle connections are reaped after the lifetime instead.
        let pool = PgPoolOptions::new()
            .max_connections(target.pool.max_open.max(1))
            .min_connections(0)
            .max_lifetime(target.pool.max_lifetime)
            .idle_timeout(target.pool.max_lifetime)
            .acquire_timeout(self.connect_timeout)
            .connect_lazy_with(Self::options(target));

        let ping = async {
            let mut conn = pool.acquire().await.map_err(|e| connect_error(&e))?;
            conn.ping().await.map_err(|e| connect_error(&e))
        };

        if let Err(err) = bounded(self.connect_timeout, ping).await {
            pool.close().await;
            return Err(match err {
                SqlError::Timeout(d) => {
                    SqlError::Connect(format!("timed out after {d:?} while connecting"))
                }
                other => other,
            });
        }

        Ok(Arc::new(PgConnection {
            pool,
            statement_timeout: self.statement_timeout,
        }))
    }
}

/// A validated `sqlx` pool.
#[derive(Debug)]
pub struct PgConnection {
    pool: PgPool,
    statement_timeout: Duration,
}

#[async_trait]
impl SqlConnection for PgConnection {
    async fn execute(&self, sql: &str) -> Result<(), SqlError> {
        bounded(self.statement_timeout, async {
            sqlx::raw_sql(sql)
                .execute(&self.pool)
                .await
                .map(|_| ())
                .map_err(|e| statement_error(&e))
        })
        .await
    }

    async fn begin(&self) -> Result<Box<dyn SqlTransaction>, SqlError> {
        let tx = bounded(self.statement_timeout, async {
            self.pool.begin().await.map_err(|e| match e {
                sqlx::Error::PoolClosed => SqlError::Closed,
                other => SqlError::Transaction(other.to_string()),
            })
        })
        .await?;

        Ok(Box::new(PgTransaction {
            tx,
            statement_timeout: self.statement_timeout,
        }))
    }

    async fn close(&self) -> Result<(), SqlError> {
        self.pool.close().await;
        Ok(())
    }
}

/// A transaction on a pooled connection.
pub struct PgTransaction {
    tx: Transaction<'static, Postgres>,
    statement_timeout: Duration,
}

#[async_trait]
impl SqlTransaction for PgTransaction {
    async fn execute(&mut self, sql: &str) -> Result<(), SqlError> {
        let limit = self.statement_timeout;
        let conn: &mut sqlx::PgConnection = &mut self.tx;
        bounded(limit, async move {
            sqlx::Executor::execute(conn, sqlx::raw_sql(sql))
                .await
                .map(|_| ())
                .map_err(|e| statement_error(&e))
        })
        .await
    }

    async fn commit(self: Box<Self>) -> Result<(), SqlError> {
        self.tx
            .commit()
            .await
            .map_err(|e| SqlError::Transaction(e.to_string()))
    }

    async fn rollback(self: Box<Self>) -> Result<(), SqlError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| SqlError::Transaction(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssl_mode_mapping() {
        assert!(matches!(ssl_mode(SslMode::Disable), PgSslMode::Disable));
        assert!(matches!(ssl_mode(SslMode::Require), PgSslMode::Require));
        assert!(matches!(ssl_mode(SslMode::VerifyCa), PgSslMode::VerifyCa));
        assert!(matches!(ssl_mode(SslMode::VerifyFull), PgSslMode::VerifyFull));
    }

    #[test]
    fn test_pool_closed_maps_to_closed() {
        assert!(matches!(statement_error(&sqlx::Error::PoolClosed), SqlError::Closed));
        assert!(matches!(
            statement_error(&sqlx::Error::RowNotFound),
            SqlError::Statement(_)
        ));
    }
}
