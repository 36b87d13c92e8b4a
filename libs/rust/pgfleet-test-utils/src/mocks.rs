//! Scripted SQL connector.
//!
//! [`FakeConnector`] hands out connections that accept every statement and
//! record it, unless a failure rule matches. Transactions record their
//! statements as they run; commit and rollback are counted separately.

use async_trait::async_trait;
use pgfleet_broker::sql::{ConnectTarget, SqlConnection, SqlConnector, SqlError, SqlTransaction};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// One statement seen by a fake connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Executed {
    /// Login the connection was opened with
    pub username: String,
    /// Database the connection was opened against
    pub database: String,
    /// Rendered SQL
    pub sql: String,
    /// Ran inside a transaction
    pub in_transaction: bool,
    /// Rejected by a failure rule
    pub failed: bool,
}

#[derive(Debug, Default)]
struct Shared {
    executed: RwLock<Vec<Executed>>,
    targets: RwLock<Vec<ConnectTarget>>,
    fail_patterns: RwLock<Vec<String>>,
    fail_connect: AtomicBool,
    fail_close: AtomicBool,
    connects: AtomicUsize,
    closes: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
}

impl Shared {
    async fn run(&self, username: &str, database: &str, sql: &str, in_transaction: bool) -> Result<(), SqlError> {
        let matched = self
            .fail_patterns
            .read()
            .await
            .iter()
            .find(|p| sql.contains(p.as_str()))
            .cloned();

        self.executed.write().await.push(Executed {
            username: username.to_string(),
            database: database.to_string(),
            sql: sql.to_string(),
            in_transaction,
            failed: matched.is_some(),
        });

        match matched {
            Some(pattern) => Err(SqlError::statement(format!("injected failure on {pattern:?}"))),
            None => Ok(()),
        }
    }
}

/// Connector whose connections only record what they are asked to do.
#[derive(Debug, Default, Clone)]
pub struct FakeConnector {
    shared: Arc<Shared>,
}

impl FakeConnector {
    /// Create a connector that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every statement containing `pattern`.
    pub async fn fail_on(&self, pattern: &str) {
        self.shared.fail_patterns.write().await.push(pattern.to_string());
    }

    /// Drop every failure rule.
    pub async fn clear_failures(&self) {
        self.shared.fail_patterns.write().await.clear();
    }

    /// Make new connections fail their ping.
    pub fn set_fail_connect(&self, fail: bool) {
        self.shared.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Make closing a connection fail.
    pub fn set_fail_close(&self, fail: bool) {
        self.shared.fail_close.store(fail, Ordering::SeqCst);
    }

    /// Every statement attempted so far, in order.
    pub async fn executed(&self) -> Vec<Executed> {
        self.shared.executed.read().await.clone()
    }

    /// SQL text of every statement attempted so far.
    pub async fn statements(&self) -> Vec<String> {
        self.executed().await.into_iter().map(|e| e.sql).collect()
    }

    /// Statements containing `needle`.
    pub async fn statements_containing(&self, needle: &str) -> Vec<String> {
        self.statements()
            .await
            .into_iter()
            .filter(|s| s.contains(needle))
            .collect()
    }

    /// Forget recorded statements and targets.
    pub async fn reset_log(&self) {
        self.shared.executed.write().await.clear();
        self.shared.targets.write().await.clear();
    }

    /// Targets of every successful connect, in order.
    pub async fn targets(&self) -> Vec<ConnectTarget> {
        self.shared.targets.read().await.clone()
    }

    /// Successful connects.
    #[must_use]
    pub fn connects(&self) -> usize {
        self.shared.connects.load(Ordering::SeqCst)
    }

    /// Close calls, failed ones included.
    #[must_use]
    pub fn closes(&self) -> usize {
        self.shared.closes.load(Ordering::SeqCst)
    }

    /// Committed transactions.
    #[must_use]
    pub fn commits(&self) -> usize {
        self.shared.commits.load(Ordering::SeqCst)
    }

    /// Rolled back transactions.
    #[must_use]
    pub fn rollbacks(&self) -> usize {
        self.shared.rollbacks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SqlConnector for FakeConnector {
    async fn connect(&self, target: &ConnectTarget) -> Result<Arc<dyn SqlConnection>, SqlError> {
        if self.shared.fail_connect.load(Ordering::SeqCst) {
            return Err(SqlError::Connect(format!(
                "connection refused by {}:{}",
                target.host, target.port
            )));
        }

        self.shared.connects.fetch_add(1, Ordering::SeqCst);
        self.shared.targets.write().await.push(target.clone());

        Ok(Arc::new(FakeConnection {
            shared: Arc::clone(&self.shared),
            username: target.username.clone(),
            database: target.database.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

#[derive(Debug)]
struct FakeConnection {
    shared: Arc<Shared>,
    username: String,
    database: String,
    closed: AtomicBool,
}

#[async_trait]
impl SqlConnection for FakeConnection {
    async fn execute(&self, sql: &str) -> Result<(), SqlError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SqlError::Closed);
        }
        self.shared.run(&self.username, &self.database, sql, false).await
    }

    async fn begin(&self) -> Result<Box<dyn SqlTransaction>, SqlError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SqlError::Closed);
        }
        Ok(Box::new(FakeTransaction {
            shared: Arc::clone(&self.shared),
            username: self.username.clone(),
            database: self.database.clone(),
        }))
    }

    async fn close(&self) -> Result<(), SqlError> {
        self.closed.store(true, Ordering::SeqCst);
        self.shared.closes.fetch_add(1, Ordering::SeqCst);
        if self.shared.fail_close.load(Ordering::SeqCst) {
            return Err(SqlError::Close("injected close failure".to_string()));
        }
        Ok(())
    }
}

struct FakeTransaction {
    shared: Arc<Shared>,
    username: String,
    database: String,
}

#[async_trait]
impl SqlTransaction for FakeTransaction {
    async fn execute(&mut self, sql: &str) -> Result<(), SqlError> {
        self.shared.run(&self.username, &self.database, sql, true).await
    }

    async fn commit(self: Box<Self>) -> Result<(), SqlError> {
        self.shared.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), SqlError> {
        self.shared.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgfleet_broker::sql::{PoolTuning, SslMode};
    use secrecy::SecretString;
    use std::time::Duration;

    fn target() -> ConnectTarget {
        ConnectTarget {
            host: "db.internal".to_string(),
            port: 5432,
            username: "postgres".to_string(),
            password: SecretString::from("pw".to_string()),
            database: "postgres".to_string(),
            ssl_mode: SslMode::Disable,
            pool: PoolTuning {
                max_open: 1,
                max_idle: 1,
                max_lifetime: Duration::from_secs(60),
            },
        }
    }

    #[tokio::test]
    async fn test_records_statements() {
        let connector = FakeConnector::new();
        let conn = connector.connect(&target()).await.unwrap();

        conn.execute("select 1").await.unwrap();
        let mut tx = conn.begin().await.unwrap();
        tx.execute("select 2").await.unwrap();
        tx.commit().await.unwrap();

        let executed = connector.executed().await;
        assert_eq!(executed.len(), 2);
        assert!(!executed[0].in_transaction);
        assert!(executed[1].in_transaction);
        assert_eq!(executed[1].username, "postgres");
        assert_eq!(connector.commits(), 1);
    }

    #[tokio::test]
    async fn test_failure_rules() {
        let connector = FakeConnector::new();
        connector.fail_on("drop").await;
        let conn = connector.connect(&target()).await.unwrap();

        assert!(conn.execute("drop role x").await.is_err());
        assert!(conn.execute("select 1").await.is_ok());
        assert!(connector.executed().await[0].failed);
    }

    #[tokio::test]
    async fn test_closed_connection_rejects_work() {
        let connector = FakeConnector::new();
        let conn = connector.connect(&target()).await.unwrap();
        conn.close().await.unwrap();

        assert!(matches!(conn.execute("select 1").await, Err(SqlError::Closed)));
        assert!(matches!(conn.begin().await, Err(SqlError::Closed)));
        assert_eq!(connector.closes(), 1);
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let connector = FakeConnector::new();
        connector.set_fail_connect(true);
        assert!(connector.connect(&target()).await.is_err());
        assert_eq!(connector.connects(), 0);
    }
}
