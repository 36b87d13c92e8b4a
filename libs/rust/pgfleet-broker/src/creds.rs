//! Credential issuance, renewal and revocation.
//!
//! Creation is all-or-nothing: every creation statement runs in one
//! transaction and any failure aborts the issue. Revocation is best-effort:
//! each statement runs under its own savepoint so a failure is rolled back on
//! its own, recorded as a warning, and the remaining statements still run. The
//! transaction is committed even when every statement failed.

use crate::broker::Broker;
use crate::error::{BrokerError, BrokerResult};
use crate::model::{IssuedCredential, LeaseSecret, Outcome, RenewedLease, naming};
use crate::roles::role_not_configured;
use crate::connection::ConnectionKind;
use crate::sql::{Bindings, SqlConnection, SqlError, SqlTransaction, render};
use crate::statements::{self, DEFAULT_REVOCATION_SQL};
use crate::ttl::{TtlRequest, calculate_ttl};
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const EXPIRATION_FORMAT: &str = "%Y-%m-%d %H:%M:%S%z";
const REVOKE_SAVEPOINT: &str = "pgfleet_revoke";

fn expiration(at: DateTime<Utc>) -> String {
    at.format(EXPIRATION_FORMAT).to_string()
}

fn after(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

async fn rollback_quietly(tx: Box<dyn SqlTransaction>) {
    if let Err(e) = tx.rollback().await {
        warn!(error = %e, "Rollback failed");
    }
}

impl Broker {
    /// Issue a credential for `(cluster, database, role)`.
    ///
    /// `display_name` prefixes the generated username.
    #[instrument(skip(self))]
    pub async fn issue_credential(
        &self,
        cluster: &str,
        database: &str,
        role: &str,
        display_name: &str,
    ) -> BrokerResult<IssuedCredential> {
        let cluster_cfg = self
            .load_cluster(cluster)
            .await?
            .ok_or_else(|| BrokerError::not_found(format!("Cluster {cluster} is not configured")))?;
        if cluster_cfg.is_disabled() {
            return Err(BrokerError::conflict(format!(
                "Cluster {cluster} is marked as deleted. Cannot generate new credentials"
            )));
        }

        let db = self
            .load_database(cluster, database)
            .await?
            .ok_or_else(|| BrokerError::not_found(format!("Database {database} is not configured")))?;
        if db.is_disabled() {
            return Err(BrokerError::conflict(format!(
                "Database {database} is marked as deleted. Cannot generate new credentials"
            )));
        }

        let role_cfg = self
            .load_role(role)
            .await?
            .ok_or_else(|| role_not_configured(role))?;

        let username = naming::lease_username(display_name);
        let password = naming::generate_password();

        let now = Utc::now();
        let ttl = calculate_ttl(
            &self.config.lease,
            &TtlRequest {
                increment: Duration::ZERO,
                role_ttl: role_cfg.default_ttl(),
                role_max_ttl: role_cfg.default_ttl(),
                issue_time: now,
                now,
            },
        )
        .value;

        let bindings = Bindings::new()
            .identifier("user", &username)
            .literal("password", &password)
            .literal("expiration", &expiration(after(now, ttl)))
            .identifier("objects_owner", &db.objects_owner)
            .identifier("group", &cluster_cfg.management_role);

        let mut tx = self.begin_management(cluster, database).await?;
        for template in role_cfg.creation_statements() {
            let template = template.trim();
            if template.is_empty() {
                continue;
            }
            if let Err(e) = tx.execute(&render(template, &bindings)).await {
                rollback_quietly(tx).await;
                return Err(e.into());
            }
        }
        tx.commit().await?;

        self.metrics.issued.inc();
        info!(cluster, database, role, username = %username, "Issued credential");

        Ok(IssuedCredential {
            secret: LeaseSecret {
                role: role.to_string(),
                username: username.clone(),
                cluster: cluster.to_string(),
                database: database.to_string(),
            },
            username,
            password: SecretString::from(password),
            ttl: role_cfg.default_ttl(),
            max_ttl: role_cfg.max_ttl(),
        })
    }

    /// Extend a lease by `increment` (zero for the role default).
    ///
    /// A deleted role makes the lease unrenewable. When the lease is already
    /// past its max TTL the server is not touched and a zero TTL is returned.
    #[instrument(skip(self, secret), fields(username = %secret.username))]
    pub async fn renew_credential(
        &self,
        secret: &LeaseSecret,
        increment: Duration,
        issue_time: DateTime<Utc>,
    ) -> BrokerResult<Outcome<RenewedLease>> {
        let role_cfg = self
            .load_role(&secret.role)
            .await?
            .ok_or_else(|| role_not_configured(&secret.role))?;

        let cluster = &secret.cluster;
        let cluster_cfg = self.load_cluster(cluster).await?.ok_or_else(|| {
            BrokerError::not_found(format!("Configuration for cluster {cluster} is not available"))
        })?;
        if cluster_cfg.is_disabled() {
            return Err(BrokerError::conflict(format!(
                "Cluster {cluster} is marked as deleted. Cannot renew credentials"
            )));
        }

        let database = &secret.database;
        let db = self.load_database(cluster, database).await?.ok_or_else(|| {
            BrokerError::not_found(format!("Configuration for database {database} is not available"))
        })?;
        if db.is_disabled() {
            return Err(BrokerError::conflict(format!(
                "Database {database} is marked as deleted. Cannot renew credentials"
            )));
        }

        let now = Utc::now();
        let outcome = calculate_ttl(
            &self.config.lease,
            &TtlRequest {
                increment,
                role_ttl: role_cfg.default_ttl(),
                role_max_ttl: role_cfg.max_ttl(),
                issue_time,
                now,
            },
        );

        let ttl = outcome.value;
        if ttl.is_zero() {
            debug!("Lease past its max TTL, leaving the server untouched");
        } else {
            let valid_until = after(now, ttl.saturating_add(self.config.renew_margin));
            let bindings = Bindings::new()
                .identifier("user", &secret.username)
                .literal("expiration", &expiration(valid_until));
            self.execute_management(cluster, database, &render(statements::RENEW_EXPIRY, &bindings))
                .await?;
            self.metrics.renewed.inc();
            info!(ttl_secs = ttl.as_secs(), "Renewed lease");
        }

        Ok(outcome.map(|ttl| RenewedLease {
            ttl,
            max_ttl: role_cfg.max_ttl(),
        }))
    }

    /// Revoke a leased principal.
    ///
    /// Statement failures become warnings. A deleted or empty role falls back
    /// to the built-in revocation statements. Deleted clusters and databases
    /// are still revoked against.
    #[instrument(skip(self, secret), fields(username = %secret.username))]
    pub async fn revoke_credential(&self, secret: &LeaseSecret) -> BrokerResult<Outcome<()>> {
        let mut outcome = Outcome::new(());

        let templates = match self.load_role(&secret.role).await? {
            Some(role) => role.revocation_statements(),
            None => {
                warn!(role = %secret.role, "Role not found, using default revocation statements");
                outcome.warn(format!(
                    "Role {} was not found, using default revocation SQL",
                    secret.role
                ));
                DEFAULT_REVOCATION_SQL.iter().map(|s| (*s).to_string()).collect()
            }
        };

        let cluster = &secret.cluster;
        let cluster_cfg = self.load_cluster(cluster).await?.ok_or_else(|| {
            BrokerError::not_found(format!("Configuration for cluster {cluster} cannot be found"))
        })?;

        let database = &secret.database;
        let db = self.load_database(cluster, database).await?.ok_or_else(|| {
            BrokerError::not_found(format!("Configuration for database {database} cannot be found"))
        })?;

        let bindings = Bindings::new()
            .identifier("user", &secret.username)
            .identifier("database", database)
            .identifier("objects_owner", &db.objects_owner)
            .identifier("group", &cluster_cfg.management_role);

        if cluster_cfg.is_disabled() || db.is_disabled() {
            // Deleted records were flushed from the cache and stay out of it
            let conn = self
                .connections
                .open_uncached(&cluster_cfg, ConnectionKind::Management, database)
                .await?;
            let result = revoke_on(conn.as_ref(), &templates, &bindings, &mut outcome).await;
            if let Err(e) = conn.close().await {
                warn!(error = %e, "Failed to close revocation connection");
            }
            result?;
        } else {
            let mut tx = self.begin_management(cluster, database).await?;
            run_revocation(tx.as_mut(), &templates, &bindings, &mut outcome).await;
            tx.commit().await?;
        }

        self.metrics.revoked.inc();
        info!(warnings = outcome.warnings.len(), "Revoked credential");
        Ok(outcome)
    }
}

async fn revoke_on(
    conn: &dyn SqlConnection,
    templates: &[String],
    bindings: &Bindings,
    outcome: &mut Outcome<()>,
) -> Result<(), SqlError> {
    let mut tx = conn.begin().await?;
    run_revocation(tx.as_mut(), templates, bindings, outcome).await;
    tx.commit().await
}

async fn run_revocation(
    tx: &mut dyn SqlTransaction,
    templates: &[String],
    bindings: &Bindings,
    outcome: &mut Outcome<()>,
) {
    for (idx, template) in templates.iter().enumerate() {
        let template = template.trim();
        if template.is_empty() {
            continue;
        }
        if let Err(e) = run_isolated(tx, &render(template, bindings)).await {
            warn!(index = idx, error = %e, "Revocation statement failed");
            outcome.warn(format!("failed to run revocation query [{idx}]: {template:?} - {e}"));
        }
    }
}

/// Run `sql` under a savepoint, rolling back to it on failure so the
/// surrounding transaction stays usable.
async fn run_isolated(tx: &mut dyn SqlTransaction, sql: &str) -> Result<(), SqlError> {
    tx.execute(&format!("savepoint {REVOKE_SAVEPOINT}")).await?;
    match tx.execute(sql).await {
        Ok(()) => tx.execute(&format!("release savepoint {REVOKE_SAVEPOINT}")).await,
        Err(e) => {
            if let Err(rb) = tx.execute(&format!("rollback to savepoint {REVOKE_SAVEPOINT}")).await {
                debug!(error = %rb, "Rollback to savepoint failed");
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_expiration_format() {
        let at = Utc.with_ymd_and_hms(2030, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(expiration(at), "2030-01-02 03:04:05+0000");
    }

    #[test]
    fn test_after_saturates() {
        let now = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(after(now, Duration::from_secs(60)), Utc.with_ymd_and_hms(2030, 1, 1, 0, 1, 0).unwrap());
        assert_eq!(after(now, Duration::MAX), DateTime::<Utc>::MAX_UTC);
    }
}
