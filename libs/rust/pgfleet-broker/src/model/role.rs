//! Role templates.

use crate::statements::{DEFAULT_CREATION_SQL, DEFAULT_REVOCATION_SQL};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A reusable credential template, global across clusters.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoleConfig {
    /// Default lease TTL in seconds
    #[serde(default)]
    pub default_ttl: u64,
    /// Maximum lease TTL in seconds
    #[serde(default)]
    pub max_ttl: u64,
    /// Statements run when a credential is issued
    #[serde(default)]
    pub creation_statement: Vec<String>,
    /// Statements run when a credential is revoked
    #[serde(default)]
    pub revocation_statement: Vec<String>,
}

impl RoleConfig {
    /// Default TTL as a duration.
    #[must_use]
    pub const fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl)
    }

    /// Max TTL as a duration.
    #[must_use]
    pub const fn max_ttl(&self) -> Duration {
        Duration::from_secs(self.max_ttl)
    }

    /// Creation statements to run, falling back to the built-in set.
    #[must_use]
    pub fn creation_statements(&self) -> Vec<String> {
        effective(&self.creation_statement, DEFAULT_CREATION_SQL)
    }

    /// Revocation statements to run, falling back to the built-in set.
    #[must_use]
    pub fn revocation_statements(&self) -> Vec<String> {
        effective(&self.revocation_statement, DEFAULT_REVOCATION_SQL)
    }

    /// The record as returned by read endpoints.
    #[must_use]
    pub fn to_data(&self) -> serde_json::Value {
        serde_json::json!({
            "default_ttl": self.default_ttl,
            "max_ttl": self.max_ttl,
            "creation_statement": self.creation_statement,
            "revocation_statement": self.revocation_statement,
        })
    }
}

/// A list with nothing but blank entries counts as empty.
fn effective(configured: &[String], defaults: &[&str]) -> Vec<String> {
    if configured.iter().all(|s| s.trim().is_empty()) {
        defaults.iter().map(|s| (*s).to_string()).collect()
    } else {
        configured.to_vec()
    }
}

/// Fields accepted when writing a role. `None` TTLs take the system values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleRequest {
    /// Default lease TTL
    pub default_ttl: Option<Duration>,
    /// Maximum lease TTL
    pub max_ttl: Option<Duration>,
    /// Creation statement templates
    pub creation_statement: Vec<String>,
    /// Revocation statement templates
    pub revocation_statement: Vec<String>,
}

impl RoleRequest {
    /// Set both TTLs.
    #[must_use]
    pub const fn with_ttls(mut self, default_ttl: Duration, max_ttl: Duration) -> Self {
        self.default_ttl = Some(default_ttl);
        self.max_ttl = Some(max_ttl);
        self
    }

    /// Set the creation statements.
    #[must_use]
    pub fn with_creation(mut self, statements: Vec<String>) -> Self {
        self.creation_statement = statements;
        self
    }

    /// Set the revocation statements.
    #[must_use]
    pub fn with_revocation(mut self, statements: Vec<String>) -> Self {
        self.revocation_statement = statements;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_lists_fall_back_to_defaults() {
        let role = RoleConfig::default();
        assert_eq!(role.creation_statements().len(), DEFAULT_CREATION_SQL.len());
        assert_eq!(role.revocation_statements().len(), DEFAULT_REVOCATION_SQL.len());

        let blank = RoleConfig {
            creation_statement: vec!["  ".into()],
            ..RoleConfig::default()
        };
        assert_eq!(blank.creation_statements().len(), DEFAULT_CREATION_SQL.len());
    }

    #[test]
    fn test_configured_lists_win() {
        let role = RoleConfig {
            revocation_statement: vec!["drop role {{user}}".into()],
            ..RoleConfig::default()
        };
        assert_eq!(role.revocation_statements(), vec!["drop role {{user}}"]);
    }

    #[test]
    fn test_ttls() {
        let role = RoleConfig {
            default_ttl: 60,
            max_ttl: 120,
            ..RoleConfig::default()
        };
        assert_eq!(role.default_ttl(), Duration::from_secs(60));
        assert_eq!(role.max_ttl(), Duration::from_secs(120));
    }
}
