//! Database records.

use super::Status;
use serde::{Deserialize, Serialize};

/// A logical database registered inside a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Parent cluster
    pub cluster: String,
    /// Database name
    pub database: String,
    /// Role owning every object created by leased principals
    pub objects_owner: String,
    /// Soft-delete flag
    #[serde(default)]
    pub disabled: Status,
}

impl DatabaseConfig {
    /// Returns true once the database itself has been soft-deleted.
    #[must_use]
    pub const fn is_disabled(&self) -> bool {
        self.disabled.is_disabled()
    }

    /// Mark the database as soft-deleted.
    pub fn disable(&mut self) {
        self.disabled = Status::Disabled;
    }

    /// The record as returned by read endpoints.
    #[must_use]
    pub fn to_data(&self) -> serde_json::Value {
        serde_json::json!({
            "cluster": self.cluster,
            "database": self.database,
            "objects_owner": self.objects_owner,
            "disabled": self.is_disabled(),
        })
    }
}

/// Fields accepted when registering a database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseRequest {
    /// Objects owner role; generated when empty
    pub objects_owner_role: String,
    /// Create the owner role and grants on the server
    pub initialize: bool,
    /// Also create the physical database (only with `initialize`)
    pub create_db: bool,
}

impl Default for DatabaseRequest {
    fn default() -> Self {
        Self {
            objects_owner_role: String::new(),
            initialize: true,
            create_db: true,
        }
    }
}

impl DatabaseRequest {
    /// Register an existing database without touching the server.
    #[must_use]
    pub fn record_only() -> Self {
        Self {
            initialize: false,
            create_db: false,
            ..Self::default()
        }
    }

    /// Use a specific objects owner role.
    #[must_use]
    pub fn with_objects_owner(mut self, role: impl Into<String>) -> Self {
        self.objects_owner_role = role.into();
        self
    }
}
