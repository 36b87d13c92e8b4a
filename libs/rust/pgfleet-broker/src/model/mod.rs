//! Stored records and the values exchanged with the host.

pub mod cluster;
pub mod database;
pub mod lease;
pub mod metadata;
pub mod naming;
pub mod role;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub use cluster::{ClusterConfig, ClusterRequest};
pub use database::{DatabaseConfig, DatabaseRequest};
pub use lease::{IssuedCredential, LeaseSecret, RenewedLease};
pub use metadata::{MetadataRecord, MetadataTarget};
pub use role::{RoleConfig, RoleRequest};

/// Soft-delete state of a cluster or database record.
///
/// Stored as the `disabled` boolean. A missing or `null` flag reads as
/// [`Status::Active`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    /// Usable through the regular endpoints
    #[default]
    Active,
    /// Soft-deleted, only reachable through GC
    Disabled,
}

impl Status {
    /// Returns true for [`Status::Disabled`].
    #[must_use]
    pub const fn is_disabled(self) -> bool {
        matches!(self, Self::Disabled)
    }
}

impl Serialize for Status {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bool(self.is_disabled())
    }
}

impl<'de> Deserialize<'de> for Status {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let flag = Option::<bool>::deserialize(deserializer)?;
        Ok(if flag == Some(true) {
            Self::Disabled
        } else {
            Self::Active
        })
    }
}

/// Result of an operation plus the warnings the host should relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome<T> {
    /// Operation result
    pub value: T,
    /// Caller-visible warnings
    pub warnings: Vec<String>,
}

impl<T> Outcome<T> {
    /// Wrap a value with no warnings.
    pub const fn new(value: T) -> Self {
        Self {
            value,
            warnings: Vec::new(),
        }
    }

    /// Add a warning.
    pub fn warn(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// Add a warning, builder style.
    #[must_use]
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warn(warning);
        self
    }

    /// Transform the value, keeping the warnings.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            value: f(self.value),
            warnings: self.warnings,
        }
    }
}

/// Serde helpers for secrets stored in plain JSON records.
pub(crate) mod secret {
    use secrecy::{ExposeSecret, SecretString};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &SecretString, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(value.expose_secret())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SecretString, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(SecretString::from(raw.unwrap_or_default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    struct Flagged {
        #[serde(default)]
        disabled: Status,
    }

    #[test]
    fn test_status_reads_missing_and_null_as_active() {
        let f: Flagged = serde_json::from_str("{}").unwrap();
        assert_eq!(f.disabled, Status::Active);
        let f: Flagged = serde_json::from_str(r#"{"disabled":null}"#).unwrap();
        assert_eq!(f.disabled, Status::Active);
        let f: Flagged = serde_json::from_str(r#"{"disabled":true}"#).unwrap();
        assert_eq!(f.disabled, Status::Disabled);
    }

    #[test]
    fn test_status_written_as_bool() {
        let json = serde_json::to_string(&Flagged {
            disabled: Status::Disabled,
        })
        .unwrap();
        assert_eq!(json, r#"{"disabled":true}"#);
    }

    #[test]
    fn test_outcome_keeps_warnings_through_map() {
        let outcome = Outcome::new(2).with_warning("first").map(|v| v * 2);
        assert_eq!(outcome.value, 4);
        assert_eq!(outcome.warnings, vec!["first"]);
    }
}
