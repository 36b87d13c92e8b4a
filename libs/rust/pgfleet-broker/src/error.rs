//! Broker error types using thiserror 2.0.
//!
//! Caller-facing variants carry the exact message returned to the host.
//! Everything else is an upstream failure and aborts the operation.

use crate::sql::SqlError;
use crate::store::StoreError;
use pgfleet_common::{Classify, ErrorClass};
use thiserror::Error;

/// Broker errors.
#[derive(Error, Debug)]
pub enum BrokerError {
    /// Referenced cluster, database, role or metadata does not exist
    #[error("{0}")]
    NotFound(String),

    /// Malformed input
    #[error("{0}")]
    Validation(String),

    /// Record is in the wrong lifecycle state for the operation
    #[error("{0}")]
    Conflict(String),

    /// Config store failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Connection or statement failure against a target cluster
    #[error(transparent)]
    Sql(#[from] SqlError),

    /// Stored record could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Engine invariant broken at runtime
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for broker operations.
pub type BrokerResult<T> = Result<T, BrokerError>;

impl BrokerError {
    /// Create a not found error.
    #[must_use]
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a validation error.
    #[must_use]
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a state conflict error.
    #[must_use]
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns true for [`BrokerError::NotFound`].
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Wrap an upstream failure with context about what was being attempted.
    ///
    /// Caller-facing errors pass through untouched.
    #[must_use]
    pub fn context(self, what: &str) -> Self {
        match self {
            Self::Sql(e) => Self::Sql(e.context(what)),
            Self::Store(e) => Self::Store(StoreError::Backend(format!("{what}. {e}"))),
            other => other,
        }
    }
}

impl Classify for BrokerError {
    fn class(&self) -> ErrorClass {
        match self {
            Self::NotFound(_) => ErrorClass::NotFound,
            Self::Validation(_) => ErrorClass::Validation,
            Self::Conflict(_) => ErrorClass::Conflict,
            Self::Store(_) | Self::Sql(_) | Self::Serialization(_) | Self::Internal(_) => {
                ErrorClass::Upstream
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_messages_are_verbatim() {
        let err = BrokerError::not_found("Cluster with name c1 is not registered");
        assert_eq!(err.to_string(), "Cluster with name c1 is not registered");
    }

    #[test]
    fn test_classification() {
        assert_eq!(BrokerError::validation("x").class(), ErrorClass::Validation);
        assert_eq!(BrokerError::conflict("x").class(), ErrorClass::Conflict);
        assert!(BrokerError::not_found("x").is_caller_error());
        assert!(!BrokerError::Sql(SqlError::Closed).is_caller_error());
        assert!(!BrokerError::Store(StoreError::Backend("down".into())).is_caller_error());
    }

    #[test]
    fn test_context_only_touches_upstream() {
        let err = BrokerError::Sql(SqlError::statement("boom")).context("failed to rotate");
        assert!(err.to_string().contains("failed to rotate"));

        let err = BrokerError::validation("bad").context("ignored");
        assert_eq!(err.to_string(), "bad");
    }
}
