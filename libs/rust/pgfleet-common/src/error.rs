//! Error classification shared across pgfleet crates.
//!
//! Every error that leaves the engine is sorted into one of four classes. The
//! class decides how the host sees it: caller-facing classes become error
//! responses, upstream failures are propagated unchanged.

use serde::Serialize;
use std::fmt;

/// Coarse error class used to route an error to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// A referenced record does not exist.
    NotFound,
    /// Malformed or out-of-range input, rejected before any side effect.
    Validation,
    /// The record exists but is in the wrong lifecycle state for the operation.
    Conflict,
    /// Storage, connection or statement failure. Aborts the operation.
    Upstream,
}

impl ErrorClass {
    /// Returns true when the error should be reported to the caller as an
    /// error response rather than propagated as a fatal failure.
    ///
    /// # Examples
    ///
    /// ```
    /// use pgfleet_common::ErrorClass;
    ///
    /// assert!(ErrorClass::NotFound.is_caller_error());
    /// assert!(!ErrorClass::Upstream.is_caller_error());
    /// ```
    #[must_use]
    pub const fn is_caller_error(self) -> bool {
        matches!(self, Self::NotFound | Self::Validation | Self::Conflict)
    }

    /// Stable lowercase label, used in log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Validation => "validation",
            Self::Conflict => "conflict",
            Self::Upstream => "upstream",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Implemented by error types that can be sorted into an [`ErrorClass`].
pub trait Classify {
    /// Class of this error.
    fn class(&self) -> ErrorClass;

    /// Shorthand for `self.class().is_caller_error()`.
    fn is_caller_error(&self) -> bool {
        self.class().is_caller_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_errors() {
        assert!(ErrorClass::NotFound.is_caller_error());
        assert!(ErrorClass::Validation.is_caller_error());
        assert!(ErrorClass::Conflict.is_caller_error());
    }

    #[test]
    fn test_upstream_is_fatal() {
        assert!(!ErrorClass::Upstream.is_caller_error());
    }

    #[test]
    fn test_display() {
        assert_eq!(ErrorClass::Conflict.to_string(), "conflict");
        assert_eq!(ErrorClass::NotFound.to_string(), "not_found");
    }
}
