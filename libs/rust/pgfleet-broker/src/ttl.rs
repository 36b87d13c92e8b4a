//! Lease TTL arithmetic.

use crate::config::LeaseLimits;
use crate::model::Outcome;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Inputs of [`calculate_ttl`] besides the system limits.
#[derive(Debug, Clone, Copy)]
pub struct TtlRequest {
    /// Increment asked for by the caller, zero when unset
    pub increment: Duration,
    /// Role default TTL, zero when unset
    pub role_ttl: Duration,
    /// Role max TTL, zero when unset
    pub role_max_ttl: Duration,
    /// When the lease was first issued
    pub issue_time: DateTime<Utc>,
    /// Current time
    pub now: DateTime<Utc>,
}

/// Compute the TTL for a new or renewed lease.
///
/// The effective max is the system max, lowered to the role max when that is
/// set. The requested TTL is the increment, else the role TTL, else the system
/// default. A lease never extends past `issue_time + effective max`: a TTL
/// over that bound is capped with a warning, and a lease already past it gets
/// a zero TTL.
#[must_use]
pub fn calculate_ttl(limits: &LeaseLimits, request: &TtlRequest) -> Outcome<Duration> {
    let mut max_ttl = limits.max_ttl;
    if !request.role_max_ttl.is_zero() && request.role_max_ttl < max_ttl {
        max_ttl = request.role_max_ttl;
    }

    let ttl = if !request.increment.is_zero() {
        request.increment
    } else if !request.role_ttl.is_zero() {
        request.role_ttl
    } else {
        limits.default_ttl
    };

    // An issue time in the future counts as now
    let elapsed = request
        .now
        .signed_duration_since(request.issue_time)
        .to_std()
        .unwrap_or_default();
    let remaining = max_ttl.saturating_sub(elapsed);

    if remaining.is_zero() {
        return Outcome::new(Duration::ZERO).with_warning("lease is past the max TTL and cannot be renewed");
    }

    if ttl > remaining {
        return Outcome::new(remaining).with_warning(format!(
            "TTL of {}s exceeded the effective max_ttl of {}s; TTL value is capped accordingly",
            ttl.as_secs(),
            remaining.as_secs()
        ));
    }

    Outcome::new(ttl)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    fn limits() -> LeaseLimits {
        LeaseLimits {
            default_ttl: HOUR,
            max_ttl: 24 * HOUR,
        }
    }

    fn request(increment: Duration, role_ttl: Duration, role_max_ttl: Duration) -> TtlRequest {
        let now = Utc::now();
        TtlRequest {
            increment,
            role_ttl,
            role_max_ttl,
            issue_time: now,
            now,
        }
    }

    #[test]
    fn test_falls_back_to_system_default() {
        let out = calculate_ttl(&limits(), &request(Duration::ZERO, Duration::ZERO, Duration::ZERO));
        assert_eq!(out.value, HOUR);
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn test_role_ttl_then_increment_precedence() {
        let out = calculate_ttl(&limits(), &request(Duration::ZERO, 2 * HOUR, Duration::ZERO));
        assert_eq!(out.value, 2 * HOUR);

        let out = calculate_ttl(&limits(), &request(3 * HOUR, 2 * HOUR, Duration::ZERO));
        assert_eq!(out.value, 3 * HOUR);
    }

    #[test]
    fn test_capped_by_role_max() {
        let out = calculate_ttl(&limits(), &request(10 * HOUR, HOUR, 4 * HOUR));
        assert_eq!(out.value, 4 * HOUR);
        assert_eq!(out.warnings.len(), 1);
    }

    #[test]
    fn test_role_max_above_system_max_is_ignored() {
        let out = calculate_ttl(&limits(), &request(48 * HOUR, HOUR, 72 * HOUR));
        assert_eq!(out.value, 24 * HOUR);
    }

    #[test]
    fn test_cap_accounts_for_elapsed_time() {
        let mut req = request(2 * HOUR, HOUR, 4 * HOUR);
        req.issue_time = req.now - chrono::Duration::hours(3);
        let out = calculate_ttl(&limits(), &req);
        assert_eq!(out.value, HOUR);
        assert_eq!(out.warnings.len(), 1);
    }

    #[test]
    fn test_past_max_yields_zero() {
        let mut req = request(HOUR, HOUR, 4 * HOUR);
        req.issue_time = req.now - chrono::Duration::hours(5);
        let out = calculate_ttl(&limits(), &req);
        assert!(out.value.is_zero());
        assert_eq!(out.warnings.len(), 1);
    }
}
