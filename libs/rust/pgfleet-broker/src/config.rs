//! Engine-wide configuration.
//!
//! These settings stand in for the host's system view (lease limits) and tune
//! how the broker talks to target clusters. Per-cluster settings live in the
//! stored [`ClusterConfig`](crate::model::ClusterConfig) records instead.

use pgfleet_common::TracingConfig;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Environment variable could not be parsed
    #[error("Failed to parse {name}: {reason}")]
    ParseError {
        /// Variable name
        name: String,
        /// Parse failure
        reason: String,
    },

    /// Values are individually valid but inconsistent
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// System-wide lease TTL limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseLimits {
    /// TTL used when neither the request nor the role sets one
    pub default_ttl: Duration,
    /// Hard ceiling for any lease
    pub max_ttl: Duration,
}

impl Default for LeaseLimits {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(3600),
            max_ttl: Duration::from_secs(86400),
        }
    }
}

/// Broker configuration.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// System lease limits
    pub lease: LeaseLimits,
    /// Timeout for opening and pinging a connection
    pub connect_timeout: Duration,
    /// Upper bound for a single statement
    pub statement_timeout: Duration,
    /// Added to the computed expiry when renewing
    pub renew_margin: Duration,
    /// Logging setup for hosts that let the broker install a subscriber
    pub tracing: TracingConfig,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            lease: LeaseLimits::default(),
            connect_timeout: Duration::from_secs(10),
            statement_timeout: Duration::from_secs(30),
            renew_margin: Duration::from_secs(5),
            tracing: TracingConfig::default(),
        }
    }
}

impl BrokerConfig {
    /// Load configuration from `PGFLEET_*` environment variables, reading a
    /// `.env` file first when present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = Self {
            lease: LeaseLimits {
                default_ttl: Duration::from_secs(parse_env("PGFLEET_DEFAULT_LEASE_TTL", 3600)?),
                max_ttl: Duration::from_secs(parse_env("PGFLEET_MAX_LEASE_TTL", 86400)?),
            },
            connect_timeout: Duration::from_secs(parse_env("PGFLEET_CONNECT_TIMEOUT", 10)?),
            statement_timeout: Duration::from_secs(parse_env("PGFLEET_STATEMENT_TIMEOUT", 30)?),
            renew_margin: Duration::from_secs(parse_env("PGFLEET_RENEW_MARGIN", 5)?),
            tracing: TracingConfig::from_env()
                .with_directive(env::var("PGFLEET_LOG_LEVEL").unwrap_or_else(|_| "info".to_string())),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.lease.max_ttl.is_zero() {
            return Err(ConfigError::Invalid("max lease TTL must be greater than 0".to_string()));
        }
        if self.lease.default_ttl > self.lease.max_ttl {
            return Err(ConfigError::Invalid(
                "default lease TTL cannot exceed the max lease TTL".to_string(),
            ));
        }
        if self.connect_timeout.is_zero() || self.statement_timeout.is_zero() {
            return Err(ConfigError::Invalid("timeouts must be greater than 0".to_string()));
        }
        Ok(())
    }

    /// Set the system lease limits.
    #[must_use]
    pub const fn with_lease_limits(mut self, default_ttl: Duration, max_ttl: Duration) -> Self {
        self.lease = LeaseLimits {
            default_ttl,
            max_ttl,
        };
        self
    }

    /// Set the connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the statement timeout.
    #[must_use]
    pub const fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = timeout;
        self
    }

    /// Set the renewal margin.
    #[must_use]
    pub const fn with_renew_margin(mut self, margin: Duration) -> Self {
        self.renew_margin = margin;
        self
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(val) => val.parse().map_err(|e: T::Err| ConfigError::ParseError {
            name: name.to_string(),
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BrokerConfig::default();
        assert_eq!(config.lease.default_ttl, Duration::from_secs(3600));
        assert_eq!(config.lease.max_ttl, Duration::from_secs(86400));
        assert_eq!(config.renew_margin, Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builders() {
        let config = BrokerConfig::default()
            .with_lease_limits(Duration::from_secs(60), Duration::from_secs(120))
            .with_statement_timeout(Duration::from_secs(2))
            .with_renew_margin(Duration::ZERO);
        assert_eq!(config.lease.max_ttl, Duration::from_secs(120));
        assert_eq!(config.statement_timeout, Duration::from_secs(2));
        assert!(config.renew_margin.is_zero());
    }

    #[test]
    fn test_validate_rejects_inverted_limits() {
        let config = BrokerConfig::default()
            .with_lease_limits(Duration::from_secs(600), Duration::from_secs(60));
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_parse_env_falls_back_to_default() {
        let value = parse_env::<u64>("PGFLEET_TEST_UNSET_VARIABLE", 7).unwrap();
        assert_eq!(value, 7);
    }
}
