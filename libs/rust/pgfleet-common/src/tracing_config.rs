//! Log subscriber setup for hosts that embed the broker.
//!
//! The engine only emits `tracing` events. Where they end up is the host's
//! call; [`init_tracing`] is the stock wiring used by tests and small tools.

use std::str::FromStr;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Output encoding for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human readable, one event per line
    #[default]
    Plain,
    /// One JSON object per event
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plain" | "text" | "" => Ok(Self::Plain),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format {other:?}")),
        }
    }
}

/// Subscriber settings.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Component name logged once the subscriber is live
    pub component: String,
    /// Filter directive used when `RUST_LOG` is unset
    pub default_directive: String,
    /// Line encoding
    pub format: LogFormat,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            component: "pgfleet".to_string(),
            default_directive: "info".to_string(),
            format: LogFormat::Plain,
        }
    }
}

impl TracingConfig {
    /// Reads `PGFLEET_LOG_FORMAT`; unknown values keep the plain format.
    #[must_use]
    pub fn from_env() -> Self {
        let format = std::env::var("PGFLEET_LOG_FORMAT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_default();
        Self {
            format,
            ..Self::default()
        }
    }

    /// Set the component name.
    #[must_use]
    pub fn with_component(mut self, name: impl Into<String>) -> Self {
        self.component = name.into();
        self
    }

    /// Set the fallback filter directive.
    #[must_use]
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.default_directive = directive.into();
        self
    }

    /// Set the line encoding.
    #[must_use]
    pub const fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.default_directive))
    }
}

/// Install the global subscriber.
///
/// Returns false if the process already had one, e.g. when the host set up
/// its own logging first.
pub fn init_tracing(config: &TracingConfig) -> bool {
    let base = tracing_subscriber::registry().with(config.env_filter());

    let installed = match config.format {
        LogFormat::Json => base.with(tracing_subscriber::fmt::layer().json()).try_init(),
        LogFormat::Plain => base.with(tracing_subscriber::fmt::layer()).try_init(),
    }
    .is_ok();

    if installed {
        tracing::info!(component = %config.component, format = ?config.format, "Logging ready");
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TracingConfig::default();
        assert_eq!(config.component, "pgfleet");
        assert_eq!(config.default_directive, "info");
        assert_eq!(config.format, LogFormat::Plain);
    }

    #[test]
    fn test_builders() {
        let config = TracingConfig::default()
            .with_component("pgfleet-broker")
            .with_directive("pgfleet_broker=debug")
            .with_format(LogFormat::Json);

        assert_eq!(config.component, "pgfleet-broker");
        assert_eq!(config.default_directive, "pgfleet_broker=debug");
        assert_eq!(config.format, LogFormat::Json);
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("text".parse::<LogFormat>(), Ok(LogFormat::Plain));
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_second_install_is_reported() {
        let config = TracingConfig::default().with_directive("warn");
        let first = init_tracing(&config);
        let second = init_tracing(&config);
        assert!(!(first && second));
    }
}
