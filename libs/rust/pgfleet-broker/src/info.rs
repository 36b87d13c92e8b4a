//! Build and runtime information.

use crate::broker::Broker;
use pgfleet_common::metrics::render;
use serde::Serialize;

/// What the `info` endpoint reports.
#[derive(Debug, Clone, Serialize)]
pub struct BrokerInfo {
    /// Human readable description
    pub description: &'static str,
    /// Crate version
    pub version: &'static str,
    /// Commit the binary was built from, empty when unknown
    pub commit_sha: &'static str,
    /// Counters in Prometheus text format
    pub metrics: String,
}

/// Description reported by [`Broker::info`].
pub const DESCRIPTION: &str = "Manage credentials for dynamic fleets of PostgreSQL clusters";

impl Broker {
    /// Describe this build and dump the engine counters.
    #[must_use]
    pub fn info(&self) -> BrokerInfo {
        let cache = self.connections.metrics();
        let metrics = render(
            &[
                &cache.opened,
                &cache.evicted,
                &self.metrics.issued,
                &self.metrics.renewed,
                &self.metrics.revoked,
            ],
            &[&cache.cached],
        );

        BrokerInfo {
            description: DESCRIPTION,
            version: env!("CARGO_PKG_VERSION"),
            commit_sha: option_env!("PGFLEET_GIT_COMMIT").unwrap_or_default(),
            metrics,
        }
    }
}
