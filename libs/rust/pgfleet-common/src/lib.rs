//! Shared library for cross-cutting concerns in pgfleet crates.
//!
//! This crate provides centralized implementations for:
//! - Error classification shared by every engine error type
//! - Tracing subscriber configuration
//! - Counters and gauges rendered in Prometheus text format

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod metrics;
pub mod tracing_config;

pub use error::{Classify, ErrorClass};
pub use metrics::{Counter, Gauge};
pub use tracing_config::{LogFormat, TracingConfig, init_tracing};
