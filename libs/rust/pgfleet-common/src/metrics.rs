//! Lightweight metrics with Prometheus text rendering.
//!
//! The engine has no exporter of its own; hosts scrape [`render`] output or
//! read the raw values.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug)]
struct Series {
    name: String,
    help: String,
    value: AtomicU64,
}

impl Series {
    fn new(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            value: AtomicU64::new(0),
        }
    }

    fn load(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    fn add(&self, amount: u64) {
        self.value.fetch_add(amount, Ordering::Relaxed);
    }

    fn write_to(&self, out: &mut String, kind: &str) {
        let _ = writeln!(out, "# HELP {} {}", self.name, self.help);
        let _ = writeln!(out, "# TYPE {} {kind}", self.name);
        let _ = writeln!(out, "{} {}", self.name, self.load());
    }
}

/// Monotonic counter.
#[derive(Debug)]
pub struct Counter(Series);

impl Counter {
    /// New counter starting at zero.
    #[must_use]
    pub fn new(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self(Series::new(name, help))
    }

    /// Add one.
    pub fn inc(&self) {
        self.0.add(1);
    }

    /// Add `amount`.
    pub fn inc_by(&self, amount: u64) {
        self.0.add(amount);
    }

    /// Current value.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.0.load()
    }

    /// Metric name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Prometheus exposition block for this counter.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        let mut out = String::new();
        self.0.write_to(&mut out, "counter");
        out
    }
}

/// Point-in-time value that never drops below zero.
#[derive(Debug)]
pub struct Gauge(Series);

impl Gauge {
    /// New gauge starting at zero.
    #[must_use]
    pub fn new(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self(Series::new(name, help))
    }

    /// Overwrite the value.
    pub fn set(&self, value: u64) {
        self.0.value.store(value, Ordering::Relaxed);
    }

    /// Add one.
    pub fn inc(&self) {
        self.0.add(1);
    }

    /// Subtract one, saturating at zero.
    pub fn dec(&self) {
        let _ = self
            .0
            .value
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| Some(v.saturating_sub(1)));
    }

    /// Current value.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.0.load()
    }

    /// Metric name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Prometheus exposition block for this gauge.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        let mut out = String::new();
        self.0.write_to(&mut out, "gauge");
        out
    }
}

/// Render counters then gauges into one exposition document.
#[must_use]
pub fn render(counters: &[&Counter], gauges: &[&Gauge]) -> String {
    let mut out = String::new();
    for counter in counters {
        counter.0.write_to(&mut out, "counter");
    }
    for gauge in gauges {
        gauge.0.write_to(&mut out, "gauge");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_accumulates() {
        let issued = Counter::new("issued_total", "Issued");
        assert_eq!(issued.get(), 0);

        issued.inc();
        issued.inc_by(5);
        assert_eq!(issued.get(), 6);
        assert_eq!(issued.name(), "issued_total");
    }

    #[test]
    fn test_gauge_saturates() {
        let cached = Gauge::new("cached", "Cached");
        cached.dec();
        assert_eq!(cached.get(), 0);

        cached.set(10);
        cached.inc();
        assert_eq!(cached.get(), 11);

        cached.dec();
        assert_eq!(cached.get(), 10);
    }

    #[test]
    fn test_exposition_block() {
        let counter = Counter::new("pgfleet_credentials_issued_total", "Issued credentials");
        counter.inc_by(42);

        assert_eq!(
            counter.to_prometheus(),
            "# HELP pgfleet_credentials_issued_total Issued credentials\n\
             # TYPE pgfleet_credentials_issued_total counter\n\
             pgfleet_credentials_issued_total 42\n"
        );
    }

    #[test]
    fn test_render_orders_counters_first() {
        let counter = Counter::new("a_total", "a");
        let gauge = Gauge::new("b", "b");
        gauge.set(3);

        let output = render(&[&counter], &[&gauge]);
        let counter_at = output.find("a_total 0").unwrap_or(usize::MAX);
        let gauge_at = output.find("b 3").unwrap_or(usize::MAX);
        assert!(counter_at < gauge_at);
        assert!(output.contains("# TYPE b gauge"));
    }
}
