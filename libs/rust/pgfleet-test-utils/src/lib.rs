//! Shared test utilities for pgfleet crates.
//!
//! This crate provides:
//! - A scripted SQL connector that records every statement
//! - Proptest generators for names, tags and TTLs
//! - Fixtures that stand up a broker over an in-memory store

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod mocks;

pub use fixtures::*;
pub use generators::*;
pub use mocks::{Executed, FakeConnector};
