//! Shared proptest generators for pgfleet crates.

use proptest::collection::btree_map;
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::time::Duration;

/// Names accepted as cluster, database and role names.
pub fn valid_name_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z0-9_]",
        "[a-zA-Z0-9_][a-zA-Z0-9_.-]{0,20}[a-zA-Z0-9_]",
    ]
}

/// Names rejected as path segments.
pub fn invalid_name_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        "-[a-z0-9]{0,8}",
        "[a-z0-9]{0,8}\\.",
        "[a-z]{1,5}/[a-z]{1,5}",
        "[a-z]{1,5} [a-z]{1,5}",
    ]
}

/// Caller display names, some longer than the username prefix.
pub fn display_name_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z][a-z0-9-]{0,10}",
        "[a-z][a-z0-9-]{30,60}",
        "[a-zé]{20,40}",
    ]
}

/// Tag maps within the key and value length limits.
pub fn metadata_strategy() -> impl Strategy<Value = BTreeMap<String, String>> {
    btree_map("[a-z][a-z0-9_]{0,15}", "[a-zA-Z0-9 ._-]{0,32}", 1..6)
}

/// Durations up to two days, whole seconds.
pub fn ttl_strategy() -> impl Strategy<Value = Duration> {
    (0u64..172_800).prop_map(Duration::from_secs)
}
