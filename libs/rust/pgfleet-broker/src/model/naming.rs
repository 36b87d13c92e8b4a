//! Name validation and generated role names.

use crate::error::{BrokerError, BrokerResult};
use once_cell::sync::Lazy;
use rand::Rng;
use rand::distributions::Alphanumeric;
use regex::Regex;
use uuid::Uuid;

/// PostgreSQL truncates identifiers longer than this.
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Display names are cut to this length before the random suffix is added.
pub const DISPLAY_NAME_LEN: usize = 26;

/// Length of generated passwords.
pub const PASSWORD_LEN: usize = 36;

static NAME_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^\w(([\w\-.]+)?\w)?$").ok());

/// Returns true when `name` is usable as a cluster, database or role name.
#[must_use]
pub fn is_valid_name(name: &str) -> bool {
    NAME_RE.as_ref().is_some_and(|re| re.is_match(name))
}

/// Reject names that cannot appear as a single path segment.
pub fn validate_name(kind: &str, name: &str) -> BrokerResult<()> {
    if is_valid_name(name) {
        Ok(())
    } else {
        Err(BrokerError::validation(format!("Invalid {kind} name {name:?}")))
    }
}

/// Cut `value` to at most `max` bytes on a character boundary.
#[must_use]
pub fn truncate(value: &str, max: usize) -> &str {
    if value.len() <= max {
        return value;
    }
    let end = value
        .char_indices()
        .map(|(i, _)| i)
        .take_while(|&i| i <= max)
        .last()
        .unwrap_or(0);
    &value[..end]
}

/// `v-manage-{uuid}`
#[must_use]
pub fn management_role_name() -> String {
    truncate(&format!("v-manage-{}", Uuid::new_v4()), MAX_IDENTIFIER_LEN).to_string()
}

/// `v-objown-{database}-{uuid}`
#[must_use]
pub fn objects_owner_name(database: &str) -> String {
    truncate(&format!("v-objown-{database}-{}", Uuid::new_v4()), MAX_IDENTIFIER_LEN).to_string()
}

/// Username for a leased principal: truncated display name plus a random suffix.
#[must_use]
pub fn lease_username(display_name: &str) -> String {
    let prefix = truncate(display_name, DISPLAY_NAME_LEN);
    truncate(&format!("{prefix}-{}", Uuid::new_v4()), MAX_IDENTIFIER_LEN).to_string()
}

/// Random alphanumeric password.
#[must_use]
pub fn generate_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(PASSWORD_LEN)
        .map(char::from)
        .collect()
}
