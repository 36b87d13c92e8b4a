//! Metadata tag sets.

use crate::error::{BrokerError, BrokerResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Longest accepted tag key, in characters.
pub const MAX_KEY_LEN: usize = 64;
/// Longest accepted tag value, in characters.
pub const MAX_VALUE_LEN: usize = 128;

/// Kind of object a tag set is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataTarget {
    /// Tags on a cluster
    Cluster,
    /// Tags on a database
    Database,
}

impl MetadataTarget {
    /// Parse the `type` attribute of a lookup.
    pub fn parse(s: &str) -> BrokerResult<Self> {
        match s {
            "cluster" => Ok(Self::Cluster),
            "database" => Ok(Self::Database),
            other => Err(BrokerError::validation(format!(
                "invalid 'type' value {other:?}, only 'cluster' or 'database' is supported"
            ))),
        }
    }

    /// Id prefix of tag sets of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cluster => "cluster",
            Self::Database => "database",
        }
    }
}

impl fmt::Display for MetadataTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tag set attached to one cluster or one database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    /// Owning cluster
    pub cluster: String,
    /// Owning database, when the tags belong to a database
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// Tags
    pub data: BTreeMap<String, String>,
}

impl MetadataRecord {
    /// Kind of object the tags are attached to.
    #[must_use]
    pub const fn target(&self) -> MetadataTarget {
        if self.database.is_some() {
            MetadataTarget::Database
        } else {
            MetadataTarget::Cluster
        }
    }

    /// Composite id: `cluster/{cluster}` or `database/{cluster}:{database}`.
    #[must_use]
    pub fn id(&self) -> String {
        match &self.database {
            Some(db) => format!("database/{}:{db}", self.cluster),
            None => format!("cluster/{}", self.cluster),
        }
    }

    /// Object name reported by lookups: `{cluster}` or `{cluster}/{database}`.
    #[must_use]
    pub fn name(&self) -> String {
        match &self.database {
            Some(db) => format!("{}/{db}", self.cluster),
            None => self.cluster.clone(),
        }
    }

    /// Returns true when every pair of `matcher` is present in this record.
    #[must_use]
    pub fn matches(&self, matcher: &BTreeMap<String, String>) -> bool {
        matcher
            .iter()
            .all(|(k, v)| self.data.get(k).is_some_and(|stored| stored == v))
    }
}

/// Check a tag map supplied by a caller.
pub fn validate_pairs(data: &BTreeMap<String, String>) -> BrokerResult<()> {
    if data.is_empty() {
        return Err(BrokerError::validation(
            "'data' must contain at least one key-value pair",
        ));
    }

    for (k, v) in data {
        if k.is_empty() || k.chars().count() > MAX_KEY_LEN {
            return Err(BrokerError::validation(format!(
                "metadata key {k:?} must be between 1 and {MAX_KEY_LEN} characters"
            )));
        }
        if v.chars().count() > MAX_VALUE_LEN {
            return Err(BrokerError::validation(format!(
                "value for metadata key {k:?} exceeds {MAX_VALUE_LEN} characters"
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> BTreeMap<String, String> {
        items
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_ids_and_names() {
        let c = MetadataRecord {
            cluster: "c1".into(),
            database: None,
            data: pairs(&[("k", "v")]),
        };
        assert_eq!(c.id(), "cluster/c1");
        assert_eq!(c.name(), "c1");
        assert_eq!(c.target(), MetadataTarget::Cluster);

        let d = MetadataRecord {
            database: Some("d1".into()),
            ..c
        };
        assert_eq!(d.id(), "database/c1:d1");
        assert_eq!(d.name(), "c1/d1");
        assert_eq!(d.target(), MetadataTarget::Database);
    }

    #[test]
    fn test_subset_match_is_asymmetric() {
        let wide = MetadataRecord {
            cluster: "c1".into(),
            database: None,
            data: pairs(&[("k", "v"), ("k2", "v2")]),
        };
        assert!(wide.matches(&pairs(&[("k", "v")])));

        let narrow = MetadataRecord {
            data: pairs(&[("k", "v")]),
            ..wide
        };
        assert!(!narrow.matches(&pairs(&[("k", "v"), ("k3", "v3")])));
        assert!(!narrow.matches(&pairs(&[("k", "other")])));
    }

    #[test]
    fn test_validate_pairs_limits() {
        assert!(validate_pairs(&BTreeMap::new()).is_err());
        assert!(validate_pairs(&pairs(&[("k", "v")])).is_ok());

        let long_key = "k".repeat(MAX_KEY_LEN + 1);
        assert!(validate_pairs(&pairs(&[(long_key.as_str(), "v")])).is_err());

        let long_value = "v".repeat(MAX_VALUE_LEN + 1);
        assert!(validate_pairs(&pairs(&[("k", long_value.as_str())])).is_err());

        let max_value = "v".repeat(MAX_VALUE_LEN);
        assert!(validate_pairs(&pairs(&[("k", max_value.as_str())])).is_ok());
    }

    #[test]
    fn test_target_parse() {
        assert_eq!(MetadataTarget::parse("database").unwrap(), MetadataTarget::Database);
        assert!(MetadataTarget::parse("table").is_err());
    }
}
