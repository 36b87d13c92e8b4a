//! Decoding of loosely typed request fields.
//!
//! Hosts send JSON-ish maps where numbers and booleans may arrive as strings,
//! and durations as `"300s"`-style strings.

use crate::error::{BrokerError, BrokerResult};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

fn invalid(key: &str, expected: &str) -> BrokerError {
    BrokerError::validation(format!("invalid value for field {key:?}: expected {expected}"))
}

/// Optional string field.
pub fn string(data: &Map<String, Value>, key: &str) -> BrokerResult<Option<String>> {
    match data.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(_) => Err(invalid(key, "a string")),
    }
}

/// String field with a default.
pub fn string_or(data: &Map<String, Value>, key: &str, default: &str) -> BrokerResult<String> {
    Ok(string(data, key)?.unwrap_or_else(|| default.to_string()))
}

/// Integer field with a default.
pub fn int_or(data: &Map<String, Value>, key: &str, default: i64) -> BrokerResult<i64> {
    match data.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Number(n)) => n.as_i64().ok_or_else(|| invalid(key, "an integer")),
        Some(Value::String(s)) => s.trim().parse().map_err(|_| invalid(key, "an integer")),
        Some(_) => Err(invalid(key, "an integer")),
    }
}

/// Non-negative integer field with a default.
pub fn uint_or(data: &Map<String, Value>, key: &str, default: u32) -> BrokerResult<u32> {
    let value = int_or(data, key, i64::from(default))?;
    u32::try_from(value).map_err(|_| invalid(key, "a non-negative integer"))
}

/// Boolean field with a default.
pub fn bool_or(data: &Map<String, Value>, key: &str, default: bool) -> BrokerResult<bool> {
    match data.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Bool(b)) => Ok(*b),
        Some(Value::String(s)) => match s.trim() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            _ => Err(invalid(key, "a boolean")),
        },
        Some(_) => Err(invalid(key, "a boolean")),
    }
}

/// Optional duration field: whole seconds, or a string such as `90`, `300s`,
/// `15m`, `2h` or `1d`.
pub fn duration(data: &Map<String, Value>, key: &str) -> BrokerResult<Option<Duration>> {
    match data.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(|s| Some(Duration::from_secs(s)))
            .ok_or_else(|| invalid(key, "a non-negative duration")),
        Some(Value::String(s)) => parse_duration(s)
            .map(Some)
            .ok_or_else(|| invalid(key, "a duration")),
        Some(_) => Err(invalid(key, "a duration")),
    }
}

fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let split = raw.find(|c: char| !c.is_ascii_digit()).unwrap_or(raw.len());
    let (digits, unit) = raw.split_at(split);
    let value: u64 = digits.parse().ok()?;
    let scale = match unit {
        "" | "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86400,
        _ => return None,
    };
    value.checked_mul(scale).map(Duration::from_secs)
}

/// List of strings, given as an array or as a single string.
///
/// A single string is one element; SQL statements contain commas.
pub fn string_list(data: &Map<String, Value>, key: &str) -> BrokerResult<Vec<String>> {
    match data.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(Vec::new()),
        Some(Value::String(s)) => Ok(vec![s.clone()]),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => Ok(s.clone()),
                _ => Err(invalid(key, "a list of strings")),
            })
            .collect(),
        Some(_) => Err(invalid(key, "a list of strings")),
    }
}

/// Key-value pairs, given as an object of strings.
pub fn kv_pairs(data: &Map<String, Value>, key: &str) -> BrokerResult<Option<BTreeMap<String, String>>> {
    match data.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(obj)) => obj
            .iter()
            .map(|(k, v)| match v {
                Value::String(s) => Ok((k.clone(), s.clone())),
                _ => Err(BrokerError::validation(format!(
                    "value of {key:?} must be key-value pairs"
                ))),
            })
            .collect::<BrokerResult<_>>()
            .map(Some),
        Some(_) => Err(BrokerError::validation(format!(
            "value of {key:?} must be key-value pairs"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_int_accepts_numbers_and_strings() {
        let d = data(json!({"port": 6432, "other": "15432", "bad": "x"}));
        assert_eq!(int_or(&d, "port", 5432).unwrap(), 6432);
        assert_eq!(int_or(&d, "other", 5432).unwrap(), 15432);
        assert_eq!(int_or(&d, "missing", 5432).unwrap(), 5432);
        assert!(int_or(&d, "bad", 0).is_err());
    }

    #[test]
    fn test_bool_parsing() {
        let d = data(json!({"a": true, "b": "false", "c": 3}));
        assert!(bool_or(&d, "a", false).unwrap());
        assert!(!bool_or(&d, "b", true).unwrap());
        assert!(bool_or(&d, "missing", true).unwrap());
        assert!(bool_or(&d, "c", true).is_err());
    }

    #[test]
    fn test_durations() {
        let d = data(json!({"n": 300, "s": "300s", "m": "5m", "h": "2h", "bad": "5y"}));
        assert_eq!(duration(&d, "n").unwrap(), Some(Duration::from_secs(300)));
        assert_eq!(duration(&d, "s").unwrap(), Some(Duration::from_secs(300)));
        assert_eq!(duration(&d, "m").unwrap(), Some(Duration::from_secs(300)));
        assert_eq!(duration(&d, "h").unwrap(), Some(Duration::from_secs(7200)));
        assert_eq!(duration(&d, "missing").unwrap(), None);
        assert!(duration(&d, "bad").is_err());
    }

    #[test]
    fn test_string_list_forms() {
        let d = data(json!({"arr": ["a", "b"], "one": "grant a, b to c", "blank": " "}));
        assert_eq!(string_list(&d, "arr").unwrap(), vec!["a", "b"]);
        assert_eq!(string_list(&d, "one").unwrap(), vec!["grant a, b to c"]);
        assert!(string_list(&d, "blank").unwrap().is_empty());
        assert!(string_list(&d, "missing").unwrap().is_empty());
    }

    #[test]
    fn test_kv_pairs() {
        let d = data(json!({"data": {"k": "v"}, "nested": {"k": 1}}));
        assert_eq!(kv_pairs(&d, "data").unwrap().unwrap()["k"], "v");
        assert!(kv_pairs(&d, "nested").is_err());
        assert!(kv_pairs(&d, "missing").unwrap().is_none());
    }
}
