//! # Config Diff
//!
//! Topic configs are compared in the form the broker reports them: every
//! value is rendered to its canonical string before comparison.
//!
//! | spec value            | canonical form       |
//! |-----------------------|----------------------|
//! | `"snappy"`            | `snappy`             |
//! | `1234`                | `1234`               |
//! | `0.6`                 | `0.6`                |
//! | `true`                | `true`               |
//! | `[compact, delete]`   | `compact,delete`     |
//!
//! Only entries whose provenance is the topic itself are managed. Broker,
//! cluster and default values are never altered or removed.

use std::collections::BTreeMap;

use serde_json::Value;

use super::types::ReconcileFailure;
use crate::kafka::{AlterConfigOp, ConfigEntry, ConfigSource};

fn invalid(key: &str, value: &Value) -> ReconcileFailure {
    ReconcileFailure::InternalError(format!("Invalid value for topic config '{key}': {value}"))
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Render one spec value the way the broker stores it
pub fn canonical_value(key: &str, value: &Value) -> Result<String, ReconcileFailure> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| scalar(item).ok_or_else(|| invalid(key, value)))
            .collect::<Result<Vec<_>, _>>()
            .map(|parts| parts.join(",")),
        other => scalar(other).ok_or_else(|| invalid(key, value)),
    }
}

/// Render the whole `spec.config` map, failing on the first illegal value
pub fn canonical_configs(
    config: &BTreeMap<String, Value>,
) -> Result<BTreeMap<String, String>, ReconcileFailure> {
    config
        .iter()
        .map(|(key, value)| Ok((key.clone(), canonical_value(key, value)?)))
        .collect()
}

/// Topic-level entries currently set on the broker
pub fn dynamic_topic_configs(entries: &[ConfigEntry]) -> BTreeMap<&str, &str> {
    entries
        .iter()
        .filter(|e| e.source == ConfigSource::DynamicTopic)
        .filter_map(|e| e.value.as_deref().map(|v| (e.name.as_str(), v)))
        .collect()
}

/// Operations turning the live topic configs into `desired`
///
/// Empty when nothing differs.
pub fn config_ops(desired: &BTreeMap<String, String>, live: &[ConfigEntry]) -> Vec<AlterConfigOp> {
    let current = dynamic_topic_configs(live);
    let sets = desired
        .iter()
        .filter(|(key, value)| current.get(key.as_str()) != Some(&value.as_str()))
        .map(|(key, value)| AlterConfigOp::Set {
            name: key.clone(),
            value: value.clone(),
        });
    let deletes = current
        .keys()
        .filter(|key| !desired.contains_key(**key))
        .map(|key| AlterConfigOp::Delete {
            name: (*key).to_string(),
        });
    sets.chain(deletes).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(name: &str, value: &str, source: ConfigSource) -> ConfigEntry {
        ConfigEntry {
            name: name.to_string(),
            value: Some(value.to_string()),
            source,
        }
    }

    fn desired(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_canonical_scalars() {
        assert_eq!(canonical_value("k", &json!("snappy")).unwrap(), "snappy");
        assert_eq!(canonical_value("k", &json!(1234)).unwrap(), "1234");
        assert_eq!(
            canonical_value("k", &json!(9_223_372_036_854_775_807_i64)).unwrap(),
            "9223372036854775807"
        );
        assert_eq!(canonical_value("k", &json!(0.6)).unwrap(), "0.6");
        assert_eq!(canonical_value("k", &json!(false)).unwrap(), "false");
    }

    #[test]
    fn test_canonical_list_is_comma_joined() {
        assert_eq!(
            canonical_value("cleanup.policy", &json!(["compact", "delete"])).unwrap(),
            "compact,delete"
        );
    }

    #[test]
    fn test_null_and_object_are_rejected() {
        assert_eq!(
            canonical_value("cleanup.policy", &Value::Null),
            Err(ReconcileFailure::InternalError(
                "Invalid value for topic config 'cleanup.policy': null".to_string()
            ))
        );
        let err = canonical_value("cleanup.policy", &json!({"foo": 12})).unwrap_err();
        assert_eq!(err.reason(), "InternalError");
        assert_eq!(
            err.to_string(),
            "Invalid value for topic config 'cleanup.policy': {\"foo\":12}"
        );
        assert!(canonical_value("k", &json!([["nested"]])).is_err());
    }

    #[test]
    fn test_no_ops_when_equal() {
        let live = vec![entry("flush.ms", "1234", ConfigSource::DynamicTopic)];
        assert!(config_ops(&desired(&[("flush.ms", "1234")]), &live).is_empty());
    }

    #[test]
    fn test_changed_value_is_set() {
        let live = vec![entry("flush.ms", "1234", ConfigSource::DynamicTopic)];
        assert_eq!(
            config_ops(&desired(&[("flush.ms", "9876")]), &live),
            vec![AlterConfigOp::Set {
                name: "flush.ms".to_string(),
                value: "9876".to_string()
            }]
        );
    }

    #[test]
    fn test_removed_dynamic_key_is_deleted() {
        let live = vec![
            entry("flush.ms", "1234", ConfigSource::DynamicTopic),
            entry("retention.ms", "1000", ConfigSource::DynamicTopic),
        ];
        assert_eq!(
            config_ops(&desired(&[("flush.ms", "1234")]), &live),
            vec![AlterConfigOp::Delete {
                name: "retention.ms".to_string()
            }]
        );
    }

    #[test]
    fn test_inherited_entries_are_never_touched() {
        let live = vec![
            entry("cleanup.policy", "delete", ConfigSource::Default),
            entry("min.insync.replicas", "2", ConfigSource::DynamicBroker),
            entry("segment.bytes", "1024", ConfigSource::StaticBroker),
        ];
        assert!(config_ops(&BTreeMap::new(), &live).is_empty());
    }

    #[test]
    fn test_value_matching_only_a_default_is_still_set() {
        let live = vec![entry("cleanup.policy", "delete", ConfigSource::Default)];
        assert_eq!(
            config_ops(&desired(&[("cleanup.policy", "delete")]), &live).len(),
            1
        );
    }
}
