//! # KafkaTopic Spec
//!
//! Desired state of a Kafka topic.

use schemars::{Schema, SchemaGenerator};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// KafkaTopic Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: kafka.octopilot.io/v1beta1
/// kind: KafkaTopic
/// metadata:
///   name: orders
///   namespace: payments
///   labels:
///     kafka.octopilot.io/cluster: main
/// spec:
///   topicName: payments.orders
///   partitions: 12
///   replicas: 3
///   config:
///     cleanup.policy: [compact, delete]
///     retention.ms: 604800000
///     min.cleanable.dirty.ratio: 0.6
/// ```
///
/// The generated `KafkaTopicDefinition` type only exists to render the CRD.
/// The controller itself reads resources as [`crate::crd::KafkaTopic`], whose
/// spec block is optional.
#[derive(
    kube::CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema,
)]
#[kube(
    kind = "KafkaTopic",
    root = "KafkaTopicDefinition",
    group = "kafka.octopilot.io",
    version = "v1beta1",
    namespaced,
    status = "crate::crd::KafkaTopicStatus",
    shortname = "kt",
    printcolumn = r#"{"name":"Topic", "type":"string", "jsonPath":".status.topicName"}, {"name":"Partitions", "type":"integer", "jsonPath":".spec.partitions"}, {"name":"Replicas", "type":"integer", "jsonPath":".spec.replicas"}, {"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct KafkaTopicSpec {
    /// Name of the topic in Kafka
    /// Defaults to the resource name. Cannot change once the topic exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_name: Option<String>,
    /// Number of partitions
    /// Defaults to the broker's `num.partitions`. Can only increase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partitions: Option<i32>,
    /// Replication factor
    /// Defaults to the broker's `default.replication.factor`. Cannot change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    /// Topic level configuration
    /// Values may be strings, numbers, booleans or lists of those.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    #[schemars(schema_with = "topic_config_schema")]
    pub config: BTreeMap<String, serde_json::Value>,
}

fn topic_config_schema(_gen: &mut SchemaGenerator) -> Schema {
    // Typed values are validated by the controller, not by the API server
    schemars::json_schema!({
        "type": "object",
        "x-kubernetes-preserve-unknown-fields": true
    })
}
