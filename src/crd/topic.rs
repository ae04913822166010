//! # KafkaTopic Object
//!
//! The resource as read from the store. Unlike the generated CRD type, the
//! spec block is optional so resources created without one can be observed
//! and skipped instead of failing deserialization of the whole watch stream.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::NamespaceResourceScope;
use serde::{Deserialize, Serialize};

use crate::constants::{
    ANNOTATION_MANAGED, ANNOTATION_PAUSE_RECONCILIATION, KAFKA_TOPIC_GROUP, KAFKA_TOPIC_KIND,
    KAFKA_TOPIC_PLURAL, KAFKA_TOPIC_VERSION, TOPIC_FINALIZER,
};
use crate::crd::{KafkaTopicSpec, KafkaTopicStatus};

/// Namespaced identity of a KafkaTopic resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceRef {
    pub namespace: String,
    pub name: String,
}

impl ResourceRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct KafkaTopic {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<KafkaTopicSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<KafkaTopicStatus>,
}

impl kube::Resource for KafkaTopic {
    type DynamicType = ();
    type Scope = NamespaceResourceScope;

    fn kind(_: &()) -> Cow<'_, str> {
        Cow::Borrowed(KAFKA_TOPIC_KIND)
    }

    fn group(_: &()) -> Cow<'_, str> {
        Cow::Borrowed(KAFKA_TOPIC_GROUP)
    }

    fn version(_: &()) -> Cow<'_, str> {
        Cow::Borrowed(KAFKA_TOPIC_VERSION)
    }

    fn plural(_: &()) -> Cow<'_, str> {
        Cow::Borrowed(KAFKA_TOPIC_PLURAL)
    }

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

impl KafkaTopic {
    /// Build a resource with the given identity and spec, as a user would submit it
    pub fn new(namespace: &str, name: &str, spec: KafkaTopicSpec) -> Self {
        Self {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..ObjectMeta::default()
            },
            spec: Some(spec),
            status: None,
        }
    }

    pub fn resource_ref(&self) -> ResourceRef {
        ResourceRef::new(
            self.metadata.namespace.as_deref().unwrap_or("default"),
            self.metadata.name.as_deref().unwrap_or_default(),
        )
    }

    pub fn generation(&self) -> Option<i64> {
        self.metadata.generation
    }

    /// Whether every selector label is present with an equal value
    pub fn matches_selector(&self, selector: &BTreeMap<String, String>) -> bool {
        let labels = self.metadata.labels.as_ref();
        selector
            .iter()
            .all(|(k, v)| labels.and_then(|l| l.get(k)) == Some(v))
    }

    /// `managed` annotation: absent or anything but `false` means managed
    pub fn is_managed(&self) -> bool {
        !self
            .annotation(ANNOTATION_MANAGED)
            .is_some_and(|v| v.eq_ignore_ascii_case("false"))
    }

    pub fn is_paused(&self) -> bool {
        self.annotation(ANNOTATION_PAUSE_RECONCILIATION)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }

    pub fn is_being_deleted(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    pub fn has_finalizer(&self) -> bool {
        self.finalizers().iter().any(|f| f == TOPIC_FINALIZER)
    }

    pub fn finalizers(&self) -> &[String] {
        self.metadata.finalizers.as_deref().unwrap_or_default()
    }

    /// Topic name in Kafka: `spec.topicName` if set, else the resource name
    pub fn resolved_topic_name(&self) -> Option<String> {
        let spec = self.spec.as_ref()?;
        spec.topic_name
            .clone()
            .or_else(|| self.metadata.name.clone())
    }

    /// Topic name recorded by an earlier successful pass
    pub fn status_topic_name(&self) -> Option<&str> {
        self.status.as_ref()?.topic_name.as_deref()
    }

    fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(key))
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic_with_annotations(pairs: &[(&str, &str)]) -> KafkaTopic {
        let mut topic = KafkaTopic::new("ns", "my-topic", KafkaTopicSpec::default());
        topic.metadata.annotations = Some(
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        );
        topic
    }

    #[test]
    fn test_managed_annotation_is_tri_state() {
        assert!(topic_with_annotations(&[]).is_managed());
        assert!(topic_with_annotations(&[(ANNOTATION_MANAGED, "true")]).is_managed());
        assert!(!topic_with_annotations(&[(ANNOTATION_MANAGED, "false")]).is_managed());
    }

    #[test]
    fn test_pause_annotation() {
        assert!(!topic_with_annotations(&[]).is_paused());
        assert!(topic_with_annotations(&[(ANNOTATION_PAUSE_RECONCILIATION, "true")]).is_paused());
        assert!(!topic_with_annotations(&[(ANNOTATION_PAUSE_RECONCILIATION, "false")]).is_paused());
    }

    #[test]
    fn test_resolved_topic_name_prefers_override() {
        let mut topic = KafkaTopic::new("ns", "my-topic", KafkaTopicSpec::default());
        assert_eq!(topic.resolved_topic_name().as_deref(), Some("my-topic"));

        topic.spec = Some(KafkaTopicSpec {
            topic_name: Some("MY-TOPIC".to_string()),
            ..KafkaTopicSpec::default()
        });
        assert_eq!(topic.resolved_topic_name().as_deref(), Some("MY-TOPIC"));

        topic.spec = None;
        assert_eq!(topic.resolved_topic_name(), None);
    }

    #[test]
    fn test_matches_selector() {
        let mut topic = KafkaTopic::new("ns", "t", KafkaTopicSpec::default());
        let selector: BTreeMap<String, String> =
            [("foo".to_string(), "FOO".to_string())].into_iter().collect();
        assert!(!topic.matches_selector(&selector));
        assert!(topic.matches_selector(&BTreeMap::new()));

        topic.metadata.labels = Some(selector.clone());
        assert!(topic.matches_selector(&selector));
    }

    #[test]
    fn test_deserialize_without_spec() {
        let topic: KafkaTopic = serde_json::from_value(serde_json::json!({
            "apiVersion": "kafka.octopilot.io/v1beta1",
            "kind": "KafkaTopic",
            "metadata": {"name": "no-spec", "namespace": "ns"}
        }))
        .unwrap();
        assert!(topic.spec.is_none());
        assert_eq!(topic.resource_ref(), ResourceRef::new("ns", "no-spec"));
    }
}
