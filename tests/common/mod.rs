//! Common test utilities for reconciliation tests
//!
//! Wires a [`Reconciler`] to the in-memory broker and store, and offers the
//! resource edits the tests make (apply, annotate, delete).

#![allow(dead_code, reason = "each test binary uses a different subset")]

use std::collections::BTreeMap;
use std::sync::Arc;

use kafka_topic_controller::constants::{ANNOTATION_MANAGED, ANNOTATION_PAUSE_RECONCILIATION};
use kafka_topic_controller::controller::queue::{Batch, WorkItem};
use kafka_topic_controller::controller::reconciler::{BatchSummary, Reconciler};
use kafka_topic_controller::crd::{
    Condition, KafkaTopic, KafkaTopicSpec, KafkaTopicStatus, ResourceRef,
};
use kafka_topic_controller::kafka::memory::InMemoryKafka;
use kafka_topic_controller::kafka::KafkaAdmin;
use kafka_topic_controller::store::{InMemoryTopicStore, TopicStore};

pub const NAMESPACE: &str = "ns";

pub struct Harness {
    pub store: Arc<InMemoryTopicStore>,
    pub kafka: Arc<InMemoryKafka>,
    pub reconciler: Reconciler,
}

impl Harness {
    /// Reconciler selecting every resource
    pub fn new(brokers: i32, use_finalizer: bool) -> Self {
        Self::with_selector(brokers, BTreeMap::new(), use_finalizer)
    }

    pub fn with_selector(
        brokers: i32,
        selector: BTreeMap<String, String>,
        use_finalizer: bool,
    ) -> Self {
        let store = Arc::new(InMemoryTopicStore::new());
        let kafka = Arc::new(InMemoryKafka::new(brokers));
        let store_port: Arc<dyn TopicStore> = Arc::<InMemoryTopicStore>::clone(&store);
        let kafka_port: Arc<dyn KafkaAdmin> = Arc::<InMemoryKafka>::clone(&kafka);
        let reconciler = Reconciler::with_selector(store_port, kafka_port, selector, use_finalizer);
        Self {
            store,
            kafka,
            reconciler,
        }
    }

    /// Fresh reconciler over the same store and broker, as after a process restart
    pub fn restart(&mut self, selector: BTreeMap<String, String>, use_finalizer: bool) {
        let store_port: Arc<dyn TopicStore> = Arc::<InMemoryTopicStore>::clone(&self.store);
        let kafka_port: Arc<dyn KafkaAdmin> = Arc::<InMemoryKafka>::clone(&self.kafka);
        self.reconciler = Reconciler::with_selector(store_port, kafka_port, selector, use_finalizer);
    }

    pub fn apply(&self, topic: KafkaTopic) -> KafkaTopic {
        self.store.apply(topic)
    }

    /// Re-apply the stored object after `edit`, like `kubectl edit`
    pub fn edit(&self, name: &str, edit: impl FnOnce(&mut KafkaTopic)) -> KafkaTopic {
        let mut topic = self.object(name);
        edit(&mut topic);
        self.store.apply(topic)
    }

    pub async fn resync(&mut self) -> BatchSummary {
        self.reconciler
            .reconcile_batch(Batch::full_resync())
            .await
            .expect("full reconciliation should list the store")
    }

    /// Reconcile change notifications for the given resources
    pub async fn upsert(&mut self, names: &[&str]) -> BatchSummary {
        let items = names
            .iter()
            .map(|name| WorkItem::Upsert(ResourceRef::new(NAMESPACE, *name)))
            .collect();
        self.reconciler
            .reconcile_batch(Batch::of(items))
            .await
            .expect("incremental batch should not fail")
    }

    /// Delete the resource and reconcile what the watch would report
    pub async fn delete(&mut self, name: &str) -> BatchSummary {
        let id = ResourceRef::new(NAMESPACE, name);
        let (object, removed) = self.store.delete(&id).expect("resource should exist");
        let item = if removed {
            WorkItem::Delete(object)
        } else {
            WorkItem::Upsert(id)
        };
        self.reconciler
            .reconcile_batch(Batch::of(vec![item]))
            .await
            .expect("incremental batch should not fail")
    }

    pub fn object(&self, name: &str) -> KafkaTopic {
        self.store
            .object(&ResourceRef::new(NAMESPACE, name))
            .unwrap_or_else(|| panic!("KafkaTopic {NAMESPACE}/{name} should exist"))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.store
            .object(&ResourceRef::new(NAMESPACE, name))
            .is_some()
    }

    pub fn status(&self, name: &str) -> KafkaTopicStatus {
        self.object(name)
            .status
            .unwrap_or_else(|| panic!("KafkaTopic {NAMESPACE}/{name} should have a status"))
    }

    pub fn condition(&self, name: &str) -> Condition {
        self.status(name)
            .condition()
            .cloned()
            .unwrap_or_else(|| panic!("KafkaTopic {NAMESPACE}/{name} should have a condition"))
    }
}

pub fn spec() -> KafkaTopicSpec {
    KafkaTopicSpec::default()
}

pub fn sized(partitions: i32, replicas: i32) -> KafkaTopicSpec {
    KafkaTopicSpec {
        partitions: Some(partitions),
        replicas: Some(replicas),
        ..KafkaTopicSpec::default()
    }
}

pub fn with_config(mut spec: KafkaTopicSpec, key: &str, value: serde_json::Value) -> KafkaTopicSpec {
    spec.config.insert(key.to_string(), value);
    spec
}

pub fn topic(name: &str, spec: KafkaTopicSpec) -> KafkaTopic {
    KafkaTopic::new(NAMESPACE, name, spec)
}

/// Resource named `name` targeting the Kafka topic `topic_name`
pub fn topic_named(name: &str, topic_name: &str, mut spec: KafkaTopicSpec) -> KafkaTopic {
    spec.topic_name = Some(topic_name.to_string());
    topic(name, spec)
}

pub fn annotate(topic: &mut KafkaTopic, key: &str, value: &str) {
    topic
        .metadata
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(key.to_string(), value.to_string());
}

pub fn pause(topic: &mut KafkaTopic, paused: bool) {
    annotate(
        topic,
        ANNOTATION_PAUSE_RECONCILIATION,
        if paused { "true" } else { "false" },
    );
}

pub fn manage(topic: &mut KafkaTopic, managed: bool) {
    annotate(
        topic,
        ANNOTATION_MANAGED,
        if managed { "true" } else { "false" },
    );
}

pub fn assert_ready(condition: &Condition) {
    assert_eq!(condition.r#type, "Ready");
    assert_eq!(condition.status, "True", "unexpected condition {condition:?}");
    assert_eq!(condition.reason, None);
}

pub fn assert_not_ready(condition: &Condition, reason: &str, message: &str) {
    assert_eq!(condition.r#type, "Ready");
    assert_eq!(condition.status, "False");
    assert_eq!(condition.reason.as_deref(), Some(reason));
    assert_eq!(condition.message.as_deref(), Some(message));
}
