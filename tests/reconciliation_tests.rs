//! # Reconciliation Tests
//!
//! Drives the engine against the in-memory broker and store and checks what
//! lands in Kafka and in resource status:
//! - Topic creation with explicit values and broker defaults
//! - Config, partition and replication factor changes
//! - Validation failures and broker failures isolated per resource
//! - Label selection

mod common;

use std::collections::{BTreeMap, BTreeSet};

use common::*;
use kafka_topic_controller::kafka::memory::AdminOp;
use kafka_topic_controller::kafka::{ClusterConfig, KafkaError, KafkaErrorCode};
use serde_json::json;

#[tokio::test]
async fn test_create_uses_broker_defaults() {
    let mut h = Harness::new(3, false);
    h.kafka.set_cluster_config(ClusterConfig {
        auto_create_topics_enable: Some(false),
        num_partitions: Some(3),
        default_replication_factor: Some(2),
    });
    h.apply(topic("orders", spec()));

    let summary = h.resync().await;
    assert_eq!(summary.ready, 1);
    assert_eq!(summary.status_writes, 1);

    let state = h.kafka.topic("orders").expect("topic should be created");
    assert_eq!(state.partitions.len(), 3);
    assert_eq!(state.replication_factors(), BTreeSet::from([2]));

    let status = h.status("orders");
    assert_ready(&h.condition("orders"));
    assert_eq!(status.topic_name.as_deref(), Some("orders"));
    assert_eq!(status.topic_id, Some(state.id));
    assert_eq!(status.observed_generation, Some(1));
}

#[tokio::test]
async fn test_create_with_explicit_spec() {
    let mut h = Harness::new(3, false);
    let spec = with_config(sized(6, 3), "cleanup.policy", json!(["compact", "delete"]));
    let spec = with_config(spec, "min.cleanable.dirty.ratio", json!(0.6));
    h.apply(topic_named("orders", "payments.orders", spec));

    h.resync().await;

    let state = h.kafka.topic("payments.orders").expect("topic should be created");
    assert_eq!(state.partitions.len(), 6);
    assert_eq!(state.replication_factors(), BTreeSet::from([3]));
    assert_eq!(
        state.configs,
        BTreeMap::from([
            ("cleanup.policy".to_string(), "compact,delete".to_string()),
            ("min.cleanable.dirty.ratio".to_string(), "0.6".to_string()),
        ])
    );
    assert_eq!(
        h.status("orders").topic_name.as_deref(),
        Some("payments.orders")
    );
}

#[tokio::test]
async fn test_batch_uses_one_call_per_operation_kind() {
    let mut h = Harness::new(1, false);
    for name in ["a", "b", "c"] {
        h.apply(topic(name, spec()));
    }

    let summary = h.resync().await;
    assert_eq!(summary.ready, 3);
    assert_eq!(h.kafka.calls(AdminOp::CreateTopics), 1);
    assert_eq!(h.kafka.calls(AdminOp::DescribeConfigs), 1);
    // Initial describe plus the read back of created ids
    assert_eq!(h.kafka.calls(AdminOp::DescribeTopics), 2);
}

#[tokio::test]
async fn test_converged_resync_makes_no_changes() {
    let mut h = Harness::new(1, true);
    h.apply(topic("orders", with_config(spec(), "flush.ms", json!(1000))));
    h.resync().await;
    let writes = h.store.status_writes();
    let finalizer_writes = h.store.finalizer_writes();
    h.kafka.reset_calls();

    let summary = h.resync().await;

    assert_eq!(summary.ready, 1);
    assert_eq!(summary.status_writes, 0);
    assert_eq!(h.kafka.mutation_calls(), 0);
    assert_eq!(h.store.status_writes(), writes);
    assert_eq!(h.store.finalizer_writes(), finalizer_writes);
}

#[tokio::test]
async fn test_config_changes_are_applied() {
    let mut h = Harness::new(1, false);
    h.apply(topic("orders", with_config(spec(), "flush.ms", json!(1000))));
    h.resync().await;

    h.edit("orders", |t| {
        if let Some(spec) = t.spec.as_mut() {
            spec.config.insert("flush.ms".to_string(), json!(2000));
        }
    });
    h.upsert(&["orders"]).await;

    let configs = h.kafka.topic("orders").expect("topic exists").configs;
    assert_eq!(configs.get("flush.ms").map(String::as_str), Some("2000"));
    assert_eq!(h.kafka.calls(AdminOp::AlterConfigs), 1);
    assert_ready(&h.condition("orders"));
    assert_eq!(h.status("orders").observed_generation, Some(2));

    h.edit("orders", |t| {
        if let Some(spec) = t.spec.as_mut() {
            spec.config.clear();
        }
    });
    h.upsert(&["orders"]).await;

    let configs = h.kafka.topic("orders").expect("topic exists").configs;
    assert!(!configs.contains_key("flush.ms"));
}

#[tokio::test]
async fn test_out_of_band_config_drift_is_reverted() {
    let mut h = Harness::new(1, false);
    h.apply(topic("orders", with_config(spec(), "retention.ms", json!(86_400_000))));
    h.resync().await;

    assert!(h.kafka.set_config_out_of_band("orders", "retention.ms", "1000"));
    assert!(h.kafka.set_config_out_of_band("orders", "segment.ms", "1000"));
    h.resync().await;

    let configs = h.kafka.topic("orders").expect("topic exists").configs;
    assert_eq!(
        configs,
        BTreeMap::from([("retention.ms".to_string(), "86400000".to_string())])
    );
}

#[tokio::test]
async fn test_partitions_can_increase() {
    let mut h = Harness::new(1, false);
    h.apply(topic("orders", sized(1, 1)));
    h.resync().await;

    h.apply(topic("orders", sized(3, 1)));
    h.upsert(&["orders"]).await;

    assert_eq!(h.kafka.topic("orders").expect("topic exists").partitions.len(), 3);
    assert_eq!(h.kafka.calls(AdminOp::CreatePartitions), 1);
    assert_ready(&h.condition("orders"));
}

#[tokio::test]
async fn test_partition_decrease_is_rejected_but_configs_still_apply() {
    let mut h = Harness::new(1, false);
    h.apply(topic("orders", with_config(sized(3, 1), "retention.ms", json!(1000))));
    h.resync().await;

    h.apply(topic("orders", with_config(sized(2, 1), "retention.ms", json!(2000))));
    h.upsert(&["orders"]).await;

    let state = h.kafka.topic("orders").expect("topic exists");
    assert_eq!(state.partitions.len(), 3);
    assert_eq!(state.configs.get("retention.ms").map(String::as_str), Some("2000"));
    assert_not_ready(
        &h.condition("orders"),
        "NotSupported",
        "Decreasing partitions not supported",
    );
    assert_eq!(h.status("orders").topic_name.as_deref(), Some("orders"));
}

#[tokio::test]
async fn test_replication_factor_change_is_rejected() {
    let mut h = Harness::new(2, false);
    h.apply(topic("orders", sized(2, 1)));
    h.resync().await;

    h.apply(topic("orders", sized(2, 2)));
    h.upsert(&["orders"]).await;

    assert_not_ready(
        &h.condition("orders"),
        "NotSupported",
        "Replication factor change not supported, but required for partitions [0, 1]",
    );
    let state = h.kafka.topic("orders").expect("topic exists");
    assert_eq!(state.replication_factors(), BTreeSet::from([1]));
}

#[tokio::test]
async fn test_reassignment_in_progress_is_not_a_factor_change() {
    let mut h = Harness::new(3, false);
    h.apply(topic("orders", sized(1, 2)));
    h.resync().await;

    // Current replicas become [0, 1, 2] while moving to [1, 2]
    assert!(h.kafka.start_reassignment("orders", 0, &[1, 2]));
    h.resync().await;
    assert_ready(&h.condition("orders"));
    assert_eq!(h.kafka.calls(AdminOp::ListReassignments), 1);

    h.kafka.complete_reassignments();
    h.resync().await;
    assert_ready(&h.condition("orders"));
    // Nothing left to check once every partition has two replicas
    assert_eq!(h.kafka.calls(AdminOp::ListReassignments), 1);
}

#[tokio::test]
async fn test_invalid_config_value_fails_without_broker_calls() {
    let mut h = Harness::new(1, false);
    h.apply(topic("orders", with_config(spec(), "retention.ms", json!({"a": 1}))));

    let summary = h.resync().await;

    assert_eq!(summary.failed, 1);
    assert_not_ready(
        &h.condition("orders"),
        "InternalError",
        r#"Invalid value for topic config 'retention.ms': {"a":1}"#,
    );
    assert_eq!(h.kafka.mutation_calls(), 0);
    assert!(h.kafka.topic("orders").is_none());
}

#[tokio::test]
async fn test_topic_name_change_is_rejected() {
    let mut h = Harness::new(1, false);
    h.apply(topic_named("orders", "payments.orders", spec()));
    h.resync().await;

    h.apply(topic_named("orders", "payments.orders-v2", spec()));
    h.upsert(&["orders"]).await;

    assert_not_ready(
        &h.condition("orders"),
        "NotSupported",
        "Changing spec.topicName is not supported",
    );
    assert_eq!(h.kafka.topic_names(), vec!["payments.orders".to_string()]);
    assert_eq!(
        h.status("orders").topic_name.as_deref(),
        Some("payments.orders")
    );
    assert_eq!(
        h.reconciler
            .ownership()
            .claimed_name(&h.object("orders").resource_ref()),
        Some("payments.orders")
    );
}

#[tokio::test]
async fn test_broker_failure_is_isolated_to_its_resource() {
    let mut h = Harness::new(1, false);
    h.kafka.fail(
        AdminOp::CreateTopics,
        Some("rejected"),
        KafkaError::new(KafkaErrorCode::PolicyViolation, "Topic creation denied"),
    );
    h.apply(topic("accepted", spec()));
    h.apply(topic("rejected", spec()));

    let summary = h.resync().await;

    assert_eq!(summary.ready, 1);
    assert_eq!(summary.failed, 1);
    assert_ready(&h.condition("accepted"));
    assert_not_ready(
        &h.condition("rejected"),
        "KafkaError",
        "PolicyViolation: Topic creation denied",
    );

    h.kafka.clear_failures();
    h.resync().await;
    assert_ready(&h.condition("rejected"));
}

#[tokio::test]
async fn test_illegal_topic_name_reports_broker_error() {
    let mut h = Harness::new(1, false);
    h.apply(topic_named("bad", "bad name", spec()));

    h.resync().await;

    let condition = h.condition("bad");
    assert_eq!(condition.reason.as_deref(), Some("KafkaError"));
    assert!(condition
        .message
        .as_deref()
        .is_some_and(|m| m.starts_with("InvalidTopic: ")));
}

#[tokio::test]
async fn test_unselected_resources_are_ignored() {
    let selector = BTreeMap::from([("cluster".to_string(), "main".to_string())]);
    let mut h = Harness::with_selector(1, selector, false);
    h.apply(topic("orders", spec()));

    let summary = h.resync().await;
    assert_eq!(summary.ignored, 1);
    assert!(h.object("orders").status.is_none());
    assert!(h.kafka.topic("orders").is_none());

    h.edit("orders", |t| {
        t.metadata.labels = Some(BTreeMap::from([(
            "cluster".to_string(),
            "main".to_string(),
        )]));
    });
    h.upsert(&["orders"]).await;
    assert!(h.kafka.topic("orders").is_some());
    assert_ready(&h.condition("orders"));
}

#[tokio::test]
async fn test_resource_without_spec_is_ignored() {
    let mut h = Harness::new(1, false);
    let mut bare = topic("bare", spec());
    bare.spec = None;
    h.apply(bare);

    let summary = h.resync().await;
    assert_eq!(summary.ignored, 1);
    assert!(h.kafka.topic_names().is_empty());
}
