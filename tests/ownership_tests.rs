//! # Ownership Tests
//!
//! Several resources naming the same Kafka topic:
//! - The first claimant owns the topic, the others report `ResourceConflict`
//! - A resource already `Ready` for the name keeps it across restarts
//! - Claimants are promoted when the owner goes away or becomes unmanaged

mod common;

use std::collections::BTreeMap;

use common::*;
use kafka_topic_controller::kafka::memory::AdminOp;

fn conflicting(h: &Harness) {
    h.apply(topic_named("kt1", "orders", sized(1, 1)));
    h.apply(topic_named("kt2", "orders", sized(1, 1)));
}

#[tokio::test]
async fn test_second_claimant_reports_conflict() {
    let mut h = Harness::new(1, false);
    conflicting(&h);

    let summary = h.resync().await;

    assert_eq!(summary.ready, 1);
    assert_eq!(summary.failed, 1);
    assert_ready(&h.condition("kt1"));
    assert_not_ready(&h.condition("kt2"), "ResourceConflict", "Managed by ns/kt1");
    assert_eq!(h.kafka.calls(AdminOp::CreateTopics), 1);
    assert_eq!(h.status("kt2").topic_name, None);
}

#[tokio::test]
async fn test_conflict_does_not_touch_the_topic() {
    let mut h = Harness::new(1, false);
    conflicting(&h);
    h.resync().await;
    h.kafka.reset_calls();

    // The loser asks for more partitions; the owner's spec wins
    h.apply(topic_named("kt2", "orders", sized(4, 1)));
    h.upsert(&["kt2"]).await;

    assert_eq!(h.kafka.mutation_calls(), 0);
    assert_eq!(h.kafka.topic("orders").expect("topic exists").partitions.len(), 1);
}

#[tokio::test]
async fn test_ready_owner_keeps_name_after_restart() {
    let mut h = Harness::new(1, false);
    h.apply(topic_named("z-owner", "orders", spec()));
    h.resync().await;

    // Sorts before the owner in a full listing
    h.apply(topic_named("a-late", "orders", spec()));
    h.restart(BTreeMap::new(), false);
    h.resync().await;

    assert_ready(&h.condition("z-owner"));
    assert_not_ready(
        &h.condition("a-late"),
        "ResourceConflict",
        "Managed by ns/z-owner",
    );
}

#[tokio::test]
async fn test_claimant_promoted_when_owner_becomes_unmanaged() {
    let mut h = Harness::new(1, false);
    conflicting(&h);
    h.resync().await;
    let topic_id = h.status("kt1").topic_id;

    h.edit("kt1", |t| manage(t, false));
    let summary = h.upsert(&["kt1"]).await;

    assert_eq!(summary.unmanaged, 1);
    assert_eq!(summary.ready, 1);
    assert_ready(&h.condition("kt2"));
    assert_eq!(h.status("kt2").topic_id, topic_id);
    assert_eq!(h.condition("kt1").r#type, "Unmanaged");
}

#[tokio::test]
async fn test_claimant_promoted_when_owner_is_deleted() {
    let mut h = Harness::new(1, false);
    conflicting(&h);
    h.resync().await;
    let original_id = h.status("kt1").topic_id;

    let summary = h.delete("kt1").await;

    // The owner's topic goes with it, then the claimant recreates it
    assert_eq!(summary.deleted, 1);
    assert_eq!(summary.ready, 1);
    assert_ready(&h.condition("kt2"));
    let recreated = h.kafka.topic("orders").expect("topic recreated");
    assert_eq!(h.status("kt2").topic_id.as_deref(), Some(recreated.id.as_str()));
    assert_ne!(h.status("kt2").topic_id, original_id);
}

#[tokio::test]
async fn test_deleting_a_conflicting_resource_keeps_the_topic() {
    let mut h = Harness::new(1, false);
    conflicting(&h);
    h.resync().await;

    let summary = h.delete("kt2").await;

    assert_eq!(summary.deleted, 0);
    assert!(h.kafka.topic("orders").is_some());
    assert_eq!(h.kafka.calls(AdminOp::DeleteTopics), 0);
}

#[tokio::test]
async fn test_deleted_claimant_with_finalizer_keeps_owner_topic_after_restart() {
    let mut h = Harness::new(1, true);
    conflicting(&h);
    h.resync().await;
    let topic_id = h.status("kt1").topic_id;
    assert!(h.object("kt2").has_finalizer());

    // Marked for deletion while no reconciler is running
    let (_, removed) = h
        .store
        .delete(&h.object("kt2").resource_ref())
        .expect("resource exists");
    assert!(!removed);
    h.restart(BTreeMap::new(), true);
    h.kafka.reset_calls();

    let summary = h.resync().await;

    assert_eq!(summary.deleted, 0);
    assert_eq!(h.kafka.calls(AdminOp::DeleteTopics), 0);
    assert!(!h.exists("kt2"));
    assert_ready(&h.condition("kt1"));
    assert_eq!(h.status("kt1").topic_id, topic_id);
    assert_eq!(
        h.reconciler.ownership().owner_of("orders"),
        Some(&h.object("kt1").resource_ref())
    );
}

#[tokio::test]
async fn test_topic_names_are_case_sensitive() {
    let mut h = Harness::new(1, false);
    h.apply(topic_named("upper", "Orders", spec()));
    h.apply(topic_named("lower", "orders", spec()));

    let summary = h.resync().await;

    assert_eq!(summary.ready, 2);
    assert_eq!(
        h.kafka.topic_names(),
        vec!["Orders".to_string(), "orders".to_string()]
    );
}
