//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `kafka_topic_batches_total` - Total number of reconciliation batches
//! - `kafka_topic_batch_size` - Resources handled per batch
//! - `kafka_topic_batch_duration_seconds` - Duration of a batch
//! - `kafka_topic_reconciliations_total` - Resource reconciliations by outcome
//! - `kafka_topic_broker_operations_total` - Kafka admin calls by operation
//! - `kafka_topic_queue_length` - Items waiting in the batching queue
//! - `kafka_topic_managed_topics` - Topic names with an owning resource
//! - `kafka_topic_delete_failures_total` - Failed deletions of topics whose resource is gone

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, IntGauge, Registry};
use std::sync::LazyLock;

// Metrics
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static BATCHES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "kafka_topic_batches_total",
        "Total number of reconciliation batches",
    )
    .expect("Failed to create BATCHES_TOTAL metric - this should never happen")
});

static BATCH_SIZE: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new("kafka_topic_batch_size", "Resources handled per batch")
            .buckets(vec![1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0]),
    )
    .expect("Failed to create BATCH_SIZE metric - this should never happen")
});

static BATCH_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "kafka_topic_batch_duration_seconds",
            "Duration of a reconciliation batch in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
    )
    .expect("Failed to create BATCH_DURATION metric - this should never happen")
});

static RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "kafka_topic_reconciliations_total",
            "Total number of resource reconciliations by outcome",
        ),
        &["outcome"],
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static BROKER_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "kafka_topic_broker_operations_total",
            "Total number of Kafka admin operations by operation",
        ),
        &["operation"],
    )
    .expect("Failed to create BROKER_OPERATIONS_TOTAL metric - this should never happen")
});

static QUEUE_LENGTH: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "kafka_topic_queue_length",
        "Number of items waiting in the batching queue",
    )
    .expect("Failed to create QUEUE_LENGTH metric - this should never happen")
});

static MANAGED_TOPICS: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "kafka_topic_managed_topics",
        "Current number of topic names with an owning resource",
    )
    .expect("Failed to create MANAGED_TOPICS metric - this should never happen")
});

static TOPIC_DELETE_FAILURES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "kafka_topic_delete_failures_total",
        "Total number of failed topic deletions for resources that no longer exist",
    )
    .expect("Failed to create TOPIC_DELETE_FAILURES_TOTAL metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(BATCHES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(BATCH_SIZE.clone()))?;
    REGISTRY.register(Box::new(BATCH_DURATION.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(BROKER_OPERATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(QUEUE_LENGTH.clone()))?;
    REGISTRY.register(Box::new(MANAGED_TOPICS.clone()))?;
    REGISTRY.register(Box::new(TOPIC_DELETE_FAILURES_TOTAL.clone()))?;

    Ok(())
}

/// Record one completed batch
pub fn record_batch(resources: usize, duration: f64) {
    BATCHES_TOTAL.inc();
    #[allow(clippy::cast_precision_loss, reason = "Batch sizes are far below 2^52")]
    BATCH_SIZE.observe(resources as f64);
    BATCH_DURATION.observe(duration);
}

pub fn increment_reconciliations(outcome: &str) {
    RECONCILIATIONS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn increment_broker_operations(operation: &str) {
    BROKER_OPERATIONS_TOTAL.with_label_values(&[operation]).inc();
}

pub fn set_queue_length(length: usize) {
    QUEUE_LENGTH.set(i64::try_from(length).unwrap_or(i64::MAX));
}

pub fn set_managed_topics(count: usize) {
    MANAGED_TOPICS.set(i64::try_from(count).unwrap_or(i64::MAX));
}

pub fn increment_topic_delete_failures() {
    TOPIC_DELETE_FAILURES_TOTAL.inc();
}
