//! # Kafka Topic Controller
//!
//! A Kubernetes controller that keeps Kafka topics in line with `KafkaTopic`
//! resources.
//!
//! ## Overview
//!
//! 1. **Watching resources** - Change notifications for `KafkaTopic` resources are coalesced in a bounded queue
//! 2. **Batch reconciliation** - Each batch is diffed against the brokers with one admin call per operation kind
//! 3. **Conflict detection** - A topic name is owned by a single resource; others report `ResourceConflict`
//! 4. **Status reporting** - `Ready`, `ReconciliationPaused` and `Unmanaged` conditions
//! 5. **Deletion** - Broker topics are deleted with or without finalizers
//!
//! ## Features
//!
//! - **Label selection**: Only resources matching `RESOURCE_LABELS` are reconciled
//! - **Periodic full reconciliation**: Drift made outside the controller is corrected
//! - **Prometheus metrics**: Exposes metrics for monitoring and observability
//! - **Health probes**: HTTP endpoints for liveness and readiness checks

use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::{Context, Result};
use kafka_topic_controller::controller::batch_loop::BatchLoop;
use kafka_topic_controller::controller::reconciler::Reconciler;
use kafka_topic_controller::kafka::rdkafka::RdKafkaAdmin;
use kafka_topic_controller::runtime::{initialize, review_cluster_config, run_watch_loop};
use kafka_topic_controller::store::{KubeTopicStore, TopicStore};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let init = initialize().await?;

    let kafka = Arc::new(
        RdKafkaAdmin::new(&init.controller_config).context("Failed to create Kafka admin client")?,
    );
    if let Err(e) = review_cluster_config(kafka.as_ref()).await {
        warn!("Unable to review Kafka cluster configuration: {}", e);
    }

    let store: Arc<dyn TopicStore> = Arc::<KubeTopicStore>::clone(&init.store);
    let reconciler = Reconciler::new(store, kafka, &init.controller_config);
    let batch_loop = BatchLoop::new(
        Arc::clone(&init.queue),
        reconciler,
        init.controller_config.full_reconciliation_interval(),
    );
    let batch_handle = tokio::spawn(batch_loop.run());

    let mut shutdown = init.queue.shutdown_signal();
    let watch = run_watch_loop(
        init.topics.clone(),
        Arc::clone(&init.queue),
        Arc::clone(&init.server_state),
        init.controller_config.clone(),
    );

    let result = tokio::select! {
        result = watch => result,
        _ = shutdown.wait_for(|stopped| *stopped) => {
            Err(anyhow::anyhow!("Batching queue overflowed"))
        }
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => info!("Received shutdown signal"),
                Err(e) => error!("Unable to listen for shutdown signal: {}", e),
            }
            Ok(())
        }
    };

    // Stop reporting ready before draining so traffic shifts away
    init.server_state.is_ready.store(false, Ordering::Relaxed);
    init.queue.stop();
    if let Err(e) = batch_handle.await {
        error!("Batch loop task failed: {}", e);
    }

    match result {
        Ok(()) => {
            info!("Controller stopped");
            Ok(())
        }
        Err(e) => {
            error!("Controller stopped: {:#}", e);
            std::process::exit(1);
        }
    }
}
