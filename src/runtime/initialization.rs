//! # Initialization
//!
//! Controller initialization logic including rustls setup, tracing, metrics,
//! server startup, Kubernetes client setup and the Kafka cluster review.

use crate::config::{ControllerConfig, LogFormat, ServerConfig};
use crate::constants::AUTO_CREATE_TOPICS_ENABLE;
use crate::controller::queue::BatchingQueue;
use crate::controller::server::{start_server, ServerState};
use crate::crd::KafkaTopic;
use crate::kafka::{ClusterConfig, KafkaAdmin, KafkaError};
use crate::observability;
use crate::store::KubeTopicStore;
use anyhow::{Context, Result};
use kube::{api::Api, api::ListParams, Client};
use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Initialization result containing all necessary components for the controller
pub struct InitializationResult {
    /// Kubernetes client
    pub client: Client,
    /// API for the KafkaTopic CRD, scoped to the watched namespace
    pub topics: Api<KafkaTopic>,
    /// Store used by the reconciler
    pub store: Arc<KubeTopicStore>,
    /// Queue shared by the watch and the batch loop
    pub queue: Arc<BatchingQueue>,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
    pub controller_config: ControllerConfig,
    pub server_config: ServerConfig,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field(
                "server_ready",
                &self.server_state.is_ready.load(Ordering::Relaxed),
            )
            .field("controller_config", &self.controller_config)
            .finish_non_exhaustive()
    }
}

/// Set up the tracing subscriber
///
/// `RUST_LOG` wins over the default `kafka_topic_controller=info` filter.
pub fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "kafka_topic_controller=info".into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };
    if let Err(e) = result {
        warn!("Tracing subscriber init returned error (may already be initialized): {}", e);
    }
}

/// Initialize the controller runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Configuration loading
/// - Tracing subscriber setup
/// - Metrics registration
/// - HTTP server startup
/// - Kubernetes client creation
/// - Startup summary of existing resources
pub async fn initialize() -> Result<InitializationResult> {
    // Must run before anything opens a TLS connection
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        return Err(anyhow::anyhow!("Failed to install rustls crypto provider"));
    }

    let controller_config =
        ControllerConfig::from_env().context("Invalid controller configuration")?;
    let server_config = ServerConfig::from_env();

    init_tracing(controller_config.log_format);

    info!(
        "Starting Kafka Topic Controller v{}",
        env!("CARGO_PKG_VERSION")
    );
    info!(
        namespace = controller_config.namespace.as_deref().unwrap_or("<all>"),
        selector = %controller_config.label_selector_string(),
        use_finalizer = controller_config.use_finalizer,
        max_queue_size = controller_config.max_queue_size,
        max_batch_size = controller_config.max_batch_size,
        "Controller configuration loaded"
    );

    observability::metrics::register_metrics()?;

    let queue = Arc::new(BatchingQueue::from_config(&controller_config));
    let server_state = Arc::new(ServerState::new(Arc::clone(&queue)));

    // Start HTTP server in a background task, wait for it before proceeding
    let server_state_clone = Arc::clone(&server_state);
    let server_port = server_config.metrics_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });
    wait_for_server_ready(&server_state, &server_handle, &server_config).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    let store = Arc::new(KubeTopicStore::new(
        client.clone(),
        controller_config.namespace.clone(),
    ));
    let topics = store.api();

    summarize_existing_resources(&topics).await;

    info!("Controller initialized, starting watch loop...");

    Ok(InitializationResult {
        client,
        topics,
        store,
        queue,
        server_state,
        controller_config,
        server_config,
    })
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
    server_config: &ServerConfig,
) -> Result<()> {
    let startup_timeout = server_config.startup_timeout();
    let poll_interval = server_config.poll_interval();
    let start_time = std::time::Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        // Set by start_server once bound
        if server_state.is_ready.load(Ordering::Relaxed) {
            info!("HTTP server is ready and accepting connections");
            break;
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }

    Ok(())
}

/// Review broker settings that affect the controller
///
/// Auto topic creation lets applications race the controller for topic
/// creation with broker defaults, so it is flagged.
pub async fn review_cluster_config(kafka: &dyn KafkaAdmin) -> Result<ClusterConfig, KafkaError> {
    let cluster = kafka.describe_cluster_config().await?;
    if cluster.auto_create_topics_enable == Some(true) {
        warn!(
            "It is recommended that {AUTO_CREATE_TOPICS_ENABLE} is set to 'false' to avoid races between the operator and Kafka applications auto-creating topics"
        );
    }
    info!(
        num_partitions = ?cluster.num_partitions,
        default_replication_factor = ?cluster.default_replication_factor,
        "Kafka cluster defaults"
    );
    Ok(cluster)
}

/// Log existing KafkaTopic resources per namespace
///
/// Only a visibility aid: the first full reconciliation after the watch
/// lists them handles them all.
async fn summarize_existing_resources(topics: &Api<KafkaTopic>) {
    let span = tracing::span!(
        tracing::Level::INFO,
        "controller.startup.summary",
        operation = "summarize_existing_resources"
    );
    let _guard = span.enter();

    match topics.list(&ListParams::default()).await {
        Ok(list) => {
            if list.items.is_empty() {
                info!("No existing KafkaTopic resources found, watch will pick up new resources");
                return;
            }
            let mut by_namespace: BTreeMap<String, Vec<String>> = BTreeMap::new();
            for item in &list.items {
                let id = item.resource_ref();
                by_namespace.entry(id.namespace).or_default().push(id.name);
            }

            info!("Kafka Topic Controller - Startup Resource Summary");
            info!("Resource Kind: KafkaTopic");
            info!("Total Resources: {}", list.items.len());
            info!("Namespaces: {}", by_namespace.len());
            for (namespace, mut names) in by_namespace {
                names.sort();
                info!("Namespace: {}", namespace);
                info!("  Resources ({}): {}", names.len(), abbreviate(&names));
            }
        }
        Err(e) => {
            error!("CRD is not queryable; {:?}. Is the CRD installed?", e);
            error!("Installation: crdgen | kubectl apply -f -");
            warn!("Continuing despite CRD queryability check failure - watch will retry");
        }
    }
}

/// First three names, then a total
fn abbreviate(names: &[String]) -> String {
    if names.len() <= 3 {
        names.join(", ")
    } else {
        format!("{}, ... ({} total)", names[..3].join(", "), names.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kafka::memory::InMemoryKafka;

    #[test]
    fn test_abbreviate() {
        let names: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
        assert_eq!(abbreviate(&names[..2]), "a, b");
        assert_eq!(abbreviate(&names), "a, b, c, ... (4 total)");
    }

    #[tokio::test]
    async fn test_review_cluster_config_reports_defaults() {
        let kafka = InMemoryKafka::new(3);
        kafka.set_cluster_config(ClusterConfig {
            auto_create_topics_enable: Some(true),
            num_partitions: Some(6),
            default_replication_factor: Some(3),
        });
        let cluster = review_cluster_config(&kafka).await.unwrap();
        assert_eq!(cluster.num_partitions, Some(6));
        assert_eq!(cluster.auto_create_topics_enable, Some(true));
    }
}
