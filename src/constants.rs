//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// API group of the `KafkaTopic` custom resource
pub const KAFKA_TOPIC_GROUP: &str = "kafka.octopilot.io";

/// API version of the `KafkaTopic` custom resource
pub const KAFKA_TOPIC_VERSION: &str = "v1beta1";

/// Kind of the `KafkaTopic` custom resource
pub const KAFKA_TOPIC_KIND: &str = "KafkaTopic";

/// Plural resource name used in API paths
pub const KAFKA_TOPIC_PLURAL: &str = "kafkatopics";

/// Annotation that excludes a resource from broker mutation when set to `false`
pub const ANNOTATION_MANAGED: &str = "kafka.octopilot.io/managed";

/// Annotation that freezes reconciliation of a resource when set to `true`
pub const ANNOTATION_PAUSE_RECONCILIATION: &str = "kafka.octopilot.io/pause-reconciliation";

/// Finalizer held on managed resources until the broker topic is deleted
pub const TOPIC_FINALIZER: &str = "kafka.octopilot.io/topic-controller";

/// Field manager used for status and finalizer patches
pub const FIELD_MANAGER: &str = "kafka-topic-controller";

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Default Kafka bootstrap servers
pub const DEFAULT_BOOTSTRAP_SERVERS: &str = "localhost:9092";

/// Default Kafka client id used by the admin client
pub const DEFAULT_KAFKA_CLIENT_ID: &str = "kafka-topic-controller";

/// Default timeout for a single broker admin operation (milliseconds)
pub const DEFAULT_KAFKA_OPERATION_TIMEOUT_MS: u64 = 30_000;

/// Default maximum number of distinct pending items in the batching queue
/// Exceeding it stops the process
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 1024;

/// Default maximum number of items handed to the engine per batch
pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

/// Default time a batch waits to fill up once the first item arrived (milliseconds)
pub const DEFAULT_MAX_BATCH_LINGER_MS: u64 = 100;

/// Default interval between full resyncs (milliseconds)
pub const DEFAULT_FULL_RECONCILIATION_INTERVAL_MS: u64 = 120_000;

/// Default delay before restarting watch stream after unknown errors (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Default delay before restarting watch stream after it ends (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS: u64 = 1;

/// Broker config key reviewed at startup
pub const AUTO_CREATE_TOPICS_ENABLE: &str = "auto.create.topics.enable";

/// Broker config key holding the default partition count
pub const NUM_PARTITIONS: &str = "num.partitions";

/// Broker config key holding the default replication factor
pub const DEFAULT_REPLICATION_FACTOR: &str = "default.replication.factor";

/// Initial backoff when the API server reports its storage is reinitializing (milliseconds)
pub const DEFAULT_WATCH_BACKOFF_START_MS: u64 = 1_000;

/// Maximum backoff between watch restarts caused by throttling (milliseconds)
pub const DEFAULT_WATCH_BACKOFF_MAX_MS: u64 = 30_000;
