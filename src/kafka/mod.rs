//! # Kafka Admin Port
//!
//! The broker operations the reconciliation engine depends on, expressed as a
//! batched async trait. Every per-topic call returns one result per topic name
//! so a failure for one topic never hides the outcome for the others.
//!
//! - `error`: broker error classification
//! - `memory`: in-process broker used by tests and local runs
//! - `rdkafka`: librdkafka backed implementation (feature `rdkafka`)

use std::collections::BTreeMap;

use async_trait::async_trait;

mod error;
pub mod memory;
#[cfg(feature = "rdkafka")]
pub mod rdkafka;

pub use error::{KafkaError, KafkaErrorCode};

/// Per-topic outcome of a batched admin call
pub type TopicResults<T> = BTreeMap<String, Result<T, KafkaError>>;

/// Topic to create
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTopic {
    pub name: String,
    /// `None` uses the broker's `num.partitions`
    pub partitions: Option<i32>,
    /// `None` uses the broker's `default.replication.factor`
    pub replication_factor: Option<i32>,
    pub configs: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionInfo {
    pub partition: i32,
    pub replicas: Vec<i32>,
}

/// Live broker view of a topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicDescription {
    pub name: String,
    /// Broker assigned id, when the client can report it
    pub topic_id: Option<String>,
    pub partitions: Vec<PartitionInfo>,
}

impl TopicDescription {
    pub fn num_partitions(&self) -> i32 {
        i32::try_from(self.partitions.len()).unwrap_or(i32::MAX)
    }
}

/// Where a config value comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    /// Set on the topic itself; the only provenance the controller manages
    DynamicTopic,
    DynamicBroker,
    DynamicDefaultBroker,
    StaticBroker,
    Default,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigEntry {
    pub name: String,
    pub value: Option<String>,
    pub source: ConfigSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlterConfigOp {
    Set { name: String, value: String },
    Delete { name: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TopicPartition {
    pub topic: String,
    pub partition: i32,
}

impl TopicPartition {
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }
}

/// In-flight reassignment of one partition
///
/// `replicas` is the current assignment, which during a reassignment is the
/// union of the original and target replica sets.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PartitionReassignment {
    pub replicas: Vec<i32>,
    pub adding_replicas: Vec<i32>,
    pub removing_replicas: Vec<i32>,
}

/// Broker settings reviewed at startup
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClusterConfig {
    pub auto_create_topics_enable: Option<bool>,
    pub num_partitions: Option<i32>,
    pub default_replication_factor: Option<i32>,
}

/// Broker admin operations used by the reconciliation engine
#[async_trait]
pub trait KafkaAdmin: Send + Sync {
    async fn describe_cluster_config(&self) -> Result<ClusterConfig, KafkaError>;

    /// Missing topics are reported as `UnknownTopicOrPartition`
    async fn describe_topics(&self, names: &[String]) -> TopicResults<TopicDescription>;

    async fn describe_configs(&self, names: &[String]) -> TopicResults<Vec<ConfigEntry>>;

    async fn create_topics(&self, topics: &[NewTopic]) -> TopicResults<()>;

    async fn delete_topics(&self, names: &[String]) -> TopicResults<()>;

    /// Raise the partition count of each topic to the given total
    async fn create_partitions(&self, totals: &BTreeMap<String, i32>) -> TopicResults<()>;

    async fn incremental_alter_configs(
        &self,
        ops: &BTreeMap<String, Vec<AlterConfigOp>>,
    ) -> TopicResults<()>;

    /// Only partitions with an in-flight reassignment appear in the result
    async fn list_partition_reassignments(
        &self,
        partitions: &[TopicPartition],
    ) -> Result<BTreeMap<TopicPartition, PartitionReassignment>, KafkaError>;
}
