//! # In-Memory Kafka
//!
//! A single-process broker model implementing [`KafkaAdmin`]. It keeps the
//! rules the controller relies on (topic name legality, known topic configs,
//! replica placement, partition counts, deletion switch, reassignments) and
//! records every call so tests can assert on round trips and mutations.
//!
//! Out-of-band helpers (`*_out_of_band`) model operators or applications
//! changing the broker behind the controller's back.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{LazyLock, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use regex::Regex;

use super::{
    AlterConfigOp, ClusterConfig, ConfigEntry, ConfigSource, KafkaAdmin, KafkaError,
    KafkaErrorCode, NewTopic, PartitionInfo, PartitionReassignment, TopicDescription,
    TopicPartition, TopicResults,
};

static LEGAL_TOPIC_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._-]+$").expect("Failed to compile topic name pattern")
});

const MAX_TOPIC_NAME_LENGTH: usize = 249;

const KNOWN_TOPIC_CONFIGS: &[&str] = &[
    "cleanup.policy",
    "compression.type",
    "delete.retention.ms",
    "file.delete.delay.ms",
    "flush.messages",
    "flush.ms",
    "follower.replication.throttled.replicas",
    "index.interval.bytes",
    "leader.replication.throttled.replicas",
    "local.retention.bytes",
    "local.retention.ms",
    "max.compaction.lag.ms",
    "max.message.bytes",
    "message.downconversion.enable",
    "message.timestamp.after.max.ms",
    "message.timestamp.before.max.ms",
    "message.timestamp.type",
    "min.cleanable.dirty.ratio",
    "min.compaction.lag.ms",
    "min.insync.replicas",
    "preallocate",
    "remote.storage.enable",
    "retention.bytes",
    "retention.ms",
    "segment.bytes",
    "segment.index.bytes",
    "segment.jitter.ms",
    "segment.ms",
    "unclean.leader.election.enable",
];

/// Values the broker reports with `Default` provenance when not set on the topic
const DEFAULT_TOPIC_CONFIGS: &[(&str, &str)] = &[
    ("cleanup.policy", "delete"),
    ("flush.ms", "9223372036854775807"),
    ("min.insync.replicas", "1"),
    ("retention.ms", "604800000"),
    ("segment.bytes", "1073741824"),
];

/// Admin operations, used to inspect call counts and inject failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AdminOp {
    DescribeCluster,
    DescribeTopics,
    DescribeConfigs,
    CreateTopics,
    DeleteTopics,
    CreatePartitions,
    AlterConfigs,
    ListReassignments,
}

impl AdminOp {
    fn is_mutation(self) -> bool {
        matches!(
            self,
            AdminOp::CreateTopics
                | AdminOp::DeleteTopics
                | AdminOp::CreatePartitions
                | AdminOp::AlterConfigs
        )
    }
}

/// Snapshot of a topic as the broker holds it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicState {
    pub id: String,
    /// Replica list per partition, indexed by partition id
    pub partitions: Vec<Vec<i32>>,
    /// Dynamic topic-level configs
    pub configs: BTreeMap<String, String>,
}

impl TopicState {
    pub fn replication_factors(&self) -> BTreeSet<usize> {
        self.partitions.iter().map(Vec::len).collect()
    }
}

#[derive(Debug)]
struct State {
    brokers: Vec<i32>,
    cluster: ClusterConfig,
    delete_topic_enable: bool,
    topics: BTreeMap<String, TopicState>,
    reassignments: BTreeMap<TopicPartition, PartitionReassignment>,
    failures: BTreeMap<(AdminOp, Option<String>), KafkaError>,
    calls: BTreeMap<AdminOp, usize>,
    next_id: u64,
}

impl State {
    fn record(&mut self, op: AdminOp) {
        *self.calls.entry(op).or_default() += 1;
    }

    fn injected(&self, op: AdminOp, topic: &str) -> Option<KafkaError> {
        self.failures
            .get(&(op, Some(topic.to_string())))
            .or_else(|| self.failures.get(&(op, None)))
            .cloned()
    }

    fn next_topic_id(&mut self) -> String {
        self.next_id += 1;
        format!("tid-{:08}", self.next_id)
    }

    fn assign_replicas(&self, partition: usize, replication_factor: usize) -> Vec<i32> {
        (0..replication_factor)
            .map(|r| self.brokers[(partition + r) % self.brokers.len()])
            .collect()
    }

    fn create(&mut self, topic: &NewTopic) -> Result<(), KafkaError> {
        validate_topic_name(&topic.name)?;
        if self.topics.contains_key(&topic.name) {
            return Err(KafkaError::new(
                KafkaErrorCode::TopicAlreadyExists,
                format!("Topic '{}' already exists.", topic.name),
            ));
        }
        let collision_key = topic.name.replace('.', "_");
        if let Some(existing) = self
            .topics
            .keys()
            .find(|existing| existing.replace('.', "_") == collision_key)
        {
            return Err(KafkaError::new(
                KafkaErrorCode::InvalidTopic,
                format!(
                    "Topic '{}' collides with existing topic: {existing}",
                    topic.name
                ),
            ));
        }
        let partitions = topic
            .partitions
            .or(self.cluster.num_partitions)
            .unwrap_or(1);
        if partitions < 1 {
            return Err(KafkaError::new(
                KafkaErrorCode::InvalidPartitions,
                "Number of partitions must be larger than 0.",
            ));
        }
        let replication_factor = topic
            .replication_factor
            .or(self.cluster.default_replication_factor)
            .unwrap_or(1);
        if replication_factor < 1 {
            return Err(KafkaError::new(
                KafkaErrorCode::InvalidReplicationFactor,
                "Replication factor must be larger than 0.",
            ));
        }
        let replication_factor = usize::try_from(replication_factor).unwrap_or(usize::MAX);
        if replication_factor > self.brokers.len() {
            return Err(KafkaError::new(
                KafkaErrorCode::InvalidReplicationFactor,
                format!(
                    "Replication factor: {replication_factor} larger than available brokers: {}.",
                    self.brokers.len()
                ),
            ));
        }
        for (name, value) in &topic.configs {
            validate_config(name, value)?;
        }
        let partitions = (0..usize::try_from(partitions).unwrap_or(0))
            .map(|p| self.assign_replicas(p, replication_factor))
            .collect();
        let id = self.next_topic_id();
        self.topics.insert(
            topic.name.clone(),
            TopicState {
                id,
                partitions,
                configs: topic.configs.clone(),
            },
        );
        Ok(())
    }
}

/// In-process broker implementing [`KafkaAdmin`]
#[derive(Debug)]
pub struct InMemoryKafka {
    state: Mutex<State>,
}

impl Default for InMemoryKafka {
    fn default() -> Self {
        Self::new(1)
    }
}

impl InMemoryKafka {
    /// A cluster of `brokers` brokers (ids `0..brokers`) with topic deletion enabled,
    /// `num.partitions=1`, `default.replication.factor=1`, auto creation disabled
    pub fn new(brokers: i32) -> Self {
        Self {
            state: Mutex::new(State {
                brokers: (0..brokers.max(1)).collect(),
                cluster: ClusterConfig {
                    auto_create_topics_enable: Some(false),
                    num_partitions: Some(1),
                    default_replication_factor: Some(1),
                },
                delete_topic_enable: true,
                topics: BTreeMap::new(),
                reassignments: BTreeMap::new(),
                failures: BTreeMap::new(),
                calls: BTreeMap::new(),
                next_id: 0,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_cluster_config(&self, cluster: ClusterConfig) {
        self.state().cluster = cluster;
    }

    /// Model `delete.topic.enable` on the brokers
    pub fn set_delete_topic_enable(&self, enabled: bool) {
        self.state().delete_topic_enable = enabled;
    }

    /// Fail `op` with `error`, for one topic or (with `None`) for every topic
    pub fn fail(&self, op: AdminOp, topic: Option<&str>, error: KafkaError) {
        self.state()
            .failures
            .insert((op, topic.map(str::to_string)), error);
    }

    pub fn clear_failures(&self) {
        self.state().failures.clear();
    }

    pub fn topic(&self, name: &str) -> Option<TopicState> {
        self.state().topics.get(name).cloned()
    }

    pub fn topic_names(&self) -> Vec<String> {
        self.state().topics.keys().cloned().collect()
    }

    /// Number of calls made for `op`
    pub fn calls(&self, op: AdminOp) -> usize {
        self.state().calls.get(&op).copied().unwrap_or(0)
    }

    /// Number of create/delete/add-partitions/alter calls made
    pub fn mutation_calls(&self) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|(op, _)| op.is_mutation())
            .map(|(_, count)| count)
            .sum()
    }

    pub fn reset_calls(&self) {
        self.state().calls.clear();
    }

    pub fn create_topic_out_of_band(&self, topic: &NewTopic) -> Result<(), KafkaError> {
        self.state().create(topic)
    }

    pub fn delete_topic_out_of_band(&self, name: &str) -> bool {
        let mut state = self.state();
        state.reassignments.retain(|tp, _| tp.topic != name);
        state.topics.remove(name).is_some()
    }

    pub fn set_config_out_of_band(&self, topic: &str, name: &str, value: &str) -> bool {
        match self.state().topics.get_mut(topic) {
            Some(state) => {
                state.configs.insert(name.to_string(), value.to_string());
                true
            }
            None => false,
        }
    }

    /// Start moving a partition to `target` replicas
    ///
    /// Like the broker, the current assignment becomes the union of the
    /// original and target replicas until [`Self::complete_reassignments`].
    pub fn start_reassignment(&self, topic: &str, partition: i32, target: &[i32]) -> bool {
        let mut state = self.state();
        let Some(replicas) = state
            .topics
            .get_mut(topic)
            .and_then(|t| t.partitions.get_mut(usize::try_from(partition).ok()?))
        else {
            return false;
        };
        let original = replicas.clone();
        let adding: Vec<i32> = target
            .iter()
            .copied()
            .filter(|b| !original.contains(b))
            .collect();
        let removing: Vec<i32> = original
            .iter()
            .copied()
            .filter(|b| !target.contains(b))
            .collect();
        replicas.extend(adding.iter().copied());
        let current = replicas.clone();
        state.reassignments.insert(
            TopicPartition::new(topic, partition),
            PartitionReassignment {
                replicas: current,
                adding_replicas: adding,
                removing_replicas: removing,
            },
        );
        true
    }

    /// Finish every in-flight reassignment
    pub fn complete_reassignments(&self) {
        let mut state = self.state();
        let reassignments = std::mem::take(&mut state.reassignments);
        for (tp, reassignment) in reassignments {
            if let Some(replicas) = state
                .topics
                .get_mut(&tp.topic)
                .and_then(|t| t.partitions.get_mut(usize::try_from(tp.partition).ok()?))
            {
                replicas.retain(|b| !reassignment.removing_replicas.contains(b));
            }
        }
    }
}

#[async_trait]
impl KafkaAdmin for InMemoryKafka {
    async fn describe_cluster_config(&self) -> Result<ClusterConfig, KafkaError> {
        let mut state = self.state();
        state.record(AdminOp::DescribeCluster);
        if let Some(err) = state.failures.get(&(AdminOp::DescribeCluster, None)) {
            return Err(err.clone());
        }
        Ok(state.cluster.clone())
    }

    async fn describe_topics(&self, names: &[String]) -> TopicResults<TopicDescription> {
        let mut state = self.state();
        state.record(AdminOp::DescribeTopics);
        names
            .iter()
            .map(|name| {
                let result = match state.injected(AdminOp::DescribeTopics, name) {
                    Some(err) => Err(err),
                    None => state
                        .topics
                        .get(name)
                        .map(|topic| TopicDescription {
                            name: name.clone(),
                            topic_id: Some(topic.id.clone()),
                            partitions: topic
                                .partitions
                                .iter()
                                .enumerate()
                                .map(|(p, replicas)| PartitionInfo {
                                    partition: i32::try_from(p).unwrap_or(i32::MAX),
                                    replicas: replicas.clone(),
                                })
                                .collect(),
                        })
                        .ok_or_else(|| KafkaError::unknown_topic(name)),
                };
                (name.clone(), result)
            })
            .collect()
    }

    async fn describe_configs(&self, names: &[String]) -> TopicResults<Vec<ConfigEntry>> {
        let mut state = self.state();
        state.record(AdminOp::DescribeConfigs);
        names
            .iter()
            .map(|name| {
                let result = match state.injected(AdminOp::DescribeConfigs, name) {
                    Some(err) => Err(err),
                    None => state
                        .topics
                        .get(name)
                        .map(|topic| {
                            let mut entries: Vec<ConfigEntry> = topic
                                .configs
                                .iter()
                                .map(|(k, v)| ConfigEntry {
                                    name: k.clone(),
                                    value: Some(v.clone()),
                                    source: ConfigSource::DynamicTopic,
                                })
                                .collect();
                            entries.extend(
                                DEFAULT_TOPIC_CONFIGS
                                    .iter()
                                    .filter(|(k, _)| !topic.configs.contains_key(*k))
                                    .map(|(k, v)| ConfigEntry {
                                        name: (*k).to_string(),
                                        value: Some((*v).to_string()),
                                        source: ConfigSource::Default,
                                    }),
                            );
                            entries
                        })
                        .ok_or_else(|| KafkaError::unknown_topic(name)),
                };
                (name.clone(), result)
            })
            .collect()
    }

    async fn create_topics(&self, topics: &[NewTopic]) -> TopicResults<()> {
        let mut state = self.state();
        state.record(AdminOp::CreateTopics);
        topics
            .iter()
            .map(|topic| {
                let result = match state.injected(AdminOp::CreateTopics, &topic.name) {
                    Some(err) => Err(err),
                    None => state.create(topic),
                };
                (topic.name.clone(), result)
            })
            .collect()
    }

    async fn delete_topics(&self, names: &[String]) -> TopicResults<()> {
        let mut state = self.state();
        state.record(AdminOp::DeleteTopics);
        names
            .iter()
            .map(|name| {
                let result = if let Some(err) = state.injected(AdminOp::DeleteTopics, name) {
                    Err(err)
                } else if !state.delete_topic_enable {
                    Err(KafkaError::new(
                        KafkaErrorCode::TopicDeletionDisabled,
                        "Topic deletion is disabled.",
                    ))
                } else if state.topics.remove(name).is_some() {
                    state.reassignments.retain(|tp, _| &tp.topic != name);
                    Ok(())
                } else {
                    Err(KafkaError::unknown_topic(name))
                };
                (name.clone(), result)
            })
            .collect()
    }

    async fn create_partitions(&self, totals: &BTreeMap<String, i32>) -> TopicResults<()> {
        let mut state = self.state();
        state.record(AdminOp::CreatePartitions);
        let mut results = BTreeMap::new();
        for (name, total) in totals {
            if let Some(err) = state.injected(AdminOp::CreatePartitions, name) {
                results.insert(name.clone(), Err(err));
                continue;
            }
            let Some(current) = state.topics.get(name).map(|t| t.partitions.clone()) else {
                results.insert(name.clone(), Err(KafkaError::unknown_topic(name)));
                continue;
            };
            let total = usize::try_from(*total).unwrap_or(0);
            if total <= current.len() {
                results.insert(
                    name.clone(),
                    Err(KafkaError::new(
                        KafkaErrorCode::InvalidPartitions,
                        format!(
                            "Topic currently has {} partitions, which is higher than the requested {total}.",
                            current.len()
                        ),
                    )),
                );
                continue;
            }
            let replication_factor = current.first().map_or(1, Vec::len);
            let added: Vec<Vec<i32>> = (current.len()..total)
                .map(|p| state.assign_replicas(p, replication_factor))
                .collect();
            if let Some(topic) = state.topics.get_mut(name) {
                topic.partitions.extend(added);
            }
            results.insert(name.clone(), Ok(()));
        }
        results
    }

    async fn incremental_alter_configs(
        &self,
        ops: &BTreeMap<String, Vec<AlterConfigOp>>,
    ) -> TopicResults<()> {
        let mut state = self.state();
        state.record(AdminOp::AlterConfigs);
        let mut results = BTreeMap::new();
        for (name, topic_ops) in ops {
            if let Some(err) = state.injected(AdminOp::AlterConfigs, name) {
                results.insert(name.clone(), Err(err));
                continue;
            }
            let validated = topic_ops.iter().try_for_each(|op| match op {
                AlterConfigOp::Set { name, value } => validate_config(name, value),
                AlterConfigOp::Delete { name } => validate_config_name(name),
            });
            let result = match (validated, state.topics.get_mut(name)) {
                (Err(err), _) => Err(err),
                (Ok(()), None) => Err(KafkaError::unknown_topic(name)),
                (Ok(()), Some(topic)) => {
                    for op in topic_ops {
                        match op {
                            AlterConfigOp::Set { name, value } => {
                                topic.configs.insert(name.clone(), value.clone());
                            }
                            AlterConfigOp::Delete { name } => {
                                topic.configs.remove(name);
                            }
                        }
                    }
                    Ok(())
                }
            };
            results.insert(name.clone(), result);
        }
        results
    }

    async fn list_partition_reassignments(
        &self,
        partitions: &[TopicPartition],
    ) -> Result<BTreeMap<TopicPartition, PartitionReassignment>, KafkaError> {
        let mut state = self.state();
        state.record(AdminOp::ListReassignments);
        if let Some(err) = state.failures.get(&(AdminOp::ListReassignments, None)) {
            return Err(err.clone());
        }
        Ok(partitions
            .iter()
            .filter_map(|tp| {
                state
                    .reassignments
                    .get(tp)
                    .map(|r| (tp.clone(), r.clone()))
            })
            .collect())
    }
}

fn validate_topic_name(name: &str) -> Result<(), KafkaError> {
    let illegal = |reason: &str| {
        Err(KafkaError::new(
            KafkaErrorCode::InvalidTopic,
            format!("Topic name \"{name}\" is illegal, {reason}"),
        ))
    };
    if name.is_empty() {
        return illegal("it can't be empty");
    }
    if name == "." || name == ".." {
        return illegal("it cannot be \".\" or \"..\"");
    }
    if name.len() > MAX_TOPIC_NAME_LENGTH {
        return illegal("it can't be longer than 249 characters");
    }
    if !LEGAL_TOPIC_NAME.is_match(name) {
        return illegal(
            "it contains a character other than ASCII alphanumerics, '.', '_' and '-'",
        );
    }
    Ok(())
}

fn validate_config_name(name: &str) -> Result<(), KafkaError> {
    if KNOWN_TOPIC_CONFIGS.contains(&name) {
        Ok(())
    } else {
        Err(KafkaError::new(
            KafkaErrorCode::InvalidConfig,
            format!("Unknown topic config name: {name}"),
        ))
    }
}

fn validate_config(name: &str, value: &str) -> Result<(), KafkaError> {
    validate_config_name(name)?;
    let invalid = |expected: &str| {
        Err(KafkaError::new(
            KafkaErrorCode::InvalidConfig,
            format!("Invalid value {value} for configuration {name}: {expected}"),
        ))
    };
    match name {
        "cleanup.policy" => {
            if value
                .split(',')
                .all(|p| matches!(p.trim(), "compact" | "delete"))
            {
                Ok(())
            } else {
                invalid("String must be one of: compact, delete")
            }
        }
        "min.cleanable.dirty.ratio" => match value.parse::<f64>() {
            Ok(ratio) if (0.0..=1.0).contains(&ratio) => Ok(()),
            _ => invalid("Value must be a number between 0 and 1"),
        },
        "preallocate" | "unclean.leader.election.enable" | "remote.storage.enable"
        | "message.downconversion.enable" => match value {
            "true" | "false" => Ok(()),
            _ => invalid("Expected value to be either true or false"),
        },
        "compression.type" | "message.timestamp.type" | "follower.replication.throttled.replicas"
        | "leader.replication.throttled.replicas" => Ok(()),
        _ => match value.parse::<i64>() {
            Ok(_) => Ok(()),
            Err(_) => invalid("Not a number of type LONG"),
        },
    }
}
