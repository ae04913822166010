//! # rdkafka Admin Client
//!
//! [`KafkaAdmin`] on top of librdkafka's admin API.
//!
//! Two operations have no librdkafka binding in the `rdkafka` crate:
//! - incremental config alteration is emulated by reading the topic's dynamic
//!   configs, applying the operations, then issuing a full `AlterConfigs`;
//! - partition reassignments cannot be listed, so none are reported and the
//!   replication factor comparison falls back to the raw assignment.
//!
//! Topic ids are not exposed by librdkafka metadata, so `topic_id` is `None`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::admin::{
    AdminClient, AdminOptions, AlterConfig, ConfigSource as RdConfigSource, NewPartitions,
    NewTopic as RdNewTopic, OwnedResourceSpecifier, ResourceSpecifier, TopicReplication,
};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::error::{KafkaError as RdKafkaError, RDKafkaErrorCode};
use rdkafka::metadata::Metadata;
use tracing::{debug, info};

use super::{
    AlterConfigOp, ClusterConfig, ConfigEntry, ConfigSource, KafkaAdmin, KafkaError,
    KafkaErrorCode, NewTopic, PartitionInfo, PartitionReassignment, TopicDescription,
    TopicPartition, TopicResults,
};
use crate::config::ControllerConfig;
use crate::constants::{AUTO_CREATE_TOPICS_ENABLE, DEFAULT_REPLICATION_FACTOR, NUM_PARTITIONS};

/// librdkafka backed broker admin client
pub struct RdKafkaAdmin {
    admin: Arc<AdminClient<DefaultClientContext>>,
    timeout: Duration,
}

impl std::fmt::Debug for RdKafkaAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RdKafkaAdmin")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl RdKafkaAdmin {
    pub fn new(config: &ControllerConfig) -> Result<Self, KafkaError> {
        let admin: AdminClient<DefaultClientContext> = ClientConfig::new()
            .set("bootstrap.servers", &config.bootstrap_servers)
            .set("client.id", &config.kafka_client_id)
            .create()
            .map_err(|e| from_rdkafka(&e))?;
        info!(
            bootstrap.servers = %config.bootstrap_servers,
            client.id = %config.kafka_client_id,
            "Created Kafka admin client"
        );
        Ok(Self {
            admin: Arc::new(admin),
            timeout: config.kafka_operation_timeout(),
        })
    }

    fn options(&self) -> AdminOptions {
        AdminOptions::new()
            .operation_timeout(Some(self.timeout))
            .request_timeout(Some(self.timeout))
    }

    /// Metadata requests are blocking in librdkafka
    async fn metadata(&self) -> Result<Metadata, KafkaError> {
        let admin = Arc::clone(&self.admin);
        let timeout = self.timeout;
        tokio::task::spawn_blocking(move || admin.inner().fetch_metadata(None, timeout))
            .await
            .map_err(|e| KafkaError::new(KafkaErrorCode::Client, format!("metadata task failed: {e}")))?
            .map_err(|e| from_rdkafka(&e))
    }

    async fn dynamic_configs(
        &self,
        names: &[String],
    ) -> TopicResults<BTreeMap<String, String>> {
        self.describe_configs(names)
            .await
            .into_iter()
            .map(|(name, result)| {
                let dynamic = result.map(|entries| {
                    entries
                        .into_iter()
                        .filter(|e| e.source == ConfigSource::DynamicTopic)
                        .filter_map(|e| e.value.map(|v| (e.name, v)))
                        .collect()
                });
                (name, dynamic)
            })
            .collect()
    }
}

#[async_trait]
impl KafkaAdmin for RdKafkaAdmin {
    async fn describe_cluster_config(&self) -> Result<ClusterConfig, KafkaError> {
        let metadata = self.metadata().await?;
        let broker_id = metadata
            .brokers()
            .first()
            .map(|b| b.id())
            .ok_or_else(|| KafkaError::new(KafkaErrorCode::Client, "no brokers in metadata"))?;
        let specifier = ResourceSpecifier::Broker(broker_id);
        let results = self
            .admin
            .describe_configs([&specifier], &self.options())
            .await
            .map_err(|e| from_rdkafka(&e))?;
        let resource = results
            .into_iter()
            .next()
            .ok_or_else(|| KafkaError::new(KafkaErrorCode::Client, "empty describe response"))?
            .map_err(|code| from_code(code, &format!("broker {broker_id}")))?;
        let value = |key: &str| {
            resource
                .entries
                .iter()
                .find(|e| e.name == key)
                .and_then(|e| e.value.clone())
        };
        Ok(ClusterConfig {
            auto_create_topics_enable: value(AUTO_CREATE_TOPICS_ENABLE)
                .and_then(|v| v.parse().ok()),
            num_partitions: value(NUM_PARTITIONS).and_then(|v| v.parse().ok()),
            default_replication_factor: value(DEFAULT_REPLICATION_FACTOR)
                .and_then(|v| v.parse().ok()),
        })
    }

    async fn describe_topics(&self, names: &[String]) -> TopicResults<TopicDescription> {
        let metadata = match self.metadata().await {
            Ok(metadata) => metadata,
            Err(err) => return fan_out(names, &err),
        };
        names
            .iter()
            .map(|name| {
                let result = match metadata.topics().iter().find(|t| t.name() == name) {
                    None => Err(KafkaError::unknown_topic(name)),
                    Some(topic) => match topic.error() {
                        Some(err) => Err(from_code(RDKafkaErrorCode::from(err), name)),
                        None => Ok(TopicDescription {
                            name: name.clone(),
                            topic_id: None,
                            partitions: topic
                                .partitions()
                                .iter()
                                .map(|p| PartitionInfo {
                                    partition: p.id(),
                                    replicas: p.replicas().to_vec(),
                                })
                                .collect(),
                        }),
                    },
                };
                (name.clone(), result)
            })
            .collect()
    }

    async fn describe_configs(&self, names: &[String]) -> TopicResults<Vec<ConfigEntry>> {
        if names.is_empty() {
            return BTreeMap::new();
        }
        let specifiers: Vec<ResourceSpecifier<'_>> = names
            .iter()
            .map(|n| ResourceSpecifier::Topic(n.as_str()))
            .collect();
        let results = match self
            .admin
            .describe_configs(specifiers.iter(), &self.options())
            .await
        {
            Ok(results) => results,
            Err(e) => return fan_out(names, &from_rdkafka(&e)),
        };
        names
            .iter()
            .zip(results)
            .map(|(name, result)| {
                let entries = result
                    .map(|resource| {
                        resource
                            .entries
                            .into_iter()
                            .map(|e| ConfigEntry {
                                name: e.name,
                                value: e.value,
                                source: map_source(e.source),
                            })
                            .collect()
                    })
                    .map_err(|code| from_code(code, name));
                (name.clone(), entries)
            })
            .collect()
    }

    async fn create_topics(&self, topics: &[NewTopic]) -> TopicResults<()> {
        if topics.is_empty() {
            return BTreeMap::new();
        }
        let new_topics: Vec<RdNewTopic<'_>> = topics
            .iter()
            .map(|t| {
                // -1 lets the broker apply num.partitions / default.replication.factor
                let mut topic = RdNewTopic::new(
                    &t.name,
                    t.partitions.unwrap_or(-1),
                    TopicReplication::Fixed(t.replication_factor.unwrap_or(-1)),
                );
                for (k, v) in &t.configs {
                    topic = topic.set(k, v);
                }
                topic
            })
            .collect();
        let names: Vec<String> = topics.iter().map(|t| t.name.clone()).collect();
        match self
            .admin
            .create_topics(new_topics.iter(), &self.options())
            .await
        {
            Ok(results) => collect_topic_results(results),
            Err(e) => fan_out(&names, &from_rdkafka(&e)),
        }
    }

    async fn delete_topics(&self, names: &[String]) -> TopicResults<()> {
        if names.is_empty() {
            return BTreeMap::new();
        }
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        match self.admin.delete_topics(&refs, &self.options()).await {
            Ok(results) => collect_topic_results(results),
            Err(e) => fan_out(names, &from_rdkafka(&e)),
        }
    }

    async fn create_partitions(&self, totals: &BTreeMap<String, i32>) -> TopicResults<()> {
        if totals.is_empty() {
            return BTreeMap::new();
        }
        let partitions: Vec<NewPartitions<'_>> = totals
            .iter()
            .map(|(name, total)| NewPartitions::new(name, usize::try_from(*total).unwrap_or(0)))
            .collect();
        let names: Vec<String> = totals.keys().cloned().collect();
        match self
            .admin
            .create_partitions(partitions.iter(), &self.options())
            .await
        {
            Ok(results) => collect_topic_results(results),
            Err(e) => fan_out(&names, &from_rdkafka(&e)),
        }
    }

    async fn incremental_alter_configs(
        &self,
        ops: &BTreeMap<String, Vec<AlterConfigOp>>,
    ) -> TopicResults<()> {
        if ops.is_empty() {
            return BTreeMap::new();
        }
        let names: Vec<String> = ops.keys().cloned().collect();
        let mut results = BTreeMap::new();
        let mut desired: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
        for (name, current) in self.dynamic_configs(&names).await {
            match current {
                Err(err) => {
                    results.insert(name, Err(err));
                }
                Ok(mut configs) => {
                    for op in ops.get(&name).into_iter().flatten() {
                        match op {
                            AlterConfigOp::Set { name, value } => {
                                configs.insert(name.clone(), value.clone());
                            }
                            AlterConfigOp::Delete { name } => {
                                configs.remove(name);
                            }
                        }
                    }
                    desired.insert(name, configs);
                }
            }
        }
        if desired.is_empty() {
            return results;
        }
        let alters: Vec<AlterConfig<'_>> = desired
            .iter()
            .map(|(name, configs)| {
                configs.iter().fold(
                    AlterConfig::new(ResourceSpecifier::Topic(name)),
                    |alter, (k, v)| alter.set(k, v),
                )
            })
            .collect();
        let altered_names: Vec<String> = desired.keys().cloned().collect();
        match self.admin.alter_configs(alters.iter(), &self.options()).await {
            Ok(altered) => {
                for result in altered {
                    let (name, outcome) = match result {
                        Ok(spec) => (specifier_name(&spec), Ok(())),
                        Err((spec, code)) => {
                            let name = specifier_name(&spec);
                            let err = from_code(code, &name);
                            (name, Err(err))
                        }
                    };
                    results.insert(name, outcome);
                }
            }
            Err(e) => results.extend(fan_out(&altered_names, &from_rdkafka(&e))),
        }
        results
    }

    async fn list_partition_reassignments(
        &self,
        partitions: &[TopicPartition],
    ) -> Result<BTreeMap<TopicPartition, PartitionReassignment>, KafkaError> {
        debug!(
            partitions = partitions.len(),
            "Partition reassignments are not available through librdkafka, assuming none"
        );
        Ok(BTreeMap::new())
    }
}

fn specifier_name(spec: &OwnedResourceSpecifier) -> String {
    match spec {
        OwnedResourceSpecifier::Topic(name) | OwnedResourceSpecifier::Group(name) => name.clone(),
        OwnedResourceSpecifier::Broker(id) => id.to_string(),
    }
}

fn collect_topic_results(
    results: Vec<Result<String, (String, RDKafkaErrorCode)>>,
) -> TopicResults<()> {
    results
        .into_iter()
        .map(|result| match result {
            Ok(name) => (name, Ok(())),
            Err((name, code)) => {
                let err = from_code(code, &name);
                (name, Err(err))
            }
        })
        .collect()
}

fn fan_out<T>(names: &[String], err: &KafkaError) -> TopicResults<T> {
    names
        .iter()
        .map(|name| (name.clone(), Err(err.clone())))
        .collect()
}

fn map_source(source: RdConfigSource) -> ConfigSource {
    match source {
        RdConfigSource::DynamicTopic => ConfigSource::DynamicTopic,
        RdConfigSource::DynamicBroker => ConfigSource::DynamicBroker,
        RdConfigSource::DynamicDefaultBroker => ConfigSource::DynamicDefaultBroker,
        RdConfigSource::StaticBroker => ConfigSource::StaticBroker,
        RdConfigSource::Default => ConfigSource::Default,
        _ => ConfigSource::Unknown,
    }
}

fn map_code(code: RDKafkaErrorCode) -> KafkaErrorCode {
    match code {
        RDKafkaErrorCode::UnknownTopicOrPartition => KafkaErrorCode::UnknownTopicOrPartition,
        RDKafkaErrorCode::TopicAlreadyExists => KafkaErrorCode::TopicAlreadyExists,
        RDKafkaErrorCode::TopicDeletionDisabled => KafkaErrorCode::TopicDeletionDisabled,
        RDKafkaErrorCode::InvalidTopic => KafkaErrorCode::InvalidTopic,
        RDKafkaErrorCode::InvalidPartitions => KafkaErrorCode::InvalidPartitions,
        RDKafkaErrorCode::InvalidReplicationFactor => KafkaErrorCode::InvalidReplicationFactor,
        RDKafkaErrorCode::InvalidConfig => KafkaErrorCode::InvalidConfig,
        RDKafkaErrorCode::PolicyViolation => KafkaErrorCode::PolicyViolation,
        RDKafkaErrorCode::TopicAuthorizationFailed => KafkaErrorCode::TopicAuthorizationFailed,
        RDKafkaErrorCode::ClusterAuthorizationFailed => KafkaErrorCode::ClusterAuthorizationFailed,
        RDKafkaErrorCode::UnsupportedVersion => KafkaErrorCode::UnsupportedVersion,
        RDKafkaErrorCode::RequestTimedOut | RDKafkaErrorCode::OperationTimedOut => {
            KafkaErrorCode::Timeout
        }
        other => KafkaErrorCode::Other(format!("{other:?}")),
    }
}

fn from_code(code: RDKafkaErrorCode, topic: &str) -> KafkaError {
    KafkaError::new(map_code(code), format!("{code} ({topic})"))
}

fn from_rdkafka(err: &RdKafkaError) -> KafkaError {
    let code = err
        .rdkafka_error_code()
        .map_or(KafkaErrorCode::Client, map_code);
    KafkaError::new(code, err.to_string())
}
