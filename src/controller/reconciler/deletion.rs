//! # Topic Deletion
//!
//! Two paths lead to a broker delete:
//!
//! - **Finalizer**: the resource is marked for deletion while holding our
//!   finalizer. The topic is deleted first and the finalizer removed after,
//!   so a failed delete is retried on later passes.
//! - **No finalizer**: the resource is already gone from the store. The delete
//!   is attempted once; failures are only logged.
//!
//! Only the owner of a name deletes the topic, and never for unmanaged
//! resources. Paused resources still delete their topic.

use tracing::{debug, info, warn};

use super::engine::{BatchContext, Reconciler};
use super::selection::deletes_topic;
use super::types::Outcome;
use crate::crd::{KafkaTopic, ResourceRef};
use crate::kafka::{KafkaError, KafkaErrorCode};
use crate::observability::metrics;

impl Reconciler {
    /// Resources removed from the store since the last batch
    pub(super) async fn handle_gone(&mut self, gone: Vec<KafkaTopic>, ctx: &mut BatchContext) {
        let mut doomed = Vec::new();
        for topic in gone {
            let id = topic.resource_ref();
            let name = self
                .ownership
                .claimed_name(&id)
                .map(str::to_string)
                .or_else(|| topic.status_topic_name().map(str::to_string))
                .or_else(|| topic.resolved_topic_name());
            let owned = name
                .as_deref()
                .is_some_and(|name| self.owns(name, &id, &topic));
            self.release(&id, ctx);
            ctx.processed.insert(id.clone());

            match name {
                Some(name) if !self.use_finalizer && owned && deletes_topic(&topic, &self.selector) => {
                    doomed.push(name);
                }
                _ => debug!(resource = %id, "KafkaTopic deleted, leaving topic in place"),
            }
        }
        if doomed.is_empty() {
            return;
        }

        metrics::increment_broker_operations("delete_topics");
        for (name, result) in self.kafka.delete_topics(&doomed).await {
            match result {
                Ok(()) => {
                    info!(topic.name = %name, "Deleted topic");
                    ctx.summary.deleted += 1;
                }
                Err(e) if e.is_unknown_topic() => {
                    debug!(topic.name = %name, "Topic already absent from Kafka");
                }
                Err(e) if e.is_deletion_disabled() => {
                    warn!(
                        "Unable to delete topic '{name}' from Kafka because topic deletion is disabled on the Kafka controller."
                    );
                    metrics::increment_topic_delete_failures();
                }
                Err(e) => {
                    warn!(topic.name = %name, error = %e, "Failed to delete topic from Kafka");
                    metrics::increment_topic_delete_failures();
                }
            }
        }
    }

    /// Resources marked for deletion that still hold our finalizer
    pub(super) async fn finalize(&mut self, topics: Vec<KafkaTopic>, ctx: &mut BatchContext) {
        let mut doomed: Vec<(KafkaTopic, String)> = Vec::new();
        for topic in topics {
            let id = topic.resource_ref();
            let name = topic
                .status_topic_name()
                .map(str::to_string)
                .or_else(|| topic.resolved_topic_name());
            let Some(name) = name.filter(|_| deletes_topic(&topic, &self.selector)) else {
                self.remove_finalizer(&topic, ctx).await;
                continue;
            };
            if !self.owns(&name, &id, &topic) {
                debug!(resource = %id, "Not the owner of '{name}', leaving topic in place");
                self.remove_finalizer(&topic, ctx).await;
                continue;
            }
            self.claim(&name, &id, ctx);
            doomed.push((topic, name));
        }
        if doomed.is_empty() {
            return;
        }

        let names: Vec<String> = doomed.iter().map(|(_, name)| name.clone()).collect();
        metrics::increment_broker_operations("delete_topics");
        let mut results = self.kafka.delete_topics(&names).await;
        for (topic, name) in doomed {
            let result = results.remove(&name).unwrap_or_else(|| {
                Err(KafkaError::new(
                    KafkaErrorCode::Client,
                    format!("No result returned for topic '{name}'"),
                ))
            });
            match result {
                Ok(()) => {
                    info!(topic.name = %name, "Deleted topic");
                    ctx.summary.deleted += 1;
                    self.remove_finalizer(&topic, ctx).await;
                }
                Err(e) if e.is_unknown_topic() => {
                    debug!(topic.name = %name, "Topic already absent from Kafka");
                    self.remove_finalizer(&topic, ctx).await;
                }
                Err(e) => {
                    // Finalizer stays so the delete is retried
                    self.finish(&topic, Outcome::Failed(e.into()), ctx).await;
                }
            }
        }
    }

    async fn remove_finalizer(&mut self, topic: &KafkaTopic, ctx: &mut BatchContext) {
        if self.update_finalizer(topic, false).await {
            self.release(&topic.resource_ref(), ctx);
        }
    }

    /// Owner per the table, or per status when no one has claimed the name yet
    fn owns(&self, name: &str, id: &ResourceRef, topic: &KafkaTopic) -> bool {
        match self.ownership.owner_of(name) {
            Some(owner) => owner == id,
            None => topic.status_topic_name() == Some(name),
        }
    }
}
