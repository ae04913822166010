//! # In-Memory Topic Store
//!
//! A [`TopicStore`] that behaves like the API server for the fields the
//! controller touches: `metadata.generation` bumps on spec changes, a delete
//! request on an object holding finalizers only sets `deletionTimestamp`, and
//! removing the last finalizer of a deleting object purges it.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

use super::{StoreError, TopicStore};
use crate::crd::{KafkaTopic, KafkaTopicStatus, ResourceRef};

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<ResourceRef, KafkaTopic>,
    status_writes: usize,
    finalizer_writes: usize,
    next_resource_version: u64,
}

impl State {
    fn bump_version(&mut self, topic: &mut KafkaTopic) {
        self.next_resource_version += 1;
        topic.metadata.resource_version = Some(self.next_resource_version.to_string());
    }
}

#[derive(Debug, Default)]
pub struct InMemoryTopicStore {
    state: Mutex<State>,
}

impl InMemoryTopicStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create or update a resource the way `kubectl apply` would
    ///
    /// Status, finalizers and deletion state of an existing object are kept
    /// unless the applied object sets finalizers itself.
    pub fn apply(&self, mut topic: KafkaTopic) -> KafkaTopic {
        let id = topic.resource_ref();
        let mut state = self.state();
        match state.objects.get(&id) {
            Some(existing) => {
                let generation = existing.generation().unwrap_or(1);
                topic.metadata.generation = Some(if existing.spec == topic.spec {
                    generation
                } else {
                    generation + 1
                });
                topic.status = existing.status.clone();
                if topic.metadata.finalizers.is_none() {
                    topic.metadata.finalizers = existing.metadata.finalizers.clone();
                }
                topic.metadata.deletion_timestamp = existing.metadata.deletion_timestamp.clone();
            }
            None => {
                topic.metadata.generation = Some(1);
                topic.metadata.namespace = Some(id.namespace.clone());
            }
        }
        state.bump_version(&mut topic);
        state.objects.insert(id, topic.clone());
        topic
    }

    /// Request deletion
    ///
    /// Returns the object as a watcher would report it: still present with a
    /// deletion timestamp when finalizers hold it, else the removed object.
    pub fn delete(&self, id: &ResourceRef) -> Result<(KafkaTopic, bool), StoreError> {
        let mut state = self.state();
        let Some(mut topic) = state.objects.remove(id) else {
            return Err(StoreError::NotFound(id.clone()));
        };
        if topic.finalizers().is_empty() {
            return Ok((topic, true));
        }
        if topic.metadata.deletion_timestamp.is_none() {
            topic.metadata.deletion_timestamp = Some(now()?);
        }
        state.bump_version(&mut topic);
        state.objects.insert(id.clone(), topic.clone());
        Ok((topic, false))
    }

    pub fn object(&self, id: &ResourceRef) -> Option<KafkaTopic> {
        self.state().objects.get(id).cloned()
    }

    pub fn status_writes(&self) -> usize {
        self.state().status_writes
    }

    pub fn finalizer_writes(&self) -> usize {
        self.state().finalizer_writes
    }
}

fn now() -> Result<Time, StoreError> {
    let stamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    serde_json::from_value(serde_json::Value::String(stamp))
        .map_err(|e| StoreError::Api(format!("invalid deletion timestamp: {e}")))
}

#[async_trait]
impl TopicStore for InMemoryTopicStore {
    async fn list(&self) -> Result<Vec<KafkaTopic>, StoreError> {
        Ok(self.state().objects.values().cloned().collect())
    }

    async fn get(&self, id: &ResourceRef) -> Result<Option<KafkaTopic>, StoreError> {
        Ok(self.object(id))
    }

    async fn update_status(
        &self,
        topic: &KafkaTopic,
        status: &KafkaTopicStatus,
    ) -> Result<(), StoreError> {
        let id = topic.resource_ref();
        let mut state = self.state();
        state.status_writes += 1;
        let mut object = state
            .objects
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        object.status = Some(status.clone());
        state.bump_version(&mut object);
        state.objects.insert(id, object);
        Ok(())
    }

    async fn set_finalizers(
        &self,
        topic: &KafkaTopic,
        finalizers: Vec<String>,
    ) -> Result<(), StoreError> {
        let id = topic.resource_ref();
        let mut state = self.state();
        state.finalizer_writes += 1;
        let mut object = state
            .objects
            .remove(&id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        if object.is_being_deleted() && finalizers.is_empty() {
            return Ok(());
        }
        object.metadata.finalizers = Some(finalizers);
        state.bump_version(&mut object);
        state.objects.insert(id, object);
        Ok(())
    }
}
