//! # Kubernetes Topic Store
//!
//! [`TopicStore`] backed by the Kubernetes API. Status and finalizers are
//! written with merge patches under the controller's field manager.

use async_trait::async_trait;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::Client;
use tracing::debug;

use super::{StoreError, TopicStore};
use crate::constants::FIELD_MANAGER;
use crate::crd::{KafkaTopic, KafkaTopicStatus, ResourceRef};

#[derive(Clone)]
pub struct KubeTopicStore {
    client: Client,
    /// `None` lists across all namespaces
    namespace: Option<String>,
}

impl std::fmt::Debug for KubeTopicStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeTopicStore")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl KubeTopicStore {
    pub fn new(client: Client, namespace: Option<String>) -> Self {
        Self { client, namespace }
    }

    /// API scoped to the watched namespace, or cluster wide
    pub fn api(&self) -> Api<KafkaTopic> {
        match &self.namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }

    fn namespaced(&self, namespace: &str) -> Api<KafkaTopic> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn map_error(err: kube::Error, id: &ResourceRef) -> StoreError {
    match err {
        kube::Error::Api(api_err) if api_err.code == 404 => StoreError::NotFound(id.clone()),
        kube::Error::Api(api_err) if api_err.code == 409 => StoreError::Conflict(id.clone()),
        other => StoreError::Api(other.to_string()),
    }
}

#[async_trait]
impl TopicStore for KubeTopicStore {
    async fn list(&self) -> Result<Vec<KafkaTopic>, StoreError> {
        let list = self
            .api()
            .list(&ListParams::default())
            .await
            .map_err(|e| StoreError::Api(e.to_string()))?;
        Ok(list.items)
    }

    async fn get(&self, id: &ResourceRef) -> Result<Option<KafkaTopic>, StoreError> {
        self.namespaced(&id.namespace)
            .get_opt(&id.name)
            .await
            .map_err(|e| map_error(e, id))
    }

    async fn update_status(
        &self,
        topic: &KafkaTopic,
        status: &KafkaTopicStatus,
    ) -> Result<(), StoreError> {
        let id = topic.resource_ref();
        let patch = serde_json::json!({
            "status": status
        });
        self.namespaced(&id.namespace)
            .patch_status(
                &id.name,
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(patch),
            )
            .await
            .map_err(|e| map_error(e, &id))?;
        debug!(resource = %id, "Patched KafkaTopic status");
        Ok(())
    }

    async fn set_finalizers(
        &self,
        topic: &KafkaTopic,
        finalizers: Vec<String>,
    ) -> Result<(), StoreError> {
        let id = topic.resource_ref();
        // resourceVersion turns the merge patch into an optimistic update
        let patch = serde_json::json!({
            "metadata": {
                "resourceVersion": topic.metadata.resource_version,
                "finalizers": finalizers
            }
        });
        self.namespaced(&id.namespace)
            .patch(&id.name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(patch))
            .await
            .map_err(|e| map_error(e, &id))?;
        debug!(resource = %id, finalizers = ?finalizers, "Patched KafkaTopic finalizers");
        Ok(())
    }
}
