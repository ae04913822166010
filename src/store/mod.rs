//! # Topic Store
//!
//! The resource store port: how the engine reads `KafkaTopic` resources and
//! writes status and finalizers back.
//!
//! - `kubernetes`: Kubernetes API implementation
//! - `memory`: in-process store used by tests
//!
//! A finalizer present on a resource means the store will not remove it after
//! a delete request until the finalizer list is emptied. The engine only adds
//! and removes its own entry; purging is the store's job.

use async_trait::async_trait;

use crate::crd::{KafkaTopic, KafkaTopicStatus, ResourceRef};

pub mod kubernetes;
pub mod memory;

pub use kubernetes::KubeTopicStore;
pub use memory::InMemoryTopicStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("KafkaTopic {0} not found")]
    NotFound(ResourceRef),
    #[error("KafkaTopic {0} was modified concurrently")]
    Conflict(ResourceRef),
    #[error("Kubernetes API error: {0}")]
    Api(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

#[async_trait]
pub trait TopicStore: Send + Sync {
    /// Every resource in the watched scope, selected or not
    async fn list(&self) -> Result<Vec<KafkaTopic>, StoreError>;

    async fn get(&self, id: &ResourceRef) -> Result<Option<KafkaTopic>, StoreError>;

    /// Replace the status block of `topic`
    async fn update_status(
        &self,
        topic: &KafkaTopic,
        status: &KafkaTopicStatus,
    ) -> Result<(), StoreError>;

    /// Replace the finalizer list of `topic`
    async fn set_finalizers(
        &self,
        topic: &KafkaTopic,
        finalizers: Vec<String>,
    ) -> Result<(), StoreError>;
}
