//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ## Usage
//!
//! ```rust
//! use kafka_topic_controller::prelude::*;
//! ```
//!
//! This brings into scope:
//! - All CRD types (KafkaTopic, KafkaTopicStatus, etc.)
//! - The broker and store ports (KafkaAdmin, TopicStore)
//! - Reconciler and queue types
//! - Config types (ControllerConfig, ServerConfig)

// CRD types - most commonly used
pub use crate::crd::*;

// Ports - needed for implementing brokers and stores
pub use crate::kafka::{KafkaAdmin, KafkaError, KafkaErrorCode};
pub use crate::store::{StoreError, TopicStore};

// Reconciler types - core controller functionality
pub use crate::controller::batch_loop::BatchLoop;
pub use crate::controller::queue::{Batch, BatchingQueue, QueueError, WorkItem};
pub use crate::controller::reconciler::{
    BatchSummary, Outcome, OwnershipTable, ReconcileFailure, Reconciler,
};

// Config types - for configuration management
pub use crate::config::{ControllerConfig, LogFormat, ServerConfig};
