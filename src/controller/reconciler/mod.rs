//! # Reconciler
//!
//! Core reconciliation logic for `KafkaTopic` resources.
//!
//! The reconciler:
//! - Receives batches of changed resources from the batching queue
//! - Resolves which resource owns which Kafka topic name
//! - Creates topics, alters topic configs and adds partitions in batched broker calls
//! - Deletes topics of deleted resources
//! - Writes exactly one condition per reconciled resource
//!
//! ## Modules
//!
//! - `types`: failure kinds, per-resource outcome, batch summary
//! - `selection`: which path a resource takes through a batch
//! - `ownership`: topic name ownership table
//! - `config_diff`: canonical config values and alter operations
//! - `replicas`: reassignment-aware replication factor comparison
//! - `conditions`: status derivation
//! - `engine`: the batch pass
//! - `deletion`: finalizer and finalizer-less topic deletion

pub mod conditions;
pub mod config_diff;
mod deletion;
pub mod engine;
pub mod ownership;
pub mod replicas;
pub mod selection;
pub mod types;

// Re-export public API
pub use engine::Reconciler;
pub use ownership::OwnershipTable;
pub use types::{BatchSummary, Outcome, ReconcileFailure};
