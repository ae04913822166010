//! # Custom Resource Definitions
//!
//! CRD types for the Kafka Topic Controller.
//!
//! ## Module Structure
//!
//! - `spec.rs` - `KafkaTopicSpec` and the derived CRD definition used by `crdgen`
//! - `status.rs` - Status block and conditions
//! - `topic.rs` - The `KafkaTopic` object as the controller reads it, plus `ResourceRef`

mod spec;
mod status;
mod topic;

pub use spec::{KafkaTopicDefinition, KafkaTopicSpec};
pub use status::{Condition, ConditionType, KafkaTopicStatus};
pub use topic::{KafkaTopic, ResourceRef};
