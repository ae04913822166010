//! # KafkaTopic Status
//!
//! Status block written back after every reconciliation pass.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of the KafkaTopic resource
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KafkaTopicStatus {
    /// Exactly one condition once the resource has been reconciled
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Generation observed by the most recently completed pass
    #[serde(default)]
    pub observed_generation: Option<i64>,
    /// Name of the topic in Kafka, once resolved
    #[serde(default)]
    pub topic_name: Option<String>,
    /// Broker assigned topic id
    #[serde(default)]
    pub topic_id: Option<String>,
}

impl KafkaTopicStatus {
    /// The single condition carried by a reconciled resource
    pub fn condition(&self) -> Option<&Condition> {
        self.conditions.first()
    }
}

/// Condition represents a status condition for the resource
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition (Ready, Unmanaged, ReconciliationPaused)
    pub r#type: String,
    /// Status of condition (True, False)
    pub status: String,
    /// Last transition time (RFC3339)
    #[serde(default)]
    pub last_transition_time: Option<String>,
    /// Machine readable failure reason
    #[serde(default)]
    pub reason: Option<String>,
    /// Human readable failure message
    #[serde(default)]
    pub message: Option<String>,
}

impl Condition {
    pub fn is_true(&self) -> bool {
        self.status == "True"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionType {
    Ready,
    Unmanaged,
    ReconciliationPaused,
}

impl ConditionType {
    pub fn as_str(self) -> &'static str {
        match self {
            ConditionType::Ready => "Ready",
            ConditionType::Unmanaged => "Unmanaged",
            ConditionType::ReconciliationPaused => "ReconciliationPaused",
        }
    }
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
