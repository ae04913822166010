//! # Types
//!
//! Core types for the reconciler.

use thiserror::Error;

use crate::crd::ResourceRef;
use crate::kafka::KafkaError;

/// Why a resource could not reach `Ready=True`
///
/// Each variant becomes one `Ready=False` condition with [`Self::reason`] as
/// the reason and the `Display` output as the message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileFailure {
    /// A broker admin call failed
    #[error("{0}")]
    KafkaError(String),
    /// The requested change breaks an immutability rule
    #[error("{0}")]
    NotSupported(String),
    /// Another resource owns the topic name
    #[error("Managed by {0}")]
    ResourceConflict(ResourceRef),
    /// Local validation failed before any broker call
    #[error("{0}")]
    InternalError(String),
}

impl ReconcileFailure {
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            ReconcileFailure::KafkaError(_) => "KafkaError",
            ReconcileFailure::NotSupported(_) => "NotSupported",
            ReconcileFailure::ResourceConflict(_) => "ResourceConflict",
            ReconcileFailure::InternalError(_) => "InternalError",
        }
    }

    pub fn name_change() -> Self {
        ReconcileFailure::NotSupported("Changing spec.topicName is not supported".to_string())
    }

    pub fn partition_decrease() -> Self {
        ReconcileFailure::NotSupported("Decreasing partitions not supported".to_string())
    }
}

impl From<KafkaError> for ReconcileFailure {
    fn from(err: KafkaError) -> Self {
        ReconcileFailure::KafkaError(err.to_string())
    }
}

/// Result of one pass over one resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Topic converged; carries the live broker id when known
    Ready { topic_id: Option<String> },
    Failed(ReconcileFailure),
    Paused,
    Unmanaged,
    /// Unselected or spec-less; no status is written
    Ignored,
}

impl Outcome {
    /// Label used for the reconciliation outcome metric
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Ready { .. } => "ready",
            Outcome::Failed(_) => "failed",
            Outcome::Paused => "paused",
            Outcome::Unmanaged => "unmanaged",
            Outcome::Ignored => "ignored",
        }
    }
}

/// Counters reported after each batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub resources: usize,
    pub ready: usize,
    pub failed: usize,
    pub paused: usize,
    pub unmanaged: usize,
    pub ignored: usize,
    /// Broker topics deleted on behalf of deleted resources
    pub deleted: usize,
    pub status_writes: usize,
}

impl BatchSummary {
    pub fn record(&mut self, outcome: &Outcome) {
        self.resources += 1;
        match outcome {
            Outcome::Ready { .. } => self.ready += 1,
            Outcome::Failed(_) => self.failed += 1,
            Outcome::Paused => self.paused += 1,
            Outcome::Unmanaged => self.unmanaged += 1,
            Outcome::Ignored => self.ignored += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kafka::KafkaErrorCode;

    #[test]
    fn test_conflict_message_names_owner() {
        let failure = ReconcileFailure::ResourceConflict(ResourceRef::new("ns", "kt1"));
        assert_eq!(failure.reason(), "ResourceConflict");
        assert_eq!(failure.to_string(), "Managed by ns/kt1");
    }

    #[test]
    fn test_kafka_error_keeps_broker_description() {
        let failure: ReconcileFailure =
            KafkaError::new(KafkaErrorCode::TopicAuthorizationFailed, "not allowed").into();
        assert_eq!(failure.reason(), "KafkaError");
        assert_eq!(failure.to_string(), "TopicAuthorizationFailed: not allowed");
    }
}
