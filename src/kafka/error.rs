//! # Kafka Errors
//!
//! Broker error classification shared by every `KafkaAdmin` implementation.

use std::fmt;

/// Broker error codes the engine distinguishes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KafkaErrorCode {
    UnknownTopicOrPartition,
    TopicAlreadyExists,
    TopicDeletionDisabled,
    InvalidTopic,
    InvalidPartitions,
    InvalidReplicationFactor,
    InvalidConfig,
    PolicyViolation,
    TopicAuthorizationFailed,
    ClusterAuthorizationFailed,
    UnsupportedVersion,
    Timeout,
    /// Client side failure before or after the request reached the broker
    Client,
    Other(String),
}

impl fmt::Display for KafkaErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KafkaErrorCode::UnknownTopicOrPartition => "UnknownTopicOrPartition",
            KafkaErrorCode::TopicAlreadyExists => "TopicAlreadyExists",
            KafkaErrorCode::TopicDeletionDisabled => "TopicDeletionDisabled",
            KafkaErrorCode::InvalidTopic => "InvalidTopic",
            KafkaErrorCode::InvalidPartitions => "InvalidPartitions",
            KafkaErrorCode::InvalidReplicationFactor => "InvalidReplicationFactor",
            KafkaErrorCode::InvalidConfig => "InvalidConfig",
            KafkaErrorCode::PolicyViolation => "PolicyViolation",
            KafkaErrorCode::TopicAuthorizationFailed => "TopicAuthorizationFailed",
            KafkaErrorCode::ClusterAuthorizationFailed => "ClusterAuthorizationFailed",
            KafkaErrorCode::UnsupportedVersion => "UnsupportedVersion",
            KafkaErrorCode::Timeout => "Timeout",
            KafkaErrorCode::Client => "ClientError",
            KafkaErrorCode::Other(name) => name,
        };
        f.write_str(name)
    }
}

/// A failed broker admin call for one topic (or the whole request)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct KafkaError {
    pub code: KafkaErrorCode,
    pub message: String,
}

impl KafkaError {
    pub fn new(code: KafkaErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn unknown_topic(name: &str) -> Self {
        Self::new(
            KafkaErrorCode::UnknownTopicOrPartition,
            format!("This server does not host this topic-partition: {name}"),
        )
    }

    pub fn is_unknown_topic(&self) -> bool {
        self.code == KafkaErrorCode::UnknownTopicOrPartition
    }

    pub fn is_topic_exists(&self) -> bool {
        self.code == KafkaErrorCode::TopicAlreadyExists
    }

    pub fn is_deletion_disabled(&self) -> bool {
        self.code == KafkaErrorCode::TopicDeletionDisabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_code_and_message() {
        let err = KafkaError::new(
            KafkaErrorCode::TopicDeletionDisabled,
            "Topic deletion is disabled.",
        );
        assert_eq!(
            err.to_string(),
            "TopicDeletionDisabled: Topic deletion is disabled."
        );
        assert!(err.is_deletion_disabled());
    }

    #[test]
    fn test_other_code_renders_its_name() {
        let err = KafkaError::new(KafkaErrorCode::Other("NotController".into()), "moved");
        assert_eq!(err.to_string(), "NotController: moved");
    }
}
