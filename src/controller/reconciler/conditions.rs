//! # Status Conditions
//!
//! Derives the status block a resource should carry after one pass. Every
//! reconciled resource carries exactly one condition:
//!
//! - `Ready=True` once the topic matches the spec
//! - `Ready=False` with a failure reason and message
//! - `ReconciliationPaused=True` while paused
//! - `Unmanaged=True` while unmanaged

use super::types::Outcome;
use crate::crd::{Condition, ConditionType, KafkaTopic, KafkaTopicStatus};

/// Current time in the format used for `lastTransitionTime`
pub fn now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

fn condition(
    previous: Option<&Condition>,
    r#type: ConditionType,
    status: bool,
    reason: Option<String>,
    message: Option<String>,
    now: &str,
) -> Condition {
    let status = if status { "True" } else { "False" }.to_string();
    // Only a type or status flip counts as a transition
    let last_transition_time = previous
        .filter(|p| p.r#type == r#type.as_str() && p.status == status)
        .and_then(|p| p.last_transition_time.clone())
        .or_else(|| Some(now.to_string()));
    Condition {
        r#type: r#type.as_str().to_string(),
        status,
        last_transition_time,
        reason,
        message,
    }
}

/// Status to write for `outcome`, or `None` when the resource gets no status
pub fn derive_status(topic: &KafkaTopic, outcome: &Outcome, now: &str) -> Option<KafkaTopicStatus> {
    let previous = topic.status.as_ref();
    let previous_condition = previous.and_then(KafkaTopicStatus::condition);
    let previous_name = topic.status_topic_name().map(str::to_string);
    let previous_id = previous.and_then(|s| s.topic_id.clone());

    let (condition, topic_name, topic_id) = match outcome {
        Outcome::Ignored => return None,
        Outcome::Ready { topic_id } => (
            condition(previous_condition, ConditionType::Ready, true, None, None, now),
            topic.resolved_topic_name(),
            topic_id.clone(),
        ),
        Outcome::Failed(failure) => (
            condition(
                previous_condition,
                ConditionType::Ready,
                false,
                Some(failure.reason().to_string()),
                Some(failure.to_string()),
                now,
            ),
            previous_name,
            previous_id,
        ),
        Outcome::Paused => (
            condition(
                previous_condition,
                ConditionType::ReconciliationPaused,
                true,
                None,
                None,
                now,
            ),
            previous_name,
            None,
        ),
        Outcome::Unmanaged => (
            condition(previous_condition, ConditionType::Unmanaged, true, None, None, now),
            None,
            None,
        ),
    };

    Some(KafkaTopicStatus {
        conditions: vec![condition],
        observed_generation: topic.generation(),
        topic_name,
        topic_id,
    })
}

/// Whether writing `status` would change anything on the resource
pub fn status_changed(topic: &KafkaTopic, status: &KafkaTopicStatus) -> bool {
    topic.status.as_ref() != Some(status)
}
