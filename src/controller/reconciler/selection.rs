//! # Selection
//!
//! Sorts the resources of a batch into the paths the engine takes for them.

use std::collections::BTreeMap;

use crate::crd::KafkaTopic;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Deletion requested and our finalizer is still held
    Finalizing,
    /// Deletion requested without our finalizer; nothing left to do
    Terminating,
    /// Labels do not match the selector
    Unselected,
    /// No `spec` block at all
    MissingSpec,
    Paused,
    Unmanaged,
    Active,
}

/// Classify a resource present in the store
///
/// Deletion is checked before selection so a finalizer we placed is always
/// released, even after the resource stopped matching the selector.
pub fn classify(topic: &KafkaTopic, selector: &BTreeMap<String, String>) -> Disposition {
    if topic.is_being_deleted() {
        return if topic.has_finalizer() {
            Disposition::Finalizing
        } else {
            Disposition::Terminating
        };
    }
    if !topic.matches_selector(selector) {
        return Disposition::Unselected;
    }
    if topic.spec.is_none() {
        return Disposition::MissingSpec;
    }
    if !topic.is_managed() {
        return Disposition::Unmanaged;
    }
    if topic.is_paused() {
        return Disposition::Paused;
    }
    Disposition::Active
}

/// Whether this resource's topic may be deleted from Kafka when the resource goes
pub fn deletes_topic(topic: &KafkaTopic, selector: &BTreeMap<String, String>) -> bool {
    topic.matches_selector(selector) && topic.spec.is_some() && topic.is_managed()
}
