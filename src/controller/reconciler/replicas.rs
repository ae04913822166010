//! # Replication Factor Comparison
//!
//! A partition's replica list grows temporarily while it is being moved: the
//! broker reports the union of the old and new assignment until the move
//! completes. Comparing the raw list length against `spec.replicas` would
//! therefore flag every reassignment as a replication factor change.
//!
//! The comparison runs in two steps so the engine can batch the broker call:
//!
//! 1. [`candidates`] picks partitions whose raw replica count differs
//! 2. [`mismatched_partitions`] re-checks those with the in-flight
//!    reassignments applied: `(replicas - removing) + adding`

use std::collections::{BTreeMap, BTreeSet};

use super::types::ReconcileFailure;
use crate::kafka::{PartitionReassignment, TopicDescription, TopicPartition};

/// Partitions whose current replica count differs from `replication_factor`
pub fn candidates(topic: &TopicDescription, replication_factor: i32) -> Vec<TopicPartition> {
    topic
        .partitions
        .iter()
        .filter(|p| replica_count(&p.replicas) != replication_factor)
        .map(|p| TopicPartition::new(topic.name.clone(), p.partition))
        .collect()
}

/// Size of the replica set a partition will settle on
pub fn effective_replicas(replicas: &[i32], reassignment: Option<&PartitionReassignment>) -> usize {
    match reassignment {
        None => replicas.len(),
        Some(r) => replicas
            .iter()
            .filter(|b| !r.removing_replicas.contains(b))
            .chain(r.adding_replicas.iter())
            .collect::<BTreeSet<_>>()
            .len(),
    }
}

/// Partition ids that really differ once reassignments are taken into account
pub fn mismatched_partitions(
    topic: &TopicDescription,
    replication_factor: i32,
    reassignments: &BTreeMap<TopicPartition, PartitionReassignment>,
) -> Vec<i32> {
    topic
        .partitions
        .iter()
        .filter(|p| {
            let key = TopicPartition::new(topic.name.clone(), p.partition);
            let effective = effective_replicas(&p.replicas, reassignments.get(&key));
            i32::try_from(effective).unwrap_or(i32::MAX) != replication_factor
        })
        .map(|p| p.partition)
        .collect()
}

pub fn replication_factor_change(partitions: &[i32]) -> ReconcileFailure {
    ReconcileFailure::NotSupported(format!(
        "Replication factor change not supported, but required for partitions {partitions:?}"
    ))
}

fn replica_count(replicas: &[i32]) -> i32 {
    i32::try_from(replicas.len()).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kafka::PartitionInfo;

    fn topic(assignments: &[&[i32]]) -> TopicDescription {
        TopicDescription {
            name: "t".to_string(),
            topic_id: None,
            partitions: assignments
                .iter()
                .enumerate()
                .map(|(p, replicas)| PartitionInfo {
                    partition: i32::try_from(p).unwrap(),
                    replicas: replicas.to_vec(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_no_candidates_when_factor_matches() {
        assert!(candidates(&topic(&[&[0], &[1]]), 1).is_empty());
    }

    #[test]
    fn test_every_partition_is_reported() {
        let t = topic(&[&[0], &[1]]);
        assert_eq!(
            candidates(&t, 2),
            vec![TopicPartition::new("t", 0), TopicPartition::new("t", 1)]
        );
        let mismatched = mismatched_partitions(&t, 2, &BTreeMap::new());
        assert_eq!(mismatched, vec![0, 1]);
        assert_eq!(
            replication_factor_change(&mismatched).to_string(),
            "Replication factor change not supported, but required for partitions [0, 1]"
        );
    }

    #[test]
    fn test_moving_partition_is_not_a_factor_change() {
        // 0 -> 1 in flight: broker reports [0, 1]
        let t = topic(&[&[0, 1]]);
        let reassignments = BTreeMap::from([(
            TopicPartition::new("t", 0),
            PartitionReassignment {
                replicas: vec![0, 1],
                adding_replicas: vec![1],
                removing_replicas: vec![0],
            },
        )]);
        assert_eq!(candidates(&t, 1).len(), 1);
        assert!(mismatched_partitions(&t, 1, &reassignments).is_empty());
    }

    #[test]
    fn test_reassignment_that_grows_the_set_is_a_change() {
        let t = topic(&[&[0, 1]]);
        let reassignments = BTreeMap::from([(
            TopicPartition::new("t", 0),
            PartitionReassignment {
                replicas: vec![0, 1],
                adding_replicas: vec![1],
                removing_replicas: vec![],
            },
        )]);
        assert_eq!(mismatched_partitions(&t, 1, &reassignments), vec![0]);
    }

    #[test]
    fn test_effective_replicas_deduplicates() {
        let r = PartitionReassignment {
            replicas: vec![0, 1],
            adding_replicas: vec![1],
            removing_replicas: vec![],
        };
        assert_eq!(effective_replicas(&[0, 1], Some(&r)), 2);
        assert_eq!(effective_replicas(&[0, 1, 2], None), 3);
    }
}
