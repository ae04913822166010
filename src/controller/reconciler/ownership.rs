//! # Topic Ownership
//!
//! Which resource owns which Kafka topic name. A name may be claimed by
//! several resources; the earliest claimant is the owner and the others are
//! reported as conflicting until the owner releases the name.
//!
//! Names are compared exactly as Kafka does, so `Orders` and `orders` are
//! different topics.

use std::collections::{BTreeMap, HashMap};

use crate::crd::ResourceRef;

#[derive(Debug, Default)]
pub struct OwnershipTable {
    claimants: HashMap<String, Vec<ResourceRef>>,
    /// Reverse index, a resource claims at most one name
    claims: BTreeMap<ResourceRef, String>,
}

impl OwnershipTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `name` for `id` and return the current owner
    ///
    /// A resource that already claims a different name gives that one up first.
    pub fn claim(&mut self, name: &str, id: &ResourceRef) -> ResourceRef {
        if self.claims.get(id).is_some_and(|claimed| claimed != name) {
            self.release(id);
        }
        let claimants = self.claimants.entry(name.to_string()).or_default();
        if !claimants.contains(id) {
            claimants.push(id.clone());
            self.claims.insert(id.clone(), name.to_string());
        }
        claimants[0].clone()
    }

    /// Drop every claim held by `id`
    ///
    /// Returns the released name when `id` was its owner, so the next
    /// claimant can be promoted.
    pub fn release(&mut self, id: &ResourceRef) -> Option<String> {
        let name = self.claims.remove(id)?;
        let claimants = self.claimants.get_mut(&name)?;
        let was_owner = claimants.first() == Some(id);
        claimants.retain(|c| c != id);
        if claimants.is_empty() {
            self.claimants.remove(&name);
            return None;
        }
        was_owner.then_some(name)
    }

    /// Claimants of `name`, owner first
    pub fn claimants_of(&self, name: &str) -> &[ResourceRef] {
        self.claimants.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn owner_of(&self, name: &str) -> Option<&ResourceRef> {
        self.claimants_of(name).first()
    }

    pub fn claimed_name(&self, id: &ResourceRef) -> Option<&str> {
        self.claims.get(id).map(String::as_str)
    }

    /// Every resource holding a claim
    pub fn resources(&self) -> Vec<ResourceRef> {
        self.claims.keys().cloned().collect()
    }

    /// Number of names with an owner
    pub fn len(&self) -> usize {
        self.claimants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claimants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(name: &str) -> ResourceRef {
        ResourceRef::new("ns", name)
    }

    #[test]
    fn test_first_claimant_owns() {
        let mut table = OwnershipTable::new();
        assert_eq!(table.claim("orders", &r("a")), r("a"));
        assert_eq!(table.claim("orders", &r("b")), r("a"));
        // re-claiming keeps the original order
        assert_eq!(table.claim("orders", &r("a")), r("a"));
        assert_eq!(table.claimants_of("orders"), &[r("a"), r("b")]);
    }

    #[test]
    fn test_release_promotes_next_claimant() {
        let mut table = OwnershipTable::new();
        table.claim("orders", &r("a"));
        table.claim("orders", &r("b"));

        assert_eq!(table.release(&r("a")), Some("orders".to_string()));
        assert_eq!(table.owner_of("orders"), Some(&r("b")));
    }

    #[test]
    fn test_release_by_non_owner_does_not_report_name() {
        let mut table = OwnershipTable::new();
        table.claim("orders", &r("a"));
        table.claim("orders", &r("b"));

        assert_eq!(table.release(&r("b")), None);
        assert_eq!(table.claimants_of("orders"), &[r("a")]);
        assert_eq!(table.release(&r("unknown")), None);
    }

    #[test]
    fn test_last_release_removes_entry() {
        let mut table = OwnershipTable::new();
        table.claim("orders", &r("a"));
        assert_eq!(table.release(&r("a")), None);
        assert!(table.is_empty());
        assert!(table.claimants_of("orders").is_empty());
    }

    #[test]
    fn test_claiming_new_name_releases_old() {
        let mut table = OwnershipTable::new();
        table.claim("orders", &r("a"));
        table.claim("orders", &r("b"));
        assert_eq!(table.claim("payments", &r("a")), r("a"));

        assert_eq!(table.owner_of("orders"), Some(&r("b")));
        assert_eq!(table.claimed_name(&r("a")), Some("payments"));
    }

    #[test]
    fn test_names_are_case_sensitive() {
        let mut table = OwnershipTable::new();
        assert_eq!(table.claim("orders", &r("a")), r("a"));
        assert_eq!(table.claim("Orders", &r("b")), r("b"));
        assert_eq!(table.len(), 2);
    }
}
