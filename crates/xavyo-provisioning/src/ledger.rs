//! Propagation ledger.
//!
//! [`PropagationByResource`] records, for one business operation, which
//! resources (or linked accounts on resources) need a create, an update or
//! a delete. Policy code fills it; [`PropagationByResource::purge`] resolves
//! conflicting entries before the executor consumes it.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use xavyo_connector::types::ResourceOperation;

/// Pending create/update/delete operations keyed by `K`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "K: Serialize",
    deserialize = "K: Deserialize<'de> + Ord"
))]
pub struct PropagationByResource<K: Ord> {
    to_be_created: BTreeSet<K>,
    to_be_updated: BTreeSet<K>,
    to_be_deleted: BTreeSet<K>,
    /// Previous connObjectKey per resource, for rename detection.
    old_conn_object_keys: BTreeMap<String, String>,
}

impl<K: Ord> Default for PropagationByResource<K> {
    fn default() -> Self {
        Self {
            to_be_created: BTreeSet::new(),
            to_be_updated: BTreeSet::new(),
            to_be_deleted: BTreeSet::new(),
            old_conn_object_keys: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Clone> PropagationByResource<K> {
    pub fn new() -> Self {
        Self::default()
    }

    fn set_mut(&mut self, operation: ResourceOperation) -> &mut BTreeSet<K> {
        match operation {
            ResourceOperation::Create => &mut self.to_be_created,
            ResourceOperation::Update => &mut self.to_be_updated,
            ResourceOperation::Delete => &mut self.to_be_deleted,
        }
    }

    /// Keys pending `operation`.
    pub fn get(&self, operation: ResourceOperation) -> &BTreeSet<K> {
        match operation {
            ResourceOperation::Create => &self.to_be_created,
            ResourceOperation::Update => &self.to_be_updated,
            ResourceOperation::Delete => &self.to_be_deleted,
        }
    }

    /// Add a key for `operation`. Returns whether it was newly added.
    pub fn add(&mut self, operation: ResourceOperation, key: K) -> bool {
        self.set_mut(operation).insert(key)
    }

    /// Add keys for `operation`. Returns whether any was newly added.
    pub fn add_all(
        &mut self,
        operation: ResourceOperation,
        keys: impl IntoIterator<Item = K>,
    ) -> bool {
        let set = self.set_mut(operation);
        keys.into_iter().fold(false, |added, key| set.insert(key) || added)
    }

    /// Remove a key from `operation`. Returns whether it was present.
    pub fn remove(&mut self, operation: ResourceOperation, key: &K) -> bool {
        self.set_mut(operation).remove(key)
    }

    /// Remove keys from `operation`. Returns whether any was present.
    pub fn remove_all<'a>(
        &mut self,
        operation: ResourceOperation,
        keys: impl IntoIterator<Item = &'a K>,
    ) -> bool
    where
        K: 'a,
    {
        let set = self.set_mut(operation);
        keys.into_iter().fold(false, |removed, key| set.remove(key) || removed)
    }

    /// Replace the keys pending `operation`.
    pub fn set(&mut self, operation: ResourceOperation, keys: impl IntoIterator<Item = K>) {
        *self.set_mut(operation) = keys.into_iter().collect();
    }

    /// Whether `key` is pending `operation`.
    pub fn contains(&self, operation: ResourceOperation, key: &K) -> bool {
        self.get(operation).contains(key)
    }

    /// Drop conflicting entries: delete wins over update and create, update
    /// wins over create.
    pub fn purge(&mut self) {
        let Self {
            to_be_created,
            to_be_updated,
            to_be_deleted,
            ..
        } = self;
        to_be_created.retain(|key| !to_be_deleted.contains(key) && !to_be_updated.contains(key));
        to_be_updated.retain(|key| !to_be_deleted.contains(key));
    }

    /// Union another ledger into this one.
    ///
    /// When both ledgers recorded an old connObjectKey for the same
    /// resource, this ledger's key is kept: it was recorded first, before
    /// the nested operation renamed anything.
    pub fn merge(&mut self, other: PropagationByResource<K>) {
        self.to_be_created.extend(other.to_be_created);
        self.to_be_updated.extend(other.to_be_updated);
        self.to_be_deleted.extend(other.to_be_deleted);
        for (resource, old_key) in other.old_conn_object_keys {
            self.old_conn_object_keys.entry(resource).or_insert(old_key);
        }
    }

    /// Empty all sets and the old-key map.
    pub fn clear(&mut self) {
        self.to_be_created.clear();
        self.to_be_updated.clear();
        self.to_be_deleted.clear();
        self.old_conn_object_keys.clear();
    }

    /// True only when all sets and the old-key map are empty.
    pub fn is_empty(&self) -> bool {
        self.to_be_created.is_empty()
            && self.to_be_updated.is_empty()
            && self.to_be_deleted.is_empty()
            && self.old_conn_object_keys.is_empty()
    }

    /// Record the connObjectKey a resource held before this operation.
    pub fn add_old_conn_object_key(
        &mut self,
        resource: impl Into<String>,
        old_key: impl Into<String>,
    ) {
        self.old_conn_object_keys.insert(resource.into(), old_key.into());
    }

    pub fn old_conn_object_key(&self, resource: &str) -> Option<&str> {
        self.old_conn_object_keys.get(resource).map(String::as_str)
    }

    pub fn old_conn_object_keys(&self) -> &BTreeMap<String, String> {
        &self.old_conn_object_keys
    }

    /// The single operation pending for `key`, if any.
    ///
    /// A key present in more than one set resolves as DELETE, then UPDATE,
    /// then CREATE, matching [`purge`](Self::purge).
    pub fn operation(&self, key: &K) -> Option<ResourceOperation> {
        [
            ResourceOperation::Delete,
            ResourceOperation::Update,
            ResourceOperation::Create,
        ]
        .into_iter()
        .find(|op| self.contains(*op, key))
    }

    /// One operation per key, with the same precedence as
    /// [`operation`](Self::operation).
    pub fn as_map(&self) -> BTreeMap<K, ResourceOperation> {
        let mut map = BTreeMap::new();
        for (operation, keys) in [
            (ResourceOperation::Create, &self.to_be_created),
            (ResourceOperation::Update, &self.to_be_updated),
            (ResourceOperation::Delete, &self.to_be_deleted),
        ] {
            for key in keys {
                map.insert(key.clone(), operation);
            }
        }
        map
    }
}

/// Identifies one linked account: a resource and the account's key on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkedAccountKey {
    pub resource: String,
    pub conn_object_key_value: String,
}

impl LinkedAccountKey {
    pub fn new(resource: impl Into<String>, conn_object_key_value: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            conn_object_key_value: conn_object_key_value.into(),
        }
    }
}

impl fmt::Display for LinkedAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource, self.conn_object_key_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use ResourceOperation::{Create, Delete, Update};

    #[test]
    fn test_create_then_delete_purges_create() {
        let mut ledger = PropagationByResource::new();
        ledger.add(Create, "resA".to_string());
        ledger.add(Delete, "resA".to_string());

        ledger.purge();

        assert!(!ledger.contains(Create, &"resA".to_string()));
        assert!(ledger.contains(Delete, &"resA".to_string()));
    }

    #[test]
    fn test_update_wins_over_create() {
        let mut ledger = PropagationByResource::new();
        ledger.add_all(Create, ["a", "b"]);
        ledger.add(Update, "b");

        ledger.purge();

        assert_eq!(ledger.get(Create).iter().copied().collect::<Vec<_>>(), vec!["a"]);
        assert_eq!(ledger.get(Update).iter().copied().collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn test_as_map_precedence_without_purge() {
        let mut ledger = PropagationByResource::new();
        ledger.add_all(Create, ["a", "b", "c"]);
        ledger.add_all(Update, ["b", "c"]);
        ledger.add(Delete, "c");

        let map = ledger.as_map();

        assert_eq!(map[&"a"], Create);
        assert_eq!(map[&"b"], Update);
        assert_eq!(map[&"c"], Delete);
        assert_eq!(ledger.operation(&"c"), Some(Delete));
        assert_eq!(ledger.operation(&"z"), None);
    }

    #[test]
    fn test_is_empty_considers_old_keys() {
        let mut ledger: PropagationByResource<String> = PropagationByResource::new();
        assert!(ledger.is_empty());

        ledger.add_old_conn_object_key("resource-ldap", "uid=old");
        assert!(!ledger.is_empty());
        assert_eq!(ledger.old_conn_object_key("resource-ldap"), Some("uid=old"));

        ledger.clear();
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_add_remove_set() {
        let mut ledger = PropagationByResource::new();
        assert!(ledger.add(Update, 1));
        assert!(!ledger.add(Update, 1));
        assert!(ledger.add_all(Update, [2, 3]));
        assert!(ledger.remove(Update, &1));
        assert!(!ledger.remove(Update, &1));
        assert!(ledger.remove_all(Update, &[2, 9]));

        ledger.set(Delete, [7, 8]);
        assert_eq!(ledger.get(Delete).len(), 2);
        assert_eq!(ledger.get(Update).len(), 1);
    }

    #[test]
    fn test_merge_includes_old_keys() {
        let mut outer = PropagationByResource::new();
        outer.add(Update, LinkedAccountKey::new("ldap", "jdoe"));

        let mut nested = PropagationByResource::new();
        nested.add(Create, LinkedAccountKey::new("ldap", "jdoe-admin"));
        nested.add_old_conn_object_key("ldap", "jdoe-old");

        outer.merge(nested);

        assert_eq!(outer.get(Create).len(), 1);
        assert_eq!(outer.get(Update).len(), 1);
        assert_eq!(outer.old_conn_object_key("ldap"), Some("jdoe-old"));
        assert_eq!(
            LinkedAccountKey::new("ldap", "jdoe-admin").to_string(),
            "ldap:jdoe-admin"
        );
    }

    #[test]
    fn test_merge_keeps_first_recorded_old_key() {
        let mut outer: PropagationByResource<String> = PropagationByResource::new();
        outer.add_old_conn_object_key("ldap", "jdoe-original");
        outer.add_old_conn_object_key("ad", "jdoe-ad");

        let mut nested = PropagationByResource::new();
        nested.add_old_conn_object_key("ldap", "jdoe-renamed");
        nested.add_old_conn_object_key("db", "jdoe-db");

        outer.merge(nested);

        assert_eq!(outer.old_conn_object_key("ldap"), Some("jdoe-original"));
        assert_eq!(outer.old_conn_object_key("ad"), Some("jdoe-ad"));
        assert_eq!(outer.old_conn_object_key("db"), Some("jdoe-db"));
        assert_eq!(outer.old_conn_object_keys().len(), 3);
    }

    #[test]
    fn test_serde_shape() {
        let mut ledger = PropagationByResource::new();
        ledger.add(Create, "resA".to_string());
        let json = serde_json::to_value(&ledger).unwrap();
        assert_eq!(json["to_be_created"], serde_json::json!(["resA"]));
        let back: PropagationByResource<String> = serde_json::from_value(json).unwrap();
        assert_eq!(back, ledger);
    }

    fn keys() -> impl Strategy<Value = Vec<u8>> {
        prop::collection::vec(0u8..16, 0..12)
    }

    fn ledger_of(c: &[u8], u: &[u8], d: &[u8]) -> PropagationByResource<u8> {
        let mut ledger = PropagationByResource::new();
        ledger.add_all(Create, c.iter().copied());
        ledger.add_all(Update, u.iter().copied());
        ledger.add_all(Delete, d.iter().copied());
        ledger
    }

    proptest! {
        #[test]
        fn prop_purge_leaves_disjoint_sets(c in keys(), u in keys(), d in keys()) {
            let mut ledger = ledger_of(&c, &u, &d);
            ledger.purge();

            let created = ledger.get(Create);
            let updated = ledger.get(Update);
            let deleted = ledger.get(Delete);
            prop_assert!(created.is_disjoint(deleted));
            prop_assert!(created.is_disjoint(updated));
            prop_assert!(updated.is_disjoint(deleted));

            // delete is never dropped
            prop_assert_eq!(deleted.len(), d.iter().collect::<BTreeSet<_>>().len());
        }

        #[test]
        fn prop_purge_agrees_with_as_map(c in keys(), u in keys(), d in keys()) {
            let ledger = ledger_of(&c, &u, &d);
            let before = ledger.as_map();

            let mut purged = ledger.clone();
            purged.purge();

            prop_assert_eq!(before, purged.as_map());
        }

        #[test]
        fn prop_merge_is_commutative(
            c1 in keys(), u1 in keys(), d1 in keys(),
            c2 in keys(), u2 in keys(), d2 in keys(),
        ) {
            let a = ledger_of(&c1, &u1, &d1);
            let b = ledger_of(&c2, &u2, &d2);

            let mut ab = a.clone();
            ab.merge(b.clone());
            let mut ba = b;
            ba.merge(a);

            prop_assert_eq!(&ab, &ba);

            ab.purge();
            ba.purge();
            prop_assert_eq!(ab, ba);
        }
    }
}
