//! Per-node key/value storage and the range-transfer logic used at join
//! and stabilize time to hand keys off to a new owner.

use std::collections::HashMap;

use crate::identifier::{on_arc, Key};

#[derive(Clone, Debug, Default)]
pub struct FileStore {
    entries: HashMap<Key, String>,
}

impl FileStore {
    pub fn new() -> Self {
        FileStore { entries: HashMap::new() }
    }

    pub fn put(&mut self, key: Key, value: String) {
        self.entries.insert(key, value);
    }

    pub fn get(&self, key: Key) -> Option<&String> {
        self.entries.get(&key)
    }

    pub fn delete(&mut self, key: Key) -> Option<String> {
        self.entries.remove(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.entries.keys()
    }

    /// Drains the whole store, returning every entry and leaving this
    /// store empty. Used when a node leaves and hands everything to its
    /// successor.
    pub fn drain_all(&mut self) -> HashMap<Key, String> {
        std::mem::take(&mut self.entries)
    }

    /// Removes and returns every `(k, v)` that now belongs to a newcomer
    /// `new_id` inserting itself as the predecessor currently sitting at
    /// `predecessor_id`, given this node's own id `self_id`. A key belongs
    /// to the newcomer in exactly three cases (see the module-level docs
    /// on the geometry of each):
    ///
    /// (a) `new_id >= k` and `new_id` itself is on the arc this node
    ///     currently owns, `(predecessor_id, self_id]`: the ordinary case
    ///     of a predecessor inserting itself ahead of keys it now owns.
    /// (b) this node is the ring's current maximum and `k > self_id >
    ///     new_id`: the newcomer becomes the new first node and inherits
    ///     everything below the old minimum.
    /// (c) `k <= new_id` and `new_id > self_id`: the symmetric wrap case
    ///     where the newcomer becomes the new last node.
    pub fn extract_for_new_owner(
        &mut self,
        new_id: Key,
        predecessor_id: Key,
        self_id: Key,
    ) -> HashMap<Key, String> {
        let mut transferred = HashMap::new();
        let keys_to_move: Vec<Key> = self
            .entries
            .keys()
            .copied()
            .filter(|&k| {
                (new_id >= k && on_arc(predecessor_id, new_id, self_id))
                    || (k > self_id && self_id > new_id)
                    || (k <= new_id && new_id > self_id)
            })
            .collect();
        for k in keys_to_move {
            if let Some(v) = self.entries.remove(&k) {
                transferred.insert(k, v);
            }
        }
        transferred
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_delete_round_trip() {
        let mut store = FileStore::new();
        let k = Key::from(42u64);
        store.put(k, "value".to_string());
        assert_eq!(store.get(k), Some(&"value".to_string()));
        assert_eq!(store.delete(k), Some("value".to_string()));
        assert_eq!(store.get(k), None);
    }

    #[test]
    fn get_on_missing_key_is_none_not_fatal() {
        let store = FileStore::new();
        assert_eq!(store.get(Key::from(1u64)), None);
    }

    #[test]
    fn drain_all_empties_the_store() {
        let mut store = FileStore::new();
        store.put(Key::from(1u64), "a".to_string());
        store.put(Key::from(2u64), "b".to_string());
        let drained = store.drain_all();
        assert_eq!(drained.len(), 2);
        assert!(store.is_empty());
    }

    #[test]
    fn extract_case_a_normal_predecessor_insertion() {
        // self_id = 100, predecessor = 0, existing keys 10 and 90. newcomer
        // id = 50 lands inside (0, 100], so keys <= 50 move to it.
        let mut store = FileStore::new();
        store.put(Key::from(10u64), "low".to_string());
        store.put(Key::from(90u64), "high".to_string());
        let transferred =
            store.extract_for_new_owner(Key::from(50u64), Key::from(0u64), Key::from(100u64));
        assert_eq!(transferred.len(), 1);
        assert_eq!(transferred.get(&Key::from(10u64)), Some(&"low".to_string()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn extract_case_a_requires_newcomer_on_owned_arc() {
        // self_id = 10, real predecessor = 200 (wraps, so this node owns
        // (200, 10]). A "newcomer" id of 190 satisfies new_id >= k for key
        // 5 but is not actually on the owned arc, so clause (a) alone must
        // not fire for it.
        let mut store = FileStore::new();
        store.put(Key::from(5u64), "owned".to_string());
        let transferred =
            store.extract_for_new_owner(Key::from(190u64), Key::from(200u64), Key::from(10u64));
        assert!(
            !on_arc(Key::from(200u64), Key::from(190u64), Key::from(10u64)),
            "precondition: 190 must not be on the (200, 10] arc"
        );
        // Still transfers via clause (c) (190 > self_id, the symmetric
        // wrap case), just not via clause (a).
        assert_eq!(transferred.len(), 1);
    }

    #[test]
    fn extract_case_b_wrap_newcomer_becomes_new_minimum() {
        // self_id = 20 is the ring's current max-holder; key 250 is held
        // because it wrapped to self. newcomer id = 5 is even smaller, so
        // key 250 (k > self_id > new_id) transfers to it.
        let mut store = FileStore::new();
        store.put(Key::from(250u64), "wrapped".to_string());
        let transferred =
            store.extract_for_new_owner(Key::from(5u64), Key::from(20u64), Key::from(20u64));
        assert_eq!(transferred.len(), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn extract_case_c_wrap_newcomer_becomes_new_maximum() {
        // self_id = 5; key 3 (k <= new_id as new_id=250 > self_id=5).
        let mut store = FileStore::new();
        store.put(Key::from(3u64), "low".to_string());
        let transferred =
            store.extract_for_new_owner(Key::from(250u64), Key::from(5u64), Key::from(5u64));
        assert_eq!(transferred.len(), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn extract_leaves_keys_the_new_owner_does_not_own() {
        let mut store = FileStore::new();
        store.put(Key::from(99u64), "stays".to_string());
        let transferred =
            store.extract_for_new_owner(Key::from(50u64), Key::from(0u64), Key::from(100u64));
        assert!(transferred.is_empty());
        assert_eq!(store.len(), 1);
    }
}
