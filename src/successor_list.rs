//! Bounded ordered list of the next `R` successors on the ring, used for
//! fault tolerance during stabilization.

use crate::error::ChordError;
use crate::identifier::{on_arc, Key};
use crate::node_info::NodeInfo;

#[derive(Clone, Debug)]
pub struct SuccessorList {
    max_len: usize,
    entries: Vec<NodeInfo>,
}

impl SuccessorList {
    pub fn new(max_len: usize) -> Self {
        SuccessorList { max_len, entries: Vec::with_capacity(max_len) }
    }

    pub fn first(&self) -> Option<&NodeInfo> {
        self.entries.first()
    }

    pub fn last(&self) -> Option<&NodeInfo> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.max_len
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn get(&self, i: usize) -> Option<&NodeInfo> {
        self.entries.get(i)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeInfo> {
        self.entries.iter()
    }

    /// Inserts `node` at position `i`, growing the list if `i` is at or
    /// past its current end, or replacing the entry already at `i`
    /// otherwise. Fails with `SuccessorListFull` if `i` would grow the
    /// list past `max_len`.
    pub fn insert_at(&mut self, i: usize, node: NodeInfo) -> Result<(), ChordError> {
        if i < self.entries.len() {
            self.entries[i] = node;
            Ok(())
        } else if i == self.entries.len() && self.entries.len() < self.max_len {
            self.entries.push(node);
            Ok(())
        } else {
            Err(ChordError::SuccessorListFull { max: self.max_len })
        }
    }

    /// Replaces the first occurrence of `old` (by id) with `new`.
    pub fn replace(&mut self, old: &NodeInfo, new: NodeInfo) {
        if let Some(slot) = self.entries.iter_mut().find(|n| n.id == old.id) {
            *slot = new;
        }
    }

    /// Fills the list with `max_len` copies of `node` (used at init/alone).
    pub fn replace_all(&mut self, node: &NodeInfo) {
        self.entries = std::iter::repeat(node.clone()).take(self.max_len).collect();
    }

    /// Removes and returns the entry at `i`, if any.
    pub fn pop(&mut self, i: usize) -> Option<NodeInfo> {
        if i < self.entries.len() {
            Some(self.entries.remove(i))
        } else {
            None
        }
    }

    /// Truncates the list to its first `i` zero-indexed entries, keeping
    /// `0..i`. Used by repair when everything past a dead index is
    /// rebuilt from scratch.
    pub fn truncate(&mut self, i: usize) {
        self.entries.truncate(i);
    }

    pub fn push(&mut self, node: NodeInfo) -> Result<(), ChordError> {
        if self.is_full() {
            return Err(ChordError::SuccessorListFull { max: self.max_len });
        }
        self.entries.push(node);
        Ok(())
    }

    /// Returns the first entry (in successor order, which the list already
    /// maintains) whose arc from `self_id` covers `k`, i.e. the closest
    /// successor at or after `k` going clockwise from this node.
    pub fn closest_successor(&self, self_id: Key, k: Key) -> Result<&NodeInfo, ChordError> {
        self.entries
            .iter()
            .find(|n| on_arc(self_id, k, n.id))
            .ok_or(ChordError::NoSuccessorFound { key: k.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(port: u16) -> NodeInfo {
        NodeInfo::new("127.0.0.1", port)
    }

    #[test]
    fn new_list_is_empty() {
        let list = SuccessorList::new(3);
        assert!(list.is_empty());
        assert!(!list.is_full());
    }

    #[test]
    fn push_up_to_max_len_then_fails() {
        let mut list = SuccessorList::new(2);
        list.push(node(1)).unwrap();
        list.push(node(2)).unwrap();
        assert!(list.is_full());
        assert!(matches!(
            list.push(node(3)),
            Err(ChordError::SuccessorListFull { .. })
        ));
    }

    #[test]
    fn replace_all_fills_with_copies() {
        let mut list = SuccessorList::new(3);
        let n = node(1);
        list.replace_all(&n);
        assert_eq!(list.len(), 3);
        assert!(list.iter().all(|e| e.id == n.id));
    }

    #[test]
    fn insert_at_existing_index_replaces() {
        let mut list = SuccessorList::new(3);
        list.push(node(1)).unwrap();
        let replacement = node(2);
        let expected = replacement.id;
        list.insert_at(0, replacement).unwrap();
        assert_eq!(list.first().unwrap().id, expected);
    }

    #[test]
    fn pop_removes_and_shifts() {
        let mut list = SuccessorList::new(3);
        list.push(node(1)).unwrap();
        list.push(node(2)).unwrap();
        let popped = list.pop(0).unwrap();
        assert_eq!(popped.id, node(1).id);
        assert_eq!(list.len(), 1);
    }
}
