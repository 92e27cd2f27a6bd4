//! Ordered list kept sorted by an externally supplied key, with
//! bisection-based lookups.
//!
//! Ported from `jdr_lib/container.py`'s `SortedList`: instead of a dynamic
//! Python key *function* re-applied on every resort, each entry's key is
//! supplied at insertion time (our keys are `pos_relative` values that the
//! owning container already tracks), which is what every call site in this
//! crate actually needs.

use std::cmp::Ordering;

/// A `(key, value)` pair kept in ascending key order. Ties keep insertion
/// order stable (new entries with an equal key go to the left, as
/// `SortedList.insert` does).
#[derive(Debug, Clone, Default)]
pub struct SortedList<K, V> {
    entries: Vec<(K, V)>,
}

impl<K: Ord + Copy, V> SortedList<K, V> {
    /// An empty list.
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate `(key, value)` pairs in ascending key order.
    pub fn iter(&self) -> impl Iterator<Item = &(K, V)> {
        self.entries.iter()
    }

    /// Iterate values only, in ascending key order.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.iter().map(|(_, v)| v)
    }

    fn bisect_left(&self, key: K) -> usize {
        self.entries.partition_point(|(k, _)| *k < key)
    }

    fn bisect_right(&self, key: K) -> usize {
        self.entries.partition_point(|(k, _)| *k <= key)
    }

    /// Insert `value` under `key`. Equal keys are placed before existing
    /// entries with the same key (bisect_left semantics).
    pub fn insert(&mut self, key: K, value: V) {
        let i = self.bisect_left(key);
        self.entries.insert(i, (key, value));
    }

    /// Insert `value` under `key`, after existing entries with the same
    /// key (bisect_right semantics).
    pub fn insert_right(&mut self, key: K, value: V) {
        let i = self.bisect_right(key);
        self.entries.insert(i, (key, value));
    }

    /// Remove and return the entry at ordinal position `i`.
    pub fn remove_at(&mut self, i: usize) -> (K, V) {
        self.entries.remove(i)
    }

    /// Index of the first entry with `key == k`, if any.
    pub fn index_of(&self, k: K) -> Option<usize> {
        let i = self.bisect_left(k);
        if i != self.entries.len() && self.entries[i].0 == k {
            Some(i)
        } else {
            None
        }
    }

    /// Index of the last entry with key `<= k`.
    pub fn index_le(&self, k: K) -> Option<usize> {
        let i = self.bisect_right(k);
        if i == 0 {
            None
        } else {
            Some(i - 1)
        }
    }

    /// Index of the last entry with key `< k`.
    pub fn index_lt(&self, k: K) -> Option<usize> {
        let i = self.bisect_left(k);
        if i == 0 {
            None
        } else {
            Some(i - 1)
        }
    }

    /// Index of the first entry with key `>= k`.
    pub fn index_ge(&self, k: K) -> Option<usize> {
        let i = self.bisect_left(k);
        if i != self.entries.len() {
            Some(i)
        } else {
            None
        }
    }

    /// Index of the first entry with key `> k`.
    pub fn index_gt(&self, k: K) -> Option<usize> {
        let i = self.bisect_right(k);
        if i != self.entries.len() {
            Some(i)
        } else {
            None
        }
    }

    /// Entry at ordinal position `i`.
    pub fn get(&self, i: usize) -> Option<&(K, V)> {
        self.entries.get(i)
    }

    /// Re-sort after keys were mutated in bulk outside this list (e.g. a
    /// rearrange pass changed several `pos_relative` values at once and
    /// rewrote them via `set_key_at`).
    pub fn re_sort(&mut self) {
        self.entries.sort_by(|a, b| a.0.cmp(&b.0).then(Ordering::Equal));
    }

    /// Overwrite the key of the entry at ordinal position `i`. Caller must
    /// call `re_sort` once done mutating in bulk.
    pub fn set_key_at(&mut self, i: usize, key: K) {
        self.entries[i].0 = key;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_keeps_ascending_order() {
        let mut l: SortedList<i64, &str> = SortedList::new();
        l.insert(10, "b");
        l.insert(0, "a");
        l.insert(20, "c");
        let keys: Vec<i64> = l.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![0, 10, 20]);
    }

    #[test]
    fn le_lt_ge_gt() {
        let mut l: SortedList<i64, i64> = SortedList::new();
        for k in [0, 5, 10, 15] {
            l.insert(k, k);
        }
        assert_eq!(l.get(l.index_le(7).unwrap()).unwrap().0, 5);
        assert_eq!(l.get(l.index_lt(5).unwrap()).unwrap().0, 0);
        assert_eq!(l.get(l.index_ge(6).unwrap()).unwrap().0, 10);
        assert_eq!(l.get(l.index_gt(10).unwrap()).unwrap().0, 15);
        assert!(l.index_lt(0).is_none());
        assert!(l.index_gt(15).is_none());
    }

    #[test]
    fn ties_go_left_on_insert() {
        let mut l: SortedList<i64, &str> = SortedList::new();
        l.insert(5, "first");
        l.insert(5, "second");
        assert_eq!(l.get(0).unwrap().1, "second");
        assert_eq!(l.get(1).unwrap().1, "first");
    }
}
