//! In-memory keyed state.
//!
//! The upload session table and the token acceptance cache are both plain
//! concurrent maps. They sit behind [`StateStore`] so the gateway can be handed
//! a different backing store without touching the coordinator or the gate.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::hash::Hash;

/// Concurrent key/value store with per-key atomic operations.
pub trait StateStore<K, V>: Send + Sync {
    fn get(&self, key: &K) -> Option<V>;

    /// Insert or overwrite.
    fn put(&self, key: K, value: V);

    /// Insert only when `key` is vacant. Returns `true` if the value was stored.
    fn insert_if_absent(&self, key: K, value: V) -> bool;

    fn remove(&self, key: &K) -> Option<V>;

    /// Atomically replace the value at `key` if it currently equals `expected`.
    ///
    /// `expected = None` means the key must be absent; `new = None` removes
    /// the entry. Returns `true` when the swap happened.
    fn compare_and_swap(&self, key: &K, expected: Option<&V>, new: Option<V>) -> bool
    where
        V: PartialEq;

    /// Point-in-time copy of every entry. Not a consistent snapshot across keys.
    fn snapshot(&self) -> Vec<(K, V)>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// [`StateStore`] backed by a sharded [`DashMap`].
#[derive(Debug)]
pub struct MemoryStore<K, V>
where
    K: Eq + Hash,
{
    map: DashMap<K, V>,
}

impl<K, V> MemoryStore<K, V>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            map: DashMap::new(),
        }
    }
}

impl<K, V> Default for MemoryStore<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> StateStore<K, V> for MemoryStore<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn get(&self, key: &K) -> Option<V> {
        self.map.get(key).map(|entry| entry.value().clone())
    }

    fn put(&self, key: K, value: V) {
        self.map.insert(key, value);
    }

    fn insert_if_absent(&self, key: K, value: V) -> bool {
        match self.map.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(value);
                true
            }
        }
    }

    fn remove(&self, key: &K) -> Option<V> {
        self.map.remove(key).map(|(_, value)| value)
    }

    fn compare_and_swap(&self, key: &K, expected: Option<&V>, new: Option<V>) -> bool
    where
        V: PartialEq,
    {
        match (expected, new) {
            (None, Some(new)) => self.insert_if_absent(key.clone(), new),
            (None, None) => !self.map.contains_key(key),
            (Some(expected), None) => self
                .map
                .remove_if(key, |_, current| current == expected)
                .is_some(),
            (Some(expected), Some(new)) => match self.map.get_mut(key) {
                Some(mut current) => {
                    if *current == *expected {
                        *current = new;
                        true
                    } else {
                        false
                    }
                }
                None => false,
            },
        }
    }

    fn snapshot(&self) -> Vec<(K, V)> {
        self.map
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    fn len(&self) -> usize {
        self.map.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_if_absent_keeps_first_value() {
        let store = MemoryStore::new();
        assert!(store.insert_if_absent(7, "first"));
        assert!(!store.insert_if_absent(7, "second"));
        assert_eq!(store.get(&7), Some("first"));
    }

    #[test]
    fn test_put_overwrites() {
        let store = MemoryStore::new();
        store.put("k".to_string(), 1);
        store.put("k".to_string(), 2);
        assert_eq!(store.get(&"k".to_string()), Some(2));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_compare_and_swap_remove_only_on_match() {
        let store = MemoryStore::new();
        store.put(1, 10);

        assert!(!store.compare_and_swap(&1, Some(&11), None));
        assert_eq!(store.get(&1), Some(10));

        assert!(store.compare_and_swap(&1, Some(&10), None));
        assert!(store.get(&1).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_compare_and_swap_replace() {
        let store = MemoryStore::new();
        store.put(1, 10);
        assert!(store.compare_and_swap(&1, Some(&10), Some(20)));
        assert_eq!(store.get(&1), Some(20));
        assert!(!store.compare_and_swap(&2, Some(&10), Some(20)));
    }

    #[test]
    fn test_compare_and_swap_expected_absent() {
        let store = MemoryStore::new();
        assert!(store.compare_and_swap(&1, None, Some(5)));
        assert!(!store.compare_and_swap(&1, None, Some(6)));
        assert_eq!(store.get(&1), Some(5));
        assert!(!store.compare_and_swap(&1, None, None));
        assert!(store.compare_and_swap(&2, None, None));
    }

    #[test]
    fn test_remove_and_snapshot() {
        let store = MemoryStore::new();
        store.put(1, "a");
        store.put(2, "b");

        let mut entries = store.snapshot();
        entries.sort();
        assert_eq!(entries, vec![(1, "a"), (2, "b")]);

        assert_eq!(store.remove(&1), Some("a"));
        assert_eq!(store.remove(&1), None);
        assert_eq!(store.len(), 1);
    }
}
