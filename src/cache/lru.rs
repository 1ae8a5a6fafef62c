//! LRU Ordering Module
//!
//! Implements the recency-ordered map backing the cache.

use std::hash::Hash;

use indexmap::{Equivalent, IndexMap};

/// Marks the absence of a neighbour in the recency chain.
const NIL: usize = usize::MAX;

// == Recency Node ==
#[derive(Debug, Clone)]
struct Node<V> {
    value: V,
    /// Slot of the next older entry
    older: usize,
    /// Slot of the next newer entry
    newer: usize,
}

// == Recency Map ==
/// Associative storage that remembers recency order.
///
/// Entries live in the slots of an `IndexMap`, and a doubly linked chain
/// threaded through those slots records the order:
/// - `oldest` = Least recently used
/// - `newest` = Most recently used
///
/// Removal uses `swap_remove`, which moves the last slot into the hole, and
/// then repoints that entry's neighbours. Insert, promote, remove and
/// pop_oldest are all O(1), so a trim pass costs time proportional to the
/// number of evictions.
#[derive(Debug, Clone)]
pub struct RecencyMap<K, V> {
    entries: IndexMap<K, Node<V>>,
    oldest: usize,
    newest: usize,
}

impl<K, V> Default for RecencyMap<K, V> {
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
            oldest: NIL,
            newest: NIL,
        }
    }
}

impl<K, V> RecencyMap<K, V>
where
    K: Hash + Eq,
{
    // == Constructor ==
    /// Creates a new empty map.
    pub fn new() -> Self {
        Self::default()
    }

    // == Insert Newest ==
    /// Inserts `value` at the most recently used position.
    ///
    /// If the key was already present its old value is replaced and
    /// returned, and the key ends up last regardless of where it used to be.
    pub fn insert_newest(&mut self, key: K, value: V) -> Option<V> {
        if let Some(slot) = self.entries.get_index_of(&key) {
            self.unlink(slot);
            let previous = std::mem::replace(&mut self.entries[slot].value, value);
            self.link_newest(slot);
            return Some(previous);
        }

        let node = Node {
            value,
            older: NIL,
            newer: NIL,
        };
        let (slot, _) = self.entries.insert_full(key, node);
        self.link_newest(slot);
        None
    }

    // == Promote ==
    /// Moves an existing key to the most recently used position.
    ///
    /// Returns the value now stored last, or None if the key is absent.
    pub fn promote<Q>(&mut self, key: &Q) -> Option<&V>
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        let slot = self.entries.get_index_of(key)?;
        if slot != self.newest {
            self.unlink(slot);
            self.link_newest(slot);
        }
        Some(&self.entries[slot].value)
    }

    // == Remove ==
    /// Removes a key, preserving the order of everything else.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        let slot = self.entries.get_index_of(key)?;
        self.remove_slot(slot).map(|(_, value)| value)
    }

    // == Pop Oldest ==
    /// Removes and returns the least recently used entry.
    ///
    /// Returns None if the map is empty.
    pub fn pop_oldest(&mut self) -> Option<(K, V)> {
        if self.oldest == NIL {
            return None;
        }
        self.remove_slot(self.oldest)
    }

    /// Entries from oldest to newest.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            entries: &self.entries,
            cursor: self.oldest,
            remaining: self.entries.len(),
        }
    }

    /// Keys from oldest to newest.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.iter().map(|(key, _)| key)
    }

    /// Values from oldest to newest.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.iter().map(|(_, value)| value)
    }

    // == Length ==
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // == Clear ==
    /// Removes every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.oldest = NIL;
        self.newest = NIL;
    }

    // == Chain Maintenance ==
    fn link_newest(&mut self, slot: usize) {
        let previous_newest = self.newest;
        {
            let node = &mut self.entries[slot];
            node.older = previous_newest;
            node.newer = NIL;
        }
        if previous_newest == NIL {
            self.oldest = slot;
        } else {
            self.entries[previous_newest].newer = slot;
        }
        self.newest = slot;
    }

    fn unlink(&mut self, slot: usize) {
        let (older, newer) = {
            let node = &self.entries[slot];
            (node.older, node.newer)
        };
        if older == NIL {
            self.oldest = newer;
        } else {
            self.entries[older].newer = newer;
        }
        if newer == NIL {
            self.newest = older;
        } else {
            self.entries[newer].older = older;
        }
    }

    fn remove_slot(&mut self, slot: usize) -> Option<(K, V)> {
        self.unlink(slot);
        let last = self.entries.len() - 1;
        let (key, node) = self.entries.swap_remove_index(slot)?;
        if slot != last {
            self.relocated(slot);
        }
        Some((key, node.value))
    }

    /// Repoints the neighbours of the entry that `swap_remove` moved into `to`.
    fn relocated(&mut self, to: usize) {
        let (older, newer) = {
            let node = &self.entries[to];
            (node.older, node.newer)
        };
        if older == NIL {
            self.oldest = to;
        } else {
            self.entries[older].newer = to;
        }
        if newer == NIL {
            self.newest = to;
        } else {
            self.entries[newer].older = to;
        }
    }
}

// == Iterator ==
/// Iterator over a [`RecencyMap`] from oldest to newest.
#[derive(Debug)]
pub struct Iter<'a, K, V> {
    entries: &'a IndexMap<K, Node<V>>,
    cursor: usize,
    remaining: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor == NIL {
            return None;
        }
        let (key, node) = self.entries.get_index(self.cursor)?;
        self.cursor = node.newer;
        self.remaining -= 1;
        Some((key, &node.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn keys(map: &RecencyMap<String, u32>) -> Vec<&str> {
        map.keys().map(String::as_str).collect()
    }

    #[test]
    fn test_map_new() {
        let map: RecencyMap<String, u32> = RecencyMap::new();
        assert!(map.is_empty());
        assert_eq!(map.len(), 0);
        assert_eq!(map.iter().next(), None);
    }

    #[test]
    fn test_insert_keeps_arrival_order() {
        let mut map = RecencyMap::new();

        map.insert_newest("key1".to_string(), 1);
        map.insert_newest("key2".to_string(), 2);
        map.insert_newest("key3".to_string(), 3);

        assert_eq!(map.len(), 3);
        assert_eq!(keys(&map), vec!["key1", "key2", "key3"]);
        assert_eq!(map.iter().len(), 3);
    }

    #[test]
    fn test_reinsert_moves_to_newest() {
        let mut map = RecencyMap::new();

        map.insert_newest("key1".to_string(), 1);
        map.insert_newest("key2".to_string(), 2);

        let previous = map.insert_newest("key1".to_string(), 10);

        assert_eq!(previous, Some(1));
        assert_eq!(map.len(), 2);
        assert_eq!(keys(&map), vec!["key2", "key1"]);
    }

    #[test]
    fn test_promote_moves_to_newest() {
        let mut map = RecencyMap::new();

        map.insert_newest("a".to_string(), 1);
        map.insert_newest("b".to_string(), 2);
        map.insert_newest("c".to_string(), 3);

        assert_eq!(map.promote("a"), Some(&1));
        assert_eq!(keys(&map), vec!["b", "c", "a"]);

        // Promoting the newest key is a no-op on order
        assert_eq!(map.promote("a"), Some(&1));
        assert_eq!(keys(&map), vec!["b", "c", "a"]);
    }

    #[test]
    fn test_promote_missing_key() {
        let mut map: RecencyMap<String, u32> = RecencyMap::new();
        map.insert_newest("a".to_string(), 1);

        assert_eq!(map.promote("missing"), None);
        assert_eq!(keys(&map), vec!["a"]);
    }

    #[test]
    fn test_remove_preserves_order() {
        let mut map = RecencyMap::new();

        map.insert_newest("a".to_string(), 1);
        map.insert_newest("b".to_string(), 2);
        map.insert_newest("c".to_string(), 3);

        assert_eq!(map.remove("b"), Some(2));
        assert_eq!(map.remove("b"), None);

        assert_eq!(keys(&map), vec!["a", "c"]);
        assert_eq!(map.promote("b"), None);
        assert_eq!(map.promote("a"), Some(&1));
    }

    #[test]
    fn test_pop_oldest_order() {
        let mut map = RecencyMap::new();

        map.insert_newest("a".to_string(), 1);
        map.insert_newest("b".to_string(), 2);
        map.insert_newest("c".to_string(), 3);

        // touch a, then c, then b: order becomes a, c, b
        map.promote("a");
        map.promote("c");
        map.promote("b");

        assert_eq!(map.pop_oldest(), Some(("a".to_string(), 1)));
        assert_eq!(map.pop_oldest(), Some(("c".to_string(), 3)));
        assert_eq!(map.pop_oldest(), Some(("b".to_string(), 2)));
        assert_eq!(map.pop_oldest(), None);
    }

    #[test]
    fn test_values_follow_key_order() {
        let mut map = RecencyMap::new();

        map.insert_newest("a".to_string(), 1);
        map.insert_newest("b".to_string(), 2);
        map.promote("a");

        assert_eq!(map.values().copied().collect::<Vec<_>>(), vec![2, 1]);
    }

    #[test]
    fn test_clear() {
        let mut map = RecencyMap::new();
        map.insert_newest("a".to_string(), 1);
        map.insert_newest("b".to_string(), 2);

        map.clear();

        assert!(map.is_empty());
        assert_eq!(map.pop_oldest(), None);
    }

    #[test]
    fn test_remove_head_middle_and_tail() {
        let mut map = RecencyMap::new();
        for (i, key) in ["a", "b", "c", "d", "e"].iter().enumerate() {
            map.insert_newest(key.to_string(), i as u32);
        }

        // Slots get swapped around underneath; the order must not notice
        assert_eq!(map.remove("a"), Some(0));
        assert_eq!(keys(&map), vec!["b", "c", "d", "e"]);
        assert_eq!(map.remove("e"), Some(4));
        assert_eq!(keys(&map), vec!["b", "c", "d"]);
        assert_eq!(map.remove("c"), Some(2));
        assert_eq!(keys(&map), vec!["b", "d"]);

        map.insert_newest("f".to_string(), 5);
        map.promote("b");
        assert_eq!(keys(&map), vec!["d", "f", "b"]);
        assert_eq!(map.values().copied().collect::<Vec<_>>(), vec![3, 5, 1]);
        assert_eq!(map.pop_oldest(), Some(("d".to_string(), 3)));
        assert_eq!(map.pop_oldest(), Some(("f".to_string(), 5)));
        assert_eq!(map.pop_oldest(), Some(("b".to_string(), 1)));
        assert!(map.is_empty());
    }

    #[test]
    fn test_reinsert_single_entry() {
        let mut map = RecencyMap::new();
        map.insert_newest("a".to_string(), 1);

        assert_eq!(map.insert_newest("a".to_string(), 2), Some(1));
        assert_eq!(keys(&map), vec!["a"]);
        assert_eq!(map.pop_oldest(), Some(("a".to_string(), 2)));
        assert_eq!(map.pop_oldest(), None);

        // Chain is usable again after running empty
        map.insert_newest("b".to_string(), 3);
        assert_eq!(keys(&map), vec!["b"]);
    }

    #[test]
    fn test_large_map_operations_stay_fast() {
        let n = 200_000u32;
        let mut map = RecencyMap::new();
        for i in 0..n {
            map.insert_newest(i, i);
        }

        let start = std::time::Instant::now();
        // Promote from the cold end, then drain everything
        for i in 0..n / 2 {
            assert_eq!(map.promote(&i), Some(&i));
        }
        let mut expected = n / 2;
        while let Some((key, _)) = map.pop_oldest() {
            assert_eq!(key, expected);
            expected = if expected + 1 == n { 0 } else { expected + 1 };
        }
        let elapsed = start.elapsed();

        assert!(map.is_empty());
        assert!(
            elapsed < std::time::Duration::from_secs(2),
            "Promote and pop should be constant time, took {:?}",
            elapsed
        );
    }
}
