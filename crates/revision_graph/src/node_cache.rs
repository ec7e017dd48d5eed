use std::{hash::Hash, rc::Rc};

use collections::{BTreeMap, HashMap};

use crate::{graph_node::GraphNode, revision::Revision};

/// Rendered rows, keyed by revision.
pub type NodeCache = LruCache<Revision, Rc<GraphNode>>;

/// A fixed capacity map that evicts the least recently used entry.
pub struct LruCache<K, V> {
    capacity: usize,
    entries: HashMap<K, (V, u64)>,
    /// Last use -> key, oldest first.
    recency: BTreeMap<u64, K>,
    clock: u64,
}

impl<K: Copy + Eq + Hash, V> LruCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::default(),
            recency: BTreeMap::new(),
            clock: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Looks up `key` and marks it as the most recently used entry.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let clock = self.tick();
        let (value, last_used) = self.entries.get_mut(key)?;
        self.recency.remove(last_used);
        *last_used = clock;
        self.recency.insert(clock, *key);
        Some(value)
    }

    /// Looks up `key` without touching its recency.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|(value, _)| value)
    }

    /// Inserts `value`, returning the entry evicted to make room for it.
    pub fn insert(&mut self, key: K, value: V) -> Option<(K, V)> {
        let clock = self.tick();
        if let Some((_, last_used)) = self.entries.insert(key, (value, clock)) {
            self.recency.remove(&last_used);
        }
        self.recency.insert(clock, key);

        if self.entries.len() <= self.capacity {
            return None;
        }
        let (_, oldest) = self.recency.pop_first()?;
        let (value, _) = self.entries.remove(&oldest)?;
        Some((oldest, value))
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let (value, last_used) = self.entries.remove(key)?;
        self.recency.remove(&last_used);
        Some(value)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.recency.clear();
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evicts_least_recently_used() {
        let mut cache = LruCache::new(2);
        assert_eq!(cache.insert(1, "a"), None);
        assert_eq!(cache.insert(2, "b"), None);
        assert_eq!(cache.get(&1), Some(&"a"));

        assert_eq!(cache.insert(3, "c"), Some((2, "b")));
        assert!(cache.contains(&1));
        assert!(!cache.contains(&2));
        assert_eq!(cache.len(), 2);

        // Peeking does not protect an entry.
        assert_eq!(cache.peek(&1), Some(&"a"));
        assert_eq!(cache.insert(4, "d"), Some((1, "a")));
    }

    #[test]
    fn test_reinsert_replaces_without_evicting() {
        let mut cache = LruCache::new(2);
        cache.insert(1, "a");
        cache.insert(2, "b");
        assert_eq!(cache.insert(1, "z"), None);
        assert_eq!(cache.peek(&1), Some(&"z"));
        assert_eq!(cache.insert(3, "c"), Some((2, "b")));

        assert_eq!(cache.remove(&1), Some("z"));
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }
}
