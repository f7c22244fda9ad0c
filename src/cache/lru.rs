//! Size-bounded LRU cache
//!
//! Entries live in a slab addressed by stable indices and are threaded onto a
//! doubly-linked recency list, so promotion and eviction are O(1) without raw
//! pointers.
//!
//! # Design
//!
//! - `head` is the most recently used entry, `tail` the least
//! - Size of an entry is `key.len() + value.len()`
//! - `max_bytes == 0` disables the bound
//!
//! Not synchronized; see [`LocalCache`](super::LocalCache) for the locked
//! wrapper a group uses.

use std::collections::HashMap;

/// Anything the cache can hold must report its size in bytes.
pub trait Value {
    fn len(&self) -> usize;
}

impl Value for String {
    fn len(&self) -> usize {
        String::len(self)
    }
}

impl Value for Vec<u8> {
    fn len(&self) -> usize {
        Vec::len(self)
    }
}

/// Callback invoked with every entry the size bound pushes out.
pub type EvictedFn<V> = Box<dyn FnMut(&str, &V) + Send>;

struct Node<V> {
    key: String,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

impl<V: Value> Node<V> {
    fn size(&self) -> usize {
        self.key.len() + self.value.len()
    }
}

/// LRU cache bounded by the total byte size of its entries.
pub struct LruCache<V> {
    max_bytes: usize,
    used_bytes: usize,
    slots: Vec<Option<Node<V>>>,
    free: Vec<usize>,
    index: HashMap<String, usize>,
    head: Option<usize>,
    tail: Option<usize>,
    on_evicted: Option<EvictedFn<V>>,
}

impl<V: Value> LruCache<V> {
    /// Create a cache holding at most `max_bytes` (0 = unbounded).
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            used_bytes: 0,
            slots: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            head: None,
            tail: None,
            on_evicted: None,
        }
    }

    /// Create a cache that reports evictions to `on_evicted`.
    pub fn with_eviction_callback(max_bytes: usize, on_evicted: EvictedFn<V>) -> Self {
        let mut cache = Self::new(max_bytes);
        cache.on_evicted = Some(on_evicted);
        cache
    }

    /// Insert or replace `key`, then evict until the size bound holds.
    pub fn add(&mut self, key: impl Into<String>, value: V) {
        let key = key.into();

        if let Some(&idx) = self.index.get(&key) {
            self.detach(idx);
            if let Some(node) = self.slots[idx].as_mut() {
                let old_len = node.value.len();
                let new_len = value.len();
                node.value = value;
                self.used_bytes = self.used_bytes + new_len - old_len;
            }
            self.push_front(idx);
        } else {
            let node = Node {
                key: key.clone(),
                value,
                prev: None,
                next: None,
            };
            self.used_bytes += node.size();
            let idx = self.alloc(node);
            self.index.insert(key, idx);
            self.push_front(idx);
        }

        while self.max_bytes != 0 && self.used_bytes > self.max_bytes {
            if self.remove_oldest().is_none() {
                break;
            }
        }
    }

    /// Look up `key` and mark it most recently used.
    pub fn get(&mut self, key: &str) -> Option<&V> {
        let idx = *self.index.get(key)?;
        self.detach(idx);
        self.push_front(idx);
        self.slots[idx].as_ref().map(|node| &node.value)
    }

    /// Look up `key` without touching recency.
    pub fn peek(&self, key: &str) -> Option<&V> {
        let idx = *self.index.get(key)?;
        self.slots[idx].as_ref().map(|node| &node.value)
    }

    /// Check if cache contains a key
    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Evict the least recently used entry, invoking the eviction callback.
    pub fn remove_oldest(&mut self) -> Option<(String, V)> {
        let idx = self.tail?;
        let node = self.unlink(idx)?;
        if let Some(on_evicted) = self.on_evicted.as_mut() {
            on_evicted(&node.key, &node.value);
        }
        Some((node.key, node.value))
    }

    /// Remove `key` explicitly. The eviction callback is not invoked.
    pub fn remove(&mut self, key: &str) -> Option<V> {
        let idx = *self.index.get(key)?;
        self.unlink(idx).map(|node| node.value)
    }

    /// Keys from most to least recently used.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys = Vec::with_capacity(self.index.len());
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            match self.slots[idx].as_ref() {
                Some(node) => {
                    keys.push(node.key.as_str());
                    cursor = node.next;
                }
                None => break,
            }
        }
        keys
    }

    /// Get number of entries
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Sum of key and value sizes of all resident entries
    pub fn used_bytes(&self) -> usize {
        self.used_bytes
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Drop every entry without invoking the eviction callback.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.index.clear();
        self.head = None;
        self.tail = None;
        self.used_bytes = 0;
    }

    fn alloc(&mut self, node: Node<V>) -> usize {
        match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(node);
                idx
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        }
    }

    /// Take a node out of the list, the index and the slab.
    fn unlink(&mut self, idx: usize) -> Option<Node<V>> {
        self.detach(idx);
        let node = self.slots[idx].take()?;
        self.free.push(idx);
        self.index.remove(&node.key);
        self.used_bytes -= node.size();
        Some(node)
    }

    fn detach(&mut self, idx: usize) {
        let (prev, next) = match self.slots[idx].as_mut() {
            Some(node) => (node.prev.take(), node.next.take()),
            None => return,
        };

        match prev {
            Some(p) => {
                if let Some(node) = self.slots[p].as_mut() {
                    node.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(n) => {
                if let Some(node) = self.slots[n].as_mut() {
                    node.prev = prev;
                }
            }
            None => self.tail = prev,
        }
    }

    fn push_front(&mut self, idx: usize) {
        let old_head = self.head;
        if let Some(node) = self.slots[idx].as_mut() {
            node.prev = None;
            node.next = old_head;
        }
        if let Some(h) = old_head {
            if let Some(node) = self.slots[h].as_mut() {
                node.prev = Some(idx);
            }
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }
}

impl<V> std::fmt::Debug for LruCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LruCache")
            .field("max_bytes", &self.max_bytes)
            .field("used_bytes", &self.used_bytes)
            .field("len", &self.index.len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_get_hit_and_miss() {
        let mut lru: LruCache<String> = LruCache::new(0);
        lru.add("key1", "1234".to_string());

        assert_eq!(lru.get("key1").map(String::as_str), Some("1234"));
        assert!(lru.get("key2").is_none());
    }

    #[test]
    fn test_remove_oldest_when_full() {
        let (k1, k2, k3) = ("key1", "key2", "k3");
        let (v1, v2, v3) = ("value1", "value2", "v3");
        let cap = k1.len() + k2.len() + v1.len() + v2.len();

        let mut lru: LruCache<String> = LruCache::new(cap);
        lru.add(k1, v1.to_string());
        lru.add(k2, v2.to_string());
        lru.add(k3, v3.to_string());

        assert!(lru.get("key1").is_none());
        assert_eq!(lru.len(), 2);
        assert!(lru.used_bytes() <= cap);
    }

    #[test]
    fn test_get_promotes_entry() {
        // Room for exactly two 2-byte entries
        let mut lru: LruCache<String> = LruCache::new(4);
        lru.add("a", "1".to_string());
        lru.add("b", "2".to_string());

        // Touch "a" so "b" becomes the oldest
        assert!(lru.get("a").is_some());
        lru.add("c", "3".to_string());

        assert!(lru.contains("a"));
        assert!(!lru.contains("b"));
        assert!(lru.contains("c"));
        assert_eq!(lru.keys(), vec!["c", "a"]);
    }

    #[test]
    fn test_eviction_callback() {
        let evicted = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&evicted);
        let mut lru: LruCache<String> = LruCache::with_eviction_callback(
            10,
            Box::new(move |key, _value| sink.lock().unwrap().push(key.to_string())),
        );

        lru.add("key1", "123456".to_string());
        lru.add("k2", "k2".to_string());
        lru.add("k3", "k3".to_string());
        lru.add("k4", "k4".to_string());

        assert_eq!(*evicted.lock().unwrap(), vec!["key1", "k2"]);
    }

    #[test]
    fn test_replace_adjusts_size() {
        let mut lru: LruCache<String> = LruCache::new(0);
        lru.add("key", "short".to_string());
        assert_eq!(lru.used_bytes(), 3 + 5);

        lru.add("key", "a much longer value".to_string());
        assert_eq!(lru.len(), 1);
        assert_eq!(lru.used_bytes(), 3 + 19);

        lru.add("key", "x".to_string());
        assert_eq!(lru.used_bytes(), 3 + 1);
    }

    #[test]
    fn test_replace_moves_to_front() {
        let mut lru: LruCache<String> = LruCache::new(0);
        lru.add("a", "1".to_string());
        lru.add("b", "2".to_string());
        lru.add("a", "3".to_string());

        assert_eq!(lru.keys(), vec!["a", "b"]);
        assert_eq!(lru.peek("a").map(String::as_str), Some("3"));
    }

    #[test]
    fn test_oversized_entry_evicts_itself() {
        let mut lru: LruCache<String> = LruCache::new(8);
        lru.add("a", "1".to_string());
        lru.add("huge", "0123456789".to_string());

        assert!(lru.is_empty());
        assert_eq!(lru.used_bytes(), 0);
    }

    #[test]
    fn test_remove_oldest_on_empty() {
        let mut lru: LruCache<String> = LruCache::new(0);
        assert!(lru.remove_oldest().is_none());
    }

    #[test]
    fn test_remove_and_slot_reuse() {
        let mut lru: LruCache<String> = LruCache::new(0);
        lru.add("a", "1".to_string());
        lru.add("b", "2".to_string());

        assert_eq!(lru.remove("a"), Some("1".to_string()));
        assert!(lru.remove("a").is_none());
        assert_eq!(lru.used_bytes(), 2);

        lru.add("c", "3".to_string());
        assert_eq!(lru.keys(), vec!["c", "b"]);
        assert_eq!(lru.slots.len(), 2);
    }

    #[test]
    fn test_peek_does_not_promote() {
        let mut lru: LruCache<String> = LruCache::new(4);
        lru.add("a", "1".to_string());
        lru.add("b", "2".to_string());

        assert!(lru.peek("a").is_some());
        lru.add("c", "3".to_string());
        assert!(!lru.contains("a"));
    }

    #[test]
    fn test_clear() {
        let mut lru: LruCache<String> = LruCache::new(0);
        for i in 0..10 {
            lru.add(format!("k{}", i), "v".to_string());
        }
        lru.clear();
        assert!(lru.is_empty());
        assert_eq!(lru.used_bytes(), 0);
        assert!(lru.keys().is_empty());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add(u8, usize),
        Get(u8),
        Remove(u8),
        RemoveOldest,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..16, 0usize..12).prop_map(|(k, n)| Op::Add(k, n)),
            (0u8..16).prop_map(Op::Get),
            (0u8..16).prop_map(Op::Remove),
            Just(Op::RemoveOldest),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Property: used_bytes always equals the resident total and respects the bound.
        #[test]
        fn prop_used_bytes_invariant(
            max_bytes in 0usize..40,
            ops in prop::collection::vec(op_strategy(), 1..200),
        ) {
            let mut lru: LruCache<Vec<u8>> = LruCache::new(max_bytes);

            for op in ops {
                match op {
                    Op::Add(k, n) => lru.add(format!("k{}", k), vec![0u8; n]),
                    Op::Get(k) => { lru.get(&format!("k{}", k)); }
                    Op::Remove(k) => { lru.remove(&format!("k{}", k)); }
                    Op::RemoveOldest => { lru.remove_oldest(); }
                }

                let resident: usize = lru
                    .keys()
                    .iter()
                    .map(|k| k.len() + lru.peek(k).map(Vec::len).unwrap_or(0))
                    .sum();
                prop_assert_eq!(lru.used_bytes(), resident);
                prop_assert_eq!(lru.keys().len(), lru.len());
                if max_bytes != 0 {
                    prop_assert!(lru.used_bytes() <= max_bytes);
                }
            }
        }
    }
}
