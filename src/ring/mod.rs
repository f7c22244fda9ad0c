//! Consistent Hash Ring
//!
//! Maps keys to owner nodes. Each real node is placed on a 32-bit hash circle
//! at `replicas` virtual positions; a key belongs to the node at the first
//! position clockwise from the key's own hash.
//!
//! # Design
//!
//! ```text
//!            2 ──── 4 ──── 6
//!          ╱                 ╲
//!       26                     12   ◀── hash("11") = 11 lands here
//!          ╲                 ╱
//!           24 ── 22 ── 16 ─
//! ```
//!
//! - Positions are kept in a sorted `Vec<u32>` and searched with
//!   `partition_point`; lookups past the last position wrap to index 0
//! - Adding or removing one node only moves the keys on the arcs that end at
//!   that node's positions
//! - Not synchronized: the owner guards mutation (the HTTP pool keeps the ring
//!   under the same lock as its peer table)

pub mod crc32;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Pluggable position hash
pub type HashFn = Arc<dyn Fn(&[u8]) -> u32 + Send + Sync>;

/// Consistent hash ring with virtual replicas.
#[derive(Clone)]
pub struct HashRing {
    hash: HashFn,
    replicas: usize,
    keys: Vec<u32>,
    owners: HashMap<u32, String>,
}

impl HashRing {
    /// Create a ring using CRC-32 (IEEE) positions.
    pub fn new(replicas: usize) -> Self {
        Self::with_hasher(replicas, Arc::new(crc32::checksum_ieee))
    }

    /// Create a ring with a custom hash function.
    pub fn with_hasher(replicas: usize, hash: HashFn) -> Self {
        Self {
            hash,
            replicas,
            keys: Vec::new(),
            owners: HashMap::new(),
        }
    }

    /// Place every node in `nodes` on the ring.
    pub fn add<I, S>(&mut self, nodes: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for node in nodes {
            let node = node.as_ref();
            for i in 0..self.replicas {
                let position = self.position(i, node);
                let at = self.keys.partition_point(|&k| k < position);
                self.keys.insert(at, position);
                self.owners.insert(position, node.to_string());
            }
        }
    }

    /// Take `node` off the ring.
    pub fn remove(&mut self, node: &str) {
        for i in 0..self.replicas {
            let position = self.position(i, node);
            if !self.owners.get(&position).is_some_and(|owner| owner == node) {
                continue;
            }
            if let Ok(at) = self.keys.binary_search(&position) {
                self.keys.remove(at);
            }
            self.owners.remove(&position);
        }
    }

    /// Owner of `key`, or `None` on an empty ring.
    pub fn get(&self, key: &str) -> Option<&str> {
        if self.keys.is_empty() {
            return None;
        }
        let hash = (self.hash)(key.as_bytes());
        let idx = self.keys.partition_point(|&k| k < hash) % self.keys.len();
        self.owners.get(&self.keys[idx]).map(String::as_str)
    }

    /// Number of virtual positions
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn replicas(&self) -> usize {
        self.replicas
    }

    /// Distinct real nodes, sorted
    pub fn nodes(&self) -> Vec<&str> {
        let nodes: BTreeSet<&str> = self.owners.values().map(String::as_str).collect();
        nodes.into_iter().collect()
    }

    fn position(&self, replica: usize, node: &str) -> u32 {
        (self.hash)(format!("{}{}", replica, node).as_bytes())
    }
}

impl std::fmt::Debug for HashRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashRing")
            .field("replicas", &self.replicas)
            .field("positions", &self.keys.len())
            .field("nodes", &self.nodes())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
