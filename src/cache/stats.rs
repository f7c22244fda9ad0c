//! Group and Cache Statistics
//!
//! Lock-free counters recorded on the request path and read as snapshots by
//! the metrics exporter and the API server.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Per-group counters
#[derive(Debug, Default)]
pub struct GroupStats {
    gets: AtomicU64,
    cache_hits: AtomicU64,
    peer_loads: AtomicU64,
    peer_errors: AtomicU64,
    loads: AtomicU64,
    loads_deduped: AtomicU64,
    local_loads: AtomicU64,
    local_load_errs: AtomicU64,
    server_requests: AtomicU64,
}

impl GroupStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Any `get` request, including ones served from cache
    pub fn record_get(&self) {
        self.gets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Value fetched from a remote owner
    pub fn record_peer_load(&self) {
        self.peer_loads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_peer_error(&self) {
        self.peer_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Cache miss entering the coalescer
    pub fn record_load(&self) {
        self.loads.fetch_add(1, Ordering::Relaxed);
    }

    /// Miss that actually ran the load (after coalescing)
    pub fn record_load_deduped(&self) {
        self.loads_deduped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_local_load(&self) {
        self.local_loads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_local_load_err(&self) {
        self.local_load_errs.fetch_add(1, Ordering::Relaxed);
    }

    /// Request arriving from a peer over the wire
    pub fn record_server_request(&self) {
        self.server_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn gets(&self) -> u64 {
        self.gets.load(Ordering::Relaxed)
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub fn peer_loads(&self) -> u64 {
        self.peer_loads.load(Ordering::Relaxed)
    }

    pub fn peer_errors(&self) -> u64 {
        self.peer_errors.load(Ordering::Relaxed)
    }

    pub fn loads(&self) -> u64 {
        self.loads.load(Ordering::Relaxed)
    }

    pub fn loads_deduped(&self) -> u64 {
        self.loads_deduped.load(Ordering::Relaxed)
    }

    pub fn local_loads(&self) -> u64 {
        self.local_loads.load(Ordering::Relaxed)
    }

    pub fn local_load_errs(&self) -> u64 {
        self.local_load_errs.load(Ordering::Relaxed)
    }

    pub fn server_requests(&self) -> u64 {
        self.server_requests.load(Ordering::Relaxed)
    }

    /// Get hit ratio
    pub fn hit_ratio(&self) -> f64 {
        let gets = self.gets();
        if gets == 0 {
            0.0
        } else {
            self.cache_hits() as f64 / gets as f64
        }
    }

    /// Get snapshot of all counters
    pub fn snapshot(&self) -> GroupStatsSnapshot {
        GroupStatsSnapshot {
            gets: self.gets(),
            cache_hits: self.cache_hits(),
            peer_loads: self.peer_loads(),
            peer_errors: self.peer_errors(),
            loads: self.loads(),
            loads_deduped: self.loads_deduped(),
            local_loads: self.local_loads(),
            local_load_errs: self.local_load_errs(),
            server_requests: self.server_requests(),
            hit_ratio: self.hit_ratio(),
        }
    }
}

/// Snapshot of [`GroupStats`]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GroupStatsSnapshot {
    pub gets: u64,
    pub cache_hits: u64,
    pub peer_loads: u64,
    pub peer_errors: u64,
    pub loads: u64,
    pub loads_deduped: u64,
    pub local_loads: u64,
    pub local_load_errs: u64,
    pub server_requests: u64,
    pub hit_ratio: f64,
}

/// State of one group's local cache
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Bytes held (keys + values)
    pub bytes: u64,
    /// Resident entries
    pub items: u64,
    /// Lookups
    pub gets: u64,
    /// Lookups that found the key
    pub hits: u64,
    /// Entries pushed out by the size bound
    pub evictions: u64,
}

// =============================================================================
// Tests
// =============================================================================
