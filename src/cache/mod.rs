//! Local Cache Storage
//!
//! The per-group storage layer: an immutable value type, a byte-bounded LRU,
//! and the locked wrapper a group reads and populates.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 LocalCache                    │
//! │      Mutex<Option<LruCache<ByteView>>>        │
//! │  ┌────────────────────────────────────────┐  │
//! │  │ LruCache: slab + recency list + index  │  │
//! │  │ MRU ◀──▶ ... ◀──▶ LRU (evicted first)  │  │
//! │  └────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────┘
//! ```

mod byteview;
pub mod lru;
mod stats;
mod store;

pub use byteview::ByteView;
pub use lru::{LruCache, Value};
pub use stats::{CacheStats, GroupStats, GroupStatsSnapshot};
pub use store::LocalCache;
