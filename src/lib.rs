//! peercache - Distributed In-Memory Read-Through Cache
//!
//! Every node runs the same process. A lookup in a [`Group`] is answered from
//! the node's local LRU when possible; otherwise the key's owner on the
//! consistent-hash ring is asked over HTTP, and only the owner calls the
//! group's [`Loader`]. Concurrent misses for one key are coalesced into a
//! single load.
//!
//! # Architecture
//!
//! ```text
//! Group::get ─▶ LocalCache ─hit─▶ value
//!                  │ miss
//!                  ▼
//!             SingleFlight ─▶ HttpPool::pick_peer ─remote─▶ HttpPeerClient ─▶ owner
//!                                     │ self / failure
//!                                     ▼
//!                                  Loader ─▶ LocalCache
//! ```
//!
//! # Modules
//!
//! - [`cache`] - byte views, the LRU and the per-group local cache
//! - [`ring`] - consistent hashing with virtual nodes
//! - [`singleflight`] - per-key call coalescing
//! - [`group`] - named cache namespaces and their registry
//! - [`peers`] - peer selection, wire protocol and HTTP client/server
//! - [`api`] - client-facing HTTP surface
//! - [`metrics`] - health probes and Prometheus exposition
//! - [`server`] - shared hyper accept loop
//! - [`error`] - error types

pub mod api;
pub mod cache;
pub mod error;
pub mod group;
pub mod metrics;
pub mod peers;
pub mod ring;
pub mod server;
pub mod singleflight;

pub use cache::ByteView;
pub use error::{Error, Result};
pub use group::{get_group, new_group, Group, GroupBuilder, Loader, LoaderFn, Registry};
pub use peers::{HttpPool, PoolConfig};
pub use ring::HashRing;
pub use singleflight::SingleFlight;
