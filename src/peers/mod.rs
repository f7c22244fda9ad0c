//! Peer Routing and Transport
//!
//! The capabilities a group needs to reach other nodes, and their HTTP
//! implementations.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Group                               │
//! │            PeerPicker ─────────▶ PeerClient                  │
//! └─────────────────────────────────────────────────────────────┘
//!                 │                        │
//!                 ▼                        ▼
//! ┌──────────────────────────┐  ┌─────────────────────────────┐
//! │ HttpPool                 │  │ HttpPeerClient              │
//! │  HashRing + client table │  │  GET <peer>/_cache/<g>/<k>  │
//! │  handle(): server side   │  │  protobuf Response body     │
//! └──────────────────────────┘  └─────────────────────────────┘
//! ```

mod client;
mod pool;
pub mod protocol;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

pub use client::HttpPeerClient;
pub use pool::{HttpPool, PoolConfig, DEFAULT_BASE_PATH, DEFAULT_REPLICAS};

/// Resolves the node that owns a key.
pub trait PeerPicker: Send + Sync {
    /// Client for the remote owner of `key`, or `None` when this node owns it
    /// (or no peers are known).
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerClient>>;
}

/// Fetches a value from one remote peer.
#[async_trait]
pub trait PeerClient: Send + Sync {
    /// Ask the peer for `key` in `group`.
    async fn fetch(&self, group: &str, key: &str) -> Result<Bytes>;

    /// Peer address, for logging
    fn addr(&self) -> &str;
}
