//! HTTP Peer Pool
//!
//! One `HttpPool` per node. It plays both sides of the peer protocol:
//!
//! - as a [`PeerPicker`], it maps keys to owners on the consistent-hash ring
//!   and hands out the matching [`HttpPeerClient`]
//! - as a server handler, it answers `GET <base_path><group>/<key>` from the
//!   local groups in its [`Registry`]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use hyper::{Method, Request, StatusCode};
use parking_lot::Mutex;
use prost::Message;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use super::client::HttpPeerClient;
use super::protocol::{self, PathError};
use super::{PeerClient, PeerPicker};
use crate::error::{Error, Result};
use crate::group::Registry;
use crate::ring::{HashFn, HashRing};
use crate::server::{self, HttpResponse};

/// URL prefix of peer requests
pub const DEFAULT_BASE_PATH: &str = "/_cache/";

/// Virtual nodes per peer on the ring
pub const DEFAULT_REPLICAS: usize = 50;

/// Pool configuration
#[derive(Clone)]
pub struct PoolConfig {
    /// Must start and end with `/`
    pub base_path: String,
    pub replicas: usize,
    /// Timeout applied to every outgoing peer request
    pub request_timeout: Duration,
    /// Ring hash; CRC-32 when unset
    pub hash: Option<HashFn>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            base_path: DEFAULT_BASE_PATH.to_string(),
            replicas: DEFAULT_REPLICAS,
            request_timeout: Duration::from_secs(10),
            hash: None,
        }
    }
}

impl std::fmt::Debug for PoolConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolConfig")
            .field("base_path", &self.base_path)
            .field("replicas", &self.replicas)
            .field("request_timeout", &self.request_timeout)
            .field("custom_hash", &self.hash.is_some())
            .finish()
    }
}

impl PoolConfig {
    fn validate(&self) -> Result<()> {
        if !self.base_path.starts_with('/') || !self.base_path.ends_with('/') {
            return Err(Error::Config(format!(
                "base path must start and end with '/': {:?}",
                self.base_path
            )));
        }
        if self.replicas == 0 {
            return Err(Error::Config("replicas must be at least 1".to_string()));
        }
        Ok(())
    }

    fn new_ring(&self) -> HashRing {
        match &self.hash {
            Some(hash) => HashRing::with_hasher(self.replicas, Arc::clone(hash)),
            None => HashRing::new(self.replicas),
        }
    }
}

struct PoolState {
    ring: HashRing,
    clients: HashMap<String, Arc<HttpPeerClient>>,
}

/// Peer membership and peer-protocol endpoint for one node.
pub struct HttpPool {
    self_addr: String,
    config: PoolConfig,
    registry: Arc<Registry>,
    client: reqwest::Client,
    state: Mutex<PoolState>,
}

impl HttpPool {
    /// Create a pool serving groups from the process-wide registry.
    pub fn new(self_addr: impl Into<String>, config: PoolConfig) -> Result<Arc<Self>> {
        Self::with_registry(self_addr, config, Registry::global())
    }

    /// Create a pool serving groups from `registry`.
    pub fn with_registry(
        self_addr: impl Into<String>,
        config: PoolConfig,
        registry: Arc<Registry>,
    ) -> Result<Arc<Self>> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {}", e)))?;

        let state = PoolState {
            ring: config.new_ring(),
            clients: HashMap::new(),
        };

        Ok(Arc::new(Self {
            self_addr: self_addr.into(),
            config,
            registry,
            client,
            state: Mutex::new(state),
        }))
    }

    pub fn self_addr(&self) -> &str {
        &self.self_addr
    }

    pub fn base_path(&self) -> &str {
        &self.config.base_path
    }

    /// Replace the peer set. Each address is a base URL such as
    /// `http://10.0.0.2:8001`; include this node's own address.
    pub fn set_peers<I, S>(&self, peers: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ring = self.config.new_ring();
        let mut clients = HashMap::new();

        for peer in peers {
            let peer = peer.as_ref();
            if peer.is_empty() || clients.contains_key(peer) {
                continue;
            }
            ring.add([peer]);
            clients.insert(
                peer.to_string(),
                Arc::new(HttpPeerClient::new(
                    peer,
                    &self.config.base_path,
                    self.client.clone(),
                )),
            );
        }

        info!(
            self_addr = %self.self_addr,
            peers = clients.len(),
            "Peer set updated"
        );

        let mut state = self.state.lock();
        state.ring = ring;
        state.clients = clients;
    }

    /// Current peer addresses, sorted
    pub fn peers(&self) -> Vec<String> {
        let mut peers: Vec<String> = self.state.lock().clients.keys().cloned().collect();
        peers.sort();
        peers
    }

    /// Ring owner of `key`, which may be this node
    pub fn owner(&self, key: &str) -> Option<String> {
        self.state.lock().ring.get(key).map(str::to_string)
    }

    /// Answer one peer-protocol request.
    pub async fn handle<B>(&self, req: Request<B>) -> HttpResponse {
        let path = req.uri().path().to_string();

        let request = match protocol::parse_path(&self.config.base_path, &path) {
            Ok(request) => request,
            Err(PathError::OutsideBasePath) => {
                warn!(%path, "Request outside the peer base path");
                return server::text(StatusCode::NOT_FOUND, "not found");
            }
            Err(PathError::Malformed(reason)) => {
                debug!(%path, %reason, "Malformed peer request");
                return server::text(StatusCode::BAD_REQUEST, Error::BadRequest(reason).to_string());
            }
        };

        if req.method() != Method::GET {
            debug!(method = %req.method(), %path, "Peer request with non-GET method");
        }
        debug!(self_addr = %self.self_addr, method = %req.method(), %path, "peer request");

        let Some(group) = self.registry.get(&request.group) else {
            return server::text(
                StatusCode::NOT_FOUND,
                Error::GroupNotFound(request.group).to_string(),
            );
        };

        group.record_server_request();

        match group.get(&request.key).await {
            Ok(view) => {
                let body = protocol::Response::new(view.bytes()).encode_to_vec();
                server::respond(StatusCode::OK, protocol::CONTENT_TYPE, body)
            }
            Err(e) => server::text(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        }
    }

    /// Serve the peer protocol on `listener`.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        server::serve(listener, "Peer", move |req| {
            let pool = Arc::clone(&self);
            async move { pool.handle(req).await }
        })
        .await
    }
}

impl PeerPicker for HttpPool {
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerClient>> {
        let state = self.state.lock();
        let owner = state.ring.get(key)?;
        if owner.is_empty() || owner == self.self_addr {
            return None;
        }
        let client = state.clients.get(owner)?;
        debug!(%key, peer = %owner, "Picked peer");
        Some(Arc::clone(client) as Arc<dyn PeerClient>)
    }
}

impl std::fmt::Debug for HttpPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpPool")
            .field("self_addr", &self.self_addr)
            .field("config", &self.config)
            .field("peers", &self.peers())
            .finish()
    }
}
