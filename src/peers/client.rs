//! HTTP client for one remote peer.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use tracing::{debug, instrument};

use super::protocol::{self, Request, Response};
use super::PeerClient;
use crate::error::{Error, Result};

/// Performs peer fetches against `<peer><base_path>`.
///
/// Instances are created once per known peer and share the pool's
/// `reqwest::Client`, so connections are reused across requests.
#[derive(Debug, Clone)]
pub struct HttpPeerClient {
    peer: String,
    base_url: String,
    client: Client,
}

impl HttpPeerClient {
    pub fn new(peer: impl Into<String>, base_path: &str, client: Client) -> Self {
        let peer = peer.into();
        let base_url = format!("{}{}", peer.trim_end_matches('/'), base_path);
        Self {
            peer,
            base_url,
            client,
        }
    }

    /// `<peer><base_path>`
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send `req` and decode the owner's response.
    #[instrument(skip(self, req), fields(peer = %self.peer, group = %req.group, key = %req.key))]
    pub async fn call(&self, req: &Request) -> Result<Response> {
        let url = protocol::request_url(&self.base_url, req);
        debug!(%url, "peer request");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::PeerRequest(e.to_string()))?;

        if response.status() != StatusCode::OK {
            return Err(Error::PeerStatus {
                peer: self.peer.clone(),
                status: response.status().as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::PeerRequest(format!("reading response body: {}", e)))?;

        Response::decode_from(&body)
    }
}

#[async_trait]
impl PeerClient for HttpPeerClient {
    async fn fetch(&self, group: &str, key: &str) -> Result<Bytes> {
        let response = self.call(&Request::new(group, key)).await?;
        Ok(response.value)
    }

    fn addr(&self) -> &str {
        &self.peer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url() {
        let client = HttpPeerClient::new("http://10.0.0.2:8001", "/_cache/", Client::new());
        assert_eq!(client.base_url(), "http://10.0.0.2:8001/_cache/");
        assert_eq!(client.addr(), "http://10.0.0.2:8001");

        let client = HttpPeerClient::new("http://10.0.0.2:8001/", "/_cache/", Client::new());
        assert_eq!(client.base_url(), "http://10.0.0.2:8001/_cache/");
    }

    #[tokio::test]
    async fn test_unreachable_peer_is_peer_failure() {
        // Port 9 (discard) on localhost is not expected to accept connections
        let client = HttpPeerClient::new("http://127.0.0.1:9", "/_cache/", Client::new());
        let err = client.fetch("scores", "Tom").await.unwrap_err();
        assert!(err.is_peer_failure(), "{:?}", err);
    }
}
