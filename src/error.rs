//! Error types for peercache

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while serving or fetching cached values.
///
/// Every variant carries owned strings so the type is `Clone`: one outcome of a
/// coalesced load is handed to every caller that waited on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // =========================================================================
    // Validation Errors
    // =========================================================================
    /// Empty key
    #[error("key is required")]
    EmptyKey,

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A peer picker was registered twice for the same group
    #[error("Peer picker already registered for group: {0}")]
    PeersAlreadyRegistered(String),

    /// A group with this name already exists in the registry
    #[error("Group already registered: {0}")]
    DuplicateGroup(String),

    // =========================================================================
    // Upstream Load Errors
    // =========================================================================
    /// The data source has no value for the key
    #[error("{0} not exist")]
    KeyNotFound(String),

    /// The loader failed for a reason other than a missing key
    #[error("Loading key {key} failed: {reason}")]
    Load { key: String, reason: String },

    // =========================================================================
    // Remote Peer Errors
    // =========================================================================
    /// Transport failure talking to a peer
    #[error("Peer request failed: {0}")]
    PeerRequest(String),

    /// Peer answered with a non-success status
    #[error("Peer {peer} returned status {status}")]
    PeerStatus { peer: String, status: u16 },

    /// Peer response body could not be decoded
    #[error("Failed to decode peer response: {0}")]
    Decode(String),

    // =========================================================================
    // Protocol Errors
    // =========================================================================
    /// Malformed peer request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// No group registered under this name
    #[error("no such group: {0}")]
    GroupNotFound(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for failures of a remote peer call, which callers answer with a
    /// local load instead of failing the request.
    pub fn is_peer_failure(&self) -> bool {
        matches!(
            self,
            Error::PeerRequest(_) | Error::PeerStatus { .. } | Error::Decode(_)
        )
    }
}
