//! Peer Wire Protocol
//!
//! One unary exchange per remote fetch:
//!
//! ```text
//! GET <peer><base_path><group>/<key>        (segments percent-encoded)
//! 200 application/octet-stream              body = protobuf Response { value }
//! ```
//!
//! The `Request` message mirrors the path so the same pair can be carried in a
//! body by other transports.

use bytes::Bytes;
use prost::Message;

use crate::error::{Error, Result};

/// Content type of a successful peer response
pub const CONTENT_TYPE: &str = "application/octet-stream";

/// Lookup of `key` in `group`
#[derive(Clone, PartialEq, Message)]
pub struct Request {
    #[prost(string, tag = "1")]
    pub group: String,
    #[prost(string, tag = "2")]
    pub key: String,
}

/// Value returned by the owner
#[derive(Clone, PartialEq, Message)]
pub struct Response {
    #[prost(bytes = "bytes", tag = "1")]
    pub value: Bytes,
}

impl Request {
    pub fn new(group: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            key: key.into(),
        }
    }

    pub fn decode_from(buf: &[u8]) -> Result<Self> {
        Self::decode(buf).map_err(|e| Error::Decode(e.to_string()))
    }
}

impl Response {
    pub fn new(value: impl Into<Bytes>) -> Self {
        Self {
            value: value.into(),
        }
    }

    pub fn decode_from(buf: &[u8]) -> Result<Self> {
        Self::decode(buf).map_err(|e| Error::Decode(e.to_string()))
    }
}

/// Why a request path was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// Path does not start with the base path
    OutsideBasePath,
    /// Remainder is not `<group>/<key>` or does not decode
    Malformed(String),
}

/// Marks a segment that would otherwise be a `.` or `..` dot segment.
const DOT_SEGMENT_MARK: char = '~';

/// Percent-encode one path segment.
///
/// URL parsers drop `.` and `..` segments (even as `%2E`), so those are
/// prefixed with `~`. A leading `~` in any other segment is written as `%7E`,
/// which keeps a raw leading `~` unambiguous.
fn encode_segment(segment: &str) -> String {
    let encoded = urlencoding::encode(segment);
    if segment == "." || segment == ".." {
        format!("{}{}", DOT_SEGMENT_MARK, encoded)
    } else if let Some(rest) = encoded.strip_prefix(DOT_SEGMENT_MARK) {
        format!("%7E{}", rest)
    } else {
        encoded.into_owned()
    }
}

fn decode_segment(raw: &str) -> std::result::Result<String, PathError> {
    let raw = raw.strip_prefix(DOT_SEGMENT_MARK).unwrap_or(raw);
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .map_err(|e| PathError::Malformed(e.to_string()))
}

/// Build the URL for `req` against a peer's `base_url` (`<peer><base_path>`).
pub fn request_url(base_url: &str, req: &Request) -> String {
    format!(
        "{}{}/{}",
        base_url,
        encode_segment(&req.group),
        encode_segment(&req.key)
    )
}

/// Split a raw request path into a [`Request`].
///
/// The remainder after `base_path` is split on its first `/`; both parts are
/// then decoded.
pub fn parse_path(base_path: &str, path: &str) -> std::result::Result<Request, PathError> {
    let rest = path
        .strip_prefix(base_path)
        .ok_or(PathError::OutsideBasePath)?;

    let (group, key) = rest
        .split_once('/')
        .ok_or_else(|| PathError::Malformed(format!("expected <group>/<key>, got {:?}", rest)))?;

    Ok(Request::new(decode_segment(group)?, decode_segment(key)?))
}

// =============================================================================
// Tests
// =============================================================================
