//! Front-end API
//!
//! A small client-facing HTTP surface over one group:
//!
//! - `GET /api?key=<key>` returns the raw value
//! - `GET /api/stats` returns the group's counters as JSON

use std::sync::Arc;

use hyper::{Request, StatusCode};
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::debug;

use crate::cache::{CacheStats, GroupStatsSnapshot};
use crate::error::{Error, Result};
use crate::group::Group;
use crate::server::{self, HttpResponse};

/// Body of `GET /api/stats`
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub group: String,
    pub stats: GroupStatsSnapshot,
    pub cache: CacheStats,
}

/// First value of `name` in a form-encoded query string.
fn query_param(query: &str, name: &str) -> Option<String> {
    let mut url = reqwest::Url::parse("http://localhost/").ok()?;
    url.set_query(Some(query));
    url.query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

/// Answer one API request against `group`.
pub async fn handle<B>(group: &Group, req: Request<B>) -> HttpResponse {
    let uri = req.into_parts().0.uri;
    match uri.path() {
        "/api" => {
            let key = uri
                .query()
                .and_then(|q| query_param(q, "key"))
                .filter(|k| !k.is_empty());
            let Some(key) = key else {
                return server::text(StatusCode::BAD_REQUEST, Error::EmptyKey.to_string());
            };

            debug!(group = %group.name(), %key, "API get");
            match group.get(&key).await {
                Ok(view) => server::respond(StatusCode::OK, "application/octet-stream", view.bytes()),
                Err(e) => server::text(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            }
        }
        "/api/stats" => {
            let body = StatsResponse {
                group: group.name().to_string(),
                stats: group.stats().snapshot(),
                cache: group.cache_stats(),
            };
            match serde_json::to_vec(&body) {
                Ok(json) => server::respond(StatusCode::OK, "application/json", json),
                Err(e) => server::text(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            }
        }
        _ => server::text(StatusCode::NOT_FOUND, "not found"),
    }
}

/// Serve the API for `group` on `listener`.
pub async fn serve(listener: TcpListener, group: Arc<Group>) -> Result<()> {
    server::serve(listener, "API", move |req| {
        let group = Arc::clone(&group);
        async move { handle(&group, req).await }
    })
    .await
}
