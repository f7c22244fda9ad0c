//! Health and Prometheus Exposition
//!
//! Serves `/healthz`, `/livez`, `/readyz` and `/metrics`. Group counters
//! live in atomics on each group; a scrape copies them into a fresh
//! prometheus registry and encodes that, so nothing is registered globally.

use std::sync::Arc;

use hyper::{Request, StatusCode};
use prometheus::{Encoder, GaugeVec, IntCounterVec, IntGaugeVec, Opts, TextEncoder};
use tokio::net::TcpListener;

use crate::error::{Error, Result};
use crate::group::Registry;
use crate::server::{self, HttpResponse};

const NAMESPACE: &str = "peercache";

fn prom_err(e: prometheus::Error) -> Error {
    Error::Internal(format!("metrics encoding failed: {}", e))
}

fn counter(registry: &prometheus::Registry, name: &str, help: &str) -> Result<IntCounterVec> {
    let vec = IntCounterVec::new(Opts::new(name, help).namespace(NAMESPACE), &["group"])
        .map_err(prom_err)?;
    registry.register(Box::new(vec.clone())).map_err(prom_err)?;
    Ok(vec)
}

fn gauge(registry: &prometheus::Registry, name: &str, help: &str) -> Result<IntGaugeVec> {
    let vec = IntGaugeVec::new(Opts::new(name, help).namespace(NAMESPACE), &["group"])
        .map_err(prom_err)?;
    registry.register(Box::new(vec.clone())).map_err(prom_err)?;
    Ok(vec)
}

/// Render every group in `groups` in the Prometheus text format.
pub fn render(groups: &Registry) -> Result<String> {
    let registry = prometheus::Registry::new();

    let gets = counter(&registry, "gets_total", "Get calls")?;
    let cache_hits = counter(&registry, "cache_hits_total", "Gets served by the local cache")?;
    let peer_loads = counter(&registry, "peer_loads_total", "Values fetched from a peer")?;
    let peer_errors = counter(&registry, "peer_errors_total", "Failed peer fetches")?;
    let loads = counter(&registry, "loads_total", "Cache misses entering the load path")?;
    let loads_deduped = counter(
        &registry,
        "loads_deduped_total",
        "Loads that ran after coalescing",
    )?;
    let local_loads = counter(&registry, "local_loads_total", "Successful loader calls")?;
    let local_load_errs = counter(&registry, "local_load_errors_total", "Failed loader calls")?;
    let server_requests = counter(
        &registry,
        "server_requests_total",
        "Peer requests served for the group",
    )?;
    let evictions = counter(&registry, "cache_evictions_total", "Entries evicted")?;
    let cache_bytes = gauge(&registry, "cache_bytes", "Bytes held by the local cache")?;
    let cache_items = gauge(&registry, "cache_items", "Entries held by the local cache")?;

    let hit_ratio = GaugeVec::new(
        Opts::new("hit_ratio", "Cache hits per get").namespace(NAMESPACE),
        &["group"],
    )
    .map_err(prom_err)?;
    registry
        .register(Box::new(hit_ratio.clone()))
        .map_err(prom_err)?;

    for group in groups.groups() {
        let label = [group.name()];
        let stats = group.stats().snapshot();
        let cache = group.cache_stats();

        gets.with_label_values(&label).inc_by(stats.gets);
        cache_hits.with_label_values(&label).inc_by(stats.cache_hits);
        peer_loads.with_label_values(&label).inc_by(stats.peer_loads);
        peer_errors.with_label_values(&label).inc_by(stats.peer_errors);
        loads.with_label_values(&label).inc_by(stats.loads);
        loads_deduped.with_label_values(&label).inc_by(stats.loads_deduped);
        local_loads.with_label_values(&label).inc_by(stats.local_loads);
        local_load_errs.with_label_values(&label).inc_by(stats.local_load_errs);
        server_requests.with_label_values(&label).inc_by(stats.server_requests);
        evictions.with_label_values(&label).inc_by(cache.evictions);
        cache_bytes.with_label_values(&label).set(cache.bytes as i64);
        cache_items.with_label_values(&label).set(cache.items as i64);
        hit_ratio.with_label_values(&label).set(stats.hit_ratio);
    }

    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&registry.gather(), &mut buffer)
        .map_err(prom_err)?;
    String::from_utf8(buffer).map_err(|e| Error::Internal(e.to_string()))
}

/// Answer one observability request.
pub fn handle<B>(groups: &Registry, req: &Request<B>) -> HttpResponse {
    match req.uri().path() {
        "/healthz" | "/livez" | "/readyz" => server::text(StatusCode::OK, "ok"),
        "/metrics" => match render(groups) {
            Ok(body) => server::respond(StatusCode::OK, "text/plain; version=0.0.4", body),
            Err(e) => server::text(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        },
        _ => server::text(StatusCode::NOT_FOUND, "not found"),
    }
}

/// Serve health and metrics endpoints for `groups`.
pub async fn serve(listener: TcpListener, groups: Arc<Registry>) -> Result<()> {
    server::serve(listener, "Metrics", move |req| {
        let response = handle(&groups, &req);
        async move { response }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::Group;
    use http_body_util::{BodyExt, Empty};
    use hyper::body::Bytes;

    fn get(path: &str) -> Request<Empty<Bytes>> {
        Request::builder().uri(path).body(Empty::new()).unwrap()
    }

    #[tokio::test]
    async fn test_health_routes() {
        let groups = Registry::new();
        for path in ["/healthz", "/livez", "/readyz"] {
            let response = handle(&groups, &get(path));
            assert_eq!(response.status(), StatusCode::OK);
            let body = response.into_body().collect().await.unwrap().to_bytes();
            assert_eq!(body.as_ref(), b"ok\n");
        }
        assert_eq!(
            handle(&groups, &get("/nope")).status(),
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn test_render_labels_groups() {
        let groups = Arc::new(Registry::new());
        let group = Group::builder("scores")
            .loader_fn(|key: &str| -> Result<Vec<u8>> { Ok(key.as_bytes().to_vec()) })
            .registry(Arc::clone(&groups))
            .build()
            .unwrap();

        group.get("Tom").await.unwrap();
        group.get("Tom").await.unwrap();

        let text = render(&groups).unwrap();
        assert!(text.contains("peercache_gets_total{group=\"scores\"} 2"), "{}", text);
        assert!(text.contains("peercache_cache_hits_total{group=\"scores\"} 1"));
        assert!(text.contains("peercache_local_loads_total{group=\"scores\"} 1"));
        assert!(text.contains("peercache_cache_items{group=\"scores\"} 1"));
        assert!(text.contains("peercache_hit_ratio{group=\"scores\"} 0.5"));
    }

    #[test]
    fn test_render_empty_registry() {
        // Vectors without children are omitted from the exposition
        let text = render(&Registry::new()).unwrap();
        assert!(!text.contains("group="));
    }
}
