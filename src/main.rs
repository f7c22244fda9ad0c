//! peercache node
//!
//! Runs one cache node: the peer-protocol server on the address in
//! `--self-addr`, an optional front-end API, and the health/metrics server.
//!
//! ```text
//! ┌──────────────── node ────────────────┐
//! │  API (:9999) ──▶ Group ◀── Peer (:8001) ◀──── other nodes
//! │                   │                  │
//! │                   ▼                  │
//! │                HttpPool ─────────────┼────▶ owners
//! │  Metrics (:9100)                     │
//! └──────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use futures::future::{self, BoxFuture, FutureExt};
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use peercache::error::{Error, Result};
use peercache::{api, metrics, server, Group, HttpPool, PoolConfig, Registry};

// =============================================================================
// CLI Arguments
// =============================================================================

/// peercache - distributed read-through cache node
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// This node's base URL, as other peers reach it
    #[arg(long, env = "CACHE_SELF_ADDR", default_value = "http://localhost:8001")]
    self_addr: String,

    /// Comma-separated base URLs of all nodes (defaults to this node only)
    #[arg(long, env = "CACHE_PEERS", value_delimiter = ',')]
    peers: Vec<String>,

    /// Name of the served group
    #[arg(long, env = "CACHE_GROUP", default_value = "scores")]
    group: String,

    /// Local cache bound in bytes (0 = unbounded)
    #[arg(long, env = "CACHE_BYTES", default_value = "2048")]
    cache_bytes: usize,

    /// URL prefix of peer requests
    #[arg(long, env = "CACHE_BASE_PATH", default_value = peercache::peers::DEFAULT_BASE_PATH)]
    base_path: String,

    /// Virtual nodes per peer on the hash ring
    #[arg(long, env = "CACHE_REPLICAS", default_value = "50")]
    replicas: usize,

    /// Peer request timeout in seconds
    #[arg(long, env = "CACHE_PEER_TIMEOUT_SECONDS", default_value = "10")]
    peer_timeout_seconds: u64,

    /// JSON object file used as the backing data source
    #[arg(long, env = "CACHE_SOURCE")]
    source: Option<String>,

    /// Front-end API bind address (disabled when unset)
    #[arg(long, env = "API_ADDR")]
    api_addr: Option<String>,

    /// Health/metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:9100")]
    metrics_addr: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    info!("Starting peercache node");
    info!("  Self address: {}", args.self_addr);
    info!("  Group: {} ({} bytes)", args.group, args.cache_bytes);

    let source = load_source(args.source.as_deref())?;
    info!("  Source entries: {}", source.len());

    let registry = Registry::global();
    let group = Group::builder(args.group.clone())
        .cache_bytes(args.cache_bytes)
        .loader_fn(move |key: &str| -> Result<Vec<u8>> {
            info!("[SlowDB] search key {}", key);
            source
                .get(key)
                .map(|v| v.clone().into_bytes())
                .ok_or_else(|| Error::KeyNotFound(key.to_string()))
        })
        .registry(Arc::clone(&registry))
        .build()?;

    let config = PoolConfig {
        base_path: args.base_path.clone(),
        replicas: args.replicas,
        request_timeout: Duration::from_secs(args.peer_timeout_seconds),
        hash: None,
    };
    let pool = HttpPool::with_registry(args.self_addr.clone(), config, Arc::clone(&registry))?;

    let peers = if args.peers.is_empty() {
        vec![args.self_addr.clone()]
    } else {
        args.peers.clone()
    };
    info!("  Peers: {}", peers.join(", "));
    pool.set_peers(&peers);
    group.register_peers(pool.clone())?;

    let mut servers: Vec<BoxFuture<'static, Result<()>>> = Vec::new();

    // Metrics server
    let metrics_listener = server::bind(&args.metrics_addr).await?;
    servers.push(metrics::serve(metrics_listener, Arc::clone(&registry)).boxed());

    // API server
    if let Some(api_addr) = &args.api_addr {
        let api_listener = server::bind(api_addr).await?;
        servers.push(api::serve(api_listener, Arc::clone(&group)).boxed());
    }

    // Peer server
    let listen_addr = listen_addr(&args.self_addr)?;
    let listener = server::bind(&listen_addr).await?;
    servers.push(pool.serve(listener).boxed());

    // Servers only return on failure; the first one stops the node
    if let Err(e) = future::try_join_all(servers).await {
        error!("Server error: {}", e);
        return Err(e);
    }

    info!("Node shutdown complete");
    Ok(())
}

// =============================================================================
// Data Source
// =============================================================================

fn load_source(path: Option<&str>) -> Result<HashMap<String, String>> {
    let Some(path) = path else {
        return Ok(HashMap::from([
            ("Tom".to_string(), "630".to_string()),
            ("Jack".to_string(), "589".to_string()),
            ("Sam".to_string(), "567".to_string()),
        ]));
    };

    let contents = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read source {}: {}", path, e)))?;
    serde_json::from_str(&contents)
        .map_err(|e| Error::Config(format!("Invalid source {}: {}", path, e)))
}

/// Socket address to listen on for a base URL such as `http://localhost:8001`.
fn listen_addr(self_addr: &str) -> Result<String> {
    let url = reqwest::Url::parse(self_addr)
        .map_err(|e| Error::Config(format!("Invalid self address {}: {}", self_addr, e)))?;

    let host = match url.host_str() {
        Some("localhost") => "127.0.0.1",
        Some(host) => host,
        None => {
            return Err(Error::Config(format!(
                "self address has no host: {}",
                self_addr
            )))
        }
    };
    let port = url
        .port_or_known_default()
        .ok_or_else(|| Error::Config(format!("self address has no port: {}", self_addr)))?;

    Ok(format!("{}:{}", host, port))
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "reqwest=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
