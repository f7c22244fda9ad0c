//! Cache Groups
//!
//! A group is a named, independently bounded cache with a loader for misses.
//! A lookup is served, in order, from the local cache, from the key's owning
//! peer, or from the loader.
//!
//! ```text
//! get(key) ──▶ local cache hit? ──yes──▶ return
//!                   │ no
//!                   ▼
//!           coalesce by key ──▶ remote owner? ──yes──▶ fetch from peer ──ok──▶ return
//!                                    │ no                    │ err
//!                                    ▼                       ▼
//!                              loader(key) ◀─────────── fall back
//!                                    │
//!                                    ▼
//!                      populate local cache, return
//! ```
//!
//! Values fetched from a peer are not cached locally: only the owner keeps a
//! copy, which bounds cluster memory to about one copy per key.

mod registry;

use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

use crate::cache::{ByteView, CacheStats, GroupStats, LocalCache};
use crate::error::{Error, Result};
use crate::peers::{PeerClient, PeerPicker};
use crate::singleflight::SingleFlight;

pub use registry::{get_group, Registry};

/// Default cache bound when the builder is not given one (2 KiB)
pub const DEFAULT_CACHE_BYTES: usize = 2 << 10;

// =============================================================================
// Loader
// =============================================================================

/// Source of truth consulted on a miss.
pub trait Loader: Send + Sync {
    /// Produce the value for `key`, or an error (typically
    /// [`Error::KeyNotFound`]) when there is none.
    fn load(&self, key: &str) -> Result<Vec<u8>>;
}

/// Adapter that lets a closure act as a [`Loader`].
pub struct LoaderFn<F>(pub F);

impl<F> Loader for LoaderFn<F>
where
    F: Fn(&str) -> Result<Vec<u8>> + Send + Sync,
{
    fn load(&self, key: &str) -> Result<Vec<u8>> {
        (self.0)(key)
    }
}

// =============================================================================
// Group
// =============================================================================

/// A named cache namespace.
pub struct Group {
    name: String,
    loader: Arc<dyn Loader>,
    main_cache: LocalCache,
    peers: OnceCell<Arc<dyn PeerPicker>>,
    flight: SingleFlight<Result<ByteView>>,
    stats: GroupStats,
}

impl Group {
    /// Start building a group named `name`.
    pub fn builder(name: impl Into<String>) -> GroupBuilder {
        GroupBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attach the peer picker. Allowed once per group.
    pub fn register_peers(&self, peers: Arc<dyn PeerPicker>) -> Result<()> {
        self.peers
            .set(peers)
            .map_err(|_| Error::PeersAlreadyRegistered(self.name.clone()))
    }

    /// Fetch the value for `key`.
    #[instrument(skip(self), fields(group = %self.name))]
    pub async fn get(&self, key: &str) -> Result<ByteView> {
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }

        self.stats.record_get();
        if let Some(value) = self.main_cache.get(key) {
            self.stats.record_cache_hit();
            debug!(key, "cache hit");
            return Ok(value);
        }

        self.load(key).await
    }

    async fn load(&self, key: &str) -> Result<ByteView> {
        self.stats.record_load();
        self.flight
            .run(key, || async {
                // Another generation may have populated the cache since our miss.
                if let Some(value) = self.main_cache.get(key) {
                    self.stats.record_cache_hit();
                    return Ok(value);
                }
                self.stats.record_load_deduped();

                if let Some(peer) = self.peers.get().and_then(|picker| picker.pick_peer(key)) {
                    match self.get_from_peer(peer.as_ref(), key).await {
                        Ok(value) => {
                            self.stats.record_peer_load();
                            return Ok(value);
                        }
                        Err(e) => {
                            self.stats.record_peer_error();
                            warn!(peer = peer.addr(), key, error = %e, "peer fetch failed, loading locally");
                        }
                    }
                }

                self.get_locally(key).await
            })
            .await
    }

    /// Run the loader on the blocking pool so a slow source only stalls this key.
    async fn get_locally(&self, key: &str) -> Result<ByteView> {
        let loader = Arc::clone(&self.loader);
        let owned_key = key.to_string();
        let loaded = tokio::task::spawn_blocking(move || loader.load(&owned_key))
            .await
            .unwrap_or_else(|e| Err(Error::Internal(format!("loader task failed: {}", e))));

        let bytes = match loaded {
            Ok(bytes) => bytes,
            Err(e) => {
                self.stats.record_local_load_err();
                debug!(key, error = %e, "loader failed");
                return Err(e);
            }
        };
        self.stats.record_local_load();

        let value = ByteView::from(bytes);
        self.populate_cache(key, value.clone());
        Ok(value)
    }

    async fn get_from_peer(&self, peer: &dyn PeerClient, key: &str) -> Result<ByteView> {
        debug!(peer = peer.addr(), key, "fetching from owner");
        let bytes = peer.fetch(&self.name, key).await?;
        Ok(ByteView::from(bytes))
    }

    fn populate_cache(&self, key: &str, value: ByteView) {
        self.main_cache.add(key, value);
    }

    /// Request counters
    pub fn stats(&self) -> &GroupStats {
        &self.stats
    }

    /// Local cache counters
    pub fn cache_stats(&self) -> CacheStats {
        self.main_cache.stats()
    }

    pub(crate) fn record_server_request(&self) {
        self.stats.record_server_request();
    }
}

impl std::fmt::Debug for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group")
            .field("name", &self.name)
            .field("cache", &self.main_cache)
            .field("has_peers", &self.peers.get().is_some())
            .finish()
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`Group`]; `build` registers the group.
pub struct GroupBuilder {
    name: String,
    cache_bytes: usize,
    loader: Option<Arc<dyn Loader>>,
    registry: Option<Arc<Registry>>,
}

impl GroupBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cache_bytes: DEFAULT_CACHE_BYTES,
            loader: None,
            registry: None,
        }
    }

    /// Bound the local cache (0 = unbounded)
    pub fn cache_bytes(mut self, cache_bytes: usize) -> Self {
        self.cache_bytes = cache_bytes;
        self
    }

    pub fn loader(mut self, loader: impl Loader + 'static) -> Self {
        self.loader = Some(Arc::new(loader));
        self
    }

    /// Use a closure as the loader
    pub fn loader_fn<F>(self, f: F) -> Self
    where
        F: Fn(&str) -> Result<Vec<u8>> + Send + Sync + 'static,
    {
        self.loader(LoaderFn(f))
    }

    /// Register into `registry` instead of the process-wide one
    pub fn registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn build(self) -> Result<Arc<Group>> {
        if self.name.is_empty() {
            return Err(Error::Config("group name is required".to_string()));
        }
        let loader = self
            .loader
            .ok_or_else(|| Error::Config(format!("group {} has no loader", self.name)))?;
        let registry = self.registry.unwrap_or_else(Registry::global);

        let group = Arc::new(Group {
            name: self.name,
            loader,
            main_cache: LocalCache::new(self.cache_bytes),
            peers: OnceCell::new(),
            flight: SingleFlight::new(),
            stats: GroupStats::new(),
        });
        registry.register(Arc::clone(&group))?;

        info!(
            group = %group.name,
            cache_bytes = self.cache_bytes,
            "group registered"
        );
        Ok(group)
    }
}

/// Create a group in the process-wide registry.
pub fn new_group(
    name: impl Into<String>,
    cache_bytes: usize,
    loader: impl Loader + 'static,
) -> Result<Arc<Group>> {
    Group::builder(name)
        .cache_bytes(cache_bytes)
        .loader(loader)
        .build()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn db() -> HashMap<&'static str, &'static str> {
        HashMap::from([("Tom", "630"), ("Jack", "589"), ("Sam", "567")])
    }

    /// Group over `db()` that counts loader calls per key.
    fn counting_group(
        name: &str,
        registry: &Arc<Registry>,
    ) -> (Arc<Group>, Arc<parking_lot::Mutex<HashMap<String, usize>>>) {
        let counts = Arc::new(parking_lot::Mutex::new(HashMap::new()));
        let sink = Arc::clone(&counts);
        let data = db();
        let group = Group::builder(name)
            .cache_bytes(2 << 10)
            .registry(Arc::clone(registry))
            .loader_fn(move |key| {
                *sink.lock().entry(key.to_string()).or_insert(0) += 1;
                data.get(key)
                    .map(|v| v.as_bytes().to_vec())
                    .ok_or_else(|| Error::KeyNotFound(key.to_string()))
            })
            .build()
            .unwrap();
        (group, counts)
    }

    struct FakePeer {
        result: Result<Bytes>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PeerClient for FakePeer {
        async fn fetch(&self, _group: &str, _key: &str) -> Result<Bytes> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }

        fn addr(&self) -> &str {
            "http://fake-peer"
        }
    }

    struct AlwaysRemote(Arc<FakePeer>);

    impl PeerPicker for AlwaysRemote {
        fn pick_peer(&self, _key: &str) -> Option<Arc<dyn PeerClient>> {
            Some(Arc::clone(&self.0) as Arc<dyn PeerClient>)
        }
    }

    struct NeverRemote;

    impl PeerPicker for NeverRemote {
        fn pick_peer(&self, _key: &str) -> Option<Arc<dyn PeerClient>> {
            None
        }
    }

    #[test]
    fn test_loader_fn_adapter() {
        let loader = LoaderFn(|key: &str| -> Result<Vec<u8>> { Ok(key.as_bytes().to_vec()) });
        assert_eq!(loader.load("abc").unwrap(), b"abc");
    }

    #[tokio::test]
    async fn test_get_loads_once_then_hits_cache() {
        let registry = Arc::new(Registry::new());
        let (group, counts) = counting_group("scores", &registry);

        for (key, value) in db() {
            let view = group.get(key).await.unwrap();
            assert_eq!(view.to_string(), value);
            // Second lookup must come from the cache
            let view = group.get(key).await.unwrap();
            assert_eq!(view.to_string(), value);
            assert_eq!(counts.lock()[key], 1, "cache {} miss", key);
        }

        let stats = group.stats().snapshot();
        assert_eq!(stats.gets, 6);
        assert_eq!(stats.cache_hits, 3);
        assert_eq!(stats.local_loads, 3);
        assert_eq!(group.cache_stats().items, 3);
    }

    #[tokio::test]
    async fn test_missing_key_is_not_cached() {
        let registry = Arc::new(Registry::new());
        let (group, counts) = counting_group("scores", &registry);

        let err = group.get("unknown").await.unwrap_err();
        assert_matches!(err, Error::KeyNotFound(ref k) if k == "unknown");
        assert_eq!(group.cache_stats().items, 0);

        // A failed load is retried on the next call
        assert!(group.get("unknown").await.is_err());
        assert_eq!(counts.lock()["unknown"], 2);
        assert_eq!(group.stats().local_load_errs(), 2);
    }

    #[tokio::test]
    async fn test_empty_key_rejected() {
        let registry = Arc::new(Registry::new());
        let (group, counts) = counting_group("scores", &registry);

        assert_matches!(group.get("").await, Err(Error::EmptyKey));
        assert!(counts.lock().is_empty());
        assert_eq!(group.stats().gets(), 0);
    }

    #[tokio::test]
    async fn test_register_peers_twice_fails() {
        let registry = Arc::new(Registry::new());
        let (group, _) = counting_group("scores", &registry);

        assert!(group.register_peers(Arc::new(NeverRemote)).is_ok());
        assert_matches!(
            group.register_peers(Arc::new(NeverRemote)),
            Err(Error::PeersAlreadyRegistered(ref name)) if name == "scores"
        );
    }

    #[test]
    fn test_builder_requires_loader() {
        let registry = Arc::new(Registry::new());
        let result = Group::builder("scores").registry(Arc::clone(&registry)).build();
        assert_matches!(result, Err(Error::Config(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_builder_requires_name() {
        let result = Group::builder("")
            .registry(Arc::new(Registry::new()))
            .loader_fn(|_| Ok(Vec::new()))
            .build();
        assert_matches!(result, Err(Error::Config(_)));
    }

    #[test]
    fn test_registry_lookup_and_duplicates() {
        let registry = Arc::new(Registry::new());
        let (group, _) = counting_group("scores", &registry);

        let found = registry.get("scores").unwrap();
        assert!(Arc::ptr_eq(&found, &group));
        assert!(registry.get("missing").is_none());

        let dup = Group::builder("scores")
            .registry(Arc::clone(&registry))
            .loader_fn(|_| Ok(Vec::new()))
            .build();
        assert_matches!(dup, Err(Error::DuplicateGroup(_)));
        assert_eq!(registry.names(), vec!["scores".to_string()]);
    }

    #[test]
    fn test_global_registry() {
        let group = new_group(
            "group-mod-global-test",
            0,
            LoaderFn(|key: &str| -> Result<Vec<u8>> { Ok(key.as_bytes().to_vec()) }),
        )
        .unwrap();
        let found = get_group("group-mod-global-test").unwrap();
        assert!(Arc::ptr_eq(&found, &group));
    }

    #[tokio::test]
    async fn test_remote_hit_is_not_cached_locally() {
        let registry = Arc::new(Registry::new());
        let (group, counts) = counting_group("scores", &registry);
        let peer = Arc::new(FakePeer {
            result: Ok(Bytes::from_static(b"remote")),
            calls: AtomicUsize::new(0),
        });
        group
            .register_peers(Arc::new(AlwaysRemote(Arc::clone(&peer))))
            .unwrap();

        assert_eq!(group.get("Tom").await.unwrap().to_string(), "remote");
        assert_eq!(group.get("Tom").await.unwrap().to_string(), "remote");

        assert_eq!(peer.calls.load(Ordering::SeqCst), 2);
        assert!(counts.lock().is_empty());
        assert_eq!(group.cache_stats().items, 0);
        assert_eq!(group.stats().peer_loads(), 2);
    }

    #[tokio::test]
    async fn test_remote_failure_falls_back_to_loader() {
        let registry = Arc::new(Registry::new());
        let (group, counts) = counting_group("scores", &registry);
        let peer = Arc::new(FakePeer {
            result: Err(Error::PeerRequest("connection refused".into())),
            calls: AtomicUsize::new(0),
        });
        group
            .register_peers(Arc::new(AlwaysRemote(Arc::clone(&peer))))
            .unwrap();

        assert_eq!(group.get("Jack").await.unwrap().to_string(), "589");
        assert_eq!(peer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(counts.lock()["Jack"], 1);
        assert_eq!(group.stats().peer_errors(), 1);

        // Fallback populated the local cache
        assert_eq!(group.get("Jack").await.unwrap().to_string(), "589");
        assert_eq!(peer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_self_owned_key_uses_loader() {
        let registry = Arc::new(Registry::new());
        let (group, counts) = counting_group("scores", &registry);
        group.register_peers(Arc::new(NeverRemote)).unwrap();

        assert_eq!(group.get("Sam").await.unwrap().to_string(), "567");
        assert_eq!(counts.lock()["Sam"], 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_misses_load_once() {
        let registry = Arc::new(Registry::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let group = Group::builder("slow")
            .registry(Arc::clone(&registry))
            .loader_fn(move |key| {
                counter.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(std::time::Duration::from_millis(50));
                Ok(key.as_bytes().to_vec())
            })
            .build()
            .unwrap();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let group = Arc::clone(&group);
                tokio::spawn(async move { group.get("hot").await })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().to_string(), "hot");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_slow_loader_does_not_block_other_keys() {
        use std::time::{Duration, Instant};

        let registry = Arc::new(Registry::new());
        let group = Group::builder("blocking")
            .registry(Arc::clone(&registry))
            .loader_fn(|key: &str| -> Result<Vec<u8>> {
                if key == "slow" {
                    std::thread::sleep(Duration::from_millis(500));
                }
                Ok(key.as_bytes().to_vec())
            })
            .build()
            .unwrap();

        // Single-threaded runtime: the slow load must not occupy the only worker
        let started = Instant::now();
        let slow = {
            let group = Arc::clone(&group);
            tokio::spawn(async move { group.get("slow").await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(group.get("fast").await.unwrap().to_string(), "fast");
        assert!(
            started.elapsed() < Duration::from_millis(400),
            "fast key waited {:?}",
            started.elapsed()
        );
        assert!(!slow.is_finished());

        assert_eq!(slow.await.unwrap().unwrap().to_string(), "slow");
    }
}
