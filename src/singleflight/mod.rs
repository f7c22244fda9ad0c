//! Request Coalescing
//!
//! Collapses concurrent calls for the same key into one execution. The first
//! caller (the leader) runs the work; everyone arriving while it is in flight
//! waits and receives a clone of the leader's outcome.
//!
//! # Generations
//!
//! ```text
//! caller A ──▶ [publish record] ──▶ run work ──▶ store ──▶ [remove record]
//! caller B ──────▶ join record ──────────── wait ──▶ clone outcome
//! caller C ───────────────────────────────────────────────────────▶ new generation
//! ```
//!
//! Outcomes are never kept past the generation: a caller arriving after the
//! record is removed always triggers fresh work, so failures are not cached.
//! If the leader is dropped before publishing, its record is removed and the
//! waiters race to lead the next generation.

use std::future::Future;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::watch;
use tracing::trace;

type Slot<T> = watch::Receiver<Option<T>>;

/// Deduplicates concurrent work by key.
pub struct SingleFlight<T> {
    calls: DashMap<String, Slot<T>>,
}

enum Role<T> {
    Leader(watch::Sender<Option<T>>, Slot<T>),
    Follower(Slot<T>),
}

/// Removes the leader's record when the leader finishes or is dropped.
struct CallGuard<'a, T> {
    calls: &'a DashMap<String, Slot<T>>,
    key: &'a str,
    slot: Slot<T>,
}

impl<T> Drop for CallGuard<'_, T> {
    fn drop(&mut self) {
        self.calls
            .remove_if(self.key, |_, current| current.same_channel(&self.slot));
    }
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync,
{
    pub fn new() -> Self {
        Self {
            calls: DashMap::new(),
        }
    }

    /// Run `work` for `key` unless a call for `key` is already in flight, in
    /// which case wait for that call and return its outcome.
    pub async fn run<F, Fut>(&self, key: &str, work: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let (tx, slot) = loop {
            let role = match self.calls.entry(key.to_string()) {
                Entry::Occupied(entry) => Role::Follower(entry.get().clone()),
                Entry::Vacant(entry) => {
                    let (tx, rx) = watch::channel(None);
                    entry.insert(rx.clone());
                    Role::Leader(tx, rx)
                }
            };

            match role {
                Role::Leader(tx, slot) => break (tx, slot),
                Role::Follower(mut rx) => {
                    trace!(key, "joining in-flight call");
                    let published = match rx.wait_for(Option::is_some).await {
                        Ok(value) => value.clone(),
                        Err(_) => None,
                    };
                    if let Some(value) = published {
                        return value;
                    }
                    // Leader dropped without an outcome; try to lead ourselves.
                }
            }
        };

        let guard = CallGuard {
            calls: &self.calls,
            key,
            slot,
        };
        let value = work().await;
        tx.send_replace(Some(value.clone()));
        drop(guard);
        value
    }

    /// Number of keys with a call in flight
    pub fn in_flight(&self) -> usize {
        self.calls.len()
    }
}

impl<T> Default for SingleFlight<T>
where
    T: Clone + Send + Sync,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for SingleFlight<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleFlight")
            .field("in_flight", &self.calls.len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
