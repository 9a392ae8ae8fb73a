//! Time-bounded "have we surfaced this mint already?" set.
//!
//! Shared by every monitor task. The check-and-record happens under one
//! lock, so two connections racing on the same mint cannot both see it as
//! new. Entries older than the TTL read as absent whether or not they have
//! been physically evicted yet.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;

/// Default suppression window.
pub const DEFAULT_DEDUP_TTL: Duration = Duration::from_secs(300);

/// Thread-safe TTL set keyed by mint address.
#[derive(Debug)]
pub struct DedupCache {
    ttl: Duration,
    /// mint → expires_at
    entries: Mutex<HashMap<String, Instant>>,
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_TTL)
    }
}

impl DedupCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` if `mint` was recorded within the TTL. Otherwise records
    /// it with a fresh window and returns `false`.
    pub fn seen_before(&self, mint: &str) -> bool {
        self.seen_before_at(mint, Instant::now())
    }

    /// [`seen_before`](Self::seen_before) against an explicit clock reading.
    pub fn seen_before_at(&self, mint: &str, now: Instant) -> bool {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(mint) {
            Some(expires_at) if *expires_at > now => true,
            _ => {
                entries.insert(mint.to_string(), now + self.ttl);
                false
            }
        }
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    pub fn purge_expired_at(&self, now: Instant) -> usize {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|_, expires_at| *expires_at > now);
        before - entries.len()
    }

    /// Number of physically stored entries (expired ones included until purged).
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Purge expired entries every `interval` until the returned task is
    /// aborted or the last other reference to the cache is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                let removed = cache.purge_expired();
                if removed > 0 {
                    tracing::debug!(removed, remaining = cache.len(), "dedup cache swept");
                }
            }
        })
    }
}
