//! Read-through cache for serialized question listings.
//!
//! Entries expire after a fixed TTL and the whole cache is flushed on any write
//! to questions or categories; there is no per-key invalidation.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
struct CacheEntry {
    payload: Arc<str>,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Bounded TTL cache. The least recently used entry goes first once
/// `capacity` is reached.
#[derive(Debug)]
pub struct QueryCache {
    ttl: Duration,
    entries: RwLock<LruCache<String, CacheEntry>>,
    generation: AtomicU64,
}

impl QueryCache {
    pub fn new(ttl: Duration, capacity: NonZeroUsize) -> Self {
        Self {
            ttl,
            entries: RwLock::new(LruCache::new(capacity)),
            generation: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Bumped by every flush. A payload computed under an older generation
    /// may predate the write that caused the flush.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Returns the stored payload unless it is missing or expired.
    /// Expired entries are dropped on the way out.
    pub async fn get(&self, key: &str) -> Option<Arc<str>> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let lookup = entries
            .get(key)
            .map(|entry| (entry.is_expired(now), entry.payload.clone()));
        match lookup {
            Some((false, payload)) => Some(payload),
            Some((true, _)) => {
                entries.pop(key);
                None
            }
            None => None,
        }
    }

    pub async fn set(&self, key: String, payload: Arc<str>) {
        let entry = CacheEntry {
            payload,
            expires_at: Instant::now() + self.ttl,
        };
        self.entries.write().await.put(key, entry);
    }

    /// Stores `payload` only if no flush happened since `generation` was read.
    /// Returns whether it was stored.
    pub async fn set_if_current(&self, key: String, payload: Arc<str>, generation: u64) -> bool {
        let entry = CacheEntry {
            payload,
            expires_at: Instant::now() + self.ttl,
        };
        let mut entries = self.entries.write().await;
        if self.generation.load(Ordering::Acquire) != generation {
            return false;
        }
        entries.put(key, entry);
        true
    }

    /// Drops every entry.
    pub async fn flush(&self) {
        let mut entries = self.entries.write().await;
        self.generation.fetch_add(1, Ordering::AcqRel);
        let dropped = entries.len();
        entries.clear();
        tracing::debug!(dropped, "Flushed query cache");
    }

    /// Removes expired entries, returning how many went.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            entries.pop(key);
        }
        expired.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

/// Periodically sweeps expired entries so abandoned keys do not pile up.
pub fn spawn_sweeper(cache: Arc<QueryCache>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!("Starting cache sweeper every {}s", every.as_secs());
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let removed = cache.purge_expired().await;
            if removed > 0 {
                tracing::debug!(removed, "Removed expired cache entries");
            }
        }
    })
}
