//! Per-backend cache of flattened GET bodies.
//!
//! Every `clear` bumps a generation counter. A body read from the store
//! under an older generation is never kept, so a GET racing a write cannot
//! cache what the write replaced.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const DEFAULT_MAX_ENTRIES: usize = 10_000;

#[derive(Debug, Clone)]
struct CachedBody {
    body: Arc<Vec<u8>>,
    stored_at: Instant,
}

/// Thread-safe TTL cache keyed by request path and query.
#[derive(Debug, Clone)]
pub struct ResponseCache {
    inner: Arc<DashMap<String, CachedBody>>,
    generation: Arc<AtomicU64>,
    ttl: Duration,
    max_entries: usize,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            generation: Arc::new(AtomicU64::new(0)),
            ttl,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    pub fn key(path: &str, query: Option<&str>) -> String {
        match query {
            Some(q) if !q.is_empty() => format!("{path}?{q}"),
            _ => path.to_string(),
        }
    }

    /// Take this before reading the store; hand it back to [`Self::put`].
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Fresh entry for `key`; expired entries are evicted on the way.
    pub fn get(&self, key: &str) -> Option<Arc<Vec<u8>>> {
        let expired = match self.inner.get(key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => return Some(entry.body.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.inner.remove(key);
        }
        None
    }

    /// Store `body` read under `generation`. Returns false when it was not
    /// kept: the cache was cleared since, or it is full of fresh entries.
    pub fn put(&self, key: String, body: Vec<u8>, generation: u64) -> bool {
        if self.inner.len() >= self.max_entries && self.purge_expired() == 0 {
            tracing::debug!(entries = self.inner.len(), "Response cache full, not caching");
            return false;
        }

        self.inner.insert(
            key.clone(),
            CachedBody {
                body: Arc::new(body),
                stored_at: Instant::now(),
            },
        );
        if self.generation() != generation {
            self.inner.remove(&key);
            return false;
        }
        true
    }

    /// Drop every expired entry. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let before = self.inner.len();
        self.inner.retain(|_, entry| entry.stored_at.elapsed() < self.ttl);
        before.saturating_sub(self.inner.len())
    }

    pub fn clear(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
