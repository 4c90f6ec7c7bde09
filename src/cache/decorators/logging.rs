use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::cache::{Cache, CacheEntry, CacheKey};

/// Instrumentation: counts requests and hits and reports the running hit
/// ratio through `tracing` on every lookup.
pub struct LoggingCache {
    delegate: Box<dyn Cache>,
    requests: AtomicUsize,
    hits: AtomicUsize,
}

impl LoggingCache {
    #[must_use]
    pub fn new(delegate: Box<dyn Cache>) -> Self {
        Self {
            delegate,
            requests: AtomicUsize::new(0),
            hits: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn hit_ratio(&self) -> f64 {
        let requests = self.requests.load(Ordering::Relaxed);
        if requests == 0 {
            return 0.0;
        }
        self.hits.load(Ordering::Relaxed) as f64 / requests as f64
    }
}

impl fmt::Debug for LoggingCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggingCache")
            .field("id", &self.id())
            .field("hit_ratio", &self.hit_ratio())
            .finish()
    }
}

impl Cache for LoggingCache {
    fn id(&self) -> &str {
        self.delegate.id()
    }

    fn size(&self) -> usize {
        self.delegate.size()
    }

    fn put(&self, key: CacheKey, value: CacheEntry) {
        self.delegate.put(key, value);
    }

    fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let value = self.delegate.get(key);
        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        tracing::debug!(
            cache = self.id(),
            hit = value.is_some(),
            ratio = self.hit_ratio(),
            "cache lookup"
        );
        value
    }

    fn remove(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.delegate.remove(key)
    }

    fn clear(&self) {
        self.delegate.clear();
    }
}
