use std::fmt;

use crate::cache::{Cache, CacheEntry, CacheKey};

/// Weak-reference semantics have no faithful rendering without a garbage
/// collector, so this decorator passes through unchanged and warns once
/// at construction that entries will persist until evicted or cleared.
pub struct WeakCache {
    delegate: Box<dyn Cache>,
}

impl WeakCache {
    #[must_use]
    pub fn new(delegate: Box<dyn Cache>) -> Self {
        tracing::warn!(
            cache = delegate.id(),
            "WEAK eviction behaves like PERPETUAL here; entries persist until cleared"
        );
        Self { delegate }
    }
}

impl fmt::Debug for WeakCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakCache").field("id", &self.id()).finish()
    }
}

impl Cache for WeakCache {
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
        self.delegate.get(key)
    }

    fn remove(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.delegate.remove(key)
    }

    fn clear(&self) {
        self.delegate.clear();
    }
}
