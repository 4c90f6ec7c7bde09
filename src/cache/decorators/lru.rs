use std::fmt;
use std::sync::Mutex;

use crate::cache::{Cache, CacheEntry, CacheKey};

pub const DEFAULT_LRU_SIZE: usize = 1024;

/// Least-recently-used eviction: an access-ordered key list; an insertion
/// that would overflow evicts the least recently touched key from the
/// delegate.
pub struct LruCache {
    delegate: Box<dyn Cache>,
    state: Mutex<LruState>,
}

struct LruState {
    capacity: usize,
    // Access order, least recent first.
    keys: Vec<CacheKey>,
}

impl LruCache {
    #[must_use]
    pub fn new(delegate: Box<dyn Cache>) -> Self {
        Self::with_capacity(delegate, DEFAULT_LRU_SIZE)
    }

    #[must_use]
    pub fn with_capacity(delegate: Box<dyn Cache>, capacity: usize) -> Self {
        Self {
            delegate,
            state: Mutex::new(LruState {
                capacity: capacity.max(1),
                keys: Vec::new(),
            }),
        }
    }

    fn touch(&self, key: &CacheKey) {
        let mut state = self.state.lock().expect("lru state poisoned");
        if let Some(pos) = state.keys.iter().position(|k| k == key) {
            let k = state.keys.remove(pos);
            state.keys.push(k);
        }
    }

    fn record_put(&self, key: &CacheKey) -> Option<CacheKey> {
        let mut state = self.state.lock().expect("lru state poisoned");
        if let Some(pos) = state.keys.iter().position(|k| k == key) {
            let k = state.keys.remove(pos);
            state.keys.push(k);
        } else {
            state.keys.push(key.clone());
        }
        if state.keys.len() > state.capacity {
            Some(state.keys.remove(0))
        } else {
            None
        }
    }

    fn forget(&self, key: &CacheKey) {
        let mut state = self.state.lock().expect("lru state poisoned");
        if let Some(pos) = state.keys.iter().position(|k| k == key) {
            state.keys.remove(pos);
        }
    }
}

impl fmt::Debug for LruCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LruCache").field("id", &self.id()).finish()
    }
}

impl Cache for LruCache {
    fn id(&self) -> &str {
        self.delegate.id()
    }

    fn size(&self) -> usize {
        self.delegate.size()
    }

    fn put(&self, key: CacheKey, value: CacheEntry) {
        let evicted = self.record_put(&key);
        self.delegate.put(key, value);
        if let Some(eldest) = evicted {
            self.delegate.remove(&eldest);
        }
    }

    fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.touch(key);
        self.delegate.get(key)
    }

    fn remove(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.forget(key);
        self.delegate.remove(key)
    }

    fn clear(&self) {
        self.delegate.clear();
        self.state.lock().expect("lru state poisoned").keys.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::PerpetualCache;
    use serde_json::json;

    fn key(n: i64) -> CacheKey {
        let mut k = CacheKey::new();
        k.update(n).unwrap();
        k
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache = LruCache::with_capacity(Box::new(PerpetualCache::new("lru")), 2);
        cache.put(key(1), CacheEntry::from_value(json!("a")));
        cache.put(key(2), CacheEntry::from_value(json!("b")));
        // Touch A so B becomes the eviction candidate.
        assert!(cache.get(&key(1)).is_some());
        cache.put(key(3), CacheEntry::from_value(json!("c")));
        assert!(cache.get(&key(1)).is_some());
        assert!(cache.get(&key(2)).is_none());
        assert!(cache.get(&key(3)).is_some());
    }

    #[test]
    fn never_accessed_first_key_falls_out() {
        let cache = LruCache::with_capacity(Box::new(PerpetualCache::new("lru")), 3);
        for n in 1..=4 {
            cache.put(key(n), CacheEntry::from_value(json!(n)));
        }
        assert!(cache.get(&key(1)).is_none());
        for n in 2..=4 {
            assert!(cache.get(&key(n)).is_some(), "key {n} should remain");
        }
    }
}
