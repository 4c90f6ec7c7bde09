use std::fmt;
use std::sync::Arc;

use crate::cache::{Cache, CacheEntry, CacheKey};

/// Round-trips entries through byte serialization so every reader gets a
/// detached copy and mutations never leak back into the cache.
pub struct SerializedCache {
    delegate: Box<dyn Cache>,
}

impl SerializedCache {
    #[must_use]
    pub fn new(delegate: Box<dyn Cache>) -> Self {
        Self { delegate }
    }

    fn encode(value: CacheEntry) -> CacheEntry {
        match value {
            CacheEntry::Value(v) => match serde_json::to_vec(v.as_ref()) {
                Ok(bytes) => CacheEntry::Bytes(Arc::new(bytes)),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to serialize cache entry; storing as-is");
                    CacheEntry::Value(v)
                }
            },
            other => other,
        }
    }

    fn decode(value: CacheEntry) -> Option<CacheEntry> {
        match value {
            CacheEntry::Bytes(bytes) => match serde_json::from_slice(&bytes) {
                Ok(v) => Some(CacheEntry::Value(Arc::new(v))),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to deserialize cache entry; dropping it");
                    None
                }
            },
            other => Some(other),
        }
    }
}

impl fmt::Debug for SerializedCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializedCache").field("id", &self.id()).finish()
    }
}

impl Cache for SerializedCache {
    fn id(&self) -> &str {
        self.delegate.id()
    }

    fn size(&self) -> usize {
        self.delegate.size()
    }

    fn put(&self, key: CacheKey, value: CacheEntry) {
        self.delegate.put(key, Self::encode(value));
    }

    fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.delegate.get(key).and_then(Self::decode)
    }

    fn remove(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.delegate.remove(key).and_then(Self::decode)
    }

    fn clear(&self) {
        self.delegate.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::PerpetualCache;
    use serde_json::json;

    #[test]
    fn readers_get_detached_copies() {
        let cache = SerializedCache::new(Box::new(PerpetualCache::new("ser")));
        let mut key = CacheKey::new();
        key.update("k").unwrap();
        cache.put(key.clone(), CacheEntry::from_value(json!({"a": [1, 2]})));

        let first = cache.get(&key).unwrap().into_value().unwrap().unwrap();
        let second = cache.get(&key).unwrap().into_value().unwrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(first, json!({"a": [1, 2]}));
    }
}
