//! The namespace cache contract and its composable decorators.
//!
//! A cache stores rendered query results keyed by [`CacheKey`]. Decorators
//! compose outermost→innermost as
//! `{Blocking? → Synchronized → Logging → Serialized? → Scheduled? →
//! Lru|Fifo|Soft|Weak → Perpetual}`; [`builder::CacheBuilder`] assembles
//! the standard stack from `<cache>` attributes.

pub mod builder;
pub mod decorators;
pub mod key;

pub use builder::CacheBuilder;
pub use key::{CacheKey, KeyComponent};

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use serde_json::Value;

/// A stored cache entry. `Null` records that a lookup produced nothing
/// (the transactional buffer publishes these so blocking readers are
/// released); `Bytes` is the serialized decorator's detached form.
#[derive(Debug, Clone)]
pub enum CacheEntry {
    Null,
    Value(Arc<Value>),
    Bytes(Arc<Vec<u8>>),
}

impl CacheEntry {
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        CacheEntry::Value(Arc::new(value))
    }

    /// The plain value, decoding the serialized form if necessary.
    pub fn into_value(self) -> crate::error::Result<Option<Value>> {
        match self {
            CacheEntry::Null => Ok(None),
            CacheEntry::Value(v) => Ok(Some(v.as_ref().clone())),
            CacheEntry::Bytes(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| crate::error::SqlMapperError::Cache(format!(
                    "failed to deserialize cached entry: {e}"
                ))),
        }
    }
}

/// The cache contract shared by the perpetual base and every decorator.
///
/// Implementations take `&self`; interior mutability is their own
/// business. Only the synchronized/blocking decorators promise
/// cross-thread visibility.
pub trait Cache: Send + Sync + fmt::Debug {
    fn id(&self) -> &str;
    fn size(&self) -> usize;
    fn put(&self, key: CacheKey, value: CacheEntry);
    fn get(&self, key: &CacheKey) -> Option<CacheEntry>;
    fn remove(&self, key: &CacheKey) -> Option<CacheEntry>;
    fn clear(&self);
}

/// The backing store every decorator stack bottoms out in.
pub struct PerpetualCache {
    id: String,
    map: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl PerpetualCache {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            map: Mutex::new(HashMap::new()),
        }
    }
}

impl fmt::Debug for PerpetualCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PerpetualCache")
            .field("id", &self.id)
            .field("size", &self.size())
            .finish()
    }
}

impl Cache for PerpetualCache {
    fn id(&self) -> &str {
        &self.id
    }

    fn size(&self) -> usize {
        self.map.lock().expect("cache map poisoned").len()
    }

    fn put(&self, key: CacheKey, value: CacheEntry) {
        self.map.lock().expect("cache map poisoned").insert(key, value);
    }

    fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.map.lock().expect("cache map poisoned").get(key).cloned()
    }

    fn remove(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.map.lock().expect("cache map poisoned").remove(key)
    }

    fn clear(&self) {
        self.map.lock().expect("cache map poisoned").clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn basic_put_get_remove() {
        let cache = PerpetualCache::new("test");
        let mut key = CacheKey::new();
        key.update("k").unwrap();
        cache.put(key.clone(), CacheEntry::from_value(json!([1, 2])));
        assert_eq!(cache.size(), 1);
        let got = cache.get(&key).unwrap().into_value().unwrap();
        assert_eq!(got, Some(json!([1, 2])));
        cache.remove(&key);
        assert!(cache.get(&key).is_none());
    }
}
