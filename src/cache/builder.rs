use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Result, SqlMapperError};

use super::decorators::{
    BlockingCache, FifoCache, LoggingCache, LruCache, ScheduledCache, SerializedCache, SoftCache,
    SynchronizedCache, WeakCache,
};
use super::{Cache, PerpetualCache};

/// Assembles a namespace cache from `<cache>` attributes.
///
/// Standard composition, outermost first:
/// `Blocking? → Synchronized → Logging → Serialized? → Scheduled? →
/// eviction → Perpetual`. Eviction and the base implementation are chosen
/// by registered alias; unknown names fail as configuration errors.
pub struct CacheBuilder {
    id: String,
    implementation: String,
    eviction: String,
    clear_interval: Option<Duration>,
    size: Option<usize>,
    read_write: bool,
    blocking: bool,
    blocking_timeout: Option<Duration>,
    properties: HashMap<String, String>,
}

impl CacheBuilder {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            implementation: "PERPETUAL".into(),
            eviction: "LRU".into(),
            clear_interval: None,
            size: None,
            read_write: true,
            blocking: false,
            blocking_timeout: None,
            properties: HashMap::new(),
        }
    }

    #[must_use]
    pub fn implementation(mut self, name: impl Into<String>) -> Self {
        self.implementation = name.into().to_ascii_uppercase();
        self
    }

    #[must_use]
    pub fn eviction(mut self, name: impl Into<String>) -> Self {
        self.eviction = name.into().to_ascii_uppercase();
        self
    }

    #[must_use]
    pub fn clear_interval(mut self, interval: Option<Duration>) -> Self {
        self.clear_interval = interval;
        self
    }

    #[must_use]
    pub fn size(mut self, size: Option<usize>) -> Self {
        self.size = size;
        self
    }

    /// `readOnly="true"` in configuration maps to `read_write = false`.
    #[must_use]
    pub fn read_write(mut self, read_write: bool) -> Self {
        self.read_write = read_write;
        self
    }

    #[must_use]
    pub fn blocking(mut self, blocking: bool) -> Self {
        self.blocking = blocking;
        self
    }

    #[must_use]
    pub fn properties(mut self, properties: HashMap<String, String>) -> Self {
        self.properties = properties;
        self
    }

    pub fn build(mut self) -> Result<Arc<dyn Cache>> {
        self.apply_properties()?;

        if self.implementation != "PERPETUAL" {
            return Err(SqlMapperError::Cache(format!(
                "unknown cache implementation '{}' for cache '{}'",
                self.implementation, self.id
            )));
        }
        let base: Box<dyn Cache> = Box::new(PerpetualCache::new(self.id.clone()));

        let mut cache: Box<dyn Cache> = match self.eviction.as_str() {
            "LRU" => match self.size {
                Some(n) => Box::new(LruCache::with_capacity(base, n)),
                None => Box::new(LruCache::new(base)),
            },
            "FIFO" => match self.size {
                Some(n) => Box::new(FifoCache::with_capacity(base, n)),
                None => Box::new(FifoCache::new(base)),
            },
            "SOFT" => match self.size {
                Some(n) => Box::new(SoftCache::with_capacity(base, n)),
                None => Box::new(SoftCache::new(base)),
            },
            "WEAK" => Box::new(WeakCache::new(base)),
            "PERPETUAL" => base,
            other => {
                return Err(SqlMapperError::Cache(format!(
                    "unknown eviction policy '{other}' for cache '{}'",
                    self.id
                )))
            }
        };

        if let Some(interval) = self.clear_interval {
            cache = Box::new(ScheduledCache::with_interval(cache, interval));
        }
        if self.read_write {
            cache = Box::new(SerializedCache::new(cache));
        }
        cache = Box::new(LoggingCache::new(cache));
        cache = Box::new(SynchronizedCache::new(cache));
        if self.blocking {
            cache = Box::new(BlockingCache::new(cache).with_timeout(self.blocking_timeout));
        }
        Ok(Arc::from(cache))
    }

    fn apply_properties(&mut self) -> Result<()> {
        for (name, value) in &self.properties {
            match name.as_str() {
                "size" => {
                    let n = value.parse::<usize>().map_err(|_| {
                        SqlMapperError::Cache(format!(
                            "cache '{}' property 'size' is not a number: '{value}'",
                            self.id
                        ))
                    })?;
                    self.size = Some(n);
                }
                "timeout" | "blockingTimeout" => {
                    let millis = value.parse::<u64>().map_err(|_| {
                        SqlMapperError::Cache(format!(
                            "cache '{}' property '{name}' is not a number: '{value}'",
                            self.id
                        ))
                    })?;
                    self.blocking_timeout = Some(Duration::from_millis(millis));
                }
                // Unknown properties are tolerated for forward compatibility.
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheEntry, CacheKey};
    use serde_json::json;

    #[test]
    fn builds_default_stack() {
        let cache = CacheBuilder::new("ns.Cache").build().unwrap();
        let mut key = CacheKey::new();
        key.update("x").unwrap();
        cache.put(key.clone(), CacheEntry::from_value(json!([1])));
        assert_eq!(
            cache.get(&key).unwrap().into_value().unwrap(),
            Some(json!([1]))
        );
    }

    #[test]
    fn fifo_eviction_from_attributes() {
        let cache = CacheBuilder::new("ns.Fifo")
            .eviction("FIFO")
            .size(Some(1))
            .read_write(false)
            .build()
            .unwrap();
        let mut k1 = CacheKey::new();
        k1.update(1i64).unwrap();
        let mut k2 = CacheKey::new();
        k2.update(2i64).unwrap();
        cache.put(k1.clone(), CacheEntry::from_value(json!("a")));
        cache.put(k2.clone(), CacheEntry::from_value(json!("b")));
        assert!(cache.get(&k1).is_none());
        assert!(cache.get(&k2).is_some());
    }

    #[test]
    fn unknown_eviction_fails() {
        assert!(CacheBuilder::new("x").eviction("RANDOM").build().is_err());
    }
}
