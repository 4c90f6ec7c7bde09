use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::cache::{Cache, CacheEntry, CacheKey};

pub const DEFAULT_CLEAR_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Clears everything once the configured interval has elapsed. The check
/// runs on every `get`/`put`/`remove`/`size`, so an idle cache is flushed
/// by whichever operation touches it next.
pub struct ScheduledCache {
    delegate: Box<dyn Cache>,
    clear_interval: Duration,
    last_clear: Mutex<Instant>,
}

impl ScheduledCache {
    #[must_use]
    pub fn new(delegate: Box<dyn Cache>) -> Self {
        Self::with_interval(delegate, DEFAULT_CLEAR_INTERVAL)
    }

    #[must_use]
    pub fn with_interval(delegate: Box<dyn Cache>, clear_interval: Duration) -> Self {
        Self {
            delegate,
            clear_interval,
            last_clear: Mutex::new(Instant::now()),
        }
    }

    fn clear_when_stale(&self) -> bool {
        let mut last = self.last_clear.lock().expect("scheduled state poisoned");
        if last.elapsed() >= self.clear_interval {
            *last = Instant::now();
            drop(last);
            self.delegate.clear();
            true
        } else {
            false
        }
    }
}

impl fmt::Debug for ScheduledCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledCache")
            .field("id", &self.id())
            .field("clear_interval", &self.clear_interval)
            .finish()
    }
}

impl Cache for ScheduledCache {
    fn id(&self) -> &str {
        self.delegate.id()
    }

    fn size(&self) -> usize {
        self.clear_when_stale();
        self.delegate.size()
    }

    fn put(&self, key: CacheKey, value: CacheEntry) {
        self.clear_when_stale();
        self.delegate.put(key, value);
    }

    fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        if self.clear_when_stale() {
            return None;
        }
        self.delegate.get(key)
    }

    fn remove(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.clear_when_stale();
        self.delegate.remove(key)
    }

    fn clear(&self) {
        *self.last_clear.lock().expect("scheduled state poisoned") = Instant::now();
        self.delegate.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::PerpetualCache;
    use serde_json::json;

    #[test]
    fn flushes_after_interval() {
        let cache = ScheduledCache::with_interval(
            Box::new(PerpetualCache::new("sched")),
            Duration::from_millis(20),
        );
        let mut key = CacheKey::new();
        key.update("k").unwrap();
        cache.put(key.clone(), CacheEntry::from_value(json!(1)));
        assert!(cache.get(&key).is_some());
        std::thread::sleep(Duration::from_millis(30));
        assert!(cache.get(&key).is_none());
    }
}
