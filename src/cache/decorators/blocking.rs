use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::cache::{Cache, CacheEntry, CacheKey};

/// Per-key single-flight: a `get` that misses keeps the key's latch until
/// the matching `put` (or `remove`, the failure-path release) arrives, so
/// concurrent loads of the same key are serialized down to one.
///
/// Callers that miss MUST follow up with a `put` or a `remove` for the
/// same key, or other readers of that key will block until `timeout`.
pub struct BlockingCache {
    delegate: Box<dyn Cache>,
    timeout: Option<Duration>,
    latches: Mutex<HashMap<CacheKey, Arc<Latch>>>,
}

struct Latch {
    released: Mutex<bool>,
    cond: Condvar,
}

impl BlockingCache {
    #[must_use]
    pub fn new(delegate: Box<dyn Cache>) -> Self {
        Self {
            delegate,
            timeout: None,
            latches: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Take the latch for `key`, waiting while another thread holds it.
    /// Returns false when the wait timed out.
    fn acquire(&self, key: &CacheKey) -> bool {
        loop {
            let existing = {
                let mut latches = self.latches.lock().expect("latch table poisoned");
                match latches.get(key) {
                    Some(latch) => latch.clone(),
                    None => {
                        latches.insert(
                            key.clone(),
                            Arc::new(Latch {
                                released: Mutex::new(false),
                                cond: Condvar::new(),
                            }),
                        );
                        return true;
                    }
                }
            };

            let guard = existing.released.lock().expect("latch poisoned");
            let released = match self.timeout {
                Some(timeout) => {
                    let (guard, result) = existing
                        .cond
                        .wait_timeout_while(guard, timeout, |done| !*done)
                        .expect("latch poisoned");
                    drop(guard);
                    !result.timed_out()
                }
                None => {
                    let guard = existing
                        .cond
                        .wait_while(guard, |done| !*done)
                        .expect("latch poisoned");
                    drop(guard);
                    true
                }
            };
            if !released {
                return false;
            }
            // Loop: the latch may already be re-taken by another waiter.
        }
    }

    fn release(&self, key: &CacheKey) {
        let latch = self
            .latches
            .lock()
            .expect("latch table poisoned")
            .remove(key);
        if let Some(latch) = latch {
            *latch.released.lock().expect("latch poisoned") = true;
            latch.cond.notify_all();
        }
    }
}

impl fmt::Debug for BlockingCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingCache")
            .field("id", &self.id())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Cache for BlockingCache {
    fn id(&self) -> &str {
        self.delegate.id()
    }

    fn size(&self) -> usize {
        self.delegate.size()
    }

    fn put(&self, key: CacheKey, value: CacheEntry) {
        self.delegate.put(key.clone(), value);
        self.release(&key);
    }

    fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        if !self.acquire(key) {
            tracing::warn!(cache = self.id(), "timed out waiting on blocking cache key");
            return None;
        }
        let value = self.delegate.get(key);
        if value.is_some() {
            self.release(key);
        }
        value
    }

    fn remove(&self, key: &CacheKey) -> Option<CacheEntry> {
        // Release only; the loader calls this on its failure path.
        self.release(key);
        None
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
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    fn key(n: i64) -> CacheKey {
        let mut k = CacheKey::new();
        k.update(n).unwrap();
        k
    }

    #[test]
    fn hit_does_not_block_others() {
        let cache = BlockingCache::new(Box::new(PerpetualCache::new("b")));
        cache.put(key(1), CacheEntry::from_value(json!(1)));
        assert!(cache.get(&key(1)).is_some());
        assert!(cache.get(&key(1)).is_some());
    }

    #[test]
    fn second_reader_blocks_until_put() {
        let cache = Arc::new(BlockingCache::new(Box::new(PerpetualCache::new("b"))));
        // First miss takes the latch.
        assert!(cache.get(&key(1)).is_none());

        let unblocked = Arc::new(AtomicBool::new(false));
        let handle = {
            let cache = cache.clone();
            let unblocked = unblocked.clone();
            thread::spawn(move || {
                let got = cache.get(&key(1));
                unblocked.store(true, Ordering::SeqCst);
                got
            })
        };

        thread::sleep(Duration::from_millis(40));
        assert!(!unblocked.load(Ordering::SeqCst), "reader should be parked");

        cache.put(key(1), CacheEntry::from_value(json!("ready")));
        let got = handle.join().unwrap();
        assert!(unblocked.load(Ordering::SeqCst));
        assert_eq!(got.unwrap().into_value().unwrap(), Some(json!("ready")));
    }

    #[test]
    fn remove_releases_failed_load() {
        let cache = Arc::new(BlockingCache::new(Box::new(PerpetualCache::new("b"))));
        assert!(cache.get(&key(2)).is_none());
        // Loader failed; release via remove so others can retry.
        cache.remove(&key(2));
        assert!(cache.get(&key(2)).is_none());
        cache.remove(&key(2));
    }
}
