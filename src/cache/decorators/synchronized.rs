use std::fmt;
use std::sync::Mutex;

use crate::cache::{Cache, CacheEntry, CacheKey};

/// Coarse lock around every operation. This is the visibility boundary the
/// executor relies on for shared namespace caches; decorators below it may
/// keep their own finer state but never leak lock state upward.
pub struct SynchronizedCache {
    delegate: Box<dyn Cache>,
    lock: Mutex<()>,
}

impl SynchronizedCache {
    #[must_use]
    pub fn new(delegate: Box<dyn Cache>) -> Self {
        Self {
            delegate,
            lock: Mutex::new(()),
        }
    }
}

impl fmt::Debug for SynchronizedCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SynchronizedCache").field("id", &self.id()).finish()
    }
}

impl Cache for SynchronizedCache {
    fn id(&self) -> &str {
        self.delegate.id()
    }

    fn size(&self) -> usize {
        let _guard = self.lock.lock().expect("synchronized cache poisoned");
        self.delegate.size()
    }

    fn put(&self, key: CacheKey, value: CacheEntry) {
        let _guard = self.lock.lock().expect("synchronized cache poisoned");
        self.delegate.put(key, value);
    }

    fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let _guard = self.lock.lock().expect("synchronized cache poisoned");
        self.delegate.get(key)
    }

    fn remove(&self, key: &CacheKey) -> Option<CacheEntry> {
        let _guard = self.lock.lock().expect("synchronized cache poisoned");
        self.delegate.remove(key)
    }

    fn clear(&self) {
        let _guard = self.lock.lock().expect("synchronized cache poisoned");
        self.delegate.clear();
    }
}
