use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;

use crate::cache::{Cache, CacheEntry, CacheKey};

pub const DEFAULT_FIFO_SIZE: usize = 1024;

/// First-in-first-out eviction: a bounded insertion-order queue; on
/// overflow the head key is evicted from the delegate regardless of
/// access history.
pub struct FifoCache {
    delegate: Box<dyn Cache>,
    state: Mutex<FifoState>,
}

struct FifoState {
    capacity: usize,
    keys: VecDeque<CacheKey>,
}

impl FifoCache {
    #[must_use]
    pub fn new(delegate: Box<dyn Cache>) -> Self {
        Self::with_capacity(delegate, DEFAULT_FIFO_SIZE)
    }

    #[must_use]
    pub fn with_capacity(delegate: Box<dyn Cache>, capacity: usize) -> Self {
        Self {
            delegate,
            state: Mutex::new(FifoState {
                capacity: capacity.max(1),
                keys: VecDeque::new(),
            }),
        }
    }
}

impl fmt::Debug for FifoCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FifoCache").field("id", &self.id()).finish()
    }
}

impl Cache for FifoCache {
    fn id(&self) -> &str {
        self.delegate.id()
    }

    fn size(&self) -> usize {
        self.delegate.size()
    }

    fn put(&self, key: CacheKey, value: CacheEntry) {
        let evicted = {
            let mut state = self.state.lock().expect("fifo state poisoned");
            if !state.keys.contains(&key) {
                state.keys.push_back(key.clone());
            }
            if state.keys.len() > state.capacity {
                state.keys.pop_front()
            } else {
                None
            }
        };
        self.delegate.put(key, value);
        if let Some(oldest) = evicted {
            self.delegate.remove(&oldest);
        }
    }

    fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.delegate.get(key)
    }

    fn remove(&self, key: &CacheKey) -> Option<CacheEntry> {
        let mut state = self.state.lock().expect("fifo state poisoned");
        if let Some(pos) = state.keys.iter().position(|k| k == key) {
            state.keys.remove(pos);
        }
        drop(state);
        self.delegate.remove(key)
    }

    fn clear(&self) {
        self.delegate.clear();
        self.state.lock().expect("fifo state poisoned").keys.clear();
    }
}
