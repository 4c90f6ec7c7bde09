use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;

use crate::cache::{Cache, CacheEntry, CacheKey};

pub const DEFAULT_HARD_LINKS: usize = 256;

/// Memory-sensitive cache rendered without a garbage collector: a
/// fixed-capacity LRU plays the role of collectable references, and a
/// bounded FIFO of strong handles keeps the hottest entries pinned.
pub struct SoftCache {
    delegate: Box<dyn Cache>,
    state: Mutex<SoftState>,
}

struct SoftState {
    capacity: usize,
    keys: Vec<CacheKey>,
    hard_links: VecDeque<CacheEntry>,
    hard_link_limit: usize,
}

impl SoftCache {
    #[must_use]
    pub fn new(delegate: Box<dyn Cache>) -> Self {
        Self::with_capacity(delegate, DEFAULT_HARD_LINKS * 4)
    }

    #[must_use]
    pub fn with_capacity(delegate: Box<dyn Cache>, capacity: usize) -> Self {
        Self {
            delegate,
            state: Mutex::new(SoftState {
                capacity: capacity.max(1),
                keys: Vec::new(),
                hard_links: VecDeque::new(),
                hard_link_limit: DEFAULT_HARD_LINKS,
            }),
        }
    }
}

impl fmt::Debug for SoftCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftCache").field("id", &self.id()).finish()
    }
}

impl Cache for SoftCache {
    fn id(&self) -> &str {
        self.delegate.id()
    }

    fn size(&self) -> usize {
        self.delegate.size()
    }

    fn put(&self, key: CacheKey, value: CacheEntry) {
        let evicted = {
            let mut state = self.state.lock().expect("soft state poisoned");
            if let Some(pos) = state.keys.iter().position(|k| k == &key) {
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
        };
        self.delegate.put(key, value);
        if let Some(eldest) = evicted {
            self.delegate.remove(&eldest);
        }
    }

    fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let found = self.delegate.get(key);
        if let Some(entry) = &found {
            let mut state = self.state.lock().expect("soft state poisoned");
            if let Some(pos) = state.keys.iter().position(|k| k == key) {
                let k = state.keys.remove(pos);
                state.keys.push(k);
            }
            state.hard_links.push_front(entry.clone());
            let limit = state.hard_link_limit;
            if state.hard_links.len() > limit {
                state.hard_links.pop_back();
            }
        }
        found
    }

    fn remove(&self, key: &CacheKey) -> Option<CacheEntry> {
        let mut state = self.state.lock().expect("soft state poisoned");
        if let Some(pos) = state.keys.iter().position(|k| k == key) {
            state.keys.remove(pos);
        }
        drop(state);
        self.delegate.remove(key)
    }

    fn clear(&self) {
        self.delegate.clear();
        let mut state = self.state.lock().expect("soft state poisoned");
        state.keys.clear();
        state.hard_links.clear();
    }
}
