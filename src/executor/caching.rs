//! The second-level cache coordinator: consults each statement's
//! namespace cache before the wrapped executor, staging writes in a
//! per-session transactional buffer that publishes on commit and is
//! discarded on rollback.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;

use crate::cache::{Cache, CacheEntry, CacheKey};
use crate::config::Configuration;
use crate::error::Result;
use crate::mapping::{BoundSql, MappedStatement};
use crate::session::{ResultHandler, RowBounds};

use super::{BatchResult, Executor};

/// Staged interaction with one shared cache for one session.
struct TransactionalCache {
    cache: Arc<dyn Cache>,
    clear_on_commit: bool,
    entries_to_add: HashMap<CacheKey, CacheEntry>,
    entries_missed: HashSet<CacheKey>,
}

impl TransactionalCache {
    fn new(cache: Arc<dyn Cache>) -> Self {
        Self {
            cache,
            clear_on_commit: false,
            entries_to_add: HashMap::new(),
            entries_missed: HashSet::new(),
        }
    }

    fn get(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        let entry = self.cache.get(key);
        if entry.is_none() {
            self.entries_missed.insert(key.clone());
        }
        // A pending clear hides everything currently published.
        if self.clear_on_commit {
            return None;
        }
        entry
    }

    fn put(&mut self, key: CacheKey, value: CacheEntry) {
        self.entries_to_add.insert(key, value);
    }

    fn clear(&mut self) {
        self.clear_on_commit = true;
        self.entries_to_add.clear();
    }

    fn commit(&mut self) {
        if self.clear_on_commit {
            self.cache.clear();
        }
        for (key, value) in self.entries_to_add.drain() {
            self.entries_missed.remove(&key);
            self.cache.put(key, value);
        }
        // Publish misses so blocking readers of those keys are released.
        for key in self.entries_missed.drain() {
            self.cache.put(key, CacheEntry::Null);
        }
        self.clear_on_commit = false;
    }

    fn rollback(&mut self) {
        // Unlock any keys this session claimed on its misses.
        for key in self.entries_missed.drain() {
            self.cache.remove(&key);
        }
        self.entries_to_add.clear();
        self.clear_on_commit = false;
    }
}

#[derive(Default)]
struct TransactionalCacheManager {
    caches: HashMap<String, TransactionalCache>,
}

impl TransactionalCacheManager {
    fn entry(&mut self, cache: &Arc<dyn Cache>) -> &mut TransactionalCache {
        self.caches
            .entry(cache.id().to_string())
            .or_insert_with(|| TransactionalCache::new(cache.clone()))
    }

    fn get(&mut self, cache: &Arc<dyn Cache>, key: &CacheKey) -> Option<CacheEntry> {
        self.entry(cache).get(key)
    }

    fn put(&mut self, cache: &Arc<dyn Cache>, key: CacheKey, value: CacheEntry) {
        self.entry(cache).put(key, value);
    }

    fn clear(&mut self, cache: &Arc<dyn Cache>) {
        self.entry(cache).clear();
    }

    fn commit(&mut self) {
        for cache in self.caches.values_mut() {
            cache.commit();
        }
    }

    fn rollback(&mut self) {
        for cache in self.caches.values_mut() {
            cache.rollback();
        }
    }
}

/// Wraps any executor with namespace-cache coordination.
pub struct CachingExecutor {
    delegate: Box<dyn Executor>,
    tcm: TransactionalCacheManager,
}

impl CachingExecutor {
    #[must_use]
    pub fn new(delegate: Box<dyn Executor>) -> Self {
        Self {
            delegate,
            tcm: TransactionalCacheManager::default(),
        }
    }

    fn flush_cache_if_required(&mut self, ms: &MappedStatement) {
        if let Some(cache) = &ms.cache {
            if ms.flush_cache_on_execute {
                self.tcm.clear(cache);
            }
        }
    }
}

impl Executor for CachingExecutor {
    fn configuration(&self) -> &Arc<Configuration> {
        self.delegate.configuration()
    }

    fn update(&mut self, ms: &Arc<MappedStatement>, parameter: &mut Value) -> Result<i64> {
        self.flush_cache_if_required(ms);
        self.delegate.update(ms, parameter)
    }

    fn query(
        &mut self,
        ms: &Arc<MappedStatement>,
        parameter: &Value,
        bounds: RowBounds,
        handler: Option<&mut dyn ResultHandler>,
    ) -> Result<Vec<Value>> {
        self.flush_cache_if_required(ms);

        let Some(cache) = ms.cache.clone() else {
            return self.delegate.query(ms, parameter, bounds, handler);
        };
        if !ms.use_cache || handler.is_some() {
            return self.delegate.query(ms, parameter, bounds, handler);
        }

        let bound_sql = ms
            .sql_source
            .bound_sql(self.delegate.configuration(), parameter)?;
        let key = self
            .delegate
            .create_cache_key(ms, parameter, bounds, &bound_sql)?;

        if let Some(entry) = self.tcm.get(&cache, &key) {
            if let Some(Value::Array(rows)) = entry.into_value()? {
                tracing::debug!(statement = %ms.id, cache = cache.id(), "second-level cache hit");
                return Ok(rows);
            }
        }

        let rows = self.delegate.query(ms, parameter, bounds, None)?;
        self.tcm.put(
            &cache,
            key,
            CacheEntry::from_value(Value::Array(rows.clone())),
        );
        Ok(rows)
    }

    fn flush_statements(&mut self) -> Result<Vec<BatchResult>> {
        self.delegate.flush_statements()
    }

    fn commit(&mut self, required: bool) -> Result<()> {
        self.delegate.commit(required)?;
        self.tcm.commit();
        Ok(())
    }

    fn rollback(&mut self, required: bool) -> Result<()> {
        let outcome = self.delegate.rollback(required);
        if required {
            self.tcm.rollback();
        }
        outcome
    }

    fn create_cache_key(
        &self,
        ms: &MappedStatement,
        parameter: &Value,
        bounds: RowBounds,
        bound_sql: &BoundSql,
    ) -> Result<CacheKey> {
        self.delegate.create_cache_key(ms, parameter, bounds, bound_sql)
    }

    fn clear_local_cache(&mut self) {
        self.delegate.clear_local_cache();
    }

    fn close(&mut self, force_rollback: bool) -> Result<()> {
        if force_rollback {
            self.tcm.rollback();
        } else {
            self.tcm.commit();
        }
        self.delegate.close(force_rollback)
    }

    fn is_closed(&self) -> bool {
        self.delegate.is_closed()
    }
}
