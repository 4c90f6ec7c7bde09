use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::driver::{
    ConnectionSpec, Driver, ExecuteResult, IsolationLevel, RawConnection, StatementSpec,
};
use crate::error::{Result, SqlMapperError};
use crate::results::ResultSet;
use crate::types::DbValue;

use super::DataSource;

const DEFAULT_MAX_ACTIVE: usize = 10;
const DEFAULT_MAX_IDLE: usize = 5;
const DEFAULT_MAX_CHECKOUT: Duration = Duration::from_millis(20_000);
const DEFAULT_WAIT: Duration = Duration::from_millis(20_000);
const DEFAULT_BAD_TOLERANCE: usize = 3;
const DEFAULT_PING_QUERY: &str = "NO PING QUERY SET";

/// Bookkeeping wrapped around one real connection. The same entry is held
/// by the pool's lists and by the proxy in the caller's hands, so an
/// overdue reclaim can invalidate the holder's wrapper in place.
struct PooledEntry {
    real: Option<Box<dyn RawConnection>>,
    valid: bool,
    type_code: i64,
    created_at: Instant,
    last_used_at: Instant,
    checked_out_at: Instant,
}

type SharedEntry = Arc<Mutex<PooledEntry>>;

impl PooledEntry {
    fn wrap(real: Box<dyn RawConnection>, type_code: i64) -> SharedEntry {
        let now = Instant::now();
        Arc::new(Mutex::new(PooledEntry {
            real: Some(real),
            valid: true,
            type_code,
            created_at: now,
            last_used_at: now,
            checked_out_at: now,
        }))
    }
}

#[derive(Debug, Default)]
struct PoolState {
    idle: Vec<SharedEntry>,
    active: Vec<SharedEntry>,
    request_count: u64,
    accumulated_request_time: Duration,
    accumulated_checkout_time: Duration,
    claimed_overdue_connection_count: u64,
    accumulated_checkout_time_of_overdue: Duration,
    accumulated_wait_time: Duration,
    had_to_wait_count: u64,
    bad_connection_count: u64,
}

impl fmt::Debug for PooledEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledEntry")
            .field("valid", &self.valid)
            .field("type_code", &self.type_code)
            .finish()
    }
}

/// Snapshot of pool statistics, rendered for diagnostics.
#[derive(Debug, Clone, Default)]
pub struct PoolStatus {
    pub idle_connections: usize,
    pub active_connections: usize,
    pub request_count: u64,
    pub average_request_time: Duration,
    pub accumulated_checkout_time: Duration,
    pub claimed_overdue_connection_count: u64,
    pub had_to_wait_count: u64,
    pub accumulated_wait_time: Duration,
    pub bad_connection_count: u64,
}

impl fmt::Display for PoolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- pool status ---")?;
        writeln!(f, " active: {}, idle: {}", self.active_connections, self.idle_connections)?;
        writeln!(f, " requests: {}, avg request time: {:?}", self.request_count, self.average_request_time)?;
        writeln!(f, " claimed overdue: {}", self.claimed_overdue_connection_count)?;
        writeln!(f, " had to wait: {} (total {:?})", self.had_to_wait_count, self.accumulated_wait_time)?;
        write!(f, " bad connections: {}", self.bad_connection_count)
    }
}

/// A synchronous, thread-safe connection pool.
///
/// All shared state sits under one monitor (`Mutex` + `Condvar`).
/// Check-out reuses idle entries, opens new connections under the active
/// cap, reclaims the oldest active entry once it exceeds the checkout
/// budget, and otherwise waits. The handed-out [`PoolConnection`] proxy
/// returns itself on `close` instead of closing the engine connection.
pub struct PooledDataSource {
    inner: Arc<PoolInner>,
}

impl fmt::Debug for PooledDataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledDataSource").finish()
    }
}

struct PoolInner {
    driver: Arc<dyn Driver>,
    spec: ConnectionSpec,
    expected_type_code: i64,
    max_active: usize,
    max_idle: usize,
    max_checkout_time: Duration,
    wait_time: Duration,
    max_bad_tolerance: usize,
    ping_enabled: bool,
    ping_query: String,
    ping_if_idle_for: Duration,
    state: Mutex<PoolState>,
    cond: Condvar,
}

impl PooledDataSource {
    #[must_use]
    pub fn new(driver: Arc<dyn Driver>, spec: ConnectionSpec) -> Self {
        let expected_type_code = spec.type_code();
        Self {
            inner: Arc::new(PoolInner {
                driver,
                spec,
                expected_type_code,
                max_active: DEFAULT_MAX_ACTIVE,
                max_idle: DEFAULT_MAX_IDLE,
                max_checkout_time: DEFAULT_MAX_CHECKOUT,
                wait_time: DEFAULT_WAIT,
                max_bad_tolerance: DEFAULT_BAD_TOLERANCE,
                ping_enabled: false,
                ping_query: DEFAULT_PING_QUERY.into(),
                ping_if_idle_for: Duration::ZERO,
                state: Mutex::new(PoolState::default()),
                cond: Condvar::new(),
            }),
        }
    }

    /// Apply `<dataSource>` property knobs. Unknown keys are left to the
    /// driver's connection spec.
    pub fn apply_properties(&mut self, properties: &HashMap<String, String>) -> Result<()> {
        let inner = Arc::get_mut(&mut self.inner).ok_or_else(|| {
            SqlMapperError::Config("pool properties must be applied before sharing".into())
        })?;
        for (key, value) in properties {
            match key.as_str() {
                "poolMaximumActiveConnections" => inner.max_active = parse_num(key, value)?,
                "poolMaximumIdleConnections" => inner.max_idle = parse_num(key, value)?,
                "poolMaximumCheckoutTime" => {
                    inner.max_checkout_time = Duration::from_millis(parse_num(key, value)? as u64);
                }
                "poolTimeToWait" => {
                    inner.wait_time = Duration::from_millis(parse_num(key, value)? as u64);
                }
                "poolMaximumLocalBadConnectionTolerance" => {
                    inner.max_bad_tolerance = parse_num(key, value)?;
                }
                "poolPingQuery" => inner.ping_query = value.clone(),
                "poolPingEnabled" => inner.ping_enabled = value == "true",
                "poolPingConnectionsNotUsedFor" => {
                    inner.ping_if_idle_for = Duration::from_millis(parse_num(key, value)? as u64);
                }
                _ => {}
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn with_max_active(mut self, n: usize) -> Self {
        self.mutate(|i| i.max_active = n);
        self
    }

    #[must_use]
    pub fn with_max_idle(mut self, n: usize) -> Self {
        self.mutate(|i| i.max_idle = n);
        self
    }

    #[must_use]
    pub fn with_max_checkout_time(mut self, d: Duration) -> Self {
        self.mutate(|i| i.max_checkout_time = d);
        self
    }

    #[must_use]
    pub fn with_wait_time(mut self, d: Duration) -> Self {
        self.mutate(|i| i.wait_time = d);
        self
    }

    #[must_use]
    pub fn with_ping(mut self, query: impl Into<String>, if_idle_for: Duration) -> Self {
        self.mutate(|i| {
            i.ping_enabled = true;
            i.ping_query = query.into();
            i.ping_if_idle_for = if_idle_for;
        });
        self
    }

    fn mutate(&mut self, f: impl FnOnce(&mut PoolInner)) {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            f(inner);
        }
    }

    /// Current statistics snapshot.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let state = self.inner.state.lock().expect("pool state poisoned");
        PoolStatus {
            idle_connections: state.idle.len(),
            active_connections: state.active.len(),
            request_count: state.request_count,
            average_request_time: if state.request_count > 0 {
                state.accumulated_request_time / state.request_count as u32
            } else {
                Duration::ZERO
            },
            accumulated_checkout_time: state.accumulated_checkout_time,
            claimed_overdue_connection_count: state.claimed_overdue_connection_count,
            had_to_wait_count: state.had_to_wait_count,
            accumulated_wait_time: state.accumulated_wait_time,
            bad_connection_count: state.bad_connection_count,
        }
    }

    /// Invalidate and close everything, idle and active alike.
    pub fn force_close_all(&self) {
        let mut state = self.inner.state.lock().expect("pool state poisoned");
        fn drain_list(list: &mut Vec<Arc<Mutex<PooledEntry>>>) {
            while let Some(entry) = list.pop() {
                let mut entry = entry.lock().expect("pool entry poisoned");
                entry.valid = false;
                if let Some(mut real) = entry.real.take() {
                    if !real.is_auto_commit() {
                        let _ = real.rollback();
                    }
                    let _ = real.close();
                }
            }
        }
        drain_list(&mut state.active);
        drain_list(&mut state.idle);
        drop(state);
        self.inner.cond.notify_all();
        tracing::debug!("pool forcefully closed/removed all connections");
    }

    fn pop_connection(&self) -> Result<SharedEntry> {
        let inner = &self.inner;
        let started = Instant::now();
        let mut counted_wait = false;
        let mut local_bad = 0usize;

        loop {
            let mut state = inner.state.lock().expect("pool state poisoned");
            let candidate: Option<SharedEntry> = if !state.idle.is_empty() {
                // Most recently returned first; its statement cache is warm.
                let entry = state.idle.pop().expect("idle checked non-empty");
                tracing::debug!("checked out connection from pool");
                Some(entry)
            } else if state.active.len() < inner.max_active {
                match inner.driver.connect(&inner.spec) {
                    Ok(real) => {
                        tracing::debug!("created a new pooled connection");
                        Some(PooledEntry::wrap(real, inner.expected_type_code))
                    }
                    Err(e) => {
                        state.bad_connection_count += 1;
                        local_bad += 1;
                        if local_bad > inner.max_idle + inner.max_bad_tolerance {
                            return Err(SqlMapperError::Pool(format!(
                                "could not open a connection to the database: {e}"
                            )));
                        }
                        continue;
                    }
                }
            } else {
                let oldest = state.active[0].clone();
                let checkout_time = {
                    let entry = oldest.lock().expect("pool entry poisoned");
                    entry.checked_out_at.elapsed()
                };
                if checkout_time > inner.max_checkout_time {
                    // Reclaim the overdue holder's connection.
                    state.claimed_overdue_connection_count += 1;
                    state.accumulated_checkout_time_of_overdue += checkout_time;
                    state.accumulated_checkout_time += checkout_time;
                    state.active.remove(0);
                    let mut old = oldest.lock().expect("pool entry poisoned");
                    old.valid = false;
                    let real = old.real.take();
                    let (created_at, last_used_at) = (old.created_at, old.last_used_at);
                    drop(old);
                    match real {
                        Some(mut real) => {
                            if !real.is_auto_commit() {
                                // A failed rollback leaves a bad connection
                                // that validation will weed out below.
                                if let Err(e) = real.rollback() {
                                    tracing::debug!(error = %e, "bad connection; could not roll back");
                                }
                            }
                            let entry = PooledEntry::wrap(real, inner.expected_type_code);
                            {
                                let mut fresh = entry.lock().expect("pool entry poisoned");
                                fresh.created_at = created_at;
                                fresh.last_used_at = last_used_at;
                            }
                            tracing::debug!("claimed overdue connection");
                            Some(entry)
                        }
                        None => continue,
                    }
                } else {
                    // Wait for a return or an invalidation.
                    if !counted_wait {
                        state.had_to_wait_count += 1;
                        counted_wait = true;
                    }
                    tracing::debug!(wait = ?inner.wait_time, "waiting for pooled connection");
                    let waited = Instant::now();
                    let (mut state, _timeout) = inner
                        .cond
                        .wait_timeout(state, inner.wait_time)
                        .expect("pool state poisoned");
                    state.accumulated_wait_time += waited.elapsed();
                    continue;
                }
            };

            let Some(entry) = candidate else { continue };

            if self.validate(&entry) {
                {
                    let mut e = entry.lock().expect("pool entry poisoned");
                    if let Some(real) = e.real.as_mut() {
                        if !real.is_auto_commit() {
                            real.rollback()?;
                        }
                    }
                    e.type_code = inner.expected_type_code;
                    let now = Instant::now();
                    e.checked_out_at = now;
                    e.last_used_at = now;
                }
                state.active.push(entry.clone());
                state.request_count += 1;
                state.accumulated_request_time += started.elapsed();
                return Ok(entry);
            }

            tracing::debug!("a bad connection was returned from the pool, getting another");
            state.bad_connection_count += 1;
            local_bad += 1;
            drop(state);
            if local_bad > inner.max_idle + inner.max_bad_tolerance {
                return Err(SqlMapperError::Pool(
                    "could not get a good connection to the database".into(),
                ));
            }
        }
    }

    /// Liveness check: the validity flag, and the ping query when the
    /// entry has idled past the configured threshold.
    fn validate(&self, entry: &SharedEntry) -> bool {
        let inner = &self.inner;
        let mut e = entry.lock().expect("pool entry poisoned");
        if !e.valid || e.real.is_none() {
            return false;
        }
        if inner.ping_enabled && e.last_used_at.elapsed() >= inner.ping_if_idle_for {
            let query = inner.ping_query.clone();
            let real = e.real.as_mut().expect("checked above");
            if let Err(err) = real.ping(&query) {
                tracing::debug!(error = %err, "ping failed, discarding connection");
                if let Some(mut dead) = e.real.take() {
                    let _ = dead.close();
                }
                e.valid = false;
                return false;
            }
        }
        true
    }

    fn push_connection(&self, entry: &SharedEntry) -> Result<()> {
        let inner = &self.inner;
        let mut state = inner.state.lock().expect("pool state poisoned");
        if let Some(pos) = state.active.iter().position(|e| Arc::ptr_eq(e, entry)) {
            state.active.remove(pos);
        }

        let mut e = entry.lock().expect("pool entry poisoned");
        if !e.valid || e.real.is_none() {
            tracing::debug!("a bad connection attempted to return to the pool, discarding");
            state.bad_connection_count += 1;
            return Ok(());
        }

        let checkout_time = e.checked_out_at.elapsed();
        state.accumulated_checkout_time += checkout_time;

        if state.idle.len() < inner.max_idle && e.type_code == inner.expected_type_code {
            let mut real = e.real.take().expect("checked above");
            if !real.is_auto_commit() {
                real.rollback()?;
            }
            let fresh = PooledEntry::wrap(real, e.type_code);
            {
                let mut f = fresh.lock().expect("pool entry poisoned");
                f.created_at = e.created_at;
                f.last_used_at = e.last_used_at;
            }
            e.valid = false;
            drop(e);
            state.idle.push(fresh);
            drop(state);
            inner.cond.notify_all();
            tracing::debug!("returned connection to pool");
        } else {
            let mut real = e.real.take().expect("checked above");
            if !real.is_auto_commit() {
                real.rollback()?;
            }
            let _ = real.close();
            e.valid = false;
            tracing::debug!("closed surplus connection");
        }
        Ok(())
    }
}

fn parse_num(key: &str, value: &str) -> Result<usize> {
    value.parse::<usize>().map_err(|_| {
        SqlMapperError::Config(format!("pool property '{key}' is not a number: '{value}'"))
    })
}

impl DataSource for PooledDataSource {
    fn get_connection(&self) -> Result<Box<dyn RawConnection>> {
        let entry = self.pop_connection()?;
        Ok(Box::new(PoolConnection {
            entry,
            pool: PooledDataSource {
                inner: self.inner.clone(),
            },
            returned: false,
        }))
    }

    fn type_code(&self) -> i64 {
        self.inner.expected_type_code
    }
}

/// The proxy handed to callers. Transparent for statement execution;
/// `close` returns the underlying connection to the pool. After an
/// overdue reclaim invalidates the wrapper, every operation fails and
/// `close` becomes a no-op.
#[derive(Debug)]
pub struct PoolConnection {
    entry: SharedEntry,
    pool: PooledDataSource,
    returned: bool,
}

impl PoolConnection {
    fn with_real<T>(
        &mut self,
        f: impl FnOnce(&mut Box<dyn RawConnection>) -> Result<T>,
    ) -> Result<T> {
        let mut entry = self.entry.lock().expect("pool entry poisoned");
        if !entry.valid {
            return Err(SqlMapperError::Pool(
                "connection was invalidated by the pool (overdue or force-closed)".into(),
            ));
        }
        let result = match entry.real.as_mut() {
            Some(real) => f(real),
            None => Err(SqlMapperError::Pool(
                "connection was reclaimed by the pool".into(),
            )),
        };
        entry.last_used_at = Instant::now();
        result
    }
}

impl RawConnection for PoolConnection {
    fn query(&mut self, stmt: &StatementSpec<'_>, params: &[DbValue]) -> Result<ResultSet> {
        self.with_real(|real| real.query(stmt, params))
    }

    fn execute(&mut self, stmt: &StatementSpec<'_>, params: &[DbValue]) -> Result<ExecuteResult> {
        self.with_real(|real| real.execute(stmt, params))
    }

    fn execute_script(&mut self, sql: &str) -> Result<()> {
        self.with_real(|real| real.execute_script(sql))
    }

    fn set_auto_commit(&mut self, auto_commit: bool) -> Result<()> {
        self.with_real(|real| real.set_auto_commit(auto_commit))
    }

    fn is_auto_commit(&self) -> bool {
        let entry = self.entry.lock().expect("pool entry poisoned");
        entry
            .real
            .as_ref()
            .map(|real| real.is_auto_commit())
            .unwrap_or(true)
    }

    fn commit(&mut self) -> Result<()> {
        self.with_real(|real| real.commit())
    }

    fn rollback(&mut self) -> Result<()> {
        self.with_real(|real| real.rollback())
    }

    fn set_isolation(&mut self, level: IsolationLevel) -> Result<()> {
        self.with_real(|real| real.set_isolation(level))
    }

    fn ping(&mut self, query: &str) -> Result<()> {
        self.with_real(|real| real.ping(query))
    }

    fn close(&mut self) -> Result<()> {
        if self.returned {
            return Ok(());
        }
        self.returned = true;
        self.pool.push_connection(&self.entry)
    }

    fn product_name(&self) -> String {
        let entry = self.entry.lock().expect("pool entry poisoned");
        entry
            .real
            .as_ref()
            .map(|real| real.product_name())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

impl Drop for PoolConnection {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
