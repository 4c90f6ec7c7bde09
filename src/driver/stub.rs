//! A controllable in-memory driver used by the pool and executor tests.
//! Registered under the name `stub`; real deployments never reference it.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{Result, SqlMapperError};
use crate::results::ResultSet;
use crate::types::DbValue;

use super::{
    ConnectionSpec, Driver, ExecuteResult, IsolationLevel, RawConnection, StatementSpec,
};

/// Shared switchboard for every connection the stub driver hands out.
#[derive(Debug, Default)]
pub struct StubState {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub rollbacks: AtomicUsize,
    pub commits: AtomicUsize,
    pub pings: AtomicUsize,
    /// When set, every ping fails until cleared.
    pub fail_pings: AtomicBool,
    /// When set, the next `connect` fails once.
    pub fail_next_connect: AtomicBool,
    /// Canned rows handed back by every query, as (columns, rows).
    pub canned: Mutex<Option<(Vec<String>, Vec<Vec<DbValue>>)>>,
}

#[derive(Default)]
pub struct StubDriver {
    state: Arc<StubState>,
}

impl StubDriver {
    #[must_use]
    pub fn with_state(state: Arc<StubState>) -> Self {
        Self { state }
    }

    #[must_use]
    pub fn state(&self) -> Arc<StubState> {
        self.state.clone()
    }
}

impl Driver for StubDriver {
    fn name(&self) -> &str {
        "stub"
    }

    fn connect(&self, _spec: &ConnectionSpec) -> Result<Box<dyn RawConnection>> {
        if self.state.fail_next_connect.swap(false, Ordering::SeqCst) {
            return Err(SqlMapperError::DataStore("stub connect failure".into()));
        }
        self.state.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StubConnection {
            state: self.state.clone(),
            auto_commit: true,
            closed: false,
        }))
    }
}

#[derive(Debug)]
pub struct StubConnection {
    state: Arc<StubState>,
    auto_commit: bool,
    closed: bool,
}

impl StubConnection {
    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(SqlMapperError::DataStore("stub connection is closed".into()));
        }
        Ok(())
    }
}

impl RawConnection for StubConnection {
    fn query(&mut self, _stmt: &StatementSpec<'_>, _params: &[DbValue]) -> Result<ResultSet> {
        self.check_open()?;
        let canned = self.state.canned.lock().expect("stub state poisoned");
        let mut rs = ResultSet::with_capacity(4);
        if let Some((columns, rows)) = canned.as_ref() {
            rs.set_column_names(Arc::new(columns.clone()));
            for row in rows {
                rs.push_values(row.clone());
            }
        }
        Ok(rs)
    }

    fn execute(&mut self, _stmt: &StatementSpec<'_>, _params: &[DbValue]) -> Result<ExecuteResult> {
        self.check_open()?;
        Ok(ExecuteResult {
            rows_affected: 1,
            generated_key: Some(DbValue::Int(1)),
        })
    }

    fn execute_script(&mut self, _sql: &str) -> Result<()> {
        self.check_open()
    }

    fn set_auto_commit(&mut self, auto_commit: bool) -> Result<()> {
        self.auto_commit = auto_commit;
        Ok(())
    }

    fn is_auto_commit(&self) -> bool {
        self.auto_commit
    }

    fn commit(&mut self) -> Result<()> {
        self.check_open()?;
        self.state.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.check_open()?;
        self.state.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn set_isolation(&mut self, _level: IsolationLevel) -> Result<()> {
        Ok(())
    }

    fn ping(&mut self, _query: &str) -> Result<()> {
        self.check_open()?;
        self.state.pings.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_pings.load(Ordering::SeqCst) {
            return Err(SqlMapperError::DataStore("stub ping failure".into()));
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.state.closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn product_name(&self) -> String {
        "Stub".to_string()
    }
}
