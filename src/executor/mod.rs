//! The execution pipeline: dispatch, session-local caching, parameter
//! binding, result mapping and key generation, with the interceptor chain
//! wrapped around the outermost executor.

pub mod caching;
pub mod parameter;
pub mod result_set;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::cache::key::KeyComponent;
use crate::cache::CacheKey;
use crate::config::{Configuration, LocalCacheScope};
use crate::driver::{ExecuteResult, StatementSpec};
use crate::error::{Result, SqlMapperError};
use crate::error_context::ErrorContext;
use crate::mapping::{BoundSql, KeyGeneratorKind, MappedStatement};
use crate::plugin::{run_chain, Call, Interceptor, Outcome};
use crate::reflection::MetaValue;
use crate::session::{ExecutorType, ResultHandler, RowBounds};
use crate::transaction::Transaction;
use crate::types::DbValue;

/// Sentinel update count returned by the batch executor until flush.
pub const BATCH_UPDATE_RETURN_VALUE: i64 = i64::MIN + 1002;

/// Outcome of one flushed batch: the statement, its SQL, and the update
/// counts the driver reported per queued parameter set.
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub statement_id: String,
    pub sql: String,
    pub update_counts: Vec<i64>,
    pub parameter_objects: Vec<Value>,
}

/// One session's executor. Single-threaded by contract; holds the
/// transaction and the first-level cache.
pub trait Executor {
    fn configuration(&self) -> &Arc<Configuration>;

    fn update(&mut self, ms: &Arc<MappedStatement>, parameter: &mut Value) -> Result<i64>;

    fn query(
        &mut self,
        ms: &Arc<MappedStatement>,
        parameter: &Value,
        bounds: RowBounds,
        handler: Option<&mut dyn ResultHandler>,
    ) -> Result<Vec<Value>>;

    fn flush_statements(&mut self) -> Result<Vec<BatchResult>>;

    fn commit(&mut self, required: bool) -> Result<()>;

    fn rollback(&mut self, required: bool) -> Result<()>;

    fn create_cache_key(
        &self,
        ms: &MappedStatement,
        parameter: &Value,
        bounds: RowBounds,
        bound_sql: &BoundSql,
    ) -> Result<CacheKey>;

    fn clear_local_cache(&mut self);

    fn close(&mut self, force_rollback: bool) -> Result<()>;

    fn is_closed(&self) -> bool;
}

/// Build the session executor stack: base dispatch, second-level caching
/// when enabled, interceptors outermost.
pub fn build_executor(
    configuration: Arc<Configuration>,
    transaction: Box<dyn Transaction>,
    executor_type: ExecutorType,
) -> Box<dyn Executor> {
    let base: Box<dyn Executor> = match executor_type {
        ExecutorType::Simple => {
            Box::new(BaseExecutor::new(configuration.clone(), transaction, SimpleDispatch))
        }
        ExecutorType::Reuse => {
            Box::new(BaseExecutor::new(configuration.clone(), transaction, ReuseDispatch))
        }
        ExecutorType::Batch => Box::new(BaseExecutor::new(
            configuration.clone(),
            transaction,
            BatchDispatch::default(),
        )),
    };

    let cached: Box<dyn Executor> = if configuration.settings.cache_enabled {
        Box::new(caching::CachingExecutor::new(base))
    } else {
        base
    };

    if configuration.interceptors().is_empty() {
        cached
    } else {
        let interceptors = configuration.interceptors().to_vec();
        Box::new(InterceptedExecutor {
            inner: cached,
            interceptors,
        })
    }
}

enum LocalEntry {
    /// Parked while the owning query is still executing; a nested query
    /// landing here is circular.
    ExecutionPlaceholder,
    Rows(Arc<Vec<Value>>),
}

/// Shared behavior of the simple/reuse/batch executors; the dispatch
/// value supplies the statement-level strategy.
pub struct BaseExecutor<D: StatementDispatch> {
    configuration: Arc<Configuration>,
    transaction: Box<dyn Transaction>,
    local_cache: HashMap<CacheKey, LocalEntry>,
    query_stack: usize,
    closed: bool,
    dispatch: D,
}

impl<D: StatementDispatch> BaseExecutor<D> {
    pub fn new(
        configuration: Arc<Configuration>,
        transaction: Box<dyn Transaction>,
        dispatch: D,
    ) -> Self {
        Self {
            configuration,
            transaction,
            local_cache: HashMap::new(),
            query_stack: 0,
            closed: false,
            dispatch,
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(SqlMapperError::Execution("executor was closed".into()));
        }
        Ok(())
    }

    /// Route an inner-pipeline call (parameter binding, statement
    /// preparation, result handling) through interceptors that declared
    /// its signature. The real operation runs after the chain returns.
    fn run_hook(&self, call: &Call<'_>) -> Result<()> {
        let interceptors = self.configuration.interceptors();
        if interceptors.is_empty() {
            return Ok(());
        }
        let mut terminal = |_: &Call<'_>| Ok(Outcome::Unit);
        run_chain(interceptors, call, &mut terminal)?;
        Ok(())
    }

    fn query_from_database(
        &mut self,
        ms: &Arc<MappedStatement>,
        parameter: &Value,
        bounds: RowBounds,
        key: &CacheKey,
        bound_sql: &BoundSql,
        handler: Option<&mut dyn ResultHandler>,
    ) -> Result<Vec<Value>> {
        self.local_cache
            .insert(key.clone(), LocalEntry::ExecutionPlaceholder);
        let outcome: Result<Vec<Value>> = (|| {
            self.run_hook(&Call::SetParameters {
                statement: ms.as_ref(),
                bound_sql,
            })?;
            let params = parameter::bind_parameters(&self.configuration, bound_sql, parameter)?;
            self.run_hook(&Call::PrepareStatement {
                statement: ms.as_ref(),
                sql: &bound_sql.sql,
            })?;
            let result_set = self.dispatch.do_query(
                self.transaction.as_mut(),
                &self.configuration,
                ms,
                bound_sql,
                &params,
            )?;
            let row_count = result_set.len();
            let rows = result_set::handle_result_set(self, ms, result_set, bounds, handler)?;
            self.run_hook(&Call::HandleResultSets {
                statement: ms.as_ref(),
                row_count,
            })?;
            Ok(rows)
        })();
        self.local_cache.remove(key);
        let rows = outcome?;
        self.local_cache
            .insert(key.clone(), LocalEntry::Rows(Arc::new(rows.clone())));
        Ok(rows)
    }

    fn apply_key_generator_before(
        &mut self,
        ms: &Arc<MappedStatement>,
        parameter: &mut Value,
    ) -> Result<()> {
        if let KeyGeneratorKind::SelectKey {
            statement_id,
            execute_before: true,
        } = &ms.key_generator
        {
            self.run_select_key(&statement_id.clone(), ms, parameter)?;
        }
        Ok(())
    }

    fn apply_key_generator_after(
        &mut self,
        ms: &Arc<MappedStatement>,
        parameter: &mut Value,
        result: &ExecuteResult,
    ) -> Result<()> {
        match &ms.key_generator {
            KeyGeneratorKind::DriverGenerated => {
                if let (Some(property), Some(key)) =
                    (ms.key_properties.first(), result.generated_key.as_ref())
                {
                    let value = match key {
                        DbValue::Int(n) => Value::from(*n),
                        DbValue::Text(s) => Value::String(s.clone()),
                        other => {
                            return Err(SqlMapperError::Execution(format!(
                                "unsupported generated key value {other:?}"
                            )))
                        }
                    };
                    MetaValue::set(parameter, property, value)?;
                }
                Ok(())
            }
            KeyGeneratorKind::SelectKey {
                statement_id,
                execute_before: false,
            } => self.run_select_key(&statement_id.clone(), ms, parameter),
            _ => Ok(()),
        }
    }

    fn run_select_key(
        &mut self,
        key_statement_id: &str,
        ms: &Arc<MappedStatement>,
        parameter: &mut Value,
    ) -> Result<()> {
        let key_ms = self.configuration.mapped_statement(key_statement_id)?;
        ErrorContext::store();
        let rows = self.query(&key_ms, &parameter.clone(), RowBounds::default(), None);
        ErrorContext::recall();
        let rows = rows?;
        let row = match rows.as_slice() {
            [] => {
                return Err(SqlMapperError::Execution(format!(
                    "select-key statement '{key_statement_id}' returned no row"
                )))
            }
            [one] => one.clone(),
            _ => {
                return Err(SqlMapperError::Execution(format!(
                    "select-key statement '{key_statement_id}' returned more than one row"
                )))
            }
        };

        let properties = if key_ms.key_properties.is_empty() {
            ms.key_properties.clone()
        } else {
            key_ms.key_properties.clone()
        };
        for property in &properties {
            let short = property.rsplit('.').next().unwrap_or(property);
            let value = if row.is_object() && MetaValue::has(&row, short) {
                MetaValue::get(&row, short)
            } else {
                row.clone()
            };
            MetaValue::set(parameter, property, value)?;
        }
        Ok(())
    }
}

impl<D: StatementDispatch> Executor for BaseExecutor<D> {
    fn configuration(&self) -> &Arc<Configuration> {
        &self.configuration
    }

    fn update(&mut self, ms: &Arc<MappedStatement>, parameter: &mut Value) -> Result<i64> {
        self.check_open()?;
        ErrorContext::with(|c| {
            c.resource = Some(ms.resource.clone());
            c.activity = Some("executing an update".into());
            c.object = Some(ms.id.clone());
        });
        self.clear_local_cache();

        self.apply_key_generator_before(ms, parameter)?;
        let bound_sql = ms.sql_source.bound_sql(&self.configuration, parameter)?;
        ErrorContext::sql(bound_sql.sql.clone());
        self.run_hook(&Call::SetParameters {
            statement: ms.as_ref(),
            bound_sql: &bound_sql,
        })?;
        let params = parameter::bind_parameters(&self.configuration, &bound_sql, parameter)?;
        self.run_hook(&Call::PrepareStatement {
            statement: ms.as_ref(),
            sql: &bound_sql.sql,
        })?;
        let result = self.dispatch.do_update(
            self.transaction.as_mut(),
            &self.configuration,
            ms,
            &bound_sql,
            &params,
            parameter,
        )?;
        self.apply_key_generator_after(ms, parameter, &result)?;
        Ok(result.rows_affected)
    }

    fn query(
        &mut self,
        ms: &Arc<MappedStatement>,
        parameter: &Value,
        bounds: RowBounds,
        handler: Option<&mut dyn ResultHandler>,
    ) -> Result<Vec<Value>> {
        self.check_open()?;
        ErrorContext::with(|c| {
            c.resource = Some(ms.resource.clone());
            c.activity = Some("executing a query".into());
            c.object = Some(ms.id.clone());
        });
        if self.query_stack == 0 && ms.flush_cache_on_execute {
            self.clear_local_cache();
        }

        let bound_sql = ms.sql_source.bound_sql(&self.configuration, parameter)?;
        ErrorContext::sql(bound_sql.sql.clone());
        let key = self.create_cache_key(ms, parameter, bounds, &bound_sql)?;

        self.query_stack += 1;
        let result: Result<Vec<Value>> = (|| {
            if handler.is_none() {
                match self.local_cache.get(&key) {
                    Some(LocalEntry::Rows(rows)) => {
                        tracing::trace!(statement = %ms.id, "first-level cache hit");
                        return Ok(rows.as_ref().clone());
                    }
                    Some(LocalEntry::ExecutionPlaceholder) => {
                        return Err(SqlMapperError::Execution(format!(
                            "circular nested query detected for statement '{}'",
                            ms.id
                        )))
                    }
                    None => {}
                }
            }
            self.query_from_database(ms, parameter, bounds, &key, &bound_sql, handler)
        })();
        self.query_stack -= 1;

        if self.query_stack == 0
            && self.configuration.settings.local_cache_scope == LocalCacheScope::Statement
        {
            self.clear_local_cache();
        }
        result
    }

    fn flush_statements(&mut self) -> Result<Vec<BatchResult>> {
        self.check_open()?;
        self.dispatch
            .do_flush(self.transaction.as_mut(), &self.configuration)
    }

    fn commit(&mut self, required: bool) -> Result<()> {
        self.check_open()?;
        self.clear_local_cache();
        self.flush_statements()?;
        if required {
            self.transaction.commit()?;
        }
        Ok(())
    }

    fn rollback(&mut self, required: bool) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.clear_local_cache();
        self.dispatch.discard_pending();
        if required {
            self.transaction.rollback()?;
        }
        Ok(())
    }

    fn create_cache_key(
        &self,
        ms: &MappedStatement,
        parameter: &Value,
        bounds: RowBounds,
        bound_sql: &BoundSql,
    ) -> Result<CacheKey> {
        let mut key = CacheKey::new();
        key.update(ms.id.as_str())?;
        key.update(bounds.offset as i64)?;
        key.update(bounds.limit.min(i64::MAX as usize) as i64)?;
        key.update(bound_sql.sql.as_str())?;
        for value in parameter::resolve_parameter_values(bound_sql, parameter) {
            key.update(KeyComponent::from(&value))?;
        }
        if let Some(environment) = self.configuration.environment() {
            key.update(environment.id.as_str())?;
        }
        Ok(key)
    }

    fn clear_local_cache(&mut self) {
        if !self.closed {
            self.local_cache.clear();
        }
    }

    fn close(&mut self, force_rollback: bool) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let outcome: Result<()> = (|| {
            if force_rollback {
                self.rollback(true)?;
            } else {
                self.commit(false)?;
            }
            Ok(())
        })();
        let close_result = self.transaction.close();
        self.closed = true;
        self.local_cache.clear();
        outcome?;
        close_result
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Per-statement execution strategy behind the shared base executor.
pub trait StatementDispatch {
    fn do_query(
        &mut self,
        transaction: &mut dyn Transaction,
        configuration: &Configuration,
        ms: &MappedStatement,
        bound_sql: &BoundSql,
        params: &[DbValue],
    ) -> Result<crate::results::ResultSet>;

    fn do_update(
        &mut self,
        transaction: &mut dyn Transaction,
        configuration: &Configuration,
        ms: &MappedStatement,
        bound_sql: &BoundSql,
        params: &[DbValue],
        parameter: &Value,
    ) -> Result<ExecuteResult>;

    fn do_flush(
        &mut self,
        transaction: &mut dyn Transaction,
        configuration: &Configuration,
    ) -> Result<Vec<BatchResult>>;

    /// Drop anything queued without executing (rollback path).
    fn discard_pending(&mut self) {}
}

fn statement_spec<'a>(ms: &MappedStatement, sql: &'a str, reuse: bool) -> StatementSpec<'a> {
    StatementSpec {
        sql,
        style: ms.statement_style,
        timeout: ms.timeout,
        fetch_size: ms.fetch_size,
        reuse,
    }
}

/// One prepared statement per call, nothing reused or queued.
pub struct SimpleDispatch;

impl StatementDispatch for SimpleDispatch {
    fn do_query(
        &mut self,
        transaction: &mut dyn Transaction,
        _configuration: &Configuration,
        ms: &MappedStatement,
        bound_sql: &BoundSql,
        params: &[DbValue],
    ) -> Result<crate::results::ResultSet> {
        let spec = statement_spec(ms, &bound_sql.sql, false);
        transaction.connection()?.query(&spec, params)
    }

    fn do_update(
        &mut self,
        transaction: &mut dyn Transaction,
        _configuration: &Configuration,
        ms: &MappedStatement,
        bound_sql: &BoundSql,
        params: &[DbValue],
        _parameter: &Value,
    ) -> Result<ExecuteResult> {
        let spec = statement_spec(ms, &bound_sql.sql, false);
        transaction.connection()?.execute(&spec, params)
    }

    fn do_flush(
        &mut self,
        _transaction: &mut dyn Transaction,
        _configuration: &Configuration,
    ) -> Result<Vec<BatchResult>> {
        Ok(Vec::new())
    }
}

/// Prepared statements cached by SQL text for the session; the driver
/// keeps the prepared form under its statement cache.
pub struct ReuseDispatch;

impl StatementDispatch for ReuseDispatch {
    fn do_query(
        &mut self,
        transaction: &mut dyn Transaction,
        _configuration: &Configuration,
        ms: &MappedStatement,
        bound_sql: &BoundSql,
        params: &[DbValue],
    ) -> Result<crate::results::ResultSet> {
        let spec = statement_spec(ms, &bound_sql.sql, true);
        transaction.connection()?.query(&spec, params)
    }

    fn do_update(
        &mut self,
        transaction: &mut dyn Transaction,
        _configuration: &Configuration,
        ms: &MappedStatement,
        bound_sql: &BoundSql,
        params: &[DbValue],
        _parameter: &Value,
    ) -> Result<ExecuteResult> {
        let spec = statement_spec(ms, &bound_sql.sql, true);
        transaction.connection()?.execute(&spec, params)
    }

    fn do_flush(
        &mut self,
        _transaction: &mut dyn Transaction,
        _configuration: &Configuration,
    ) -> Result<Vec<BatchResult>> {
        Ok(Vec::new())
    }
}

struct BatchItem {
    statement_id: String,
    sql: String,
    timeout: Option<std::time::Duration>,
    params_list: Vec<Vec<DbValue>>,
    parameter_objects: Vec<Value>,
}

/// Updates are queued and executed on flush, grouped by consecutive SQL
/// text the way a driver batch would be.
#[derive(Default)]
pub struct BatchDispatch {
    queue: Vec<BatchItem>,
}

impl StatementDispatch for BatchDispatch {
    fn do_query(
        &mut self,
        transaction: &mut dyn Transaction,
        configuration: &Configuration,
        ms: &MappedStatement,
        bound_sql: &BoundSql,
        params: &[DbValue],
    ) -> Result<crate::results::ResultSet> {
        // Pending updates must land before a query observes their effect.
        self.do_flush(transaction, configuration)?;
        let spec = statement_spec(ms, &bound_sql.sql, false);
        transaction.connection()?.query(&spec, params)
    }

    fn do_update(
        &mut self,
        _transaction: &mut dyn Transaction,
        _configuration: &Configuration,
        ms: &MappedStatement,
        bound_sql: &BoundSql,
        params: &[DbValue],
        parameter: &Value,
    ) -> Result<ExecuteResult> {
        let same_tail = self
            .queue
            .last()
            .is_some_and(|item| item.sql == bound_sql.sql && item.statement_id == ms.id);
        if same_tail {
            let item = self.queue.last_mut().expect("checked above");
            item.params_list.push(params.to_vec());
            item.parameter_objects.push(parameter.clone());
        } else {
            self.queue.push(BatchItem {
                statement_id: ms.id.clone(),
                sql: bound_sql.sql.clone(),
                timeout: ms.timeout,
                params_list: vec![params.to_vec()],
                parameter_objects: vec![parameter.clone()],
            });
        }
        Ok(ExecuteResult {
            rows_affected: BATCH_UPDATE_RETURN_VALUE,
            generated_key: None,
        })
    }

    fn do_flush(
        &mut self,
        transaction: &mut dyn Transaction,
        _configuration: &Configuration,
    ) -> Result<Vec<BatchResult>> {
        let mut results = Vec::with_capacity(self.queue.len());
        for item in self.queue.drain(..) {
            let mut update_counts = Vec::with_capacity(item.params_list.len());
            let spec = StatementSpec {
                sql: &item.sql,
                style: crate::driver::StatementStyle::Prepared,
                timeout: item.timeout,
                fetch_size: None,
                reuse: true,
            };
            for params in &item.params_list {
                let result = transaction.connection()?.execute(&spec, params)?;
                update_counts.push(result.rows_affected);
            }
            results.push(BatchResult {
                statement_id: item.statement_id,
                sql: item.sql,
                update_counts,
                parameter_objects: item.parameter_objects,
            });
        }
        Ok(results)
    }

    fn discard_pending(&mut self) {
        self.queue.clear();
    }
}

/// Routes calls through the registered interceptor chain; the first
/// registered interceptor runs outermost.
pub struct InterceptedExecutor {
    inner: Box<dyn Executor>,
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl Executor for InterceptedExecutor {
    fn configuration(&self) -> &Arc<Configuration> {
        self.inner.configuration()
    }

    fn update(&mut self, ms: &Arc<MappedStatement>, parameter: &mut Value) -> Result<i64> {
        let snapshot = parameter.clone();
        let call = Call::ExecutorUpdate {
            statement: ms.as_ref(),
            parameter: &snapshot,
        };
        let inner = &mut self.inner;
        let mut terminal =
            |_: &Call<'_>| inner.update(ms, parameter).map(Outcome::Affected);
        Ok(run_chain(&self.interceptors, &call, &mut terminal)?.affected())
    }

    fn query(
        &mut self,
        ms: &Arc<MappedStatement>,
        parameter: &Value,
        bounds: RowBounds,
        handler: Option<&mut dyn ResultHandler>,
    ) -> Result<Vec<Value>> {
        let call = Call::ExecutorQuery {
            statement: ms.as_ref(),
            parameter,
            bounds,
        };
        let inner = &mut self.inner;
        let mut handler = handler;
        let mut terminal = |_: &Call<'_>| {
            inner
                .query(ms, parameter, bounds, handler.take())
                .map(Outcome::Rows)
        };
        Ok(run_chain(&self.interceptors, &call, &mut terminal)?.rows())
    }

    fn flush_statements(&mut self) -> Result<Vec<BatchResult>> {
        self.inner.flush_statements()
    }

    fn commit(&mut self, required: bool) -> Result<()> {
        let call = Call::ExecutorCommit { required };
        let inner = &mut self.inner;
        let mut terminal = |_: &Call<'_>| inner.commit(required).map(|()| Outcome::Unit);
        run_chain(&self.interceptors, &call, &mut terminal)?;
        Ok(())
    }

    fn rollback(&mut self, required: bool) -> Result<()> {
        let call = Call::ExecutorRollback { required };
        let inner = &mut self.inner;
        let mut terminal = |_: &Call<'_>| inner.rollback(required).map(|()| Outcome::Unit);
        run_chain(&self.interceptors, &call, &mut terminal)?;
        Ok(())
    }

    fn create_cache_key(
        &self,
        ms: &MappedStatement,
        parameter: &Value,
        bounds: RowBounds,
        bound_sql: &BoundSql,
    ) -> Result<CacheKey> {
        self.inner.create_cache_key(ms, parameter, bounds, bound_sql)
    }

    fn clear_local_cache(&mut self) {
        self.inner.clear_local_cache();
    }

    fn close(&mut self, force_rollback: bool) -> Result<()> {
        self.inner.close(force_rollback)
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}
