//! The session surface: factory, session, row bounds and result-handler
//! contracts.
//!
//! A session owns one executor and one transaction and is single-threaded
//! by construction (interior `RefCell` state makes it `!Sync`); open one
//! per unit of work and close it.

use std::cell::{Cell, RefCell};
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::binding::MapperProxy;
use crate::config::{Configuration, XmlConfigBuilder};
use crate::driver::IsolationLevel;
use crate::error::{Result, SqlMapperError};
use crate::error_context::ErrorContext;
use crate::executor::{build_executor, BatchResult, Executor};
use crate::mapping::StatementKind;

/// Which executor flavor a session runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutorType {
    #[default]
    Simple,
    Reuse,
    Batch,
}

impl ExecutorType {
    #[must_use]
    pub fn parse(name: &str) -> Option<ExecutorType> {
        match name.trim().to_ascii_uppercase().as_str() {
            "SIMPLE" => Some(ExecutorType::Simple),
            "REUSE" => Some(ExecutorType::Reuse),
            "BATCH" => Some(ExecutorType::Batch),
            _ => None,
        }
    }
}

/// Client-side pagination applied while consuming the result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowBounds {
    pub offset: usize,
    pub limit: usize,
}

impl Default for RowBounds {
    fn default() -> Self {
        RowBounds {
            offset: 0,
            limit: usize::MAX,
        }
    }
}

impl RowBounds {
    #[must_use]
    pub fn new(offset: usize, limit: usize) -> Self {
        RowBounds { offset, limit }
    }
}

/// Streaming consumer of mapped rows; returning false stops the scan.
pub trait ResultHandler {
    fn handle(&mut self, value: &Value) -> bool;
}

/// Builds a [`SqlSessionFactory`] from configuration XML.
#[derive(Default)]
pub struct SqlSessionFactoryBuilder;

impl SqlSessionFactoryBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Parse the root configuration document.
    pub fn build(&self, xml: &str) -> Result<SqlSessionFactory> {
        self.build_with(XmlConfigBuilder::new(), xml)
    }

    /// Parse with a prepared loader (pre-registered records, handlers,
    /// interceptor factories, environment override).
    pub fn build_with(
        &self,
        loader: XmlConfigBuilder,
        xml: &str,
    ) -> Result<SqlSessionFactory> {
        let configuration = loader.parse(xml)?;
        Ok(SqlSessionFactory::from_configuration(configuration))
    }
}

/// Creates sessions against one frozen configuration.
#[derive(Clone)]
#[derive(Debug)]
pub struct SqlSessionFactory {
    configuration: Arc<Configuration>,
}

impl SqlSessionFactory {
    #[must_use]
    pub fn from_configuration(configuration: Configuration) -> Self {
        Self {
            configuration: Arc::new(configuration),
        }
    }

    #[must_use]
    pub fn configuration(&self) -> &Arc<Configuration> {
        &self.configuration
    }

    pub fn open_session(&self) -> Result<SqlSession> {
        self.open_session_with(
            self.configuration.settings.default_executor_type,
            false,
            None,
        )
    }

    pub fn open_session_auto_commit(&self) -> Result<SqlSession> {
        self.open_session_with(
            self.configuration.settings.default_executor_type,
            true,
            None,
        )
    }

    pub fn open_session_with(
        &self,
        executor_type: ExecutorType,
        auto_commit: bool,
        isolation: Option<IsolationLevel>,
    ) -> Result<SqlSession> {
        let environment = self.configuration.environment().ok_or_else(|| {
            SqlMapperError::Config(
                "cannot open a session: the configuration has no environment".into(),
            )
        })?;
        let transaction = environment.transaction_manager.new_transaction(
            environment.data_source.clone(),
            isolation,
            auto_commit,
        );
        let executor = build_executor(self.configuration.clone(), transaction, executor_type);
        Ok(SqlSession {
            configuration: self.configuration.clone(),
            executor: RefCell::new(executor),
            auto_commit,
            dirty: Cell::new(false),
        })
    }
}

/// One unit of work: select/insert/update/delete against mapped
/// statements, commit/rollback, mapper dispatch. Not shareable across
/// threads.
pub struct SqlSession {
    configuration: Arc<Configuration>,
    executor: RefCell<Box<dyn Executor>>,
    auto_commit: bool,
    dirty: Cell<bool>,
}

impl SqlSession {
    #[must_use]
    pub fn configuration(&self) -> &Arc<Configuration> {
        &self.configuration
    }

    /// One row or null; more than one row is an execution error.
    pub fn select_one(&self, statement: &str, parameter: Value) -> Result<Value> {
        let mut rows = self.select_list(statement, parameter)?;
        match rows.len() {
            0 => Ok(Value::Null),
            1 => Ok(rows.remove(0)),
            n => Err(SqlMapperError::Execution(format!(
                "expected one result (or null) to be returned by select_one(), but found {n}"
            ))),
        }
    }

    pub fn select_list(&self, statement: &str, parameter: Value) -> Result<Vec<Value>> {
        self.select_list_with_bounds(statement, parameter, RowBounds::default())
    }

    /// Typed single-row select, deserialized through serde.
    pub fn select_one_as<T: serde::de::DeserializeOwned>(
        &self,
        statement: &str,
        parameter: Value,
    ) -> Result<Option<T>> {
        let value = self.select_one(statement, parameter)?;
        if value.is_null() {
            return Ok(None);
        }
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| SqlMapperError::Execution(format!("could not deserialize row: {e}")))
    }

    /// Typed list select, each row deserialized through serde.
    pub fn select_list_as<T: serde::de::DeserializeOwned>(
        &self,
        statement: &str,
        parameter: Value,
    ) -> Result<Vec<T>> {
        self.select_list(statement, parameter)?
            .into_iter()
            .map(|row| {
                serde_json::from_value(row).map_err(|e| {
                    SqlMapperError::Execution(format!("could not deserialize row: {e}"))
                })
            })
            .collect()
    }

    pub fn select_list_with_bounds(
        &self,
        statement: &str,
        parameter: Value,
        bounds: RowBounds,
    ) -> Result<Vec<Value>> {
        let ms = self.configuration.mapped_statement(statement)?;
        self.executor
            .borrow_mut()
            .query(&ms, &parameter, bounds, None)
            .map_err(attach_context)
    }

    /// Rows keyed by one property's rendered value.
    pub fn select_map(
        &self,
        statement: &str,
        parameter: Value,
        key_property: &str,
    ) -> Result<Map<String, Value>> {
        self.select_map_with_bounds(statement, parameter, key_property, RowBounds::default())
    }

    pub fn select_map_with_bounds(
        &self,
        statement: &str,
        parameter: Value,
        key_property: &str,
        bounds: RowBounds,
    ) -> Result<Map<String, Value>> {
        let rows = self.select_list_with_bounds(statement, parameter, bounds)?;
        let mut keyed = Map::new();
        for row in rows {
            let key = crate::reflection::MetaValue::get(&row, key_property);
            let rendered = match key {
                Value::String(s) => s,
                Value::Null => continue,
                other => other.to_string(),
            };
            keyed.insert(rendered, row);
        }
        Ok(keyed)
    }

    pub fn select_with_handler(
        &self,
        statement: &str,
        parameter: Value,
        bounds: RowBounds,
        handler: &mut dyn ResultHandler,
    ) -> Result<()> {
        let ms = self.configuration.mapped_statement(statement)?;
        self.executor
            .borrow_mut()
            .query(&ms, &parameter, bounds, Some(handler))
            .map_err(attach_context)?;
        Ok(())
    }

    pub fn insert(&self, statement: &str, parameter: Value) -> Result<i64> {
        let mut parameter = parameter;
        self.insert_with_keys(statement, &mut parameter)
    }

    /// Insert whose generated keys are written back into `parameter`'s
    /// declared key properties.
    pub fn insert_with_keys(&self, statement: &str, parameter: &mut Value) -> Result<i64> {
        self.run_update(statement, parameter)
    }

    pub fn update(&self, statement: &str, parameter: Value) -> Result<i64> {
        let mut parameter = parameter;
        self.run_update(statement, &mut parameter)
    }

    pub fn delete(&self, statement: &str, parameter: Value) -> Result<i64> {
        let mut parameter = parameter;
        self.run_update(statement, &mut parameter)
    }

    fn run_update(&self, statement: &str, parameter: &mut Value) -> Result<i64> {
        let ms = self.configuration.mapped_statement(statement)?;
        if ms.kind == StatementKind::Select {
            return Err(SqlMapperError::Execution(format!(
                "statement '{statement}' is a select; use the select methods"
            )));
        }
        self.dirty.set(true);
        self.executor
            .borrow_mut()
            .update(&ms, parameter)
            .map_err(attach_context)
    }

    pub fn flush_statements(&self) -> Result<Vec<BatchResult>> {
        self.executor
            .borrow_mut()
            .flush_statements()
            .map_err(attach_context)
    }

    pub fn commit(&self) -> Result<()> {
        self.commit_force(false)
    }

    pub fn commit_force(&self, force: bool) -> Result<()> {
        let required = self.commit_or_rollback_required(force);
        self.executor
            .borrow_mut()
            .commit(required)
            .map_err(attach_context)?;
        self.dirty.set(false);
        Ok(())
    }

    pub fn rollback(&self) -> Result<()> {
        self.rollback_force(false)
    }

    pub fn rollback_force(&self, force: bool) -> Result<()> {
        let required = self.commit_or_rollback_required(force);
        self.executor
            .borrow_mut()
            .rollback(required)
            .map_err(attach_context)?;
        self.dirty.set(false);
        Ok(())
    }

    fn commit_or_rollback_required(&self, force: bool) -> bool {
        (!self.auto_commit && self.dirty.get()) || force
    }

    /// Dispatch handle for a registered mapper interface.
    pub fn get_mapper(&self, interface: &str) -> Result<MapperProxy<'_>> {
        let descriptor = self.configuration.mapper_registry().get(interface)?;
        Ok(MapperProxy::new(self, descriptor))
    }

    pub fn close(&self) -> Result<()> {
        let force_rollback = self.commit_or_rollback_required(false);
        let outcome = self.executor.borrow_mut().close(force_rollback);
        self.dirty.set(false);
        ErrorContext::reset();
        outcome
    }
}

impl Drop for SqlSession {
    fn drop(&mut self) {
        if !self.executor.borrow().is_closed() {
            let _ = self.close();
        }
    }
}

fn attach_context(error: SqlMapperError) -> SqlMapperError {
    match error {
        #[cfg(feature = "sqlite")]
        SqlMapperError::SqliteError(e) => SqlMapperError::DataStore(
            ErrorContext::current_message(&format!("driver error: {e}")),
        ),
        SqlMapperError::DataStore(m) => {
            SqlMapperError::DataStore(ErrorContext::current_message(&m))
        }
        SqlMapperError::Execution(m) => {
            SqlMapperError::Execution(ErrorContext::current_message(&m))
        }
        other => other,
    }
}
