//! The seam between the mapping runtime and the raw database engine.
//!
//! Pools, transactions and executors speak [`RawConnection`]; concrete
//! engines implement [`Driver`] and register themselves under a name the
//! environment configuration refers to. SQLite ships behind the `sqlite`
//! feature; the stub driver backs tests that need controllable failures.

#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod stub;

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, RwLock};
use std::time::Duration;

use crate::error::{Result, SqlMapperError};
use crate::results::ResultSet;
use crate::types::DbValue;

/// How a statement is to be executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatementStyle {
    /// Direct execution, no parameter binding.
    Plain,
    /// Prepared with `?` placeholders.
    #[default]
    Prepared,
    /// Stored-procedure call with potential OUT parameters.
    Callable,
}

impl StatementStyle {
    #[must_use]
    pub fn parse(name: &str) -> Option<StatementStyle> {
        match name.trim().to_ascii_uppercase().as_str() {
            "STATEMENT" | "PLAIN" => Some(StatementStyle::Plain),
            "PREPARED" => Some(StatementStyle::Prepared),
            "CALLABLE" => Some(StatementStyle::Callable),
            _ => None,
        }
    }
}

/// Transaction isolation requested on checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

/// Everything the driver needs to run one statement.
#[derive(Debug, Clone)]
pub struct StatementSpec<'a> {
    pub sql: &'a str,
    pub style: StatementStyle,
    /// Propagated to the driver; engines without per-statement timeouts
    /// may apply it as a busy timeout or ignore it.
    pub timeout: Option<Duration>,
    pub fetch_size: Option<u32>,
    /// Hint that the prepared form will be reused within the session.
    pub reuse: bool,
}

impl<'a> StatementSpec<'a> {
    #[must_use]
    pub fn prepared(sql: &'a str) -> Self {
        StatementSpec {
            sql,
            style: StatementStyle::Prepared,
            timeout: None,
            fetch_size: None,
            reuse: false,
        }
    }
}

/// Outcome of a DML statement.
#[derive(Debug, Clone, Default)]
pub struct ExecuteResult {
    pub rows_affected: i64,
    /// Key produced by the engine for the last inserted row, when it has
    /// the concept.
    pub generated_key: Option<DbValue>,
}

/// Connection parameters from the environment configuration. `type_code`
/// hashing covers exactly (url, username, password).
#[derive(Debug, Clone, Default)]
pub struct ConnectionSpec {
    pub url: String,
    pub username: String,
    pub password: String,
    pub properties: HashMap<String, String>,
}

impl ConnectionSpec {
    /// Hash of (url, username, password), the pool's connection type code.
    #[must_use]
    pub fn type_code(&self) -> i64 {
        let combined = format!("{}{}{}", self.url, self.username, self.password);
        i64::from(combined.bytes().fold(0i32, |acc, b| {
            acc.wrapping_mul(31).wrapping_add(i32::from(b))
        }))
    }
}

/// A raw engine connection. Exclusively owned by its holder between
/// checkout and return; never shared across threads concurrently.
pub trait RawConnection: Send + std::fmt::Debug {
    fn query(&mut self, stmt: &StatementSpec<'_>, params: &[DbValue]) -> Result<ResultSet>;

    fn execute(&mut self, stmt: &StatementSpec<'_>, params: &[DbValue]) -> Result<ExecuteResult>;

    /// Run a multi-statement script (schema setup, batch DDL).
    fn execute_script(&mut self, sql: &str) -> Result<()>;

    fn set_auto_commit(&mut self, auto_commit: bool) -> Result<()>;

    fn is_auto_commit(&self) -> bool;

    fn commit(&mut self) -> Result<()>;

    fn rollback(&mut self) -> Result<()>;

    fn set_isolation(&mut self, level: IsolationLevel) -> Result<()>;

    /// Liveness probe: run `query` and fail if the engine does.
    fn ping(&mut self, query: &str) -> Result<()>;

    fn close(&mut self) -> Result<()>;

    /// Vendor product name consulted by the database-id provider.
    fn product_name(&self) -> String;
}

/// A named connection factory.
pub trait Driver: Send + Sync {
    fn name(&self) -> &str;
    fn connect(&self, spec: &ConnectionSpec) -> Result<Box<dyn RawConnection>>;
}

static DRIVERS: LazyLock<RwLock<HashMap<String, Arc<dyn Driver>>>> = LazyLock::new(|| {
    let mut map: HashMap<String, Arc<dyn Driver>> = HashMap::new();
    #[cfg(feature = "sqlite")]
    map.insert("sqlite".into(), Arc::new(sqlite::SqliteDriver));
    map.insert("stub".into(), Arc::new(stub::StubDriver::default()));
    RwLock::new(map)
});

/// Register a driver under `name`, replacing any previous registration.
pub fn register_driver(name: &str, driver: Arc<dyn Driver>) {
    DRIVERS
        .write()
        .expect("driver registry poisoned")
        .insert(name.to_ascii_lowercase(), driver);
}

/// Look up a registered driver by name (case-insensitive).
pub fn lookup_driver(name: &str) -> Result<Arc<dyn Driver>> {
    DRIVERS
        .read()
        .expect("driver registry poisoned")
        .get(&name.to_ascii_lowercase())
        .cloned()
        .ok_or_else(|| {
            SqlMapperError::DataStore(format!("no driver registered under name '{name}'"))
        })
}
