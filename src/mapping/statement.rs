use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::Cache;
use crate::driver::StatementStyle;

use super::parameter::ParameterMap;
use super::result_map::ResultMap;
use super::sql_source::SqlSource;

/// What a statement does, driving cache flushing and return shaping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Flush,
    Unknown,
}

impl StatementKind {
    #[must_use]
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            StatementKind::Insert | StatementKind::Update | StatementKind::Delete
        )
    }
}

/// Requested result-set traversal style, forwarded to the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultSetStyle {
    #[default]
    Default,
    ForwardOnly,
    ScrollInsensitive,
    ScrollSensitive,
}

impl ResultSetStyle {
    #[must_use]
    pub fn parse(name: &str) -> Option<ResultSetStyle> {
        match name.trim().to_ascii_uppercase().as_str() {
            "DEFAULT" => Some(ResultSetStyle::Default),
            "FORWARD_ONLY" => Some(ResultSetStyle::ForwardOnly),
            "SCROLL_INSENSITIVE" => Some(ResultSetStyle::ScrollInsensitive),
            "SCROLL_SENSITIVE" => Some(ResultSetStyle::ScrollSensitive),
            _ => None,
        }
    }
}

/// How generated keys are produced for an insert.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum KeyGeneratorKind {
    #[default]
    None,
    /// Read the driver-generated key back after execution.
    DriverGenerated,
    /// Run an auxiliary select statement before or after the insert.
    SelectKey {
        statement_id: String,
        execute_before: bool,
    },
}

/// Suffix appended to derived `<selectKey>` statement ids.
pub const SELECT_KEY_SUFFIX: &str = "!selectKey";

/// The executable contract of one SQL operation. Built during
/// configuration assembly and never mutated afterwards.
pub struct MappedStatement {
    pub id: String,
    pub kind: StatementKind,
    pub sql_source: Arc<dyn SqlSource>,
    pub statement_style: StatementStyle,
    pub fetch_size: Option<u32>,
    pub timeout: Option<Duration>,
    pub result_set_style: ResultSetStyle,
    pub flush_cache_on_execute: bool,
    pub use_cache: bool,
    pub result_ordered: bool,
    pub parameter_map: Option<Arc<ParameterMap>>,
    pub result_maps: Vec<Arc<ResultMap>>,
    pub key_generator: KeyGeneratorKind,
    pub key_properties: Vec<String>,
    pub key_columns: Vec<String>,
    pub database_id: Option<String>,
    /// The namespace cache, when the mapper declared one.
    pub cache: Option<Arc<dyn Cache>>,
    /// Where this statement was defined, for diagnostics.
    pub resource: String,
}

impl fmt::Debug for MappedStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedStatement")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("database_id", &self.database_id)
            .finish()
    }
}

impl MappedStatement {
    #[must_use]
    pub fn builder(
        id: impl Into<String>,
        kind: StatementKind,
        sql_source: Arc<dyn SqlSource>,
    ) -> MappedStatementBuilder {
        MappedStatementBuilder {
            statement: MappedStatement {
                id: id.into(),
                kind,
                sql_source,
                statement_style: StatementStyle::Prepared,
                fetch_size: None,
                timeout: None,
                result_set_style: ResultSetStyle::Default,
                flush_cache_on_execute: kind != StatementKind::Select,
                use_cache: kind == StatementKind::Select,
                result_ordered: false,
                parameter_map: None,
                result_maps: Vec::new(),
                key_generator: KeyGeneratorKind::None,
                key_properties: Vec::new(),
                key_columns: Vec::new(),
                database_id: None,
                cache: None,
                resource: String::new(),
            },
        }
    }

    /// The namespace part of the statement id.
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.id.rsplit_once('.').map(|(ns, _)| ns).unwrap_or("")
    }
}

pub struct MappedStatementBuilder {
    statement: MappedStatement,
}

impl MappedStatementBuilder {
    #[must_use]
    pub fn statement_style(mut self, style: StatementStyle) -> Self {
        self.statement.statement_style = style;
        self
    }

    #[must_use]
    pub fn fetch_size(mut self, fetch_size: Option<u32>) -> Self {
        self.statement.fetch_size = fetch_size;
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.statement.timeout = timeout;
        self
    }

    #[must_use]
    pub fn result_set_style(mut self, style: ResultSetStyle) -> Self {
        self.statement.result_set_style = style;
        self
    }

    #[must_use]
    pub fn flush_cache(mut self, flush: bool) -> Self {
        self.statement.flush_cache_on_execute = flush;
        self
    }

    #[must_use]
    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.statement.use_cache = use_cache;
        self
    }

    #[must_use]
    pub fn result_ordered(mut self, ordered: bool) -> Self {
        self.statement.result_ordered = ordered;
        self
    }

    #[must_use]
    pub fn parameter_map(mut self, map: Option<Arc<ParameterMap>>) -> Self {
        self.statement.parameter_map = map;
        self
    }

    #[must_use]
    pub fn result_maps(mut self, maps: Vec<Arc<ResultMap>>) -> Self {
        self.statement.result_maps = maps;
        self
    }

    #[must_use]
    pub fn key_generator(mut self, generator: KeyGeneratorKind) -> Self {
        self.statement.key_generator = generator;
        self
    }

    #[must_use]
    pub fn key_properties(mut self, properties: Vec<String>) -> Self {
        self.statement.key_properties = properties;
        self
    }

    #[must_use]
    pub fn key_columns(mut self, columns: Vec<String>) -> Self {
        self.statement.key_columns = columns;
        self
    }

    #[must_use]
    pub fn database_id(mut self, database_id: Option<String>) -> Self {
        self.statement.database_id = database_id;
        self
    }

    #[must_use]
    pub fn cache(mut self, cache: Option<Arc<dyn Cache>>) -> Self {
        self.statement.cache = cache;
        self
    }

    #[must_use]
    pub fn resource(mut self, resource: impl Into<String>) -> Self {
        self.statement.resource = resource.into();
        self
    }

    #[must_use]
    pub fn build(self) -> Arc<MappedStatement> {
        Arc::new(self.statement)
    }
}
