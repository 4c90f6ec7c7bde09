use thiserror::Error;

/// Errors raised anywhere in the mapping runtime.
///
/// Driver errors are wrapped transparently so the underlying cause chain
/// stays intact; everything else carries a rendered message, usually
/// enriched with the [`crate::error_context::ErrorContext`] breadcrumb.
#[derive(Debug, Error)]
pub enum SqlMapperError {
    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    /// Malformed XML, unknown element, missing attribute, alias collision,
    /// or an unresolved reference left over at fixed point.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Mapper method not mapped, unsupported return shape, or a null
    /// result where a primitive return was declared.
    #[error("Binding error: {0}")]
    Binding(String),

    /// Property not found, or an ambiguous accessor used at invocation time.
    #[error("Reflection error: {0}")]
    Reflection(String),

    /// No suitable type handler for the requested (kind, sql type) pair.
    #[error("Type handler error: {0}")]
    Type(String),

    /// Serialization failure or decorator misconfiguration in a cache.
    #[error("Cache error: {0}")]
    Cache(String),

    /// Driver-reported failure or connection validation failure.
    #[error("Data store error: {0}")]
    DataStore(String),

    /// Unable to obtain a good connection after bounded retries. Distinct
    /// from [`SqlMapperError::DataStore`] so callers can tell pool
    /// exhaustion from statement failures.
    #[error("Pool error: {0}")]
    Pool(String),

    /// Statement execution or result mapping failure.
    #[error("Execution error: {0}")]
    Execution(String),

    /// A `test="…"` or `${…}` expression failed to parse or evaluate.
    #[error("Expression error: {0}")]
    Expression(String),
}

pub type Result<T> = std::result::Result<T, SqlMapperError>;
