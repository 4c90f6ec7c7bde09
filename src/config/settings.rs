use std::time::Duration;

use crate::error::{Result, SqlMapperError};
use crate::session::ExecutorType;
use crate::types::SqlType;

/// Automapping of columns not covered by explicit result mappings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutoMappingBehavior {
    None,
    #[default]
    Partial,
    Full,
}

/// Lifetime of the session-local cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LocalCacheScope {
    #[default]
    Session,
    Statement,
}

/// The recognized `<settings>` table with its defaults. Every `<setting>`
/// key must hit one of these fields; anything else is a configuration
/// error.
#[derive(Debug, Clone)]
pub struct Settings {
    pub cache_enabled: bool,
    pub lazy_loading_enabled: bool,
    pub aggressive_lazy_loading: bool,
    pub multiple_result_sets_enabled: bool,
    pub use_column_label: bool,
    pub use_generated_keys: bool,
    pub auto_mapping_behavior: AutoMappingBehavior,
    pub default_executor_type: ExecutorType,
    pub default_statement_timeout: Option<Duration>,
    pub default_fetch_size: Option<u32>,
    pub map_underscore_to_camel_case: bool,
    pub safe_result_handler_enabled: bool,
    pub local_cache_scope: LocalCacheScope,
    pub jdbc_type_for_null: SqlType,
    pub call_setters_on_nulls: bool,
    pub log_prefix: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            cache_enabled: true,
            lazy_loading_enabled: false,
            aggressive_lazy_loading: false,
            multiple_result_sets_enabled: true,
            use_column_label: true,
            use_generated_keys: false,
            auto_mapping_behavior: AutoMappingBehavior::Partial,
            default_executor_type: ExecutorType::Simple,
            default_statement_timeout: None,
            default_fetch_size: None,
            map_underscore_to_camel_case: false,
            safe_result_handler_enabled: true,
            local_cache_scope: LocalCacheScope::Session,
            jdbc_type_for_null: SqlType::Other,
            call_setters_on_nulls: false,
            log_prefix: None,
        }
    }
}

impl Settings {
    /// Apply one `<setting name value>` pair.
    pub fn apply(&mut self, name: &str, value: &str) -> Result<()> {
        match name {
            "cacheEnabled" => self.cache_enabled = parse_bool(name, value)?,
            "lazyLoadingEnabled" => self.lazy_loading_enabled = parse_bool(name, value)?,
            "aggressiveLazyLoading" => self.aggressive_lazy_loading = parse_bool(name, value)?,
            "multipleResultSetsEnabled" => {
                self.multiple_result_sets_enabled = parse_bool(name, value)?;
            }
            "useColumnLabel" => self.use_column_label = parse_bool(name, value)?,
            "useGeneratedKeys" => self.use_generated_keys = parse_bool(name, value)?,
            "autoMappingBehavior" => {
                self.auto_mapping_behavior = match value.to_ascii_uppercase().as_str() {
                    "NONE" => AutoMappingBehavior::None,
                    "PARTIAL" => AutoMappingBehavior::Partial,
                    "FULL" => AutoMappingBehavior::Full,
                    _ => {
                        return Err(SqlMapperError::Config(format!(
                            "invalid autoMappingBehavior '{value}'"
                        )))
                    }
                };
            }
            "defaultExecutorType" => {
                self.default_executor_type =
                    ExecutorType::parse(value).ok_or_else(|| {
                        SqlMapperError::Config(format!("invalid defaultExecutorType '{value}'"))
                    })?;
            }
            "defaultStatementTimeout" => {
                self.default_statement_timeout =
                    Some(Duration::from_millis(parse_u64(name, value)?));
            }
            "defaultFetchSize" => {
                self.default_fetch_size = Some(parse_u64(name, value)? as u32);
            }
            "mapUnderscoreToCamelCase" => {
                self.map_underscore_to_camel_case = parse_bool(name, value)?;
            }
            "safeResultHandlerEnabled" => {
                self.safe_result_handler_enabled = parse_bool(name, value)?;
            }
            "localCacheScope" => {
                self.local_cache_scope = match value.to_ascii_uppercase().as_str() {
                    "SESSION" => LocalCacheScope::Session,
                    "STATEMENT" => LocalCacheScope::Statement,
                    _ => {
                        return Err(SqlMapperError::Config(format!(
                            "invalid localCacheScope '{value}'"
                        )))
                    }
                };
            }
            "jdbcTypeForNull" => {
                self.jdbc_type_for_null = SqlType::parse(value).ok_or_else(|| {
                    SqlMapperError::Config(format!("invalid jdbcTypeForNull '{value}'"))
                })?;
            }
            "callSettersOnNulls" => self.call_setters_on_nulls = parse_bool(name, value)?,
            "logPrefix" => self.log_prefix = Some(value.to_string()),
            // Recognized but serviced elsewhere.
            "vfsImpl" | "logImpl" => {}
            other => {
                return Err(SqlMapperError::Config(format!(
                    "the setting {other} is not known; make sure you spelled it correctly (case sensitive)"
                )))
            }
        }
        Ok(())
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(SqlMapperError::Config(format!(
            "setting '{name}' expects true/false, got '{value}'"
        ))),
    }
}

fn parse_u64(name: &str, value: &str) -> Result<u64> {
    value.parse::<u64>().map_err(|_| {
        SqlMapperError::Config(format!("setting '{name}' expects a number, got '{value}'"))
    })
}
