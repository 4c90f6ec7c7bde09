use std::fmt;

use serde_json::{Map, Value};

use crate::config::Configuration;
use crate::error::Result;

use super::parameter::ParameterMapping;

/// The executable form of one invocation: prepared-style SQL with `?`
/// slots, the ordered placeholder metadata, and values synthesized during
/// rendering (`<bind>`, `<foreach>` items).
#[derive(Debug, Clone, Default)]
pub struct BoundSql {
    pub sql: String,
    pub parameter_mappings: Vec<ParameterMapping>,
    pub additional_parameters: Map<String, Value>,
}

impl BoundSql {
    #[must_use]
    pub fn additional_parameter(&self, name: &str) -> Option<&Value> {
        self.additional_parameters.get(name)
    }

    pub fn set_additional_parameter(&mut self, name: impl Into<String>, value: Value) {
        self.additional_parameters.insert(name.into(), value);
    }
}

/// Produces the [`BoundSql`] for a parameter object. Raw sources resolve
/// once at build time; dynamic sources re-render per call.
pub trait SqlSource: Send + Sync + fmt::Debug {
    fn bound_sql(&self, configuration: &Configuration, parameter: &Value) -> Result<BoundSql>;
}

/// A fully resolved source: text and mappings computed ahead of time.
#[derive(Debug, Clone)]
pub struct StaticSqlSource {
    pub sql: String,
    pub parameter_mappings: Vec<ParameterMapping>,
}

impl StaticSqlSource {
    #[must_use]
    pub fn new(sql: impl Into<String>, parameter_mappings: Vec<ParameterMapping>) -> Self {
        Self {
            sql: sql.into(),
            parameter_mappings,
        }
    }
}

impl SqlSource for StaticSqlSource {
    fn bound_sql(&self, _configuration: &Configuration, _parameter: &Value) -> Result<BoundSql> {
        Ok(BoundSql {
            sql: self.sql.clone(),
            parameter_mappings: self.parameter_mappings.clone(),
            additional_parameters: Map::new(),
        })
    }
}
