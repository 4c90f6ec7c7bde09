use serde_json::Value;

use crate::config::Configuration;
use crate::error::{Result, SqlMapperError};
use crate::mapping::{BoundSql, ParamMode, ParameterMapping, SqlSource, StaticSqlSource};
use crate::parsing::TokenParser;
use crate::types::SqlType;

use super::dynamic_context::DynamicContext;
use super::sql_node::SqlNode;

/// Scans rendered SQL for `#{…}` markers, emitting one `?` per marker and
/// the ordered [`ParameterMapping`] list.
pub struct SqlSourceBuilder;

impl SqlSourceBuilder {
    pub fn build(configuration: &Configuration, sql: &str) -> Result<StaticSqlSource> {
        let mut mappings = Vec::new();
        let parser = TokenParser::new("#{", "}");
        let parsed = parser.parse(sql, |content| {
            mappings.push(parse_parameter_mapping(configuration, content)?);
            Ok::<_, SqlMapperError>("?".to_string())
        })?;
        Ok(StaticSqlSource::new(parsed, mappings))
    }
}

/// `#{prop,javaType=…,jdbcType=…,mode=…,numericScale=…,typeHandler=…}`
fn parse_parameter_mapping(
    configuration: &Configuration,
    content: &str,
) -> Result<ParameterMapping> {
    let mut parts = content.split(',');
    let property = parts
        .next()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| {
            SqlMapperError::Config(format!("empty parameter expression in '#{{{content}}}'"))
        })?;

    let mut mapping = ParameterMapping::of(property);
    for attr in parts {
        let (name, value) = attr.split_once('=').ok_or_else(|| {
            SqlMapperError::Config(format!(
                "malformed attribute '{attr}' in parameter expression '#{{{content}}}'"
            ))
        })?;
        let (name, value) = (name.trim(), value.trim());
        match name {
            "javaType" => mapping.kind = Some(configuration.resolve_kind(value)),
            "jdbcType" => {
                mapping.sql_type = Some(SqlType::parse(value).ok_or_else(|| {
                    SqlMapperError::Config(format!("unknown jdbcType '{value}'"))
                })?);
            }
            "mode" => {
                mapping.mode = ParamMode::parse(value).ok_or_else(|| {
                    SqlMapperError::Config(format!("unknown parameter mode '{value}'"))
                })?;
            }
            "numericScale" => {
                mapping.numeric_scale = Some(value.parse().map_err(|_| {
                    SqlMapperError::Config(format!("numericScale is not a number: '{value}'"))
                })?);
            }
            "typeHandler" => mapping.type_handler = Some(value.to_string()),
            other => {
                return Err(SqlMapperError::Config(format!(
                    "unsupported attribute '{other}' in parameter expression '#{{{content}}}'"
                )))
            }
        }
    }
    Ok(mapping)
}

/// A source with conditional fragments or `${…}`: re-rendered per call
/// against a fresh context.
#[derive(Debug)]
pub struct DynamicSqlSource {
    root: SqlNode,
}

impl DynamicSqlSource {
    #[must_use]
    pub fn new(root: SqlNode) -> Self {
        Self { root }
    }
}

impl SqlSource for DynamicSqlSource {
    fn bound_sql(&self, configuration: &Configuration, parameter: &Value) -> Result<BoundSql> {
        let mut ctx = DynamicContext::new(parameter, configuration.database_id());
        self.root.apply(&mut ctx)?;
        let rendered = ctx.sql();
        let static_source = SqlSourceBuilder::build(configuration, &rendered)?;
        let mut bound = BoundSql {
            sql: static_source.sql,
            parameter_mappings: static_source.parameter_mappings,
            additional_parameters: ctx.into_bindings(),
        };
        // The seeded keys are bindings, not synthesized parameters.
        bound.additional_parameters.remove(super::PARAMETER_OBJECT_KEY);
        bound.additional_parameters.remove(super::DATABASE_ID_KEY);
        Ok(bound)
    }
}

/// A source with no dynamic fragments: rendered and scanned once at build
/// time.
#[derive(Debug)]
pub struct RawSqlSource {
    resolved: StaticSqlSource,
}

impl RawSqlSource {
    pub fn new(configuration: &Configuration, root: &SqlNode) -> Result<Self> {
        let mut ctx = DynamicContext::new(&Value::Null, configuration.database_id());
        root.apply(&mut ctx)?;
        let rendered = ctx.sql();
        Ok(Self {
            resolved: SqlSourceBuilder::build(configuration, &rendered)?,
        })
    }
}

impl SqlSource for RawSqlSource {
    fn bound_sql(&self, configuration: &Configuration, parameter: &Value) -> Result<BoundSql> {
        self.resolved.bound_sql(configuration, parameter)
    }
}

/// Build the statement's [`SqlSource`] from its XML subtree: dynamic when
/// any element or `${…}` text is present, raw otherwise.
pub fn build_sql_source(
    configuration: &Configuration,
    node: &crate::parsing::XmlNode,
) -> Result<std::sync::Arc<dyn SqlSource>> {
    let (root, dynamic) = super::builder::ScriptBuilder::new().parse(node)?;
    if dynamic {
        Ok(std::sync::Arc::new(DynamicSqlSource::new(root)))
    } else {
        Ok(std::sync::Arc::new(RawSqlSource::new(configuration, &root)?))
    }
}
