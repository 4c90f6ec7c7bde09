//! Per-mapper-file parser: `<cache-ref>`, `<cache>`, `<parameterMap>`,
//! `<resultMap>`, `<sql>` fragments, then the statements. Elements whose
//! dependencies are not registered yet are queued as incomplete and
//! re-resolved after the pass.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::CacheBuilder;
use crate::error::{Result, SqlMapperError};
use crate::error_context::ErrorContext;
use crate::mapping::{
    Discriminator, ParamMode, ParameterMap, ParameterMapping, ResultFlag, ResultMap, ResultMapping,
};
use crate::parsing::{parse_document, XmlNode};
use crate::types::SqlType;

use super::statement_builder;
use super::{Configuration, Deferred, Incomplete};

/// Parse one mapper XML document and register its contents.
pub fn parse_mapper(config: &mut Configuration, resource: &str, xml: &str) -> Result<()> {
    if config.is_resource_loaded(resource) {
        return Ok(());
    }
    ErrorContext::resource(resource);

    let doc = parse_document(xml)?;
    if doc.name != "mapper" {
        return Err(SqlMapperError::Config(format!(
            "mapper resource '{resource}' must have a <mapper> root, found <{}>",
            doc.name
        )));
    }
    let namespace = doc.required_attr("namespace")?.trim().to_string();
    if namespace.is_empty() {
        return Err(SqlMapperError::Config(format!(
            "mapper resource '{resource}' declares an empty namespace"
        )));
    }

    ErrorContext::activity(format!("parsing mapper namespace '{namespace}'"));

    cache_ref_element(config, &namespace, &doc)?;
    cache_element(config, &namespace, &doc)?;

    for node in doc.elements_named("parameterMap") {
        parameter_map_element(config, &namespace, node)?;
    }
    for node in doc.elements_named("sql") {
        sql_element(config, &namespace, node)?;
    }
    for node in doc.elements_named("resultMap") {
        match result_map_element(config, &namespace, node)? {
            Deferred::Done => {}
            Deferred::Missing(_) => config.defer(Incomplete::ResultMap {
                namespace: namespace.clone(),
                resource: resource.to_string(),
                node: node.clone(),
            }),
        }
    }
    for node in doc.elements() {
        if matches!(node.name.as_str(), "select" | "insert" | "update" | "delete") {
            match statement_builder::parse_statement(config, &namespace, resource, node)? {
                Deferred::Done => {}
                Deferred::Missing(_) => config.defer(Incomplete::Statement {
                    namespace: namespace.clone(),
                    resource: resource.to_string(),
                    node: node.clone(),
                }),
            }
        }
    }

    config.mark_resource_loaded(resource);
    // A partial drain; leftovers are retried (strictly) at parse() end.
    config.resolve_pending(false)
}

pub(crate) fn retry_result_map(
    config: &mut Configuration,
    namespace: &str,
    resource: &str,
    node: &XmlNode,
) -> Result<Deferred> {
    ErrorContext::resource(resource.to_string());
    result_map_element(config, namespace, node)
}

pub(crate) fn retry_statement(
    config: &mut Configuration,
    namespace: &str,
    resource: &str,
    node: &XmlNode,
) -> Result<Deferred> {
    ErrorContext::resource(resource.to_string());
    statement_builder::parse_statement(config, namespace, resource, node)
}

fn cache_ref_element(config: &mut Configuration, namespace: &str, doc: &XmlNode) -> Result<()> {
    let Some(node) = doc.first_element("cache-ref") else {
        return Ok(());
    };
    let referenced = node.required_attr("namespace")?.to_string();
    config.add_cache_ref(namespace, &referenced);
    if !config.has_cache(&referenced) {
        config.defer(Incomplete::CacheRef {
            namespace: namespace.to_string(),
        });
    }
    Ok(())
}

fn cache_element(config: &mut Configuration, namespace: &str, doc: &XmlNode) -> Result<()> {
    let Some(node) = doc.first_element("cache") else {
        return Ok(());
    };
    let mut properties = std::collections::HashMap::new();
    for property in node.elements_named("property") {
        properties.insert(
            property.required_attr("name")?.to_string(),
            property.required_attr("value")?.to_string(),
        );
    }
    let cache = CacheBuilder::new(namespace)
        .implementation(node.attr("type").unwrap_or("PERPETUAL"))
        .eviction(node.attr("eviction").unwrap_or("LRU"))
        .clear_interval(
            node.attr("flushInterval")
                .map(|v| {
                    v.parse::<u64>().map(Duration::from_millis).map_err(|_| {
                        SqlMapperError::Config(format!("flushInterval is not a number: '{v}'"))
                    })
                })
                .transpose()?,
        )
        .size(
            node.attr("size")
                .map(|v| {
                    v.parse::<usize>().map_err(|_| {
                        SqlMapperError::Config(format!("cache size is not a number: '{v}'"))
                    })
                })
                .transpose()?,
        )
        .read_write(node.attr("readOnly") != Some("true"))
        .blocking(node.attr("blocking") == Some("true"))
        .properties(properties)
        .build()?;
    config.add_cache(cache)
}

fn parameter_map_element(
    config: &mut Configuration,
    namespace: &str,
    node: &XmlNode,
) -> Result<()> {
    let id = format!("{namespace}.{}", node.required_attr("id")?);
    let kind = node.attr("type").map(|t| config.resolve_kind(t));
    let mut mappings = Vec::new();
    for parameter in node.elements_named("parameter") {
        let mut mapping = ParameterMapping::of(parameter.required_attr("property")?);
        if let Some(java_type) = parameter.attr("javaType") {
            mapping.kind = Some(config.resolve_kind(java_type));
        }
        if let Some(jdbc_type) = parameter.attr("jdbcType") {
            mapping.sql_type = Some(parse_sql_type(jdbc_type)?);
        }
        if let Some(mode) = parameter.attr("mode") {
            mapping.mode = ParamMode::parse(mode).ok_or_else(|| {
                SqlMapperError::Config(format!("unknown parameter mode '{mode}'"))
            })?;
        }
        if let Some(scale) = parameter.attr("numericScale") {
            mapping.numeric_scale = Some(scale.parse().map_err(|_| {
                SqlMapperError::Config(format!("numericScale is not a number: '{scale}'"))
            })?);
        }
        if let Some(handler) = parameter.attr("typeHandler") {
            mapping.type_handler = Some(handler.to_string());
        }
        mappings.push(mapping);
    }
    config.add_parameter_map(Arc::new(ParameterMap { id, kind, mappings }))
}

fn sql_element(config: &mut Configuration, namespace: &str, node: &XmlNode) -> Result<()> {
    if !statement_builder::database_id_matches(config, node) {
        return Ok(());
    }
    let id = format!("{namespace}.{}", node.required_attr("id")?);
    config.add_sql_fragment(&id, node.clone())
}

/// Parse one `<resultMap>`; `Missing` when its `extends` parent is not
/// yet registered (the caller queues a retry). The extends check runs
/// before any registration so retries stay idempotent.
fn result_map_element(
    config: &mut Configuration,
    namespace: &str,
    node: &XmlNode,
) -> Result<Deferred> {
    let local_id = node.required_attr("id")?;
    let id = format!("{namespace}.{local_id}");
    if config.has_result_map(&id) {
        return Ok(Deferred::Done);
    }

    let parent = match node.attr("extends") {
        Some(extends) => {
            let parent_id = qualify(namespace, extends);
            match config.result_map(&parent_id) {
                Ok(parent) => Some(parent),
                Err(_) => {
                    return Ok(Deferred::Missing(format!(
                        "result map '{parent_id}' extended by '{id}'"
                    )))
                }
            }
        }
        None => None,
    };

    let type_name = node
        .attr("type")
        .or_else(|| node.attr("ofType"))
        .or_else(|| node.attr("resultType"))
        .or_else(|| node.attr("javaType"))
        .ok_or_else(|| {
            SqlMapperError::Config(format!("result map '{id}' is missing its target type"))
        })?
        .to_string();
    let kind = config.resolve_kind(&type_name);

    let mut mappings = Vec::new();
    let mut discriminator = None;
    for child in node.elements() {
        match child.name.as_str() {
            "constructor" => {
                for arg in child.elements() {
                    let mut flags = vec![ResultFlag::Constructor];
                    if arg.name == "idArg" {
                        flags.push(ResultFlag::Id);
                    }
                    mappings.push(build_result_mapping(config, namespace, &id, arg, flags)?);
                }
            }
            "id" => mappings.push(build_result_mapping(
                config,
                namespace,
                &id,
                child,
                vec![ResultFlag::Id],
            )?),
            "result" | "association" | "collection" => mappings.push(build_result_mapping(
                config,
                namespace,
                &id,
                child,
                Vec::new(),
            )?),
            "discriminator" => {
                discriminator = Some(discriminator_element(config, namespace, &id, child)?);
            }
            other => {
                return Err(SqlMapperError::Config(format!(
                    "unknown element <{other}> in result map '{id}'"
                )))
            }
        }
    }

    let mut builder = ResultMap::builder(id.clone(), type_name, kind)
        .mappings(mappings)
        .discriminator(discriminator)
        .auto_mapping(node.attr("autoMapping").map(|v| v == "true"));

    if let Some(parent) = parent {
        builder = merge_parent(builder, &parent);
    }

    config.add_result_map(Arc::new(builder.build()?))?;
    Ok(Deferred::Done)
}

fn merge_parent(
    mut builder: crate::mapping::ResultMapBuilder,
    parent: &Arc<ResultMap>,
) -> crate::mapping::ResultMapBuilder {
    // Child declarations come first; a child constructor hides the
    // parent's entirely.
    for mapping in &parent.id_mappings {
        builder = builder.mapping(mapping.clone());
    }
    for mapping in &parent.property_mappings {
        builder = builder.mapping(mapping.clone());
    }
    builder.inherit_constructor(parent.constructor_mappings.clone())
}

fn build_result_mapping(
    config: &mut Configuration,
    namespace: &str,
    owner_id: &str,
    node: &XmlNode,
    flags: Vec<ResultFlag>,
) -> Result<ResultMapping> {
    let property = node
        .attr("property")
        .or_else(|| node.attr("name"))
        .unwrap_or_default()
        .to_string();
    if property.is_empty() && !flags.contains(&ResultFlag::Constructor) {
        return Err(SqlMapperError::Config(format!(
            "a mapping in result map '{owner_id}' is missing its property name"
        )));
    }

    let mut mapping = ResultMapping {
        property,
        column: None,
        kind: None,
        sql_type: None,
        nested_result_map: None,
        nested_select: None,
        type_handler: None,
        flags,
        composites: Vec::new(),
        column_prefix: node.attr("columnPrefix").map(ToString::to_string),
        many: node.name == "collection",
    };

    if let Some(column) = node.attr("column") {
        let column = column.trim();
        if column.starts_with('{') && column.ends_with('}') {
            mapping.composites = parse_composite_columns(column);
        } else {
            mapping.column = Some(column.to_string());
        }
    }
    if let Some(java_type) = node
        .attr("javaType")
        .or_else(|| node.attr("ofType"))
    {
        mapping.kind = Some(config.resolve_kind(java_type));
    }
    if let Some(jdbc_type) = node.attr("jdbcType") {
        mapping.sql_type = Some(parse_sql_type(jdbc_type)?);
    }
    if let Some(handler) = node.attr("typeHandler") {
        mapping.type_handler = Some(handler.to_string());
    }
    if let Some(select) = node.attr("select") {
        mapping.nested_select = Some(qualify(namespace, select));
    }
    if let Some(result_map) = node.attr("resultMap") {
        mapping.nested_result_map = Some(qualify(namespace, result_map));
    }

    // Inline nested mappings build an anonymous result map.
    let has_inline_children = node.elements().next().is_some()
        && matches!(node.name.as_str(), "association" | "collection");
    if has_inline_children && mapping.nested_result_map.is_none() && mapping.nested_select.is_none()
    {
        let nested_id = format!("{owner_id}_{}[{}]", node.name, mapping.property);
        let nested = nested_result_map(config, namespace, &nested_id, node)?;
        config.add_result_map(Arc::new(nested))?;
        mapping.nested_result_map = Some(nested_id);
    }

    Ok(mapping)
}

fn nested_result_map(
    config: &mut Configuration,
    namespace: &str,
    nested_id: &str,
    node: &XmlNode,
) -> Result<ResultMap> {
    let type_name = node
        .attr("javaType")
        .or_else(|| node.attr("ofType"))
        .unwrap_or("map")
        .to_string();
    let kind = config.resolve_kind(&type_name);
    let mut mappings = Vec::new();
    for child in node.elements() {
        let flags = if child.name == "id" {
            vec![ResultFlag::Id]
        } else {
            Vec::new()
        };
        mappings.push(build_result_mapping(config, namespace, nested_id, child, flags)?);
    }
    ResultMap::builder(nested_id.to_string(), type_name, kind)
        .mappings(mappings)
        .build()
}

fn discriminator_element(
    config: &mut Configuration,
    namespace: &str,
    owner_id: &str,
    node: &XmlNode,
) -> Result<Discriminator> {
    let column = node.required_attr("column")?.to_string();
    let kind = node.attr("javaType").map(|t| config.resolve_kind(t));
    let sql_type = node.attr("jdbcType").map(parse_sql_type).transpose()?;
    let mut cases = std::collections::HashMap::new();
    for case in node.elements_named("case") {
        let value = case.required_attr("value")?.to_string();
        let target = match case.attr("resultMap") {
            Some(id) => qualify(namespace, id),
            None => {
                // Inline case mappings form an anonymous result map.
                let nested_id = format!("{owner_id}_case[{value}]");
                let nested = nested_result_map(config, namespace, &nested_id, case)?;
                config.add_result_map(Arc::new(nested))?;
                nested_id
            }
        };
        cases.insert(value, target);
    }
    Ok(Discriminator {
        column,
        kind,
        sql_type,
        cases,
    })
}

fn parse_composite_columns(spec: &str) -> Vec<(String, String)> {
    spec.trim_matches(|c| c == '{' || c == '}')
        .split(',')
        .filter_map(|pair| {
            pair.split_once('=')
                .map(|(p, c)| (p.trim().to_string(), c.trim().to_string()))
        })
        .collect()
}

pub(crate) fn parse_sql_type(name: &str) -> Result<SqlType> {
    SqlType::parse(name)
        .ok_or_else(|| SqlMapperError::Config(format!("unknown jdbcType '{name}'")))
}

/// Qualify a local reference with the namespace unless already dotted.
pub(crate) fn qualify(namespace: &str, reference: &str) -> String {
    if reference.contains('.') {
        reference.to_string()
    } else {
        format!("{namespace}.{reference}")
    }
}
