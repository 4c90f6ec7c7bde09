//! Statement parsing: `<include>` expansion, `<selectKey>` extraction,
//! attribute resolution and registration of the mapped statement.

use std::sync::Arc;
use std::time::Duration;

use crate::driver::StatementStyle;
use crate::error::{Result, SqlMapperError};
use crate::error_context::ErrorContext;
use crate::mapping::{
    KeyGeneratorKind, MappedStatement, ResultMap, ResultSetStyle, StatementKind, SELECT_KEY_SUFFIX,
};
use crate::parsing::{parse_placeholders, Variables, XmlChild, XmlNode};
use crate::scripting::build_sql_source;

use super::xml_mapper::qualify;
use super::{Configuration, Deferred};

/// Whether `node`'s `databaseId` admits it under the active database id.
/// With no active id, only id-free elements load; with one, an id-bearing
/// element must match it, and a generic element yields to a previously
/// registered id-specific twin.
pub(crate) fn database_id_matches(config: &Configuration, node: &XmlNode) -> bool {
    match (config.database_id(), node.attr("databaseId")) {
        (None, None) => true,
        (None, Some(_)) => false,
        (Some(current), Some(declared)) => current == declared,
        (Some(_), None) => true,
    }
}

/// Parse one `select|insert|update|delete`. `Missing` defers the element
/// until its references (includes, result maps, cache-ref) register.
pub(crate) fn parse_statement(
    config: &mut Configuration,
    namespace: &str,
    resource: &str,
    node: &XmlNode,
) -> Result<Deferred> {
    if !database_id_matches(config, node) {
        return Ok(Deferred::Done);
    }

    let local_id = node.required_attr("id")?;
    let id = format!("{namespace}.{local_id}");
    ErrorContext::object(format!("statement '{id}'"));

    // A generic statement yields to an id-specific twin seen earlier.
    let shadowed = if config.has_statement(&id) {
        let previous = config.mapped_statement(&id)?;
        if node.attr("databaseId").is_none() && previous.database_id.is_some() {
            return Ok(Deferred::Done);
        }
        previous.database_id.is_none() && node.attr("databaseId").is_some()
    } else {
        false
    };

    // Statements wait for their namespace's cache-ref to resolve so they
    // bind the right shared cache.
    if let Some(referenced) = config.cache_ref(namespace) {
        if !config.has_cache(referenced) {
            return Ok(Deferred::Missing(format!(
                "cache '{referenced}' referenced from namespace '{namespace}'"
            )));
        }
    }

    let kind = match node.name.as_str() {
        "select" => StatementKind::Select,
        "insert" => StatementKind::Insert,
        "update" => StatementKind::Update,
        "delete" => StatementKind::Delete,
        _ => StatementKind::Unknown,
    };

    // Expand <include> fragments before anything inspects the body.
    let mut body = node.clone();
    if let Some(missing) = apply_includes(config, namespace, &mut body)? {
        return Ok(Deferred::Missing(missing));
    }

    // <selectKey> runs as its own derived statement.
    let key_generator = extract_select_keys(config, resource, &id, &mut body)?;

    let parameter_map = match node.attr("parameterMap") {
        Some(reference) => {
            let map_id = qualify(namespace, reference);
            match config.parameter_map(&map_id) {
                Ok(map) => Some(map),
                Err(_) => {
                    return Ok(Deferred::Missing(format!(
                        "parameter map '{map_id}' used by statement '{id}'"
                    )))
                }
            }
        }
        None => None,
    };

    let result_maps = match resolve_result_maps(config, namespace, &id, node)? {
        Ok(maps) => maps,
        Err(missing) => return Ok(Deferred::Missing(missing)),
    };

    let sql_source = build_sql_source(config, &body)?;

    let use_generated_keys = node
        .attr("useGeneratedKeys")
        .map(|v| v == "true")
        .unwrap_or(config.settings.use_generated_keys && kind == StatementKind::Insert);
    let key_generator = match key_generator {
        Some(generator) => generator,
        None if use_generated_keys && kind == StatementKind::Insert => {
            KeyGeneratorKind::DriverGenerated
        }
        None => KeyGeneratorKind::None,
    };

    let statement_style = match node.attr("statementType") {
        Some(style) => StatementStyle::parse(style).ok_or_else(|| {
            SqlMapperError::Config(format!("unknown statementType '{style}'"))
        })?,
        None => StatementStyle::Prepared,
    };
    let result_set_style = match node.attr("resultSetType") {
        Some(style) => ResultSetStyle::parse(style).ok_or_else(|| {
            SqlMapperError::Config(format!("unknown resultSetType '{style}'"))
        })?,
        None => ResultSetStyle::Default,
    };

    let statement = MappedStatement::builder(id.clone(), kind, sql_source)
        .statement_style(statement_style)
        .result_set_style(result_set_style)
        .fetch_size(
            parse_opt_num(node.attr("fetchSize"), "fetchSize")?
                .map(|n| n as u32)
                .or(config.settings.default_fetch_size),
        )
        .timeout(
            parse_opt_num(node.attr("timeout"), "timeout")?
                .map(Duration::from_millis)
                .or(config.settings.default_statement_timeout),
        )
        .flush_cache(
            node.attr("flushCache")
                .map(|v| v == "true")
                .unwrap_or(kind != StatementKind::Select),
        )
        .use_cache(
            node.attr("useCache")
                .map(|v| v == "true")
                .unwrap_or(kind == StatementKind::Select),
        )
        .result_ordered(node.attr("resultOrdered") == Some("true"))
        .parameter_map(parameter_map)
        .result_maps(result_maps)
        .key_generator(key_generator)
        .key_properties(split_list(node.attr("keyProperty")))
        .key_columns(split_list(node.attr("keyColumn")))
        .database_id(node.attr("databaseId").map(ToString::to_string))
        .cache(config.effective_cache(namespace))
        .resource(resource)
        .build();

    if shadowed {
        config.replace_mapped_statement(statement);
    } else {
        config.add_mapped_statement(statement)?;
    }
    Ok(Deferred::Done)
}

/// Resolve `resultMap` (a comma-separated id list) or synthesize an
/// inline map from `resultType`. The inner `Err` carries the first
/// missing reference.
fn resolve_result_maps(
    config: &mut Configuration,
    namespace: &str,
    id: &str,
    node: &XmlNode,
) -> Result<std::result::Result<Vec<Arc<ResultMap>>, String>> {
    if let Some(refs) = node.attr("resultMap") {
        let mut maps = Vec::new();
        for reference in refs.split(',').map(str::trim).filter(|r| !r.is_empty()) {
            let map_id = qualify(namespace, reference);
            match config.result_map(&map_id) {
                Ok(map) => maps.push(map),
                Err(_) => {
                    return Ok(Err(format!(
                        "result map '{map_id}' used by statement '{id}'"
                    )))
                }
            }
        }
        return Ok(Ok(maps));
    }
    if let Some(result_type) = node.attr("resultType") {
        let kind = config.resolve_kind(result_type);
        let inline = ResultMap::inline(format!("{id}-Inline"), result_type, kind);
        return Ok(Ok(vec![inline]));
    }
    Ok(Ok(Vec::new()))
}

/// Replace `<include refid>` elements by the referenced `<sql>` fragment's
/// children, substituting declared `<property>` values, recursively.
/// Returns the first missing fragment reference, if any.
pub(crate) fn apply_includes(
    config: &Configuration,
    namespace: &str,
    node: &mut XmlNode,
) -> Result<Option<String>> {
    let variables = config.variables().clone();
    apply_includes_with(config, namespace, node, &variables)
}

fn apply_includes_with(
    config: &Configuration,
    namespace: &str,
    node: &mut XmlNode,
    variables: &Variables,
) -> Result<Option<String>> {
    let children = std::mem::take(&mut node.children);
    let mut replaced = Vec::with_capacity(children.len());
    for child in children {
        match child {
            XmlChild::Element(element) if element.name == "include" => {
                let refid_raw = element.required_attr("refid")?.to_string();
                let refid = parse_placeholders(&refid_raw, variables);
                let fragment_id = qualify(namespace, &refid);
                let Some(fragment) = config
                    .sql_fragment(&fragment_id)
                    .or_else(|| config.sql_fragment(&refid))
                    .cloned()
                else {
                    node.children = replaced;
                    return Ok(Some(format!("sql fragment '{fragment_id}'")));
                };

                // <property> children overlay the surrounding variables.
                let mut merged = variables.clone();
                for property in element.elements_named("property") {
                    let name = property.required_attr("name")?.to_string();
                    let value =
                        parse_placeholders(property.required_attr("value")?, variables);
                    merged.insert(name, value);
                }

                let mut fragment = fragment;
                substitute_variables(&mut fragment, &merged);
                if let Some(missing) =
                    apply_includes_with(config, namespace, &mut fragment, &merged)?
                {
                    node.children = replaced;
                    return Ok(Some(missing));
                }
                replaced.extend(fragment.children);
            }
            XmlChild::Element(mut element) => {
                if let Some(missing) =
                    apply_includes_with(config, namespace, &mut element, variables)?
                {
                    node.children = replaced;
                    node.children.push(XmlChild::Element(element));
                    return Ok(Some(missing));
                }
                replaced.push(XmlChild::Element(element));
            }
            text => replaced.push(text),
        }
    }
    node.children = replaced;
    Ok(None)
}

/// Substitute `${…}` configuration variables in a fragment's text and
/// attributes. Unknown names stay verbatim for runtime interpolation.
fn substitute_variables(node: &mut XmlNode, variables: &Variables) {
    for (_, value) in &mut node.attributes {
        *value = parse_placeholders(value, variables);
    }
    for child in &mut node.children {
        match child {
            XmlChild::Text(text) => *text = parse_placeholders(text, variables),
            XmlChild::Element(element) => substitute_variables(element, variables),
        }
    }
}

/// Register `<selectKey>` children as derived statements and strip them
/// from the body. Returns the configured key generator, if any.
fn extract_select_keys(
    config: &mut Configuration,
    resource: &str,
    statement_id: &str,
    body: &mut XmlNode,
) -> Result<Option<KeyGeneratorKind>> {
    let mut generator = None;
    let mut kept = Vec::with_capacity(body.children.len());
    for child in body.children.drain(..) {
        match child {
            XmlChild::Element(element) if element.name == "selectKey" => {
                if !database_id_matches(config, &element) {
                    continue;
                }
                let key_id = format!("{statement_id}{SELECT_KEY_SUFFIX}");
                let execute_before = element.attr("order").map(str::to_ascii_uppercase)
                    != Some("AFTER".to_string());

                // Retried statements re-encounter their own select key.
                if !config.has_statement(&key_id) {
                    let result_type = element.attr("resultType").unwrap_or("object");
                    let kind = config.resolve_kind(result_type);
                    let result_map =
                        ResultMap::inline(format!("{key_id}-Inline"), result_type, kind);
                    let sql_source = build_sql_source(config, &element)?;
                    let key_statement =
                        MappedStatement::builder(key_id.clone(), StatementKind::Select, sql_source)
                            .use_cache(false)
                            .flush_cache(false)
                            .result_maps(vec![result_map])
                            .key_properties(split_list(element.attr("keyProperty")))
                            .key_columns(split_list(element.attr("keyColumn")))
                            .resource(resource)
                            .build();
                    config.add_mapped_statement(key_statement)?;
                }
                generator = Some(KeyGeneratorKind::SelectKey {
                    statement_id: key_id,
                    execute_before,
                });
            }
            other => kept.push(other),
        }
    }
    body.children = kept;
    Ok(generator)
}

fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_opt_num(value: Option<&str>, name: &str) -> Result<Option<u64>> {
    value
        .map(|v| {
            v.parse::<u64>().map_err(|_| {
                SqlMapperError::Config(format!("attribute '{name}' is not a number: '{v}'"))
            })
        })
        .transpose()
}
