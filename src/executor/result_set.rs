//! Result mapping: rows into dynamic record values via the result-map
//! system, with discriminator resolution, automapping, nested selects and
//! joined-row grouping.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::cache::key::KeyComponent;
use crate::cache::CacheKey;
use crate::config::{AutoMappingBehavior, Configuration};
use crate::error::{Result, SqlMapperError};
use crate::mapping::{MappedStatement, ResultMap, ResultMapping};
use crate::reflection::property::underscore_to_camel;
use crate::reflection::MetaValue;
use crate::results::{ResultSet, Row};
use crate::session::{ResultHandler, RowBounds};
use crate::type_handler::TypeHandler;
use crate::types::{DbValue, TypeKind};

use super::Executor;

/// Map a fetched result set into values, honoring row bounds and an
/// optional streaming handler. Rows are fully consumed before returning.
pub fn handle_result_set(
    executor: &mut dyn Executor,
    ms: &Arc<MappedStatement>,
    result_set: ResultSet,
    bounds: RowBounds,
    mut handler: Option<&mut dyn ResultHandler>,
) -> Result<Vec<Value>> {
    let configuration = executor.configuration().clone();
    let result_map = match ms.result_maps.first() {
        Some(map) => map.clone(),
        None => ResultMap::inline(format!("{}-Default", ms.id), "map", TypeKind::Map),
    };

    let rows: Vec<&Row> = result_set
        .rows
        .iter()
        .skip(bounds.offset)
        .take(bounds.limit)
        .collect();

    let mut out = Vec::new();
    let mut sink = |value: Value| -> bool {
        match handler.as_mut() {
            Some(h) => h.handle(&value),
            None => {
                out.push(value);
                true
            }
        }
    };

    if result_map.has_nested_result_maps {
        handle_grouped_rows(executor, &configuration, ms, &result_map, &rows, &mut sink)?;
    } else {
        for row in rows {
            let map = discriminated(&configuration, row, result_map.clone())?;
            let value = map_row_flat(executor, &configuration, &map, row, "", false)?;
            if !sink(value) {
                break;
            }
        }
    }
    drop(sink);
    Ok(out)
}

/// Follow the discriminator chain for a row until it settles. Cycles are
/// broken by a visited set, keeping the choice a deterministic function
/// of the row and the discriminator table.
fn discriminated(
    configuration: &Configuration,
    row: &Row,
    mut map: Arc<ResultMap>,
) -> Result<Arc<ResultMap>> {
    let mut visited = std::collections::HashSet::new();
    visited.insert(map.id.clone());
    while let Some(discriminator) = map.discriminator.clone() {
        let value = match row.get(&discriminator.column) {
            Some(v) => discriminator_key(v),
            None => break,
        };
        match discriminator.case_for(&value) {
            Some(next_id) if !visited.contains(next_id) => {
                visited.insert(next_id.to_string());
                map = configuration.result_map(next_id)?;
            }
            _ => break,
        }
    }
    Ok(map)
}

fn discriminator_key(value: &DbValue) -> String {
    match value {
        DbValue::Text(s) => s.clone(),
        DbValue::Int(n) => n.to_string(),
        DbValue::Float(f) => f.to_string(),
        DbValue::Bool(b) => b.to_string(),
        DbValue::Timestamp(ts) => ts.format("%Y-%m-%d %H:%M:%S").to_string(),
        DbValue::Null => "null".to_string(),
        DbValue::Blob(_) => String::new(),
    }
}

fn is_scalar_kind(kind: &TypeKind) -> bool {
    matches!(
        kind,
        TypeKind::Boolean
            | TypeKind::Int
            | TypeKind::Long
            | TypeKind::Float
            | TypeKind::Double
            | TypeKind::Decimal
            | TypeKind::BigInteger
            | TypeKind::String
            | TypeKind::Date
            | TypeKind::Blob
    )
}

/// Map one row into one value, running constructor, id and property
/// mappings plus automapping. Nested result-map mappings are skipped
/// here; the grouped path applies them.
fn map_row_flat(
    executor: &mut dyn Executor,
    configuration: &Configuration,
    map: &Arc<ResultMap>,
    row: &Row,
    prefix: &str,
    nested: bool,
) -> Result<Value> {
    // Scalar targets take the single column directly.
    if is_scalar_kind(&map.kind)
        && map.constructor_mappings.is_empty()
        && map.id_mappings.is_empty()
        && map.property_mappings.is_empty()
    {
        let handler = configuration
            .type_handlers()
            .resolve(Some(&map.kind), None)
            .unwrap_or_else(|| configuration.type_handlers().unknown());
        return handler.get_by_index(row, 0);
    }

    let mut instance = configuration.create_object(&map.type_name)?;

    for mapping in map
        .constructor_mappings
        .iter()
        .chain(&map.id_mappings)
        .chain(&map.property_mappings)
    {
        if mapping.nested_result_map.is_some() || mapping.property.is_empty() {
            continue;
        }
        if let Some(select_id) = &mapping.nested_select {
            let value = run_nested_select(executor, configuration, mapping, row, select_id)?;
            MetaValue::set(&mut instance, &mapping.property, value)?;
            continue;
        }
        let Some(column) = mapping.column.as_deref() else {
            continue;
        };
        let column = format!("{prefix}{column}");
        if row.column_index(&column).is_none() {
            continue;
        }
        let handler = resolve_handler(configuration, mapping)?;
        let value = handler.get_by_name(row, &column)?;
        if !value.is_null() || configuration.settings.call_setters_on_nulls {
            MetaValue::set(&mut instance, &mapping.property, value)?;
        }
    }

    apply_automapping(configuration, map, row, prefix, nested, &mut instance)?;
    Ok(instance)
}

fn resolve_handler(
    configuration: &Configuration,
    mapping: &ResultMapping,
) -> Result<Arc<dyn TypeHandler>> {
    if let Some(name) = &mapping.type_handler {
        return configuration.named_type_handler(name).ok_or_else(|| {
            SqlMapperError::Type(format!(
                "result mapping '{}' references unregistered type handler '{name}'",
                mapping.property
            ))
        });
    }
    if let Some(kind) = &mapping.kind {
        if let Some(handler) = configuration
            .type_handlers()
            .resolve(Some(kind), mapping.sql_type)
        {
            return Ok(handler);
        }
    }
    // No declared kind: the unknown handler decides per column value.
    Ok(configuration.type_handlers().unknown())
}

fn apply_automapping(
    configuration: &Configuration,
    map: &Arc<ResultMap>,
    row: &Row,
    prefix: &str,
    nested: bool,
    instance: &mut Value,
) -> Result<()> {
    let behavior = configuration.settings.auto_mapping_behavior;
    let enabled = match map.auto_mapping {
        Some(explicit) => explicit,
        None => match behavior {
            AutoMappingBehavior::None => false,
            AutoMappingBehavior::Partial => !nested,
            AutoMappingBehavior::Full => true,
        },
    };
    if !enabled {
        return Ok(());
    }

    let reflector = configuration.reflectors().reflector_for(&map.type_name)?;
    let unknown = configuration.type_handlers().unknown();

    for (index, column) in row.column_names.iter().enumerate() {
        let unprefixed = if prefix.is_empty() {
            column.as_str()
        } else {
            match column.strip_prefix(prefix) {
                Some(rest) => rest,
                None => continue,
            }
        };
        if map.mapped_columns.contains(&unprefixed.to_uppercase())
            || map.mapped_columns.contains(&column.to_uppercase())
        {
            continue;
        }
        let property = if configuration.settings.map_underscore_to_camel_case {
            underscore_to_camel(unprefixed)
        } else {
            unprefixed.to_string()
        };
        let property = match reflector.find_property(&property) {
            Some(canonical) => canonical.to_string(),
            None if reflector.is_open() => property,
            None => continue,
        };
        if !reflector.has_setter(&property) {
            continue;
        }
        let value = unknown.get_by_index(row, index)?;
        if !value.is_null() || configuration.settings.call_setters_on_nulls {
            MetaValue::set(instance, &property, value)?;
        }
    }
    Ok(())
}

fn run_nested_select(
    executor: &mut dyn Executor,
    configuration: &Configuration,
    mapping: &ResultMapping,
    row: &Row,
    select_id: &str,
) -> Result<Value> {
    let unknown = configuration.type_handlers().unknown();
    let parameter = if mapping.composites.is_empty() {
        match mapping.column.as_deref() {
            Some(column) if row.column_index(column).is_some() => {
                unknown.get_by_name(row, column)?
            }
            _ => Value::Null,
        }
    } else {
        let mut composite = Map::new();
        for (property, column) in &mapping.composites {
            if row.column_index(column).is_some() {
                composite.insert(property.clone(), unknown.get_by_name(row, column)?);
            }
        }
        Value::Object(composite)
    };

    if parameter.is_null() {
        return Ok(if mapping.many {
            Value::Array(Vec::new())
        } else {
            Value::Null
        });
    }

    let nested_ms = configuration.mapped_statement(select_id)?;
    let rows = executor.query(&nested_ms, &parameter, RowBounds::default(), None)?;
    if mapping.many {
        return Ok(Value::Array(rows));
    }
    match rows.len() {
        0 => Ok(Value::Null),
        1 => Ok(rows.into_iter().next().expect("length checked")),
        n => Err(SqlMapperError::Execution(format!(
            "nested select '{select_id}' for property '{}' returned {n} rows where one was expected",
            mapping.property
        ))),
    }
}

/// Identity of a row under a result map: the id columns (falling back to
/// every explicitly mapped column). `None` when every keyed column is
/// null, which is how a left join says "no nested row here".
fn row_key(map: &Arc<ResultMap>, row: &Row, prefix: &str) -> Result<Option<CacheKey>> {
    let id_mappings: Vec<&ResultMapping> = if map.id_mappings.is_empty() {
        map.property_mappings
            .iter()
            .filter(|m| m.column.is_some() && m.nested_result_map.is_none())
            .collect()
    } else {
        map.id_mappings.iter().collect()
    };

    let mut key = CacheKey::new();
    key.update(map.id.as_str())?;
    let mut any_non_null = false;
    for mapping in id_mappings {
        let Some(column) = mapping.column.as_deref() else {
            continue;
        };
        let column = format!("{prefix}{column}");
        let Some(value) = row.get(&column) else {
            continue;
        };
        if !value.is_null() {
            any_non_null = true;
        }
        key.update(column.as_str())?;
        key.update(KeyComponent::from(value))?;
    }
    if !any_non_null {
        return Ok(None);
    }
    Ok(Some(key))
}

fn handle_grouped_rows(
    executor: &mut dyn Executor,
    configuration: &Configuration,
    ms: &Arc<MappedStatement>,
    result_map: &Arc<ResultMap>,
    rows: &[&Row],
    emit: &mut dyn FnMut(Value) -> bool,
) -> Result<()> {
    let mut partials: HashMap<CacheKey, Value> = HashMap::new();
    let mut order: Vec<CacheKey> = Vec::new();
    let mut nested_seen: HashMap<CacheKey, usize> = HashMap::new();
    let mut previous_key: Option<CacheKey> = None;

    for row in rows {
        let map = discriminated(configuration, row, result_map.clone())?;
        let Some(key) = row_key(&map, row, "")? else {
            continue;
        };

        if ms.result_ordered {
            // Streaming: a change of outer id completes the previous object.
            if let Some(prev) = previous_key.take() {
                if prev != key {
                    if let Some(done) = partials.remove(&prev) {
                        order.retain(|k| *k != prev);
                        if !emit(done) {
                            return Ok(());
                        }
                    }
                }
            }
            previous_key = Some(key.clone());
        }

        if !partials.contains_key(&key) {
            let base = map_row_flat(executor, configuration, &map, row, "", false)?;
            partials.insert(key.clone(), base);
            order.push(key.clone());
        }
        let mut parent = partials
            .remove(&key)
            .expect("partial inserted above");
        apply_nested_mappings(
            executor,
            configuration,
            &map,
            row,
            &mut parent,
            &key,
            &mut nested_seen,
        )?;
        partials.insert(key.clone(), parent);
    }

    for key in order {
        if let Some(value) = partials.remove(&key) {
            if !emit(value) {
                return Ok(());
            }
        }
    }
    Ok(())
}

/// Apply nested association/collection mappings of `map` for one joined
/// row onto the partially built parent, deduplicating collection elements
/// by their nested row identity.
fn apply_nested_mappings(
    executor: &mut dyn Executor,
    configuration: &Configuration,
    map: &Arc<ResultMap>,
    row: &Row,
    parent: &mut Value,
    parent_key: &CacheKey,
    nested_seen: &mut HashMap<CacheKey, usize>,
) -> Result<()> {
    for mapping in &map.property_mappings {
        let Some(nested_id) = &mapping.nested_result_map else {
            continue;
        };
        let nested_map = discriminated(configuration, row, configuration.result_map(nested_id)?)?;
        let prefix = mapping.column_prefix.as_deref().unwrap_or("");
        let Some(nested_key) = row_key(&nested_map, row, prefix)? else {
            continue;
        };

        let mut composite = CacheKey::new();
        composite.update(parent_key.to_string())?;
        composite.update(mapping.property.as_str())?;
        composite.update(nested_key.to_string())?;

        let target = parent.as_object_mut().ok_or_else(|| {
            SqlMapperError::Execution(format!(
                "cannot attach nested property '{}' to a non-object result",
                mapping.property
            ))
        })?;

        if mapping.many {
            let slot = target
                .entry(mapping.property.clone())
                .or_insert_with(|| Value::Array(Vec::new()));
            if slot.is_null() {
                *slot = Value::Array(Vec::new());
            }
            let arr = slot.as_array_mut().ok_or_else(|| {
                SqlMapperError::Execution(format!(
                    "collection property '{}' holds a non-list value",
                    mapping.property
                ))
            })?;
            if let Some(&index) = nested_seen.get(&composite) {
                let mut element = arr
                    .get_mut(index)
                    .ok_or_else(|| {
                        SqlMapperError::Execution("nested collection index out of range".into())
                    })?
                    .take();
                apply_nested_mappings(
                    executor,
                    configuration,
                    &nested_map,
                    row,
                    &mut element,
                    &composite,
                    nested_seen,
                )?;
                arr[index] = element;
            } else {
                let mut element =
                    map_row_flat(executor, configuration, &nested_map, row, prefix, true)?;
                apply_nested_mappings(
                    executor,
                    configuration,
                    &nested_map,
                    row,
                    &mut element,
                    &composite,
                    nested_seen,
                )?;
                arr.push(element);
                nested_seen.insert(composite, arr.len() - 1);
            }
        } else {
            let existing = target.get(&mapping.property).cloned().unwrap_or(Value::Null);
            if existing.is_null() {
                let mut element =
                    map_row_flat(executor, configuration, &nested_map, row, prefix, true)?;
                apply_nested_mappings(
                    executor,
                    configuration,
                    &nested_map,
                    row,
                    &mut element,
                    &composite,
                    nested_seen,
                )?;
                target.insert(mapping.property.clone(), element);
            } else {
                let element = target
                    .get_mut(&mapping.property)
                    .expect("existing checked above");
                apply_nested_in_place(
                    executor,
                    configuration,
                    &nested_map,
                    row,
                    element,
                    &composite,
                    nested_seen,
                )?;
            }
        }
    }
    Ok(())
}

fn apply_nested_in_place(
    executor: &mut dyn Executor,
    configuration: &Configuration,
    map: &Arc<ResultMap>,
    row: &Row,
    element: &mut Value,
    element_key: &CacheKey,
    nested_seen: &mut HashMap<CacheKey, usize>,
) -> Result<()> {
    apply_nested_mappings(
        executor,
        configuration,
        map,
        row,
        element,
        element_key,
        nested_seen,
    )
}
