//! Parameter binding: resolves each placeholder's value (synthesized
//! parameters first, then the parameter object) and runs it through the
//! resolved type handler onto the driver's parameter slots.

use serde_json::Value;

use crate::config::Configuration;
use crate::error::{Result, SqlMapperError};
use crate::mapping::{BoundSql, ParamMode};
use crate::reflection::MetaValue;
use crate::types::{kind_of_value, DbValue, TypeKind};

/// The pre-conversion value for each placeholder, in order. Used both for
/// cache-key assembly and as type-handler input.
pub fn resolve_parameter_values(bound_sql: &BoundSql, parameter: &Value) -> Vec<Value> {
    bound_sql
        .parameter_mappings
        .iter()
        .map(|mapping| {
            if mapping.mode == ParamMode::Out {
                return Value::Null;
            }
            value_for(bound_sql, parameter, &mapping.property)
        })
        .collect()
}

fn value_for(bound_sql: &BoundSql, parameter: &Value, property: &str) -> Value {
    let additional = Value::Object(bound_sql.additional_parameters.clone());
    if MetaValue::has(&additional, property) {
        return MetaValue::get(&additional, property);
    }
    if parameter.is_null() {
        return Value::Null;
    }
    if property == "value" && !parameter.is_object() {
        return parameter.clone();
    }
    if !parameter.is_object() {
        // A scalar parameter binds itself to whichever name was used.
        return parameter.clone();
    }
    MetaValue::get(parameter, property)
}

/// Convert the resolved values into driver slots through their handlers.
pub fn bind_parameters(
    configuration: &Configuration,
    bound_sql: &BoundSql,
    parameter: &Value,
) -> Result<Vec<DbValue>> {
    let values = resolve_parameter_values(bound_sql, parameter);
    let mut slots = vec![DbValue::Null; values.len()];

    for (index, (mapping, value)) in bound_sql
        .parameter_mappings
        .iter()
        .zip(values.iter())
        .enumerate()
    {
        if mapping.mode == ParamMode::Out {
            continue;
        }
        let handler = match &mapping.type_handler {
            Some(name) => configuration.named_type_handler(name).ok_or_else(|| {
                SqlMapperError::Type(format!(
                    "parameter '{}' references unregistered type handler '{name}'",
                    mapping.property
                ))
            })?,
            None => {
                let kind: Option<TypeKind> = mapping
                    .kind
                    .clone()
                    .or_else(|| (!value.is_null()).then(|| kind_of_value(value)));
                match kind {
                    Some(kind) => configuration
                        .type_handlers()
                        .resolve(Some(&kind), mapping.sql_type)
                        .unwrap_or_else(|| configuration.type_handlers().unknown()),
                    None => configuration.type_handlers().unknown(),
                }
            }
        };
        handler
            .set(&mut slots, index, value, mapping.sql_type)
            .map_err(|e| {
                SqlMapperError::Type(format!(
                    "could not set parameter '{}' at position {}: {e}",
                    mapping.property,
                    index + 1
                ))
            })?;
    }
    Ok(slots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::ParameterMapping;
    use serde_json::json;

    fn bound(mappings: Vec<ParameterMapping>, additional: Value) -> BoundSql {
        BoundSql {
            sql: String::new(),
            parameter_mappings: mappings,
            additional_parameters: match additional {
                Value::Object(map) => map,
                _ => serde_json::Map::new(),
            },
        }
    }

    #[test]
    fn additional_parameters_win() {
        let b = bound(
            vec![ParameterMapping::of("__frch_id_0")],
            json!({"__frch_id_0": 10}),
        );
        let values = resolve_parameter_values(&b, &json!({"id": 99}));
        assert_eq!(values, vec![json!(10)]);
    }

    #[test]
    fn scalar_parameter_binds_itself() {
        let b = bound(vec![ParameterMapping::of("id")], json!({}));
        let values = resolve_parameter_values(&b, &json!(42));
        assert_eq!(values, vec![json!(42)]);
    }

    #[test]
    fn object_parameter_resolves_paths() {
        let b = bound(vec![ParameterMapping::of("user.name")], json!({}));
        let values = resolve_parameter_values(&b, &json!({"user": {"name": "ann"}}));
        assert_eq!(values, vec![json!("ann")]);
    }

    #[test]
    fn binds_through_handlers() {
        let config = Configuration::new();
        let b = bound(
            vec![ParameterMapping::of("a"), ParameterMapping::of("b")],
            json!({}),
        );
        let slots = bind_parameters(&config, &b, &json!({"a": 1, "b": "x"})).unwrap();
        assert_eq!(slots, vec![DbValue::Int(1), DbValue::Text("x".into())]);
    }
}
