use serde_json::{Map, Value};

use crate::error::{Result, SqlMapperError};

use super::property::{tokenize, Index, Segment};

/// Navigates dotted/indexed property paths over a dynamic value.
///
/// Reads clone the addressed fragment; writes auto-vivify intermediate
/// objects so `order.customer.name` can be set on an empty object.
pub struct MetaValue;

impl MetaValue {
    /// Read `path`, returning `Value::Null` when any hop is absent.
    #[must_use]
    pub fn get(object: &Value, path: &str) -> Value {
        let mut current = object;
        for segment in tokenize(path) {
            match step(current, &segment) {
                Some(next) => current = next,
                None => return Value::Null,
            }
        }
        current.clone()
    }

    /// Whether every hop of `path` resolves to a present value.
    #[must_use]
    pub fn has(object: &Value, path: &str) -> bool {
        let mut current = object;
        for segment in tokenize(path) {
            match step(current, &segment) {
                Some(next) => current = next,
                None => return false,
            }
        }
        true
    }

    /// Write `value` at `path`, creating intermediate objects as needed.
    pub fn set(object: &mut Value, path: &str, value: Value) -> Result<()> {
        let segments = tokenize(path);
        if segments.is_empty() {
            return Err(SqlMapperError::Reflection(
                "cannot set a value at an empty property path".into(),
            ));
        }
        set_segments(object, &segments, value, path)
    }
}

fn step<'a>(current: &'a Value, segment: &Segment) -> Option<&'a Value> {
    let named = if segment.name.is_empty() {
        Some(current)
    } else {
        lookup_name(current, &segment.name)
    }?;
    match &segment.index {
        None => Some(named),
        Some(Index::Position(n)) => named.as_array().and_then(|a| a.get(*n)),
        Some(Index::Key(k)) => named.as_object().and_then(|m| m.get(k)),
    }
}

fn lookup_name<'a>(current: &'a Value, name: &str) -> Option<&'a Value> {
    let map = current.as_object()?;
    if let Some(v) = map.get(name) {
        return Some(v);
    }
    // Column labels and declared properties can differ in case only.
    map.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v)
}

fn set_segments(target: &mut Value, segments: &[Segment], value: Value, full: &str) -> Result<()> {
    let (segment, rest) = segments
        .split_first()
        .expect("set_segments requires at least one segment");

    if target.is_null() {
        *target = Value::Object(Map::new());
    }

    let slot = slot_for(target, segment, full)?;
    if rest.is_empty() {
        *slot = value;
        Ok(())
    } else {
        set_segments(slot, rest, value, full)
    }
}

fn slot_for<'a>(target: &'a mut Value, segment: &Segment, full: &str) -> Result<&'a mut Value> {
    let named: &mut Value = if segment.name.is_empty() {
        target
    } else {
        let map = target.as_object_mut().ok_or_else(|| {
            SqlMapperError::Reflection(format!(
                "cannot set property '{}' of path '{full}' on a non-object value",
                segment.name
            ))
        })?;
        map.entry(segment.name.clone()).or_insert(Value::Null)
    };

    match &segment.index {
        None => Ok(named),
        Some(Index::Position(n)) => {
            if named.is_null() {
                *named = Value::Array(Vec::new());
            }
            let arr = named.as_array_mut().ok_or_else(|| {
                SqlMapperError::Reflection(format!(
                    "indexed segment '{}[{n}]' of path '{full}' does not address a list",
                    segment.name
                ))
            })?;
            while arr.len() <= *n {
                arr.push(Value::Null);
            }
            Ok(&mut arr[*n])
        }
        Some(Index::Key(k)) => {
            if named.is_null() {
                *named = Value::Object(Map::new());
            }
            let map = named.as_object_mut().ok_or_else(|| {
                SqlMapperError::Reflection(format!(
                    "keyed segment '{}[{k}]' of path '{full}' does not address a map",
                    segment.name
                ))
            })?;
            Ok(map.entry(k.clone()).or_insert(Value::Null))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_nested_and_indexed_paths() {
        let v = json!({"order": {"lines": [{"sku": "a"}, {"sku": "b"}], "tags": {"x": 1}}});
        assert_eq!(MetaValue::get(&v, "order.lines[1].sku"), json!("b"));
        assert_eq!(MetaValue::get(&v, "order.tags[x]"), json!(1));
        assert_eq!(MetaValue::get(&v, "order.missing"), Value::Null);
    }

    #[test]
    fn case_insensitive_fallback() {
        let v = json!({"userName": "ann"});
        assert_eq!(MetaValue::get(&v, "username"), json!("ann"));
    }

    #[test]
    fn set_auto_vivifies() {
        let mut v = json!({});
        MetaValue::set(&mut v, "order.customer.name", json!("ann")).unwrap();
        assert_eq!(v, json!({"order": {"customer": {"name": "ann"}}}));
    }

    #[test]
    fn set_list_position_grows() {
        let mut v = json!({});
        MetaValue::set(&mut v, "items[2]", json!(9)).unwrap();
        assert_eq!(v, json!({"items": [null, null, 9]}));
    }

    #[test]
    fn set_on_scalar_fails() {
        let mut v = json!(42);
        assert!(MetaValue::set(&mut v, "x", json!(1)).is_err());
    }
}
