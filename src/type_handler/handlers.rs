use std::fmt;
use std::sync::Arc;

use chrono::NaiveDateTime;
use serde_json::Value;

use crate::error::{Result, SqlMapperError};
use crate::results::Row;
use crate::types::{DbValue, SqlType};

use super::TypeHandler;

fn type_err(handler: &str, value: &dyn fmt::Debug) -> SqlMapperError {
    SqlMapperError::Type(format!("{handler} cannot convert {value:?}"))
}

fn fetch<'a>(row: &'a Row, column: &str) -> Result<&'a DbValue> {
    row.get(column).ok_or_else(|| {
        SqlMapperError::Execution(format!("result set has no column named '{column}'"))
    })
}

fn fetch_idx(row: &Row, index: usize) -> Result<&DbValue> {
    row.get_by_index(index).ok_or_else(|| {
        SqlMapperError::Execution(format!("result set has no column at index {index}"))
    })
}

macro_rules! simple_handler {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Default)]
        pub struct $name;
    };
}

simple_handler!(BooleanHandler, "Boolean values; integers 0/1 coerce on read.");
simple_handler!(IntHandler, "32-bit integer column values.");
simple_handler!(LongHandler, "64-bit integer column values.");
simple_handler!(DoubleHandler, "Floating point column values.");
simple_handler!(DecimalHandler, "Exact decimals carried as text to avoid float drift.");
simple_handler!(StringHandler, "Character data.");
simple_handler!(DateHandler, "Timestamps, `YYYY-MM-DD HH:MM:SS` text accepted on read.");
simple_handler!(DateOnlyHandler, "Calendar dates with the time part truncated.");
simple_handler!(BlobHandler, "Binary data; JSON-side form is an array of byte numbers.");
simple_handler!(JsonHandler, "Structured values stored as their JSON text rendering.");

impl TypeHandler for BooleanHandler {
    fn set(&self, params: &mut [DbValue], index: usize, value: &Value, _sql_type: Option<SqlType>) -> Result<()> {
        params[index] = match value {
            Value::Null => DbValue::Null,
            Value::Bool(b) => DbValue::Bool(*b),
            other => return Err(type_err("BooleanHandler", other)),
        };
        Ok(())
    }

    fn get_by_name(&self, row: &Row, column: &str) -> Result<Value> {
        decode_bool(fetch(row, column)?)
    }

    fn get_by_index(&self, row: &Row, index: usize) -> Result<Value> {
        decode_bool(fetch_idx(row, index)?)
    }
}

fn decode_bool(value: &DbValue) -> Result<Value> {
    match value {
        DbValue::Null => Ok(Value::Null),
        v => v
            .as_bool()
            .map(Value::Bool)
            .ok_or_else(|| type_err("BooleanHandler", v)),
    }
}

impl TypeHandler for IntHandler {
    fn set(&self, params: &mut [DbValue], index: usize, value: &Value, _sql_type: Option<SqlType>) -> Result<()> {
        params[index] = match value {
            Value::Null => DbValue::Null,
            Value::Number(n) => match n.as_i64() {
                Some(i) if i32::try_from(i).is_ok() => DbValue::Int(i),
                _ => return Err(type_err("IntHandler", value)),
            },
            other => return Err(type_err("IntHandler", other)),
        };
        Ok(())
    }

    fn get_by_name(&self, row: &Row, column: &str) -> Result<Value> {
        decode_int(fetch(row, column)?, "IntHandler")
    }

    fn get_by_index(&self, row: &Row, index: usize) -> Result<Value> {
        decode_int(fetch_idx(row, index)?, "IntHandler")
    }
}

impl TypeHandler for LongHandler {
    fn set(&self, params: &mut [DbValue], index: usize, value: &Value, _sql_type: Option<SqlType>) -> Result<()> {
        params[index] = match value {
            Value::Null => DbValue::Null,
            Value::Number(n) => match n.as_i64() {
                Some(i) => DbValue::Int(i),
                None => return Err(type_err("LongHandler", value)),
            },
            other => return Err(type_err("LongHandler", other)),
        };
        Ok(())
    }

    fn get_by_name(&self, row: &Row, column: &str) -> Result<Value> {
        decode_int(fetch(row, column)?, "LongHandler")
    }

    fn get_by_index(&self, row: &Row, index: usize) -> Result<Value> {
        decode_int(fetch_idx(row, index)?, "LongHandler")
    }
}

fn decode_int(value: &DbValue, handler: &str) -> Result<Value> {
    match value {
        DbValue::Null => Ok(Value::Null),
        DbValue::Int(i) => Ok(Value::from(*i)),
        DbValue::Text(s) => s
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| type_err(handler, value)),
        other => Err(type_err(handler, other)),
    }
}

impl TypeHandler for DoubleHandler {
    fn set(&self, params: &mut [DbValue], index: usize, value: &Value, _sql_type: Option<SqlType>) -> Result<()> {
        params[index] = match value {
            Value::Null => DbValue::Null,
            Value::Number(n) => match n.as_f64() {
                Some(f) => DbValue::Float(f),
                None => return Err(type_err("DoubleHandler", value)),
            },
            other => return Err(type_err("DoubleHandler", other)),
        };
        Ok(())
    }

    fn get_by_name(&self, row: &Row, column: &str) -> Result<Value> {
        decode_float(fetch(row, column)?)
    }

    fn get_by_index(&self, row: &Row, index: usize) -> Result<Value> {
        decode_float(fetch_idx(row, index)?)
    }
}

fn decode_float(value: &DbValue) -> Result<Value> {
    match value {
        DbValue::Null => Ok(Value::Null),
        v => v
            .as_float()
            .map(Value::from)
            .ok_or_else(|| type_err("DoubleHandler", v)),
    }
}

impl TypeHandler for DecimalHandler {
    fn set(&self, params: &mut [DbValue], index: usize, value: &Value, _sql_type: Option<SqlType>) -> Result<()> {
        params[index] = match value {
            Value::Null => DbValue::Null,
            Value::String(s) => DbValue::Text(s.clone()),
            Value::Number(n) => DbValue::Text(n.to_string()),
            other => return Err(type_err("DecimalHandler", other)),
        };
        Ok(())
    }

    fn get_by_name(&self, row: &Row, column: &str) -> Result<Value> {
        decode_decimal(fetch(row, column)?)
    }

    fn get_by_index(&self, row: &Row, index: usize) -> Result<Value> {
        decode_decimal(fetch_idx(row, index)?)
    }
}

fn decode_decimal(value: &DbValue) -> Result<Value> {
    match value {
        DbValue::Null => Ok(Value::Null),
        DbValue::Text(s) => Ok(Value::String(s.clone())),
        DbValue::Int(i) => Ok(Value::String(i.to_string())),
        DbValue::Float(f) => Ok(Value::String(f.to_string())),
        other => Err(type_err("DecimalHandler", other)),
    }
}

impl TypeHandler for StringHandler {
    fn set(&self, params: &mut [DbValue], index: usize, value: &Value, _sql_type: Option<SqlType>) -> Result<()> {
        params[index] = match value {
            Value::Null => DbValue::Null,
            Value::String(s) => DbValue::Text(s.clone()),
            Value::Number(n) => DbValue::Text(n.to_string()),
            Value::Bool(b) => DbValue::Text(b.to_string()),
            other => return Err(type_err("StringHandler", other)),
        };
        Ok(())
    }

    fn get_by_name(&self, row: &Row, column: &str) -> Result<Value> {
        decode_string(fetch(row, column)?)
    }

    fn get_by_index(&self, row: &Row, index: usize) -> Result<Value> {
        decode_string(fetch_idx(row, index)?)
    }
}

fn decode_string(value: &DbValue) -> Result<Value> {
    match value {
        DbValue::Null => Ok(Value::Null),
        DbValue::Text(s) => Ok(Value::String(s.clone())),
        DbValue::Int(i) => Ok(Value::String(i.to_string())),
        DbValue::Float(f) => Ok(Value::String(f.to_string())),
        DbValue::Bool(b) => Ok(Value::String(b.to_string())),
        DbValue::Timestamp(ts) => Ok(Value::String(ts.format("%Y-%m-%d %H:%M:%S").to_string())),
        DbValue::Blob(_) => Err(type_err("StringHandler", value)),
    }
}

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

impl TypeHandler for DateHandler {
    fn set(&self, params: &mut [DbValue], index: usize, value: &Value, _sql_type: Option<SqlType>) -> Result<()> {
        params[index] = match value {
            Value::Null => DbValue::Null,
            Value::String(s) => match parse_timestamp(s) {
                Some(ts) => DbValue::Timestamp(ts),
                None => return Err(type_err("DateHandler", value)),
            },
            other => return Err(type_err("DateHandler", other)),
        };
        Ok(())
    }

    fn get_by_name(&self, row: &Row, column: &str) -> Result<Value> {
        decode_timestamp(fetch(row, column)?, TIMESTAMP_FORMAT)
    }

    fn get_by_index(&self, row: &Row, index: usize) -> Result<Value> {
        decode_timestamp(fetch_idx(row, index)?, TIMESTAMP_FORMAT)
    }
}

impl TypeHandler for DateOnlyHandler {
    fn set(&self, params: &mut [DbValue], index: usize, value: &Value, _sql_type: Option<SqlType>) -> Result<()> {
        params[index] = match value {
            Value::Null => DbValue::Null,
            Value::String(s) => {
                let date_part = s.split(' ').next().unwrap_or(s);
                DbValue::Text(date_part.to_string())
            }
            other => return Err(type_err("DateOnlyHandler", other)),
        };
        Ok(())
    }

    fn get_by_name(&self, row: &Row, column: &str) -> Result<Value> {
        decode_timestamp(fetch(row, column)?, "%Y-%m-%d")
    }

    fn get_by_index(&self, row: &Row, index: usize) -> Result<Value> {
        decode_timestamp(fetch_idx(row, index)?, "%Y-%m-%d")
    }
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn decode_timestamp(value: &DbValue, format: &str) -> Result<Value> {
    match value {
        DbValue::Null => Ok(Value::Null),
        DbValue::Timestamp(ts) => Ok(Value::String(ts.format(format).to_string())),
        DbValue::Text(s) => match parse_timestamp(s) {
            Some(ts) => Ok(Value::String(ts.format(format).to_string())),
            None => Err(type_err("DateHandler", value)),
        },
        other => Err(type_err("DateHandler", other)),
    }
}

impl TypeHandler for BlobHandler {
    fn set(&self, params: &mut [DbValue], index: usize, value: &Value, _sql_type: Option<SqlType>) -> Result<()> {
        params[index] = match value {
            Value::Null => DbValue::Null,
            Value::Array(items) => {
                let mut bytes = Vec::with_capacity(items.len());
                for item in items {
                    match item.as_u64() {
                        Some(b) if b <= u64::from(u8::MAX) => bytes.push(b as u8),
                        _ => return Err(type_err("BlobHandler", value)),
                    }
                }
                DbValue::Blob(bytes)
            }
            Value::String(s) => DbValue::Blob(s.clone().into_bytes()),
            other => return Err(type_err("BlobHandler", other)),
        };
        Ok(())
    }

    fn get_by_name(&self, row: &Row, column: &str) -> Result<Value> {
        decode_blob(fetch(row, column)?)
    }

    fn get_by_index(&self, row: &Row, index: usize) -> Result<Value> {
        decode_blob(fetch_idx(row, index)?)
    }
}

fn decode_blob(value: &DbValue) -> Result<Value> {
    match value {
        DbValue::Null => Ok(Value::Null),
        DbValue::Blob(bytes) => Ok(Value::Array(
            bytes.iter().map(|b| Value::from(u64::from(*b))).collect(),
        )),
        DbValue::Text(s) => Ok(Value::Array(
            s.bytes().map(|b| Value::from(u64::from(b))).collect(),
        )),
        other => Err(type_err("BlobHandler", other)),
    }
}

impl TypeHandler for JsonHandler {
    fn set(&self, params: &mut [DbValue], index: usize, value: &Value, _sql_type: Option<SqlType>) -> Result<()> {
        params[index] = match value {
            Value::Null => DbValue::Null,
            other => DbValue::Text(other.to_string()),
        };
        Ok(())
    }

    fn get_by_name(&self, row: &Row, column: &str) -> Result<Value> {
        decode_json(fetch(row, column)?)
    }

    fn get_by_index(&self, row: &Row, index: usize) -> Result<Value> {
        decode_json(fetch_idx(row, index)?)
    }
}

fn decode_json(value: &DbValue) -> Result<Value> {
    match value {
        DbValue::Null => Ok(Value::Null),
        DbValue::Text(s) => serde_json::from_str(s)
            .map_err(|e| SqlMapperError::Type(format!("JsonHandler cannot parse '{s}': {e}"))),
        other => Err(type_err("JsonHandler", other)),
    }
}

/// Name-based enum handler: values are validated against the declared
/// variant list both directions.
#[derive(Debug)]
pub struct EnumNameHandler {
    enum_name: String,
    variants: Arc<Vec<String>>,
}

impl EnumNameHandler {
    #[must_use]
    pub fn new(enum_name: impl Into<String>, variants: Arc<Vec<String>>) -> Self {
        Self {
            enum_name: enum_name.into(),
            variants,
        }
    }

    fn check<'a>(&self, name: &'a str) -> Result<&'a str> {
        if self.variants.iter().any(|v| v == name) {
            Ok(name)
        } else {
            Err(SqlMapperError::Type(format!(
                "'{name}' is not a variant of enum '{}'",
                self.enum_name
            )))
        }
    }
}

impl TypeHandler for EnumNameHandler {
    fn set(&self, params: &mut [DbValue], index: usize, value: &Value, _sql_type: Option<SqlType>) -> Result<()> {
        params[index] = match value {
            Value::Null => DbValue::Null,
            Value::String(s) => DbValue::Text(self.check(s)?.to_string()),
            other => return Err(type_err("EnumNameHandler", other)),
        };
        Ok(())
    }

    fn get_by_name(&self, row: &Row, column: &str) -> Result<Value> {
        self.decode(fetch(row, column)?)
    }

    fn get_by_index(&self, row: &Row, index: usize) -> Result<Value> {
        self.decode(fetch_idx(row, index)?)
    }
}

impl EnumNameHandler {
    fn decode(&self, value: &DbValue) -> Result<Value> {
        match value {
            DbValue::Null => Ok(Value::Null),
            DbValue::Text(s) => Ok(Value::String(self.check(s)?.to_string())),
            other => Err(type_err("EnumNameHandler", other)),
        }
    }
}

/// Ordinal-based enum handler: stores the zero-based variant position.
#[derive(Debug)]
pub struct EnumOrdinalHandler {
    enum_name: String,
    variants: Arc<Vec<String>>,
}

impl EnumOrdinalHandler {
    #[must_use]
    pub fn new(enum_name: impl Into<String>, variants: Arc<Vec<String>>) -> Self {
        Self {
            enum_name: enum_name.into(),
            variants,
        }
    }
}

impl TypeHandler for EnumOrdinalHandler {
    fn set(&self, params: &mut [DbValue], index: usize, value: &Value, _sql_type: Option<SqlType>) -> Result<()> {
        params[index] = match value {
            Value::Null => DbValue::Null,
            Value::String(s) => match self.variants.iter().position(|v| v == s) {
                Some(ordinal) => DbValue::Int(ordinal as i64),
                None => {
                    return Err(SqlMapperError::Type(format!(
                        "'{s}' is not a variant of enum '{}'",
                        self.enum_name
                    )))
                }
            },
            other => return Err(type_err("EnumOrdinalHandler", other)),
        };
        Ok(())
    }

    fn get_by_name(&self, row: &Row, column: &str) -> Result<Value> {
        self.decode(fetch(row, column)?)
    }

    fn get_by_index(&self, row: &Row, index: usize) -> Result<Value> {
        self.decode(fetch_idx(row, index)?)
    }
}

impl EnumOrdinalHandler {
    fn decode(&self, value: &DbValue) -> Result<Value> {
        match value {
            DbValue::Null => Ok(Value::Null),
            DbValue::Int(i) => {
                let idx = usize::try_from(*i).ok();
                idx.and_then(|i| self.variants.get(i))
                    .map(|name| Value::String(name.clone()))
                    .ok_or_else(|| {
                        SqlMapperError::Type(format!(
                            "ordinal {i} is out of range for enum '{}'",
                            self.enum_name
                        ))
                    })
            }
            other => Err(type_err("EnumOrdinalHandler", other)),
        }
    }
}

/// Fallback handler: picks a concrete conversion per value on write and
/// mirrors the driver value on read.
#[derive(Debug, Default)]
pub struct UnknownHandler;

impl TypeHandler for UnknownHandler {
    fn set(&self, params: &mut [DbValue], index: usize, value: &Value, _sql_type: Option<SqlType>) -> Result<()> {
        params[index] = match value {
            Value::Null => DbValue::Null,
            Value::Bool(b) => DbValue::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    DbValue::Int(i)
                } else if let Some(f) = n.as_f64() {
                    DbValue::Float(f)
                } else {
                    return Err(type_err("UnknownHandler", value));
                }
            }
            Value::String(s) => DbValue::Text(s.clone()),
            // Structured values fall back to their JSON rendering.
            other => DbValue::Text(other.to_string()),
        };
        Ok(())
    }

    fn get_by_name(&self, row: &Row, column: &str) -> Result<Value> {
        Ok(decode_any(fetch(row, column)?))
    }

    fn get_by_index(&self, row: &Row, index: usize) -> Result<Value> {
        Ok(decode_any(fetch_idx(row, index)?))
    }
}

pub(super) fn decode_any(value: &DbValue) -> Value {
    match value {
        DbValue::Null => Value::Null,
        DbValue::Bool(b) => Value::Bool(*b),
        DbValue::Int(i) => Value::from(*i),
        DbValue::Float(f) => Value::from(*f),
        DbValue::Text(s) => Value::String(s.clone()),
        DbValue::Timestamp(ts) => Value::String(ts.format(TIMESTAMP_FORMAT).to_string()),
        DbValue::Blob(bytes) => Value::Array(
            bytes.iter().map(|b| Value::from(u64::from(*b))).collect(),
        ),
    }
}
