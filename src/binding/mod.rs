//! Mapper binding: translates interface-style method calls into
//! `(statement id, named parameters)` and shapes results back, without
//! any proxy generation. Descriptors are registered during configuration
//! (programmatically or by package scan) and dispatched by name.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::{Result, SqlMapperError};
use crate::mapping::StatementKind;
use crate::session::{ResultHandler, RowBounds, SqlSession};

/// How a mapper method's return value is shaped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnShape {
    /// No return; usually paired with a result handler argument.
    Void,
    /// A single row (null allowed unless the return type is primitive).
    One,
    /// A list of rows.
    Many,
    /// Rows keyed by one property.
    MapKeyed { key_property: String },
    /// A single row, absent-as-null by contract.
    Optional,
    /// Affected-row count as an integer.
    AffectedCount,
    /// Affected-row count collapsed to `count > 0`.
    AffectedBool,
}

/// Pre-analysed signature of one mapper method.
#[derive(Debug, Clone)]
pub struct MethodSignature {
    pub name: String,
    pub returns: ReturnShape,
    /// Whether a null single result is an error (primitive return type).
    pub returns_primitive: bool,
    /// Declared names for positional arguments; `None` slots fall back to
    /// `param1..paramN`.
    pub param_names: Vec<Option<String>>,
    /// Index of a row-bounds bookkeeping argument, excluded from naming.
    pub row_bounds_index: Option<usize>,
    /// Whether the caller passes a result handler (dispatches to the
    /// handler-driven select).
    pub uses_result_handler: bool,
}

impl MethodSignature {
    #[must_use]
    pub fn new(name: impl Into<String>, returns: ReturnShape) -> Self {
        Self {
            name: name.into(),
            returns,
            returns_primitive: false,
            param_names: Vec::new(),
            row_bounds_index: None,
            uses_result_handler: false,
        }
    }

    #[must_use]
    pub fn primitive(mut self) -> Self {
        self.returns_primitive = true;
        self
    }

    #[must_use]
    pub fn params(mut self, names: &[&str]) -> Self {
        self.param_names = names.iter().map(|n| Some((*n).to_string())).collect();
        self
    }

    #[must_use]
    pub fn positional_params(mut self, count: usize) -> Self {
        self.param_names = vec![None; count];
        self
    }

    #[must_use]
    pub fn row_bounds_at(mut self, index: usize) -> Self {
        self.row_bounds_index = Some(index);
        self
    }

    #[must_use]
    pub fn with_result_handler(mut self) -> Self {
        self.uses_result_handler = true;
        self
    }

    /// Fold positional arguments into the named parameter object.
    ///
    /// A single argument without a declared name passes through unwrapped;
    /// otherwise every argument is reachable under its declared name and
    /// under `paramN`.
    pub fn named_params(&self, args: &[Value]) -> Result<Value> {
        let expected = self.param_names.len();
        if args.len() != expected {
            return Err(SqlMapperError::Binding(format!(
                "method '{}' expects {expected} argument(s), got {}",
                self.name,
                args.len()
            )));
        }
        let named: Vec<(Option<&String>, &Value)> = self
            .param_names
            .iter()
            .zip(args.iter())
            .enumerate()
            .filter(|(i, _)| Some(*i) != self.row_bounds_index)
            .map(|(_, (name, value))| (name.as_ref(), value))
            .collect();

        match named.as_slice() {
            [] => Ok(Value::Null),
            [(None, single)] => Ok((*single).clone()),
            many => {
                let mut map = Map::new();
                for (i, (name, value)) in many.iter().enumerate() {
                    if let Some(name) = name {
                        map.insert((*name).clone(), (*value).clone());
                    }
                    map.insert(format!("param{}", i + 1), (*value).clone());
                }
                Ok(Value::Object(map))
            }
        }
    }
}

/// A mapper interface: its full name plus the analysed method table.
#[derive(Debug, Clone)]
pub struct MapperDescriptor {
    pub interface: String,
    pub parent: Option<String>,
    methods: HashMap<String, MethodSignature>,
}

impl MapperDescriptor {
    #[must_use]
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            parent: None,
            methods: HashMap::new(),
        }
    }

    #[must_use]
    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    #[must_use]
    pub fn method(mut self, signature: MethodSignature) -> Self {
        self.methods.insert(signature.name.clone(), signature);
        self
    }

    #[must_use]
    pub fn find_method(&self, name: &str) -> Option<&MethodSignature> {
        self.methods.get(name)
    }

    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }
}

/// One proxy factory per interface name, populated during configuration
/// or by package scan.
#[derive(Debug, Default)]
pub struct MapperRegistry {
    mappers: HashMap<String, Arc<MapperDescriptor>>,
}

impl MapperRegistry {
    pub fn add(&mut self, descriptor: MapperDescriptor) -> Result<()> {
        let name = descriptor.interface.clone();
        if self.mappers.contains_key(&name) {
            return Err(SqlMapperError::Binding(format!(
                "mapper '{name}' is already known to the registry"
            )));
        }
        self.mappers.insert(name, Arc::new(descriptor));
        Ok(())
    }

    #[must_use]
    pub fn has(&self, interface: &str) -> bool {
        self.mappers.contains_key(interface)
    }

    pub fn get(&self, interface: &str) -> Result<Arc<MapperDescriptor>> {
        self.mappers.get(interface).cloned().ok_or_else(|| {
            SqlMapperError::Binding(format!(
                "type interface '{interface}' is not known to the mapper registry"
            ))
        })
    }

    /// Interfaces registered under a package prefix.
    #[must_use]
    pub fn in_package(&self, package: &str) -> Vec<Arc<MapperDescriptor>> {
        let prefix = format!("{package}.");
        self.mappers
            .values()
            .filter(|d| d.interface.starts_with(&prefix))
            .cloned()
            .collect()
    }
}

/// Dispatches method calls on one mapper interface through a session.
pub struct MapperProxy<'a> {
    session: &'a SqlSession,
    descriptor: Arc<MapperDescriptor>,
}

impl<'a> MapperProxy<'a> {
    #[must_use]
    pub fn new(session: &'a SqlSession, descriptor: Arc<MapperDescriptor>) -> Self {
        Self {
            session,
            descriptor,
        }
    }

    /// Invoke `method` with positional `args`.
    pub fn invoke(&self, method: &str, args: &[Value]) -> Result<Value> {
        self.invoke_with_handler(method, args, None)
    }

    /// Invoke a void-with-handler method, streaming rows to `handler`.
    pub fn invoke_with_handler(
        &self,
        method: &str,
        args: &[Value],
        handler: Option<&mut dyn ResultHandler>,
    ) -> Result<Value> {
        let (signature, statement_id) = self.resolve(method)?;
        let parameter = signature.named_params(args)?;
        let bounds = signature
            .row_bounds_index
            .and_then(|i| args.get(i))
            .and_then(row_bounds_from_value)
            .unwrap_or_default();

        let kind = self
            .session
            .configuration()
            .mapped_statement(&statement_id)?
            .kind;

        match kind {
            StatementKind::Select => self.dispatch_select(
                &signature,
                &statement_id,
                &parameter,
                bounds,
                handler,
            ),
            StatementKind::Insert => {
                adapt_count(&signature, self.session.insert(&statement_id, parameter)?)
            }
            StatementKind::Update => {
                adapt_count(&signature, self.session.update(&statement_id, parameter)?)
            }
            StatementKind::Delete => {
                adapt_count(&signature, self.session.delete(&statement_id, parameter)?)
            }
            StatementKind::Flush => {
                self.session.flush_statements()?;
                Ok(Value::Null)
            }
            StatementKind::Unknown => Err(SqlMapperError::Binding(format!(
                "unknown execution kind for statement '{statement_id}'"
            ))),
        }
    }

    fn dispatch_select(
        &self,
        signature: &MethodSignature,
        statement_id: &str,
        parameter: &Value,
        bounds: RowBounds,
        handler: Option<&mut dyn ResultHandler>,
    ) -> Result<Value> {
        if signature.uses_result_handler {
            let handler = handler.ok_or_else(|| {
                SqlMapperError::Binding(format!(
                    "method '{}' requires a result handler argument",
                    signature.name
                ))
            })?;
            self.session
                .select_with_handler(statement_id, parameter.clone(), bounds, handler)?;
            return Ok(Value::Null);
        }
        match &signature.returns {
            ReturnShape::Many => {
                let rows = self
                    .session
                    .select_list_with_bounds(statement_id, parameter.clone(), bounds)?;
                Ok(Value::Array(rows))
            }
            ReturnShape::MapKeyed { key_property } => {
                let map = self.session.select_map_with_bounds(
                    statement_id,
                    parameter.clone(),
                    key_property,
                    bounds,
                )?;
                Ok(Value::Object(map))
            }
            ReturnShape::One | ReturnShape::Optional | ReturnShape::Void => {
                let value = self.session.select_one(statement_id, parameter.clone())?;
                if value.is_null() && signature.returns_primitive {
                    return Err(SqlMapperError::Binding(format!(
                        "mapper method '{}' attempted to return null from a method with a primitive return type",
                        signature.name
                    )));
                }
                Ok(value)
            }
            other => Err(SqlMapperError::Binding(format!(
                "return shape {other:?} is not applicable to a select statement"
            ))),
        }
    }

    /// Locate the method signature, walking up the parent chain, and the
    /// fully qualified statement id it maps to.
    fn resolve(&self, method: &str) -> Result<(MethodSignature, String)> {
        let mut descriptor = self.descriptor.clone();
        loop {
            if let Some(signature) = descriptor.find_method(method) {
                let candidate = format!("{}.{method}", descriptor.interface);
                let config = self.session.configuration();
                if config.has_statement(&candidate) {
                    return Ok((signature.clone(), candidate));
                }
                return Err(SqlMapperError::Binding(format!(
                    "mapped statement not found: '{candidate}'"
                )));
            }
            match &descriptor.parent {
                Some(parent) => {
                    descriptor = self
                        .session
                        .configuration()
                        .mapper_registry()
                        .get(parent)?;
                }
                None => {
                    return Err(SqlMapperError::Binding(format!(
                        "method '{method}' is not declared by mapper '{}'",
                        self.descriptor.interface
                    )))
                }
            }
        }
    }
}

fn row_bounds_from_value(value: &Value) -> Option<RowBounds> {
    let map = value.as_object()?;
    if !map.contains_key("offset") && !map.contains_key("limit") {
        return None;
    }
    Some(RowBounds {
        offset: map.get("offset").and_then(Value::as_u64).unwrap_or(0) as usize,
        limit: map
            .get("limit")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(usize::MAX),
    })
}

fn adapt_count(signature: &MethodSignature, count: i64) -> Result<Value> {
    match &signature.returns {
        ReturnShape::Void => Ok(Value::Null),
        ReturnShape::AffectedCount | ReturnShape::One | ReturnShape::Many => {
            Ok(Value::from(count))
        }
        ReturnShape::AffectedBool => Ok(Value::Bool(count > 0)),
        other => Err(SqlMapperError::Binding(format!(
            "return shape {other:?} is not applicable to an update statement"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn single_unnamed_param_passes_through() {
        let sig = MethodSignature::new("find", ReturnShape::One).positional_params(1);
        assert_eq!(sig.named_params(&[json!(5)]).unwrap(), json!(5));
    }

    #[test]
    fn named_params_get_param_n_aliases() {
        let sig = MethodSignature::new("find", ReturnShape::One).params(&["name", "age"]);
        let named = sig.named_params(&[json!("ann"), json!(40)]).unwrap();
        assert_eq!(named["name"], json!("ann"));
        assert_eq!(named["age"], json!(40));
        assert_eq!(named["param1"], json!("ann"));
        assert_eq!(named["param2"], json!(40));
    }

    #[test]
    fn row_bounds_slot_excluded_from_params() {
        let sig = MethodSignature::new("page", ReturnShape::Many)
            .positional_params(2)
            .row_bounds_at(1);
        let named = sig
            .named_params(&[json!("ann"), json!({"offset": 0, "limit": 10})])
            .unwrap();
        // The remaining argument is the only named one.
        assert_eq!(named, json!("ann"));
    }

    #[test]
    fn arity_mismatch_is_binding_error() {
        let sig = MethodSignature::new("find", ReturnShape::One).params(&["id"]);
        assert!(sig.named_params(&[]).is_err());
    }
}
