use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};

use crate::error::{Result, SqlMapperError};
use crate::types::TypeKind;

use super::property::{accessor_to_property, is_boolean_accessor};

/// Declared shape of a named record type.
///
/// Schemas stand in for concrete classes: configuration references them by
/// name (`resultType="User"`), the reflection layer derives a cached
/// descriptor from them, and instances are plain JSON objects.
#[derive(Debug, Clone)]
pub struct RecordSchema {
    pub name: String,
    /// Parent schema name; properties merge child-over-parent.
    pub parent: Option<String>,
    pub properties: Vec<PropertySpec>,
    /// Open schemas accept writes to undeclared properties.
    pub open: bool,
}

impl RecordSchema {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            properties: Vec::new(),
            open: false,
        }
    }

    #[must_use]
    pub fn open(name: impl Into<String>) -> Self {
        Self {
            open: true,
            ..Self::new(name)
        }
    }

    #[must_use]
    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    #[must_use]
    pub fn property(mut self, name: impl Into<String>, kind: TypeKind) -> Self {
        self.properties.push(PropertySpec {
            name: name.into(),
            kind,
            element: None,
            readable: true,
            writable: true,
        });
        self
    }

    #[must_use]
    pub fn list_property(mut self, name: impl Into<String>, element: TypeKind) -> Self {
        self.properties.push(PropertySpec {
            name: name.into(),
            kind: TypeKind::List,
            element: Some(element),
            readable: true,
            writable: true,
        });
        self
    }

    #[must_use]
    pub fn read_only(mut self, name: impl Into<String>, kind: TypeKind) -> Self {
        self.properties.push(PropertySpec {
            name: name.into(),
            kind,
            element: None,
            readable: true,
            writable: false,
        });
        self
    }
}

/// One declared property. `name` may use accessor spelling
/// (`is_active`, `get_name`); it is normalized during reflection.
#[derive(Debug, Clone)]
pub struct PropertySpec {
    pub name: String,
    pub kind: TypeKind,
    /// Element kind for list properties, resolved from the declaration
    /// rather than from runtime instances.
    pub element: Option<TypeKind>,
    pub readable: bool,
    pub writable: bool,
}

/// Resolved accessor for one property of one type.
#[derive(Debug, Clone)]
pub enum PropertyHandle {
    Typed {
        name: String,
        kind: TypeKind,
        element: Option<TypeKind>,
    },
    /// Two incomparable declarations for the same name; using it fails
    /// at invocation time with a precise message.
    Ambiguous {
        name: String,
        owner: String,
        candidates: (TypeKind, TypeKind),
    },
}

impl PropertyHandle {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            PropertyHandle::Typed { name, .. } | PropertyHandle::Ambiguous { name, .. } => name,
        }
    }

    /// The effective kind, or the invocation-time ambiguity error.
    pub fn kind(&self) -> Result<&TypeKind> {
        match self {
            PropertyHandle::Typed { kind, .. } => Ok(kind),
            PropertyHandle::Ambiguous {
                name,
                owner,
                candidates,
            } => Err(SqlMapperError::Reflection(format!(
                "illegal property accessor for '{name}' on type '{owner}': \
                 conflicting declarations {:?} and {:?}",
                candidates.0, candidates.1
            ))),
        }
    }

    #[must_use]
    pub fn element(&self) -> Option<&TypeKind> {
        match self {
            PropertyHandle::Typed { element, .. } => element.as_ref(),
            PropertyHandle::Ambiguous { .. } => None,
        }
    }
}

/// Cached per-type descriptor: property handles, case-insensitive lookup
/// names, and the default instance template.
#[derive(Debug)]
pub struct Reflector {
    pub type_name: String,
    readable: HashMap<String, PropertyHandle>,
    writable: HashMap<String, PropertyHandle>,
    case_map: HashMap<String, String>,
    default_instance: Value,
    open: bool,
}

impl Reflector {
    fn from_schema(schema: &RecordSchema, parents: &[Arc<RecordSchema>]) -> Self {
        let mut readable: HashMap<String, PropertyHandle> = HashMap::new();
        let mut writable: HashMap<String, PropertyHandle> = HashMap::new();
        let mut case_map: HashMap<String, String> = HashMap::new();

        // Parent chain first, most-derived last so children override.
        for source in parents.iter().map(Arc::as_ref).chain([schema]) {
            for spec in &source.properties {
                let canonical = accessor_to_property(&spec.name);
                if excluded(&canonical) {
                    continue;
                }
                let handle = merge_handles(
                    readable.get(&canonical).or_else(|| writable.get(&canonical)),
                    spec,
                    &canonical,
                    &schema.name,
                );
                case_map.insert(canonical.to_uppercase(), canonical.clone());
                if spec.readable {
                    readable.insert(canonical.clone(), handle.clone());
                }
                if spec.writable {
                    writable.insert(canonical.clone(), handle);
                }
            }
        }

        let mut template = Map::new();
        for name in writable.keys() {
            template.insert(name.clone(), Value::Null);
        }

        Reflector {
            type_name: schema.name.clone(),
            readable,
            writable,
            case_map,
            default_instance: Value::Object(template),
            open: schema.open,
        }
    }

    /// Descriptor for untyped targets (`resultType="map"` and friends).
    #[must_use]
    pub fn untyped(name: &str) -> Self {
        Reflector {
            type_name: name.to_string(),
            readable: HashMap::new(),
            writable: HashMap::new(),
            case_map: HashMap::new(),
            default_instance: Value::Object(Map::new()),
            open: true,
        }
    }

    /// The "no-argument constructor": a fresh instance with declared
    /// properties present and null.
    #[must_use]
    pub fn new_instance(&self) -> Value {
        self.default_instance.clone()
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open
    }

    #[must_use]
    pub fn has_getter(&self, property: &str) -> bool {
        self.open || self.readable.contains_key(property)
    }

    #[must_use]
    pub fn has_setter(&self, property: &str) -> bool {
        self.open || self.writable.contains_key(property)
    }

    pub fn getter(&self, property: &str) -> Result<&PropertyHandle> {
        self.readable.get(property).ok_or_else(|| {
            SqlMapperError::Reflection(format!(
                "there is no readable property '{property}' on type '{}'",
                self.type_name
            ))
        })
    }

    pub fn setter(&self, property: &str) -> Result<&PropertyHandle> {
        self.writable.get(property).ok_or_else(|| {
            SqlMapperError::Reflection(format!(
                "there is no writable property '{property}' on type '{}'",
                self.type_name
            ))
        })
    }

    /// Canonical property name for a case-insensitive lookup
    /// (column labels come back in whatever case the driver chooses).
    #[must_use]
    pub fn find_property(&self, name: &str) -> Option<&str> {
        self.case_map.get(&name.to_uppercase()).map(String::as_str)
    }

    #[must_use]
    pub fn readable_properties(&self) -> Vec<&str> {
        self.readable.keys().map(String::as_str).collect()
    }

    #[must_use]
    pub fn writable_properties(&self) -> Vec<&str> {
        self.writable.keys().map(String::as_str).collect()
    }
}

fn excluded(name: &str) -> bool {
    name.starts_with('$') || name == "class" || name == "serialVersionUID"
}

fn merge_handles(
    existing: Option<&PropertyHandle>,
    spec: &PropertySpec,
    canonical: &str,
    owner: &str,
) -> PropertyHandle {
    let incoming_kind = spec.kind.clone();
    match existing {
        None => PropertyHandle::Typed {
            name: canonical.to_string(),
            kind: incoming_kind,
            element: spec.element.clone(),
        },
        Some(PropertyHandle::Ambiguous { .. }) if incoming_kind == TypeKind::Boolean
            && is_boolean_accessor(&spec.name) =>
        {
            // An is-prefixed boolean accessor settles a prior conflict.
            PropertyHandle::Typed {
                name: canonical.to_string(),
                kind: TypeKind::Boolean,
                element: None,
            }
        }
        Some(PropertyHandle::Ambiguous { .. }) => existing.cloned().unwrap_or(PropertyHandle::Typed {
            name: canonical.to_string(),
            kind: incoming_kind,
            element: spec.element.clone(),
        }),
        Some(PropertyHandle::Typed { kind, element, .. }) => {
            if incoming_kind == *kind {
                PropertyHandle::Typed {
                    name: canonical.to_string(),
                    kind: incoming_kind,
                    element: spec.element.clone().or_else(|| element.clone()),
                }
            } else if incoming_kind == TypeKind::Boolean && is_boolean_accessor(&spec.name) {
                // Boolean pairs prefer the is-prefixed spelling.
                PropertyHandle::Typed {
                    name: canonical.to_string(),
                    kind: TypeKind::Boolean,
                    element: None,
                }
            } else if incoming_kind.is_assignable_to(kind) {
                // Most-derived declaration wins.
                PropertyHandle::Typed {
                    name: canonical.to_string(),
                    kind: incoming_kind,
                    element: spec.element.clone(),
                }
            } else if kind.is_assignable_to(&incoming_kind) {
                PropertyHandle::Typed {
                    name: canonical.to_string(),
                    kind: kind.clone(),
                    element: element.clone(),
                }
            } else {
                PropertyHandle::Ambiguous {
                    name: canonical.to_string(),
                    owner: owner.to_string(),
                    candidates: (kind.clone(), incoming_kind),
                }
            }
        }
    }
}

/// Lazily built, process-lifetime cache of [`Reflector`]s.
#[derive(Debug, Default)]
pub struct ReflectorRegistry {
    schemas: Mutex<HashMap<String, Arc<RecordSchema>>>,
    reflectors: Mutex<HashMap<String, Arc<Reflector>>>,
}

impl ReflectorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, schema: RecordSchema) -> Result<()> {
        let mut schemas = self.schemas.lock().expect("schema registry poisoned");
        let name = schema.name.clone();
        if schemas.contains_key(&name) {
            return Err(SqlMapperError::Config(format!(
                "record schema '{name}' is already registered"
            )));
        }
        schemas.insert(name.clone(), Arc::new(schema));
        drop(schemas);
        // Any cached descriptor for a child built before its parent
        // arrived is stale now.
        self.reflectors
            .lock()
            .expect("reflector cache poisoned")
            .clear();
        Ok(())
    }

    /// Names of every registered schema.
    #[must_use]
    pub fn schema_names(&self) -> Vec<String> {
        self.schemas
            .lock()
            .expect("schema registry poisoned")
            .keys()
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn has_schema(&self, name: &str) -> bool {
        self.schemas
            .lock()
            .expect("schema registry poisoned")
            .contains_key(name)
    }

    /// Descriptor for `name`, built on first use. Unregistered names get
    /// an open, untyped descriptor.
    pub fn reflector_for(&self, name: &str) -> Result<Arc<Reflector>> {
        if let Some(found) = self
            .reflectors
            .lock()
            .expect("reflector cache poisoned")
            .get(name)
        {
            return Ok(found.clone());
        }

        let schemas = self.schemas.lock().expect("schema registry poisoned");
        let built = match schemas.get(name) {
            Some(schema) => {
                let mut parents = Vec::new();
                let mut cursor = schema.parent.clone();
                while let Some(parent_name) = cursor {
                    let parent = schemas.get(&parent_name).ok_or_else(|| {
                        SqlMapperError::Config(format!(
                            "record schema '{}' extends unknown schema '{parent_name}'",
                            schema.name
                        ))
                    })?;
                    if parents.len() >= schemas.len() {
                        return Err(SqlMapperError::Config(format!(
                            "record schema '{}' has a cyclic parent chain",
                            schema.name
                        )));
                    }
                    parents.push(parent.clone());
                    cursor = parent.parent.clone();
                }
                parents.reverse();
                Arc::new(Reflector::from_schema(schema, &parents))
            }
            None => Arc::new(Reflector::untyped(name)),
        };
        drop(schemas);

        self.reflectors
            .lock()
            .expect("reflector cache poisoned")
            .insert(name.to_string(), built.clone());
        Ok(built)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_overrides_parent_with_narrower_kind() {
        let registry = ReflectorRegistry::new();
        registry
            .register(RecordSchema::new("Base").property("payload", TypeKind::Object))
            .unwrap();
        registry
            .register(
                RecordSchema::new("Derived")
                    .extends("Base")
                    .property("payload", TypeKind::String),
            )
            .unwrap();
        let r = registry.reflector_for("Derived").unwrap();
        assert_eq!(r.getter("payload").unwrap().kind().unwrap(), &TypeKind::String);
    }

    #[test]
    fn boolean_pair_prefers_is_spelling() {
        let registry = ReflectorRegistry::new();
        registry
            .register(
                RecordSchema::new("Flagged")
                    .property("active", TypeKind::String)
                    .property("is_active", TypeKind::Boolean),
            )
            .unwrap();
        let r = registry.reflector_for("Flagged").unwrap();
        assert_eq!(r.getter("active").unwrap().kind().unwrap(), &TypeKind::Boolean);
    }

    #[test]
    fn incomparable_siblings_fail_only_at_invocation() {
        let registry = ReflectorRegistry::new();
        registry
            .register(
                RecordSchema::new("Odd")
                    .property("value", TypeKind::Long)
                    .property("value", TypeKind::String),
            )
            .unwrap();
        let r = registry.reflector_for("Odd").unwrap();
        let handle = r.getter("value").unwrap();
        let err = handle.kind().unwrap_err().to_string();
        assert!(err.contains("value"));
        assert!(err.contains("Odd"));
    }

    #[test]
    fn excluded_names_never_appear() {
        let registry = ReflectorRegistry::new();
        registry
            .register(
                RecordSchema::new("Sneaky")
                    .property("$internal", TypeKind::String)
                    .property("class", TypeKind::String)
                    .property("serialVersionUID", TypeKind::Long)
                    .property("fine", TypeKind::String),
            )
            .unwrap();
        let r = registry.reflector_for("Sneaky").unwrap();
        assert!(r.getter("$internal").is_err());
        assert!(r.getter("class").is_err());
        assert!(r.getter("fine").is_ok());
    }

    #[test]
    fn case_insensitive_find() {
        let registry = ReflectorRegistry::new();
        registry
            .register(RecordSchema::new("User").property("userName", TypeKind::String))
            .unwrap();
        let r = registry.reflector_for("User").unwrap();
        assert_eq!(r.find_property("USERNAME"), Some("userName"));
        assert_eq!(r.find_property("username"), Some("userName"));
    }

    #[test]
    fn default_instance_has_null_slots() {
        let registry = ReflectorRegistry::new();
        registry
            .register(RecordSchema::new("Point").property("x", TypeKind::Long).property("y", TypeKind::Long))
            .unwrap();
        let r = registry.reflector_for("Point").unwrap();
        let inst = r.new_instance();
        assert_eq!(inst.get("x"), Some(&Value::Null));
        assert_eq!(inst.get("y"), Some(&Value::Null));
    }

    #[test]
    fn unknown_schema_is_open() {
        let registry = ReflectorRegistry::new();
        let r = registry.reflector_for("Anything").unwrap();
        assert!(r.is_open());
        assert!(r.has_setter("whatever"));
    }
}
