//! The root configuration: registries populated at load time, read-only
//! at runtime.

mod settings;
pub mod statement_builder;
mod strict_map;
pub mod xml_config;
pub mod xml_mapper;

pub use settings::{AutoMappingBehavior, LocalCacheScope, Settings};
pub use strict_map::StrictMap;
pub use xml_config::{ObjectFactory, XmlConfigBuilder};

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::alias::AliasRegistry;
use crate::binding::MapperRegistry;
use crate::cache::Cache;
use crate::error::{Result, SqlMapperError};
use crate::mapping::{Environment, MappedStatement, ParameterMap, ResultMap};
use crate::parsing::{Variables, XmlNode};
use crate::plugin::Interceptor;
use crate::reflection::{RecordSchema, ReflectorRegistry};
use crate::type_handler::{TypeHandler, TypeHandlerRegistry};
use crate::types::TypeKind;

/// Outcome of retrying a deferred configuration element.
pub(crate) enum Deferred {
    Done,
    /// Still blocked; carries the first missing reference for diagnostics.
    Missing(String),
}

/// A configuration element whose dependency was not yet registered,
/// carried with enough state to retry.
#[derive(Debug, Clone)]
pub(crate) enum Incomplete {
    CacheRef {
        namespace: String,
    },
    ResultMap {
        namespace: String,
        resource: String,
        node: XmlNode,
    },
    Statement {
        namespace: String,
        resource: String,
        node: XmlNode,
    },
    Method {
        interface: String,
        method: String,
    },
}

/// The immutable-at-runtime registry of everything the runtime consults:
/// mapped statements, result and parameter maps, caches, type handlers,
/// aliases, record schemas and mapper bindings.
///
/// Mutated only while a loader holds it exclusively; once wrapped in an
/// `Arc` by the session factory, concurrent readers need no locking.
pub struct Configuration {
    pub settings: Settings,
    variables: Variables,
    aliases: AliasRegistry,
    type_handlers: TypeHandlerRegistry,
    named_type_handlers: HashMap<String, Arc<dyn TypeHandler>>,
    reflectors: ReflectorRegistry,
    environment: Option<Environment>,
    database_id: Option<String>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    mapped_statements: StrictMap<Arc<MappedStatement>>,
    result_maps: StrictMap<Arc<ResultMap>>,
    parameter_maps: StrictMap<Arc<ParameterMap>>,
    caches: StrictMap<Arc<dyn Cache>>,
    cache_refs: HashMap<String, String>,
    sql_fragments: HashMap<String, XmlNode>,
    mapper_registry: MapperRegistry,
    loaded_resources: HashSet<String>,
    object_factory: Option<Arc<dyn ObjectFactory>>,
    incomplete: Mutex<Vec<Incomplete>>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}


impl Configuration {
    #[must_use]
    pub fn new() -> Self {
        Configuration {
            settings: Settings::default(),
            variables: Variables::new(),
            aliases: AliasRegistry::new(),
            type_handlers: TypeHandlerRegistry::new(),
            named_type_handlers: HashMap::new(),
            reflectors: ReflectorRegistry::new(),
            environment: None,
            database_id: None,
            interceptors: Vec::new(),
            mapped_statements: StrictMap::new("mapped statements collection"),
            result_maps: StrictMap::new("result maps collection"),
            parameter_maps: StrictMap::new("parameter maps collection"),
            caches: StrictMap::new("caches collection"),
            cache_refs: HashMap::new(),
            sql_fragments: HashMap::new(),
            mapper_registry: MapperRegistry::default(),
            loaded_resources: HashSet::new(),
            object_factory: None,
            incomplete: Mutex::new(Vec::new()),
        }
    }

    // ---- registries ------------------------------------------------------

    #[must_use]
    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    pub fn variables_mut(&mut self) -> &mut Variables {
        &mut self.variables
    }

    #[must_use]
    pub fn aliases(&self) -> &AliasRegistry {
        &self.aliases
    }

    pub fn aliases_mut(&mut self) -> &mut AliasRegistry {
        &mut self.aliases
    }

    /// Resolve an alias to its value kind; unknown names fall back to a
    /// record kind of the same name.
    #[must_use]
    pub fn resolve_kind(&self, alias: &str) -> TypeKind {
        self.aliases.resolve_kind(alias)
    }

    #[must_use]
    pub fn type_handlers(&self) -> &TypeHandlerRegistry {
        &self.type_handlers
    }

    pub fn register_named_type_handler(
        &mut self,
        name: impl Into<String>,
        handler: Arc<dyn TypeHandler>,
    ) {
        self.named_type_handlers.insert(name.into(), handler);
    }

    #[must_use]
    pub fn named_type_handler(&self, name: &str) -> Option<Arc<dyn TypeHandler>> {
        self.named_type_handlers.get(name).cloned()
    }

    #[must_use]
    pub fn reflectors(&self) -> &ReflectorRegistry {
        &self.reflectors
    }

    pub fn set_object_factory(&mut self, factory: Arc<dyn ObjectFactory>) {
        self.object_factory = Some(factory);
    }

    /// Build a fresh instance of a result shape, through the configured
    /// object factory when one is set.
    pub fn create_object(&self, type_name: &str) -> Result<serde_json::Value> {
        let reflector = self.reflectors.reflector_for(type_name)?;
        Ok(match &self.object_factory {
            Some(factory) => factory.create(type_name, &reflector),
            None => reflector.new_instance(),
        })
    }

    /// Register a record schema and alias its name.
    pub fn register_record(&mut self, schema: RecordSchema) -> Result<()> {
        self.aliases.register_record(&schema.name)?;
        self.reflectors.register(schema)
    }

    /// Declare an enumeration usable as `javaType`.
    pub fn register_enum(&mut self, name: &str, variants: Vec<String>) -> Result<()> {
        self.aliases
            .register(name, crate::types::TypeRef::Kind(TypeKind::Enum(name.to_string())))?;
        self.type_handlers.register_enum(name, variants);
        Ok(())
    }

    // ---- environment -----------------------------------------------------

    #[must_use]
    pub fn environment(&self) -> Option<&Environment> {
        self.environment.as_ref()
    }

    pub fn set_environment(&mut self, environment: Environment) {
        self.environment = Some(environment);
    }

    #[must_use]
    pub fn database_id(&self) -> Option<&str> {
        self.database_id.as_deref()
    }

    pub fn set_database_id(&mut self, database_id: Option<String>) {
        self.database_id = database_id;
    }

    // ---- plugins ---------------------------------------------------------

    pub fn add_interceptor(&mut self, interceptor: Arc<dyn Interceptor>) {
        self.interceptors.push(interceptor);
    }

    #[must_use]
    pub fn interceptors(&self) -> &[Arc<dyn Interceptor>] {
        &self.interceptors
    }

    // ---- statements ------------------------------------------------------

    pub fn add_mapped_statement(&mut self, statement: Arc<MappedStatement>) -> Result<()> {
        self.mapped_statements.insert(&statement.id.clone(), statement)
    }

    /// Replace an id (databaseId-specific statements shadow generic ones).
    pub fn replace_mapped_statement(&mut self, statement: Arc<MappedStatement>) {
        self.mapped_statements.replace(&statement.id.clone(), statement);
    }

    pub fn mapped_statement(&self, id: &str) -> Result<Arc<MappedStatement>> {
        self.mapped_statements.get(id)
    }

    #[must_use]
    pub fn has_statement(&self, id: &str) -> bool {
        self.mapped_statements.contains(id)
    }

    pub fn statement_ids(&self) -> impl Iterator<Item = &str> {
        self.mapped_statements.ids()
    }

    // ---- result & parameter maps ----------------------------------------

    pub fn add_result_map(&mut self, map: Arc<ResultMap>) -> Result<()> {
        self.result_maps.insert(&map.id.clone(), map)
    }

    pub fn result_map(&self, id: &str) -> Result<Arc<ResultMap>> {
        self.result_maps.get(id)
    }

    #[must_use]
    pub fn has_result_map(&self, id: &str) -> bool {
        self.result_maps.contains(id)
    }

    pub fn add_parameter_map(&mut self, map: Arc<ParameterMap>) -> Result<()> {
        self.parameter_maps.insert(&map.id.clone(), map)
    }

    pub fn parameter_map(&self, id: &str) -> Result<Arc<ParameterMap>> {
        self.parameter_maps.get(id)
    }

    // ---- caches ----------------------------------------------------------

    pub fn add_cache(&mut self, cache: Arc<dyn Cache>) -> Result<()> {
        self.caches.insert(&cache.id().to_string(), cache)
    }

    pub fn cache(&self, id: &str) -> Result<Arc<dyn Cache>> {
        self.caches.get(id)
    }

    #[must_use]
    pub fn has_cache(&self, id: &str) -> bool {
        self.caches.contains(id)
    }

    /// Record `<cache-ref>`: `namespace` uses `referenced`'s cache.
    pub fn add_cache_ref(&mut self, namespace: &str, referenced: &str) {
        self.cache_refs
            .insert(namespace.to_string(), referenced.to_string());
    }

    #[must_use]
    pub fn cache_ref(&self, namespace: &str) -> Option<&str> {
        self.cache_refs.get(namespace).map(String::as_str)
    }

    // ---- sql fragments ---------------------------------------------------

    pub fn add_sql_fragment(&mut self, id: &str, node: XmlNode) -> Result<()> {
        if self.sql_fragments.contains_key(id) {
            return Err(SqlMapperError::Config(format!(
                "sql fragments collection already contains value for {id}"
            )));
        }
        self.sql_fragments.insert(id.to_string(), node);
        Ok(())
    }

    #[must_use]
    pub fn sql_fragment(&self, id: &str) -> Option<&XmlNode> {
        self.sql_fragments.get(id)
    }

    // ---- mappers ---------------------------------------------------------

    #[must_use]
    pub fn mapper_registry(&self) -> &MapperRegistry {
        &self.mapper_registry
    }

    pub fn mapper_registry_mut(&mut self) -> &mut MapperRegistry {
        &mut self.mapper_registry
    }

    #[must_use]
    pub fn is_resource_loaded(&self, resource: &str) -> bool {
        self.loaded_resources.contains(resource)
    }

    pub fn mark_resource_loaded(&mut self, resource: &str) {
        self.loaded_resources.insert(resource.to_string());
    }

    // ---- incomplete references ------------------------------------------

    pub(crate) fn defer(&self, item: Incomplete) {
        self.incomplete
            .lock()
            .expect("incomplete queue poisoned")
            .push(item);
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.incomplete
            .lock()
            .expect("incomplete queue poisoned")
            .len()
    }

    /// Drain the incomplete queues repeatedly until empty or fixed point.
    /// At fixed point, `strict` turns the leftovers into a configuration
    /// error naming the first missing reference.
    pub fn resolve_pending(&mut self, strict: bool) -> Result<()> {
        loop {
            let queue = std::mem::take(
                &mut *self.incomplete.lock().expect("incomplete queue poisoned"),
            );
            if queue.is_empty() {
                return Ok(());
            }
            let before = queue.len();
            let mut missing_first: Option<String> = None;

            for item in queue {
                match self.retry(item.clone())? {
                    Deferred::Done => {}
                    Deferred::Missing(what) => {
                        missing_first.get_or_insert(what);
                        self.defer(item);
                    }
                }
            }

            let after = self.pending_count();
            if after == 0 {
                return Ok(());
            }
            if after >= before {
                // No progress; the queue stopped shrinking.
                return if strict {
                    Err(SqlMapperError::Config(format!(
                        "could not resolve {after} deferred configuration element(s); first missing reference: {}",
                        missing_first.unwrap_or_else(|| "<unknown>".into())
                    )))
                } else {
                    Ok(())
                };
            }
        }
    }

    fn retry(&mut self, item: Incomplete) -> Result<Deferred> {
        match item {
            Incomplete::CacheRef { namespace } => self.retry_cache_ref(&namespace),
            Incomplete::ResultMap {
                namespace,
                resource,
                node,
            } => xml_mapper::retry_result_map(self, &namespace, &resource, &node),
            Incomplete::Statement {
                namespace,
                resource,
                node,
            } => xml_mapper::retry_statement(self, &namespace, &resource, &node),
            Incomplete::Method { interface, method } => {
                let id = format!("{interface}.{method}");
                if self.has_statement(&id) {
                    Ok(Deferred::Done)
                } else {
                    Ok(Deferred::Missing(format!("mapped statement '{id}'")))
                }
            }
        }
    }

    fn retry_cache_ref(&mut self, namespace: &str) -> Result<Deferred> {
        let Some(referenced) = self.cache_ref(namespace).map(ToString::to_string) else {
            return Ok(Deferred::Done);
        };
        if self.has_cache(&referenced) {
            Ok(Deferred::Done)
        } else {
            Ok(Deferred::Missing(format!(
                "cache '{referenced}' referenced from namespace '{namespace}'"
            )))
        }
    }

    /// The cache effective for `namespace`, following `<cache-ref>`.
    pub fn effective_cache(&self, namespace: &str) -> Option<Arc<dyn Cache>> {
        let target = self.cache_ref(namespace).unwrap_or(namespace);
        self.caches.get(target).ok()
    }
}

impl std::fmt::Debug for Configuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Configuration")
            .field("database_id", &self.database_id)
            .field("environment", &self.environment)
            .finish()
    }
}
