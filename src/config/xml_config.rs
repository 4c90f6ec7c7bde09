//! The root `<configuration>` loader.
//!
//! Elements are processed in the fixed order `properties`, `settings`,
//! `typeAliases`, `plugins`, `objectFactory`, `environments`,
//! `databaseIdProvider`, `typeHandlers`, `mappers`; whatever the loader
//! cannot resolve inline is queued and drained to fixed point at the end.

use std::collections::HashMap;
use std::sync::Arc;

use crate::datasource::build_data_source;
use crate::error::{Result, SqlMapperError};
use crate::error_context::ErrorContext;
use crate::io::Resources;
use crate::mapping::{DatabaseIdProvider, Environment};
use crate::parsing::{parse_document, parse_placeholders, Variables, XmlNode};
use crate::plugin::InterceptorFactory;
use crate::reflection::Reflector;
use crate::transaction::TransactionManagerKind;
use crate::types::TypeRef;

use super::{xml_mapper, Configuration, Incomplete};

/// Creates result-shape instances; the default builds from the
/// reflector's template. Custom implementations are registered by name
/// and selected with `<objectFactory type="…">`.
pub trait ObjectFactory: Send + Sync {
    fn create(&self, type_name: &str, reflector: &Reflector) -> serde_json::Value;
}

pub struct XmlConfigBuilder {
    config: Configuration,
    environment_override: Option<String>,
    interceptor_factories: HashMap<String, InterceptorFactory>,
    object_factories: HashMap<String, Arc<dyn ObjectFactory>>,
    runtime_variables: Variables,
}

impl Default for XmlConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl XmlConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: Configuration::new(),
            environment_override: None,
            interceptor_factories: HashMap::new(),
            object_factories: HashMap::new(),
            runtime_variables: Variables::new(),
        }
    }

    /// Select an environment other than the declared default.
    #[must_use]
    pub fn environment(mut self, id: impl Into<String>) -> Self {
        self.environment_override = Some(id.into());
        self
    }

    /// Runtime properties, overriding anything `<properties>` loads.
    #[must_use]
    pub fn variables(mut self, variables: Variables) -> Self {
        self.runtime_variables = variables;
        self
    }

    /// Make an interceptor available to `<plugin interceptor="name">`.
    #[must_use]
    pub fn interceptor_factory(mut self, name: impl Into<String>, factory: InterceptorFactory) -> Self {
        self.interceptor_factories.insert(name.into(), factory);
        self
    }

    /// Make an object factory available to `<objectFactory type="name">`.
    #[must_use]
    pub fn object_factory(mut self, name: impl Into<String>, factory: Arc<dyn ObjectFactory>) -> Self {
        self.object_factories.insert(name.into(), factory);
        self
    }

    /// Pre-registration hook for record schemas, enums, named type
    /// handlers and mapper descriptors the XML refers to.
    pub fn configuration_mut(&mut self) -> &mut Configuration {
        &mut self.config
    }

    /// Parse the root document and assemble the full configuration.
    pub fn parse(mut self, xml: &str) -> Result<Configuration> {
        ErrorContext::reset();
        ErrorContext::activity("parsing the root configuration");

        let doc = parse_document(xml)?;
        if doc.name != "configuration" {
            return Err(SqlMapperError::Config(format!(
                "root configuration element must be <configuration>, found <{}>",
                doc.name
            )));
        }

        self.properties_element(&doc)?;
        self.settings_element(&doc)?;
        self.type_aliases_element(&doc)?;
        self.plugins_element(&doc)?;
        self.object_factory_element(&doc)?;
        self.environments_element(&doc)?;
        self.database_id_provider_element(&doc)?;
        self.type_handlers_element(&doc)?;
        self.mappers_element(&doc)?;

        self.config.resolve_pending(true)?;
        ErrorContext::reset();
        Ok(self.config)
    }

    fn properties_element(&mut self, doc: &XmlNode) -> Result<()> {
        if let Some(node) = doc.first_element("properties") {
            let mut variables = Variables::new();
            for property in node.elements_named("property") {
                variables.insert(
                    property.required_attr("name")?.to_string(),
                    property.required_attr("value")?.to_string(),
                );
            }
            if let Some(resource) = node.attr("resource").or_else(|| node.attr("url")) {
                let body = Resources::load_string(resource)?;
                for (name, value) in parse_properties_file(&body) {
                    variables.insert(name, value);
                }
            }
            self.config.variables_mut().extend(variables);
        }
        // Runtime-supplied values win over anything loaded.
        let runtime = std::mem::take(&mut self.runtime_variables);
        self.config.variables_mut().extend(runtime);
        Ok(())
    }

    fn settings_element(&mut self, doc: &XmlNode) -> Result<()> {
        let Some(node) = doc.first_element("settings") else {
            return Ok(());
        };
        for setting in node.elements_named("setting") {
            let name = setting.required_attr("name")?;
            let value = self.substitute(setting.required_attr("value")?);
            self.config.settings.apply(name, &value)?;
        }
        Ok(())
    }

    fn type_aliases_element(&mut self, doc: &XmlNode) -> Result<()> {
        let Some(node) = doc.first_element("typeAliases") else {
            return Ok(());
        };
        for child in node.elements() {
            match child.name.as_str() {
                "typeAlias" => {
                    let alias = child.required_attr("alias")?;
                    let target = child.required_attr("type")?;
                    let resolved = self
                        .config
                        .aliases()
                        .resolve(target)
                        .cloned()
                        .unwrap_or_else(|| {
                            TypeRef::Kind(crate::types::TypeKind::Record(target.to_string()))
                        });
                    self.config.aliases_mut().register(alias, resolved)?;
                }
                "package" => {
                    // Alias every record registered under the package by
                    // its short name.
                    let prefix = format!("{}.", child.required_attr("name")?);
                    let names: Vec<String> = self
                        .config
                        .reflectors()
                        .schema_names()
                        .into_iter()
                        .filter(|name| name.starts_with(&prefix))
                        .collect();
                    for full in names {
                        let short = full[prefix.len()..].to_string();
                        self.config.aliases_mut().register(
                            &short,
                            TypeRef::Kind(crate::types::TypeKind::Record(full)),
                        )?;
                    }
                }
                other => {
                    return Err(SqlMapperError::Config(format!(
                        "unknown element <{other}> inside <typeAliases>"
                    )))
                }
            }
        }
        Ok(())
    }

    fn plugins_element(&mut self, doc: &XmlNode) -> Result<()> {
        let Some(node) = doc.first_element("plugins") else {
            return Ok(());
        };
        for plugin in node.elements_named("plugin") {
            let name = plugin.required_attr("interceptor")?;
            let factory = self.interceptor_factories.get(name).ok_or_else(|| {
                SqlMapperError::Config(format!(
                    "no interceptor registered under the name '{name}'"
                ))
            })?;
            let mut properties = HashMap::new();
            for property in plugin.elements_named("property") {
                properties.insert(
                    property.required_attr("name")?.to_string(),
                    self.substitute(property.required_attr("value")?),
                );
            }
            let interceptor = factory(&properties)?;
            self.config.add_interceptor(interceptor);
        }
        Ok(())
    }

    fn object_factory_element(&mut self, doc: &XmlNode) -> Result<()> {
        for element in ["objectFactory", "objectWrapperFactory", "reflectorFactory"] {
            if let Some(node) = doc.first_element(element) {
                let name = node.required_attr("type")?;
                if element == "objectFactory" {
                    let factory = self.object_factories.get(name).ok_or_else(|| {
                        SqlMapperError::Config(format!(
                            "no object factory registered under the name '{name}'"
                        ))
                    })?;
                    self.config.set_object_factory(factory.clone());
                } else if !self.object_factories.contains_key(name) && name != "DEFAULT" {
                    tracing::warn!(element, name, "custom factory is not registered; using default");
                }
            }
        }
        Ok(())
    }

    fn environments_element(&mut self, doc: &XmlNode) -> Result<()> {
        let Some(node) = doc.first_element("environments") else {
            return Ok(());
        };
        let wanted = match &self.environment_override {
            Some(id) => id.clone(),
            None => node.required_attr("default")?.to_string(),
        };

        for environment in node.elements_named("environment") {
            let id = environment.required_attr("id")?;
            if id != wanted {
                continue;
            }
            let tm_node = environment.first_element("transactionManager").ok_or_else(|| {
                SqlMapperError::Config(format!(
                    "environment '{id}' is missing <transactionManager>"
                ))
            })?;
            let tm_type = tm_node.required_attr("type")?;
            let transaction_manager = TransactionManagerKind::parse(tm_type).ok_or_else(|| {
                SqlMapperError::Config(format!("unknown transaction manager type '{tm_type}'"))
            })?;

            let ds_node = environment.first_element("dataSource").ok_or_else(|| {
                SqlMapperError::Config(format!("environment '{id}' is missing <dataSource>"))
            })?;
            let ds_type = ds_node.required_attr("type")?;
            let mut properties = HashMap::new();
            for property in ds_node.elements_named("property") {
                properties.insert(
                    property.required_attr("name")?.to_string(),
                    self.substitute(property.required_attr("value")?),
                );
            }
            let data_source = build_data_source(ds_type, &properties)?;
            self.config
                .set_environment(Environment::new(id, transaction_manager, data_source));
            return Ok(());
        }
        Err(SqlMapperError::Config(format!(
            "no environment matches the requested id '{wanted}'"
        )))
    }

    fn database_id_provider_element(&mut self, doc: &XmlNode) -> Result<()> {
        let Some(node) = doc.first_element("databaseIdProvider") else {
            return Ok(());
        };
        let kind = node.required_attr("type")?;
        if !kind.eq_ignore_ascii_case("DB_VENDOR") {
            return Err(SqlMapperError::Config(format!(
                "unknown databaseIdProvider type '{kind}'"
            )));
        }
        let mut aliases = HashMap::new();
        for property in node.elements_named("property") {
            aliases.insert(
                property.required_attr("name")?.to_string(),
                property.required_attr("value")?.to_string(),
            );
        }
        let provider = DatabaseIdProvider::new(aliases);
        let data_source = self.config.environment().map(|e| e.data_source.clone());
        if let Some(data_source) = data_source {
            let database_id = provider.database_id(data_source.as_ref())?;
            self.config.set_database_id(database_id);
        }
        Ok(())
    }

    fn type_handlers_element(&mut self, doc: &XmlNode) -> Result<()> {
        let Some(node) = doc.first_element("typeHandlers") else {
            return Ok(());
        };
        for child in node.elements_named("typeHandler") {
            let name = child.required_attr("handler")?;
            let handler = self.config.named_type_handler(name).ok_or_else(|| {
                SqlMapperError::Config(format!(
                    "no type handler registered under the name '{name}'"
                ))
            })?;
            let kind = child
                .attr("javaType")
                .map(|t| self.config.resolve_kind(t))
                .ok_or_else(|| {
                    SqlMapperError::Config(format!(
                        "type handler '{name}' declares no javaType to apply to"
                    ))
                })?;
            let sql_type = child
                .attr("jdbcType")
                .map(xml_mapper::parse_sql_type)
                .transpose()?;
            self.config
                .type_handlers()
                .register(kind, sql_type, handler);
        }
        Ok(())
    }

    fn mappers_element(&mut self, doc: &XmlNode) -> Result<()> {
        let Some(node) = doc.first_element("mappers") else {
            return Ok(());
        };
        for child in node.elements() {
            match child.name.as_str() {
                "mapper" => {
                    if let Some(resource) = child.attr("resource") {
                        let xml = Resources::load_string(resource)?;
                        xml_mapper::parse_mapper(&mut self.config, resource, &xml)?;
                    } else if let Some(url) = child.attr("url") {
                        let path = url.strip_prefix("file://").unwrap_or(url);
                        let xml = Resources::load_string(path)?;
                        xml_mapper::parse_mapper(&mut self.config, path, &xml)?;
                    } else if let Some(class) = child.attr("class") {
                        self.bind_mapper_class(class)?;
                    } else {
                        return Err(SqlMapperError::Config(
                            "<mapper> requires one of resource, url or class".into(),
                        ));
                    }
                }
                "package" => {
                    let package = child.required_attr("name")?;
                    for resource in Resources::list(package)? {
                        if resource.ends_with(".xml") {
                            let xml = Resources::load_string(&resource)?;
                            xml_mapper::parse_mapper(&mut self.config, &resource, &xml)?;
                        }
                    }
                    let descriptors = self.config.mapper_registry().in_package(package);
                    for descriptor in descriptors {
                        let interface = descriptor.interface.clone();
                        self.bind_mapper_methods(&interface)?;
                    }
                }
                other => {
                    return Err(SqlMapperError::Config(format!(
                        "unknown element <{other}> inside <mappers>"
                    )))
                }
            }
        }
        Ok(())
    }

    /// `<mapper class>` binds a pre-registered descriptor's methods to
    /// their statements; statements not yet known are deferred.
    fn bind_mapper_class(&mut self, interface: &str) -> Result<()> {
        if !self.config.mapper_registry().has(interface) {
            return Err(SqlMapperError::Config(format!(
                "mapper interface '{interface}' is not registered; register its descriptor before loading"
            )));
        }
        self.bind_mapper_methods(interface)
    }

    fn bind_mapper_methods(&mut self, interface: &str) -> Result<()> {
        let descriptor = self.config.mapper_registry().get(interface)?;
        let methods: Vec<String> = descriptor.method_names().map(ToString::to_string).collect();
        for method in methods {
            let id = format!("{interface}.{method}");
            if !self.config.has_statement(&id) {
                self.config.defer(Incomplete::Method {
                    interface: interface.to_string(),
                    method,
                });
            }
        }
        Ok(())
    }

    fn substitute(&self, value: &str) -> String {
        parse_placeholders(value, self.config.variables())
    }
}

/// `key=value` lines; `#`/`!` start comments.
fn parse_properties_file(body: &str) -> Vec<(String, String)> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
        .filter_map(|line| {
            line.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn properties_file_parsing() {
        let parsed = parse_properties_file("# comment\ndb.user = ann\n\ndb.url=x\n! note");
        assert_eq!(
            parsed,
            vec![
                ("db.user".to_string(), "ann".to_string()),
                ("db.url".to_string(), "x".to_string()),
            ]
        );
    }
}
