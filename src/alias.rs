//! Case-insensitive short names for types used in configuration.

use std::collections::HashMap;

use crate::error::{Result, SqlMapperError};
use crate::types::{TypeKind, TypeRef};

/// Registry of case-folded aliases. Duplicate registration with a
/// different target is a configuration error; re-registering the same
/// target is tolerated so repeated bootstrap passes stay idempotent.
#[derive(Debug, Clone)]
pub struct AliasRegistry {
    aliases: HashMap<String, TypeRef>,
}

impl Default for AliasRegistry {
    fn default() -> Self {
        let mut registry = AliasRegistry {
            aliases: HashMap::new(),
        };
        registry.bootstrap();
        registry
    }
}

impl AliasRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn bootstrap(&mut self) {
        use TypeKind::*;
        let scalars: &[(&str, TypeKind)] = &[
            ("string", String),
            ("byte", Int),
            ("char", String),
            ("character", String),
            ("short", Int),
            ("int", Int),
            ("integer", Int),
            ("long", Long),
            ("float", Float),
            ("double", Double),
            ("boolean", Boolean),
            ("_byte", Int),
            ("_short", Int),
            ("_int", Int),
            ("_integer", Int),
            ("_long", Long),
            ("_float", Float),
            ("_double", Double),
            ("_boolean", Boolean),
            ("date", Date),
            ("decimal", Decimal),
            ("bigdecimal", Decimal),
            ("biginteger", BigInteger),
            ("object", Object),
            ("map", Map),
            ("hashmap", Map),
            ("list", List),
            ("arraylist", List),
            ("collection", List),
            ("iterator", List),
        ];
        for (name, kind) in scalars {
            self.force(name, TypeRef::Kind(kind.clone()));
            self.force(&format!("{name}[]"), TypeRef::Array(kind.clone()));
        }
        self.force("byte[]", TypeRef::Kind(Blob));
        self.force("_byte[]", TypeRef::Kind(Blob));
        self.force("resultset", TypeRef::Kind(ResultSet));
        self.force("cursor", TypeRef::Kind(Cursor));
        // Database vendor shorthand used by environment configuration.
        self.force("sqlite", TypeRef::Impl("SQLITE".into()));
        // Cache implementations selectable from <cache type=…/eviction=…>.
        for id in ["perpetual", "lru", "fifo", "soft", "weak"] {
            self.force(id, TypeRef::Impl(id.to_ascii_uppercase()));
        }
    }

    fn force(&mut self, alias: &str, target: TypeRef) {
        self.aliases.insert(alias.to_ascii_lowercase(), target);
    }

    /// Register `alias` for `target`.
    ///
    /// # Errors
    ///
    /// Fails if the alias already points at a different target.
    pub fn register(&mut self, alias: &str, target: TypeRef) -> Result<()> {
        let key = alias.trim().to_ascii_lowercase();
        if key.is_empty() {
            return Err(SqlMapperError::Config("alias name must not be empty".into()));
        }
        if let Some(existing) = self.aliases.get(&key) {
            if *existing != target {
                return Err(SqlMapperError::Config(format!(
                    "alias '{alias}' is already mapped to {existing:?}"
                )));
            }
            return Ok(());
        }
        self.aliases.insert(key, target);
        Ok(())
    }

    /// Register a record schema name under its own alias.
    pub fn register_record(&mut self, name: &str) -> Result<()> {
        self.register(name, TypeRef::Kind(TypeKind::Record(name.to_string())))
    }

    /// Resolve an alias, case-insensitively.
    #[must_use]
    pub fn resolve(&self, alias: &str) -> Option<&TypeRef> {
        self.aliases.get(&alias.trim().to_ascii_lowercase())
    }

    /// Resolve to a value kind. Unknown names resolve to a record kind of
    /// the same name so mapper files can target record shapes that are
    /// never explicitly aliased.
    #[must_use]
    pub fn resolve_kind(&self, alias: &str) -> TypeKind {
        match self.resolve(alias) {
            Some(TypeRef::Kind(kind)) => kind.clone(),
            Some(TypeRef::Array(_)) => TypeKind::List,
            Some(TypeRef::Impl(_)) | None => TypeKind::Record(alias.trim().to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_is_case_insensitive() {
        let registry = AliasRegistry::new();
        let a = registry.resolve("STRING").cloned();
        let b = registry.resolve("String").cloned();
        let c = registry.resolve("string").cloned();
        assert_eq!(a, Some(TypeRef::Kind(TypeKind::String)));
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn duplicate_with_other_target_fails() {
        let mut registry = AliasRegistry::new();
        registry.register("thing", TypeRef::Kind(TypeKind::Long)).unwrap();
        registry.register("THING", TypeRef::Kind(TypeKind::Long)).unwrap();
        assert!(registry.register("thing", TypeRef::Kind(TypeKind::String)).is_err());
    }

    #[test]
    fn unknown_alias_becomes_record_kind() {
        let registry = AliasRegistry::new();
        assert_eq!(registry.resolve_kind("User"), TypeKind::Record("User".into()));
        assert_eq!(registry.resolve_kind("int"), TypeKind::Int);
    }
}
