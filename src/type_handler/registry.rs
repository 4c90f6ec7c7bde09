use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use crate::error::{Result, SqlMapperError};
use crate::types::{SqlType, TypeKind};

use super::handlers::{
    BlobHandler, BooleanHandler, DateHandler, DateOnlyHandler, DecimalHandler, DoubleHandler,
    EnumNameHandler, IntHandler, JsonHandler, LongHandler, StringHandler, UnknownHandler,
};
use super::TypeHandler;

type HandlerSlot = HashMap<Option<SqlType>, Arc<dyn TypeHandler>>;

/// Resolves a [`TypeHandler`] for a `(kind, sql type)` pair.
///
/// Resolution: the kind's slot, exact sql-type entry preferred, then the
/// `None` entry, then the sole registered handler if there is exactly one.
/// Enum kinds that miss get the default name-based handler registered on
/// the fly. Outcomes (including misses) are memoised.
pub struct TypeHandlerRegistry {
    by_kind: RwLock<HashMap<TypeKind, HandlerSlot>>,
    enums: RwLock<HashMap<String, Arc<Vec<String>>>>,
    resolved: Mutex<HashMap<(TypeKind, Option<SqlType>), Option<Arc<dyn TypeHandler>>>>,
    unknown: Arc<dyn TypeHandler>,
}

impl std::fmt::Debug for TypeHandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeHandlerRegistry")
            .field(
                "kinds",
                &self.by_kind.read().expect("handler table poisoned").len(),
            )
            .finish()
    }
}

impl Default for TypeHandlerRegistry {
    fn default() -> Self {
        let registry = TypeHandlerRegistry {
            by_kind: RwLock::new(HashMap::new()),
            enums: RwLock::new(HashMap::new()),
            resolved: Mutex::new(HashMap::new()),
            unknown: Arc::new(UnknownHandler),
        };
        registry.bootstrap();
        registry
    }
}

impl TypeHandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn bootstrap(&self) {
        use SqlType::*;
        use TypeKind::*;

        self.register_with_meta(
            Arc::new(BooleanHandler),
            &[TypeKind::Boolean],
            &[Some(SqlType::Boolean), Some(Bit), None],
        );
        self.register_with_meta(
            Arc::new(IntHandler),
            &[Int],
            &[Some(Integer), Some(SmallInt), Some(TinyInt), None],
        );
        self.register_with_meta(Arc::new(LongHandler), &[Long], &[Some(BigInt), None]);
        self.register_with_meta(
            Arc::new(DoubleHandler),
            &[TypeKind::Float, TypeKind::Double],
            &[Some(SqlType::Float), Some(Real), Some(SqlType::Double), None],
        );
        self.register_with_meta(
            Arc::new(DecimalHandler),
            &[TypeKind::Decimal, BigInteger],
            &[Some(Numeric), Some(SqlType::Decimal), None],
        );
        self.register_with_meta(
            Arc::new(StringHandler),
            &[TypeKind::String],
            &[Some(Char), Some(Varchar), Some(LongVarchar), Some(Clob), None],
        );
        self.register_with_meta(
            Arc::new(DateHandler),
            &[TypeKind::Date],
            &[Some(SqlType::Timestamp), Some(Time), None],
        );
        self.register(TypeKind::Date, Some(SqlType::Date), Arc::new(DateOnlyHandler));
        self.register_with_meta(
            Arc::new(BlobHandler),
            &[TypeKind::Blob],
            &[
                Some(Binary),
                Some(VarBinary),
                Some(LongVarBinary),
                Some(SqlType::Blob),
                None,
            ],
        );
        self.register_with_meta(Arc::new(JsonHandler), &[Map, List], &[None]);
        self.register_with_meta(Arc::new(UnknownHandler), &[Object], &[None, Some(Other)]);
    }

    /// Register `handler` for one `(kind, sql type)` pair.
    pub fn register(
        &self,
        kind: TypeKind,
        sql_type: Option<SqlType>,
        handler: Arc<dyn TypeHandler>,
    ) {
        self.by_kind
            .write()
            .expect("handler table poisoned")
            .entry(kind)
            .or_default()
            .insert(sql_type, handler);
        self.resolved
            .lock()
            .expect("handler memo poisoned")
            .clear();
    }

    /// Declarative registration: populate the full cross product of the
    /// handler's declared kinds and sql types.
    pub fn register_with_meta(
        &self,
        handler: Arc<dyn TypeHandler>,
        kinds: &[TypeKind],
        sql_types: &[Option<SqlType>],
    ) {
        for kind in kinds {
            for sql_type in sql_types {
                self.register(kind.clone(), *sql_type, handler.clone());
            }
        }
    }

    /// Declare an enumeration's variants; `Enum(name)` kinds resolve
    /// against this table.
    pub fn register_enum(&self, name: impl Into<String>, variants: Vec<String>) {
        self.enums
            .write()
            .expect("enum table poisoned")
            .insert(name.into(), Arc::new(variants));
    }

    #[must_use]
    pub fn enum_variants(&self, name: &str) -> Option<Arc<Vec<String>>> {
        self.enums
            .read()
            .expect("enum table poisoned")
            .get(name)
            .cloned()
    }

    #[must_use]
    pub fn has_handler(&self, kind: &TypeKind) -> bool {
        self.by_kind
            .read()
            .expect("handler table poisoned")
            .contains_key(kind)
    }

    /// The fallback handler used when nothing is declared.
    #[must_use]
    pub fn unknown(&self) -> Arc<dyn TypeHandler> {
        self.unknown.clone()
    }

    /// Resolve a handler, memoising hits and misses alike.
    #[must_use]
    pub fn resolve(
        &self,
        kind: Option<&TypeKind>,
        sql_type: Option<SqlType>,
    ) -> Option<Arc<dyn TypeHandler>> {
        let kind = kind?;
        let memo_key = (kind.clone(), sql_type);
        if let Some(found) = self
            .resolved
            .lock()
            .expect("handler memo poisoned")
            .get(&memo_key)
        {
            return found.clone();
        }

        let mut outcome = self.lookup(kind, sql_type);
        if outcome.is_none() {
            if let TypeKind::Enum(name) = kind {
                // Register the default name-based handler and retry.
                let variants = self
                    .enum_variants(name)
                    .unwrap_or_else(|| Arc::new(Vec::new()));
                self.register(
                    kind.clone(),
                    None,
                    Arc::new(EnumNameHandler::new(name.clone(), variants)),
                );
                outcome = self.lookup(kind, sql_type);
            }
        }

        self.resolved
            .lock()
            .expect("handler memo poisoned")
            .insert(memo_key, outcome.clone());
        outcome
    }

    /// Resolve, or fail when no handler covers the pair.
    pub fn require(
        &self,
        kind: Option<&TypeKind>,
        sql_type: Option<SqlType>,
    ) -> Result<Arc<dyn TypeHandler>> {
        match kind {
            None => Ok(self.unknown.clone()),
            Some(k) => self.resolve(Some(k), sql_type).ok_or_else(|| {
                SqlMapperError::Type(format!(
                    "no type handler registered for kind {k:?} and sql type {sql_type:?}"
                ))
            }),
        }
    }

    fn lookup(&self, kind: &TypeKind, sql_type: Option<SqlType>) -> Option<Arc<dyn TypeHandler>> {
        let table = self.by_kind.read().expect("handler table poisoned");
        let slot = table.get(kind)?;
        if let Some(exact) = sql_type.and_then(|t| slot.get(&Some(t))) {
            return Some(exact.clone());
        }
        if let Some(default) = slot.get(&None) {
            return Some(default.clone());
        }
        // A single registration covers every sql type.
        let mut distinct = slot.values();
        let first = distinct.next()?.clone();
        if slot.len() == 1 {
            Some(first)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_is_stable() {
        let registry = TypeHandlerRegistry::new();
        let a = registry.resolve(Some(&TypeKind::Long), Some(SqlType::BigInt));
        let b = registry.resolve(Some(&TypeKind::Long), Some(SqlType::BigInt));
        let (a, b) = (a.unwrap(), b.unwrap());
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn exact_sql_type_preferred_over_default() {
        let registry = TypeHandlerRegistry::new();
        let exact = registry
            .resolve(Some(&TypeKind::Date), Some(SqlType::Date))
            .unwrap();
        let default = registry.resolve(Some(&TypeKind::Date), None).unwrap();
        assert!(!Arc::ptr_eq(&exact, &default));
    }

    #[test]
    fn enum_miss_auto_registers_name_handler() {
        let registry = TypeHandlerRegistry::new();
        registry.register_enum("Color", vec!["RED".into(), "GREEN".into()]);
        let kind = TypeKind::Enum("Color".into());
        assert!(!registry.has_handler(&kind));
        let handler = registry.resolve(Some(&kind), None);
        assert!(handler.is_some());
        assert!(registry.has_handler(&kind));
    }

    #[test]
    fn misses_are_memoised() {
        let registry = TypeHandlerRegistry::new();
        let kind = TypeKind::Record("NoSuch".into());
        assert!(registry.resolve(Some(&kind), None).is_none());
        // The memo answers the second time; behavior must match.
        assert!(registry.resolve(Some(&kind), None).is_none());
    }
}
