use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::{Result, SqlMapperError};
use crate::types::{SqlType, TypeKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultFlag {
    Id,
    Constructor,
}

/// One column-to-property binding inside a result map.
#[derive(Debug, Clone, Default)]
pub struct ResultMapping {
    pub property: String,
    pub column: Option<String>,
    pub kind: Option<TypeKind>,
    pub sql_type: Option<SqlType>,
    /// Nested `<association>`/`<collection>` rendered from joined rows.
    pub nested_result_map: Option<String>,
    /// Nested statement executed per outer row.
    pub nested_select: Option<String>,
    pub type_handler: Option<String>,
    pub flags: Vec<ResultFlag>,
    /// `column="{prop=col,…}"` composite parameters for nested selects.
    pub composites: Vec<(String, String)>,
    pub column_prefix: Option<String>,
    /// Collection mappings gather rows into a list property.
    pub many: bool,
}

impl ResultMapping {
    #[must_use]
    pub fn is_id(&self) -> bool {
        self.flags.contains(&ResultFlag::Id)
    }

    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.flags.contains(&ResultFlag::Constructor)
    }
}

/// Chooses among alternative result maps based on one column's value.
#[derive(Debug, Clone, Default)]
pub struct Discriminator {
    pub column: String,
    pub kind: Option<TypeKind>,
    pub sql_type: Option<SqlType>,
    /// Column value → result map id.
    pub cases: HashMap<String, String>,
}

impl Discriminator {
    #[must_use]
    pub fn case_for(&self, value: &str) -> Option<&str> {
        self.cases.get(value).map(String::as_str)
    }
}

/// Binds result-set columns to properties of a target shape. The concrete
/// shape for a row is a deterministic function of the row and the
/// discriminator table.
#[derive(Debug, Clone)]
pub struct ResultMap {
    pub id: String,
    pub type_name: String,
    pub kind: TypeKind,
    pub id_mappings: Vec<ResultMapping>,
    pub constructor_mappings: Vec<ResultMapping>,
    pub property_mappings: Vec<ResultMapping>,
    /// Uppercased column names claimed by explicit mappings; automapping
    /// skips these.
    pub mapped_columns: HashSet<String>,
    pub discriminator: Option<Discriminator>,
    pub has_nested_result_maps: bool,
    pub has_nested_queries: bool,
    /// Per-map automapping override.
    pub auto_mapping: Option<bool>,
}

impl ResultMap {
    #[must_use]
    pub fn builder(id: impl Into<String>, type_name: impl Into<String>, kind: TypeKind) -> ResultMapBuilder {
        ResultMapBuilder {
            id: id.into(),
            type_name: type_name.into(),
            kind,
            mappings: Vec::new(),
            inherited_constructor: Vec::new(),
            discriminator: None,
            auto_mapping: None,
        }
    }

    /// An inline map with no explicit mappings (`resultType=` statements).
    #[must_use]
    pub fn inline(id: impl Into<String>, type_name: impl Into<String>, kind: TypeKind) -> Arc<ResultMap> {
        Arc::new(
            ResultMap::builder(id, type_name, kind)
                .build()
                .expect("inline result map cannot fail"),
        )
    }
}

pub struct ResultMapBuilder {
    id: String,
    type_name: String,
    kind: TypeKind,
    mappings: Vec<ResultMapping>,
    inherited_constructor: Vec<ResultMapping>,
    discriminator: Option<Discriminator>,
    auto_mapping: Option<bool>,
}

impl ResultMapBuilder {
    /// Constructor mappings inherited from an extended parent; applied
    /// only when this map declares none of its own.
    #[must_use]
    pub fn inherit_constructor(mut self, mappings: Vec<ResultMapping>) -> Self {
        self.inherited_constructor = mappings;
        self
    }

    #[must_use]
    pub fn mapping(mut self, mapping: ResultMapping) -> Self {
        self.mappings.push(mapping);
        self
    }

    #[must_use]
    pub fn mappings(mut self, mappings: Vec<ResultMapping>) -> Self {
        self.mappings.extend(mappings);
        self
    }

    #[must_use]
    pub fn discriminator(mut self, discriminator: Option<Discriminator>) -> Self {
        self.discriminator = discriminator;
        self
    }

    #[must_use]
    pub fn auto_mapping(mut self, auto_mapping: Option<bool>) -> Self {
        self.auto_mapping = auto_mapping;
        self
    }

    pub fn build(self) -> Result<ResultMap> {
        let mut id_mappings = Vec::new();
        let mut constructor_mappings = Vec::new();
        let mut property_mappings = Vec::new();
        let mut mapped_columns = HashSet::new();
        let mut has_nested_result_maps = false;
        let mut has_nested_queries = false;

        let declares_constructor = self.mappings.iter().any(ResultMapping::is_constructor);
        let mut mappings = self.mappings;
        if !declares_constructor {
            mappings.extend(self.inherited_constructor);
        }

        for mapping in mappings {
            if mapping.nested_result_map.is_some() {
                has_nested_result_maps = true;
            }
            if mapping.nested_select.is_some() {
                has_nested_queries = true;
            }
            if mapping.nested_select.is_some() && mapping.nested_result_map.is_some() {
                return Err(SqlMapperError::Config(format!(
                    "result map '{}' property '{}' cannot declare both a nested select and a nested result map",
                    self.id, mapping.property
                )));
            }
            if let Some(column) = &mapping.column {
                mapped_columns.insert(column.to_uppercase());
            }
            for (_, column) in &mapping.composites {
                mapped_columns.insert(column.to_uppercase());
            }
            if mapping.is_constructor() {
                constructor_mappings.push(mapping);
            } else if mapping.is_id() {
                id_mappings.push(mapping);
            } else {
                property_mappings.push(mapping);
            }
        }

        if let Some(discriminator) = &self.discriminator {
            mapped_columns.insert(discriminator.column.to_uppercase());
        }

        Ok(ResultMap {
            id: self.id,
            type_name: self.type_name,
            kind: self.kind,
            id_mappings,
            constructor_mappings,
            property_mappings,
            mapped_columns,
            discriminator: self.discriminator,
            has_nested_result_maps,
            has_nested_queries,
            auto_mapping: self.auto_mapping,
        })
    }
}
