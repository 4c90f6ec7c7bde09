use crate::types::{SqlType, TypeKind};

/// Direction of one bound placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParamMode {
    #[default]
    In,
    Out,
    InOut,
}

impl ParamMode {
    #[must_use]
    pub fn parse(name: &str) -> Option<ParamMode> {
        match name.trim().to_ascii_uppercase().as_str() {
            "IN" => Some(ParamMode::In),
            "OUT" => Some(ParamMode::Out),
            "INOUT" => Some(ParamMode::InOut),
            _ => None,
        }
    }
}

/// One `#{…}` placeholder's metadata: the property path it binds plus the
/// declared conversion hints.
#[derive(Debug, Clone, Default)]
pub struct ParameterMapping {
    pub property: String,
    pub mode: ParamMode,
    pub kind: Option<TypeKind>,
    pub sql_type: Option<SqlType>,
    pub numeric_scale: Option<u32>,
    /// Named handler override registered with the configuration.
    pub type_handler: Option<String>,
}

impl ParameterMapping {
    #[must_use]
    pub fn of(property: impl Into<String>) -> Self {
        ParameterMapping {
            property: property.into(),
            ..ParameterMapping::default()
        }
    }
}

/// An external `<parameterMap>`: ordered placeholder metadata applied to
/// plain-style statements.
#[derive(Debug, Clone, Default)]
pub struct ParameterMap {
    pub id: String,
    pub kind: Option<TypeKind>,
    pub mappings: Vec<ParameterMapping>,
}
