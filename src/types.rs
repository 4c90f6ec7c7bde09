use chrono::NaiveDateTime;
use serde_json::Value as JsonValue;

/// Values travelling to and from the database driver.
///
/// One enum shared by parameter binding and result extraction so the
/// executor and type handlers never branch on driver-specific types:
/// ```rust
/// use sql_mapper::types::DbValue;
///
/// let params = vec![
///     DbValue::Int(1),
///     DbValue::Text("alice".into()),
///     DbValue::Bool(true),
/// ];
/// # let _ = params;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum DbValue {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Timestamp value
    Timestamp(NaiveDateTime),
    /// NULL value
    Null,
    /// Binary data
    Blob(Vec<u8>),
}

impl DbValue {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        if let DbValue::Int(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let DbValue::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DbValue::Bool(value) => Some(*value),
            DbValue::Int(1) => Some(true),
            DbValue::Int(0) => Some(false),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            DbValue::Float(value) => Some(*value),
            DbValue::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            DbValue::Timestamp(value) => Some(*value),
            DbValue::Text(s) => {
                if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                    return Some(dt);
                }
                if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
                    return Some(dt);
                }
                None
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let DbValue::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }
}

/// Database-side type of a bound parameter or fetched column.
///
/// The subset of the SQL type vocabulary the declared handler table covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    Bit,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Float,
    Real,
    Double,
    Numeric,
    Decimal,
    Char,
    Varchar,
    LongVarchar,
    Date,
    Time,
    Timestamp,
    Binary,
    VarBinary,
    LongVarBinary,
    Blob,
    Clob,
    Boolean,
    Null,
    Other,
    Undefined,
}

impl SqlType {
    /// Parse the configuration spelling (`jdbcType="VARCHAR"`).
    #[must_use]
    pub fn parse(name: &str) -> Option<SqlType> {
        let upper = name.trim().to_ascii_uppercase();
        let t = match upper.as_str() {
            "BIT" => SqlType::Bit,
            "TINYINT" => SqlType::TinyInt,
            "SMALLINT" => SqlType::SmallInt,
            "INTEGER" | "INT" => SqlType::Integer,
            "BIGINT" => SqlType::BigInt,
            "FLOAT" => SqlType::Float,
            "REAL" => SqlType::Real,
            "DOUBLE" => SqlType::Double,
            "NUMERIC" => SqlType::Numeric,
            "DECIMAL" => SqlType::Decimal,
            "CHAR" => SqlType::Char,
            "VARCHAR" => SqlType::Varchar,
            "LONGVARCHAR" => SqlType::LongVarchar,
            "DATE" => SqlType::Date,
            "TIME" => SqlType::Time,
            "TIMESTAMP" => SqlType::Timestamp,
            "BINARY" => SqlType::Binary,
            "VARBINARY" => SqlType::VarBinary,
            "LONGVARBINARY" => SqlType::LongVarBinary,
            "BLOB" => SqlType::Blob,
            "CLOB" => SqlType::Clob,
            "BOOLEAN" => SqlType::Boolean,
            "NULL" => SqlType::Null,
            "OTHER" => SqlType::Other,
            "UNDEFINED" => SqlType::Undefined,
            _ => return None,
        };
        Some(t)
    }
}

/// Language-side kind of a mapped value, playing the role a concrete class
/// plays for the original runtime. Record shapes are named and resolved
/// through the reflection layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Boolean,
    Int,
    Long,
    Float,
    Double,
    Decimal,
    BigInteger,
    String,
    Date,
    Blob,
    /// Untyped; the unknown handler decides per value or per column.
    Object,
    Map,
    List,
    /// A declared enumeration, identified by its registered name.
    Enum(String),
    /// A named record schema registered with the reflection layer.
    Record(String),
    Cursor,
    ResultSet,
}

impl TypeKind {
    /// Whether a value of `self` can stand where `other` is declared.
    /// `Object` is the widest kind; records widen to `Map`.
    #[must_use]
    pub fn is_assignable_to(&self, other: &TypeKind) -> bool {
        if self == other || *other == TypeKind::Object {
            return true;
        }
        match (self, other) {
            (TypeKind::Record(_), TypeKind::Map) => true,
            (TypeKind::Int, TypeKind::Long) => true,
            (TypeKind::Float, TypeKind::Double) => true,
            _ => false,
        }
    }

    /// Kinds with a primitive spelling reject null results in bindings.
    #[must_use]
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            TypeKind::Boolean
                | TypeKind::Int
                | TypeKind::Long
                | TypeKind::Float
                | TypeKind::Double
        )
    }
}

/// What a configuration alias resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    Kind(TypeKind),
    /// Element kind for `int[]`-style spellings.
    Array(TypeKind),
    /// A cache or handler implementation, identified by its registered id.
    Impl(String),
}

impl TypeRef {
    #[must_use]
    pub fn as_kind(&self) -> Option<&TypeKind> {
        match self {
            TypeRef::Kind(kind) => Some(kind),
            _ => None,
        }
    }
}

/// Coarse classification used by the unknown handler and the expression
/// evaluator when inspecting runtime JSON values.
#[must_use]
pub fn kind_of_value(value: &JsonValue) -> TypeKind {
    match value {
        JsonValue::Null => TypeKind::Object,
        JsonValue::Bool(_) => TypeKind::Boolean,
        JsonValue::Number(n) => {
            if n.is_i64() || n.is_u64() {
                TypeKind::Long
            } else {
                TypeKind::Double
            }
        }
        JsonValue::String(_) => TypeKind::String,
        JsonValue::Array(_) => TypeKind::List,
        JsonValue::Object(_) => TypeKind::Map,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_coercion_from_int() {
        assert_eq!(DbValue::Int(1).as_bool(), Some(true));
        assert_eq!(DbValue::Int(0).as_bool(), Some(false));
        assert_eq!(DbValue::Int(7).as_bool(), None);
    }

    #[test]
    fn timestamp_parses_from_text() {
        let v = DbValue::Text("2024-05-01 10:30:00".into());
        assert!(v.as_timestamp().is_some());
    }

    #[test]
    fn sql_type_spellings() {
        assert_eq!(SqlType::parse("varchar"), Some(SqlType::Varchar));
        assert_eq!(SqlType::parse("INT"), Some(SqlType::Integer));
        assert_eq!(SqlType::parse("nope"), None);
    }

    #[test]
    fn assignability_lattice() {
        assert!(TypeKind::Int.is_assignable_to(&TypeKind::Long));
        assert!(TypeKind::Record("user".into()).is_assignable_to(&TypeKind::Map));
        assert!(TypeKind::String.is_assignable_to(&TypeKind::Object));
        assert!(!TypeKind::Long.is_assignable_to(&TypeKind::Int));
    }
}
