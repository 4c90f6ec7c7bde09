use std::hash::{Hash, Hasher};

use chrono::NaiveDateTime;
use serde_json::Value as JsonValue;

use crate::error::{Result, SqlMapperError};
use crate::types::DbValue;

const DEFAULT_MULTIPLIER: i64 = 37;
const DEFAULT_HASHCODE: i64 = 17;

/// One component folded into a [`CacheKey`].
#[derive(Debug, Clone, PartialEq)]
pub enum KeyComponent {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Timestamp(NaiveDateTime),
    /// Arrays are compared structurally, element by element.
    List(Vec<KeyComponent>),
}

impl KeyComponent {
    fn base_hash(&self) -> i64 {
        match self {
            KeyComponent::Null => 1,
            KeyComponent::Bool(b) => {
                if *b {
                    1231
                } else {
                    1237
                }
            }
            KeyComponent::Int(n) => *n ^ (*n >> 32),
            KeyComponent::Float(f) => {
                let bits = f.to_bits() as i64;
                bits ^ (bits >> 32)
            }
            KeyComponent::Str(s) => string_hash(s),
            KeyComponent::Bytes(bytes) => bytes
                .iter()
                .fold(1i64, |acc, b| acc.wrapping_mul(31).wrapping_add(i64::from(*b))),
            KeyComponent::Timestamp(ts) => {
                let n = ts.and_utc().timestamp_micros();
                n ^ (n >> 32)
            }
            KeyComponent::List(items) => items
                .iter()
                .fold(1i64, |acc, item| {
                    acc.wrapping_mul(31).wrapping_add(item.base_hash())
                }),
        }
    }
}

fn string_hash(s: &str) -> i64 {
    i64::from(s.bytes().fold(0i32, |acc, b| {
        acc.wrapping_mul(31).wrapping_add(i32::from(b))
    }))
}

impl From<&DbValue> for KeyComponent {
    fn from(value: &DbValue) -> Self {
        match value {
            DbValue::Null => KeyComponent::Null,
            DbValue::Bool(b) => KeyComponent::Bool(*b),
            DbValue::Int(n) => KeyComponent::Int(*n),
            DbValue::Float(f) => KeyComponent::Float(*f),
            DbValue::Text(s) => KeyComponent::Str(s.clone()),
            DbValue::Blob(b) => KeyComponent::Bytes(b.clone()),
            DbValue::Timestamp(ts) => KeyComponent::Timestamp(*ts),
        }
    }
}

impl From<&JsonValue> for KeyComponent {
    fn from(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => KeyComponent::Null,
            JsonValue::Bool(b) => KeyComponent::Bool(*b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    KeyComponent::Int(i)
                } else {
                    KeyComponent::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            JsonValue::String(s) => KeyComponent::Str(s.clone()),
            JsonValue::Array(items) => {
                KeyComponent::List(items.iter().map(KeyComponent::from).collect())
            }
            JsonValue::Object(map) => KeyComponent::List(
                map.iter()
                    .flat_map(|(k, v)| [KeyComponent::Str(k.clone()), KeyComponent::from(v)])
                    .collect(),
            ),
        }
    }
}

impl From<&str> for KeyComponent {
    fn from(value: &str) -> Self {
        KeyComponent::Str(value.to_string())
    }
}

impl From<i64> for KeyComponent {
    fn from(value: i64) -> Self {
        KeyComponent::Int(value)
    }
}

impl From<String> for KeyComponent {
    fn from(value: String) -> Self {
        KeyComponent::Str(value)
    }
}

/// Order-sensitive composite key.
///
/// The accumulated hash multiplies each component's own hash by its
/// 1-based position before folding, so permutations of the same multiset
/// produce different keys. Equality compares `(hash, checksum, count)`
/// first, then components element-wise.
#[derive(Debug, Clone)]
pub struct CacheKey {
    hashcode: i64,
    checksum: i64,
    count: usize,
    update_list: Vec<KeyComponent>,
    frozen: bool,
}

impl Default for CacheKey {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheKey {
    #[must_use]
    pub fn new() -> Self {
        CacheKey {
            hashcode: DEFAULT_HASHCODE,
            checksum: 0,
            count: 0,
            update_list: Vec::new(),
            frozen: false,
        }
    }

    /// The shared sentinel that refuses all updates.
    #[must_use]
    pub fn null_key() -> Self {
        CacheKey {
            frozen: true,
            ..Self::new()
        }
    }

    pub fn update(&mut self, component: impl Into<KeyComponent>) -> Result<()> {
        if self.frozen {
            return Err(SqlMapperError::Cache(
                "not allowed to update a null cache key instance".into(),
            ));
        }
        let component = component.into();
        let mut base = component.base_hash();
        self.count += 1;
        self.checksum = self.checksum.wrapping_add(base);
        base = base.wrapping_mul(self.count as i64);
        self.hashcode = self
            .hashcode
            .wrapping_mul(DEFAULT_MULTIPLIER)
            .wrapping_add(base);
        self.update_list.push(component);
        Ok(())
    }

    pub fn update_all<I, C>(&mut self, components: I) -> Result<()>
    where
        I: IntoIterator<Item = C>,
        C: Into<KeyComponent>,
    {
        for c in components {
            self.update(c)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn update_count(&self) -> usize {
        self.count
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        if self.hashcode != other.hashcode
            || self.checksum != other.checksum
            || self.count != other.count
        {
            return false;
        }
        self.update_list == other.update_list
    }
}

impl Eq for CacheKey {}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_i64(self.hashcode);
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.hashcode, self.checksum)?;
        for component in &self.update_list {
            write!(f, ":{component:?}")?;
        }
        Ok(())
    }
}
