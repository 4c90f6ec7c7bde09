use std::collections::HashMap;

use crate::error::{Result, SqlMapperError};

enum Entry<V> {
    Value(V),
    /// Two namespaces registered the same short name; only the full id
    /// resolves it.
    Ambiguous(Vec<String>),
}

/// A registry that rejects duplicate full ids and additionally indexes
/// each value under its short (post-dot) name, with ambiguity detected at
/// lookup time.
pub struct StrictMap<V> {
    name: &'static str,
    entries: HashMap<String, Entry<V>>,
}

impl<V: Clone> StrictMap<V> {
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: HashMap::new(),
        }
    }

    pub fn insert(&mut self, id: &str, value: V) -> Result<()> {
        if self.entries.contains_key(id) {
            return Err(SqlMapperError::Config(format!(
                "{} already contains value for {id}",
                self.name
            )));
        }
        if let Some((_, short)) = id.rsplit_once('.') {
            match self.entries.get_mut(short) {
                None => {
                    self.entries
                        .insert(short.to_string(), Entry::Value(value.clone()));
                }
                Some(Entry::Value(_)) => {
                    let previous = short.to_string();
                    self.entries
                        .insert(previous, Entry::Ambiguous(vec![id.to_string()]));
                }
                Some(Entry::Ambiguous(ids)) => ids.push(id.to_string()),
            }
        }
        self.entries.insert(id.to_string(), Entry::Value(value));
        Ok(())
    }

    /// Replace the value under a full id (databaseId shadowing).
    pub fn replace(&mut self, id: &str, value: V) {
        if let Some((_, short)) = id.rsplit_once('.') {
            if let Some(Entry::Value(_)) = self.entries.get(short) {
                self.entries
                    .insert(short.to_string(), Entry::Value(value.clone()));
            }
        }
        self.entries.insert(id.to_string(), Entry::Value(value));
    }

    pub fn get(&self, id: &str) -> Result<V> {
        match self.entries.get(id) {
            Some(Entry::Value(v)) => Ok(v.clone()),
            Some(Entry::Ambiguous(ids)) => Err(SqlMapperError::Config(format!(
                "{id} is ambiguous in {} (try using the full name: {})",
                self.name,
                ids.join(", ")
            ))),
            None => Err(SqlMapperError::Config(format!(
                "{} does not contain value for {id}",
                self.name
            ))),
        }
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        matches!(self.entries.get(id), Some(Entry::Value(_)))
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        // Short-name aliases duplicate values; only dotted ids are canonical.
        self.entries.iter().filter_map(|(k, e)| match e {
            Entry::Value(v) if k.contains('.') => Some(v),
            _ => None,
        })
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().filter_map(|(k, e)| match e {
            Entry::Value(_) if k.contains('.') => Some(k.as_str()),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_names_resolve_until_ambiguous() {
        let mut map = StrictMap::new("statements");
        map.insert("ns1.find", 1).unwrap();
        assert_eq!(map.get("find").unwrap(), 1);
        assert_eq!(map.get("ns1.find").unwrap(), 1);

        map.insert("ns2.find", 2).unwrap();
        assert!(map.get("find").is_err());
        assert_eq!(map.get("ns2.find").unwrap(), 2);
    }

    #[test]
    fn duplicate_full_id_rejected() {
        let mut map = StrictMap::new("statements");
        map.insert("ns.find", 1).unwrap();
        assert!(map.insert("ns.find", 9).is_err());
    }
}
