use serde_json::{Map, Value};

/// Binding name under which the whole parameter object is reachable.
pub const PARAMETER_OBJECT_KEY: &str = "_parameter";
/// Binding name carrying the active environment's database id.
pub const DATABASE_ID_KEY: &str = "_databaseId";

/// Per-invocation mutable state during SQL rendering: the bindings map
/// (seeded with `_parameter` and `_databaseId`), the space-joined SQL
/// builder, and the counter naming `<foreach>` synthetic parameters.
#[derive(Debug)]
pub struct DynamicContext {
    bindings: Map<String, Value>,
    sql_parts: Vec<String>,
    unique_number: usize,
}

impl DynamicContext {
    #[must_use]
    pub fn new(parameter: &Value, database_id: Option<&str>) -> Self {
        let mut bindings = Map::new();
        bindings.insert(PARAMETER_OBJECT_KEY.to_string(), parameter.clone());
        bindings.insert(
            DATABASE_ID_KEY.to_string(),
            database_id.map(|id| Value::String(id.to_string())).unwrap_or(Value::Null),
        );
        Self {
            bindings,
            sql_parts: Vec::new(),
            unique_number: 0,
        }
    }

    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    #[must_use]
    pub fn bindings(&self) -> &Map<String, Value> {
        &self.bindings
    }

    #[must_use]
    pub fn into_bindings(self) -> Map<String, Value> {
        self.bindings
    }

    pub fn append_sql(&mut self, part: impl Into<String>) {
        let part = part.into();
        if !part.is_empty() {
            self.sql_parts.push(part);
        }
    }

    /// The rendered SQL so far, parts joined by single spaces.
    #[must_use]
    pub fn sql(&self) -> String {
        self.sql_parts.join(" ").trim().to_string()
    }

    /// Monotonically increasing number for `__frch_…` synthetic names.
    pub fn next_unique(&mut self) -> usize {
        let n = self.unique_number;
        self.unique_number += 1;
        n
    }

    /// Marker for capture-and-trim rendering: the current part count.
    #[must_use]
    pub(crate) fn mark(&self) -> usize {
        self.sql_parts.len()
    }

    /// Join and remove every part appended since `mark`.
    pub(crate) fn take_from(&mut self, mark: usize) -> String {
        let captured = self.sql_parts.split_off(mark);
        captured.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn seeds_parameter_and_database_id() {
        let ctx = DynamicContext::new(&json!({"a": 1}), Some("sqlite"));
        assert_eq!(ctx.bindings()[PARAMETER_OBJECT_KEY], json!({"a": 1}));
        assert_eq!(ctx.bindings()[DATABASE_ID_KEY], json!("sqlite"));
    }

    #[test]
    fn joins_parts_with_spaces() {
        let mut ctx = DynamicContext::new(&Value::Null, None);
        ctx.append_sql("SELECT *");
        ctx.append_sql("FROM t");
        ctx.append_sql("");
        assert_eq!(ctx.sql(), "SELECT * FROM t");
    }

    #[test]
    fn capture_and_restore() {
        let mut ctx = DynamicContext::new(&Value::Null, None);
        ctx.append_sql("head");
        let mark = ctx.mark();
        ctx.append_sql("a");
        ctx.append_sql("b");
        assert_eq!(ctx.take_from(mark), "a b");
        assert_eq!(ctx.sql(), "head");
    }
}
