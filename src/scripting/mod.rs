//! The dynamic SQL engine: node tree, per-invocation rendering context,
//! and the `#{…}` scan producing prepared SQL plus ordered bindings.

mod builder;
mod dynamic_context;
mod sql_node;
mod source;

pub use builder::ScriptBuilder;
pub use dynamic_context::{DynamicContext, DATABASE_ID_KEY, PARAMETER_OBJECT_KEY};
pub use source::{build_sql_source, DynamicSqlSource, RawSqlSource, SqlSourceBuilder};
pub use sql_node::{SqlNode, FOREACH_ITEM_PREFIX};
