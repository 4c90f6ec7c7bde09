//! The immutable mapping model assembled at configuration time.

mod environment;
mod parameter;
mod result_map;
mod sql_source;
mod statement;

pub use environment::{DatabaseIdProvider, Environment};
pub use parameter::{ParamMode, ParameterMap, ParameterMapping};
pub use result_map::{Discriminator, ResultFlag, ResultMap, ResultMapBuilder, ResultMapping};
pub use sql_source::{BoundSql, SqlSource, StaticSqlSource};
pub use statement::{
    KeyGeneratorKind, MappedStatement, MappedStatementBuilder, ResultSetStyle, StatementKind,
    SELECT_KEY_SUFFIX,
};
