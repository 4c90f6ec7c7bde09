//! Bidirectional conversion between language-side values and driver-side
//! SQL values, resolved by `(kind, sql type)`.

mod handlers;
mod registry;

pub use handlers::{
    BlobHandler, BooleanHandler, DateHandler, DateOnlyHandler, DecimalHandler, DoubleHandler,
    EnumNameHandler, EnumOrdinalHandler, IntHandler, JsonHandler, LongHandler, StringHandler,
    UnknownHandler,
};
pub use registry::TypeHandlerRegistry;

use std::fmt;

use serde_json::Value;

use crate::error::Result;
use crate::results::Row;
use crate::types::{DbValue, SqlType};

/// One (kind, sql type) conversion pair: a setter onto the prepared
/// parameter slots and getters from a fetched row.
pub trait TypeHandler: Send + Sync + fmt::Debug {
    /// Convert `value` and place it into `params[index]`.
    fn set(
        &self,
        params: &mut [DbValue],
        index: usize,
        value: &Value,
        sql_type: Option<SqlType>,
    ) -> Result<()>;

    fn get_by_name(&self, row: &Row, column: &str) -> Result<Value>;

    fn get_by_index(&self, row: &Row, index: usize) -> Result<Value>;

    /// Callable-statement output slot, positional. Outputs are modeled as
    /// a row of OUT values.
    fn get_from_callable(&self, outputs: &Row, index: usize) -> Result<Value> {
        self.get_by_index(outputs, index)
    }
}
