//! The minimal expression language behind `test="…"` conditions, `${…}`
//! interpolation and `<foreach collection="…">` lookups.
//!
//! Grammar: literals, property paths with `.`/`[…]` indexing, equality and
//! ordering comparisons, `and`/`or`/`not` (symbol forms accepted), and
//! parentheses. Names resolve against the dynamic-context bindings with a
//! fallback into the `_parameter` object.

mod eval;
mod lexer;
mod parser;

pub use eval::{truthy, Scope};
pub use parser::{CmpOp, Expr, PathSeg};
