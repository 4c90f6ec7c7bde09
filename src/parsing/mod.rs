//! Low-level parsing support: the owned XML element tree the builders walk,
//! the generic `#{…}`/`${…}` token scanner, and configuration-variable
//! substitution.

mod property;
mod token;
mod xnode;

pub use property::{parse_placeholders, Variables};
pub use token::TokenParser;
pub use xnode::{parse_document, XmlChild, XmlNode};
