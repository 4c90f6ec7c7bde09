//! Per-type descriptors and dynamic property navigation.
//!
//! Record shapes are declared as [`RecordSchema`]s; a [`Reflector`] is the
//! cached descriptor derived from one (accessor handles, effective kinds,
//! case-insensitive name table, default instance). [`MetaValue`] resolves
//! `a.b[0]`-style paths against runtime values.

pub mod meta;
pub mod property;
mod reflector;

pub use meta::MetaValue;
pub use reflector::{PropertyHandle, PropertySpec, RecordSchema, Reflector, ReflectorRegistry};
