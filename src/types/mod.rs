//! The type system of the native protocol: descriptors, their parser and a
//! parse cache.

mod cache;
mod descriptor;
mod parser;

pub use cache::TypeCache;
pub use descriptor::{EnumWidth, GeoKind, ScalarKind, TupleElement, TypeDescriptor};
pub use parser::parse_type;
