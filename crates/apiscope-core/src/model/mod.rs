//! Structural model of compiled types

pub mod member;
pub mod origin;
mod structure;

pub use member::{ConstantValue, Field, Method, MethodKey};
pub use origin::{module_cache_key, TypeOrigin, TypeResolver};
pub use structure::{Nesting, Type};
