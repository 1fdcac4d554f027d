//! Structural model of compiled JVM types for API-compatibility analysis

pub mod cache;
pub mod cancel;
pub mod classfile;
pub mod error;
pub mod flags;
pub mod lifecycle;
pub mod model;
pub mod naming;
pub mod version;

pub use cache::ModelCache;
pub use cancel::CancelToken;
pub use classfile::{ClassFileError, StructureBuilder};
pub use error::CoreError;
pub use flags::Modifiers;
pub use lifecycle::{DisposalSite, DisposalState, LazySlot};
pub use model::{
    module_cache_key, ConstantValue, Field, Method, MethodKey, Nesting, Type, TypeOrigin,
    TypeResolver,
};
pub use version::{ModuleVersion, VersionRange};
