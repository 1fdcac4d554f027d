//! Non-owning links from a type back to the module that supplied it

use std::fmt;
use std::sync::{Arc, Weak};

use super::Type;
use crate::error::CoreError;

/// Looks up types and raw class bytes on behalf of a [`Type`]
///
/// Implemented by modules. Lookups that cross module boundaries go through
/// the owning baseline's package resolution.
pub trait TypeResolver: Send + Sync {
    /// Finds the structure of a type visible from the resolver's module
    fn find_type(&self, qualified_name: &str) -> Result<Option<Arc<Type>>, CoreError>;

    /// Reads the raw class bytes of a type visible from the resolver's module
    fn class_bytes(&self, qualified_name: &str) -> Result<Option<Vec<u8>>, CoreError>;
}

/// Cache key of one module version. Several versions of a module id can
/// live in the same baseline.
pub fn module_cache_key(module_id: &str, version: Option<&str>) -> String {
    match version {
        Some(version) => format!("{}_{}", module_id, version),
        None => module_id.to_string(),
    }
}

/// Where a type came from: baseline name, module id and version, and a weak
/// handle used for lazy navigation
#[derive(Clone, Default)]
pub struct TypeOrigin {
    baseline: String,
    module_id: String,
    version: Option<String>,
    resolver: Option<Weak<dyn TypeResolver>>,
}

impl TypeOrigin {
    pub fn new(baseline: impl Into<String>, module_id: impl Into<String>) -> Self {
        Self {
            baseline: baseline.into(),
            module_id: module_id.into(),
            version: None,
            resolver: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_resolver(mut self, resolver: Weak<dyn TypeResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn baseline(&self) -> &str {
        &self.baseline
    }

    pub fn module_id(&self) -> &str {
        &self.module_id
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Module level of the cache key for types from this origin
    pub fn cache_module(&self) -> String {
        module_cache_key(&self.module_id, self.version.as_deref())
    }

    /// Upgrades the resolver handle. `None` once the module has been dropped.
    pub fn resolver(&self) -> Option<Arc<dyn TypeResolver>> {
        self.resolver.as_ref().and_then(Weak::upgrade)
    }
}

impl fmt::Debug for TypeOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeOrigin")
            .field("baseline", &self.baseline)
            .field("module_id", &self.module_id)
            .field("version", &self.version)
            .field("attached", &self.resolver().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_module_includes_version() {
        let plain = TypeOrigin::new("b", "a");
        let old = TypeOrigin::new("b", "a").with_version("1.0.0");
        let new = TypeOrigin::new("b", "a").with_version("1.0.1");
        assert_eq!(plain.cache_module(), "a");
        assert_eq!(old.cache_module(), "a_1.0.0");
        assert_ne!(old.cache_module(), new.cache_module());
        assert_eq!(old.version(), Some("1.0.0"));
    }
}
