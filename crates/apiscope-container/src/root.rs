use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Weak};

use apiscope_core::{naming, ModelCache, StructureBuilder, Type, TypeOrigin};
use tracing::{trace, warn};

use crate::archive::ZipHandle;
use crate::error::{ContainerError, Result};

/// Where the bytes of a root live
#[derive(Clone)]
pub(crate) enum Locator {
    Zip {
        handle: Weak<ZipHandle>,
        path: PathBuf,
        entry: String,
    },
    File(PathBuf),
}

/// Handle to one compiled class and its lazily built structure
///
/// The structure is memoized in the shared [`ModelCache`], so asking twice
/// only decodes the bytes once unless the cache evicted the entry.
#[derive(Clone)]
pub struct TypeRoot {
    name: String,
    locator: Locator,
    origin: TypeOrigin,
    cache: Arc<ModelCache>,
}

impl TypeRoot {
    pub(crate) fn new(
        name: impl Into<String>,
        locator: Locator,
        origin: TypeOrigin,
        cache: Arc<ModelCache>,
    ) -> Self {
        Self {
            name: name.into(),
            locator,
            origin,
            cache,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn package_name(&self) -> &str {
        naming::package_name(&self.name)
    }

    pub fn module_id(&self) -> &str {
        self.origin.module_id()
    }

    pub fn origin(&self) -> &TypeOrigin {
        &self.origin
    }

    /// Displayable location, `archive.jar!/entry` for archive members
    pub fn location(&self) -> String {
        match &self.locator {
            Locator::Zip { path, entry, .. } => format!("{}!/{}", path.display(), entry),
            Locator::File(path) => path.display().to_string(),
        }
    }

    /// Reads the raw class bytes
    pub fn bytes(&self) -> Result<Vec<u8>> {
        match &self.locator {
            Locator::Zip {
                handle,
                path,
                entry,
            } => {
                let handle = handle
                    .upgrade()
                    .ok_or_else(|| ContainerError::Closed { path: path.clone() })?;
                handle.read(entry)
            }
            Locator::File(path) => fs::read(path).map_err(|e| ContainerError::io(path, e)),
        }
    }

    /// Returns the cached structure or builds it from the class bytes
    ///
    /// Malformed class files yield `Ok(None)`; only I/O failures are errors.
    pub fn structure(&self) -> Result<Option<Arc<Type>>> {
        if let Some(ty) = self
            .cache
            .lookup(self.origin.baseline(), &self.origin.cache_module(), &self.name)
        {
            return Ok(Some(ty));
        }

        let bytes = self.bytes()?;
        let Some(ty) = StructureBuilder::build(&bytes, self.origin.clone()) else {
            warn!("No structure available for {}", self.location());
            return Ok(None);
        };
        if ty.name() != self.name {
            warn!(
                "{} declares type {}, expected {}",
                self.location(),
                ty.name(),
                self.name
            );
            return Ok(None);
        }

        trace!("Built structure for {}", self.name);
        let ty = Arc::new(ty);
        self.cache.cache(ty.clone());
        Ok(Some(ty))
    }
}

impl fmt::Debug for TypeRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRoot")
            .field("name", &self.name)
            .field("module", &self.origin.module_id())
            .field("location", &self.location())
            .finish()
    }
}
