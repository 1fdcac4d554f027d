//! Containers over output folders of compiled classes
//!
//! No file-system watching is done. Call [`DirectoryContainer::close`] to
//! force a rescan after the directory changed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use apiscope_core::{naming, CancelToken, ModelCache, TypeOrigin};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{ContainerError, Result};
use crate::index::{LazyIndex, PackageIndex};
use crate::root::{Locator, TypeRoot};

/// Type container over a directory whose sub-directories are package paths
pub struct DirectoryContainer {
    root: PathBuf,
    origin: TypeOrigin,
    cache: Arc<ModelCache>,
    index: LazyIndex,
}

impl DirectoryContainer {
    pub fn new(root: impl Into<PathBuf>, origin: TypeOrigin, cache: Arc<ModelCache>) -> Self {
        Self {
            root: root.into(),
            origin,
            cache,
            index: LazyIndex::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn origin(&self) -> &TypeOrigin {
        &self.origin
    }

    /// Scans the directory if needed, observing `cancel`
    pub fn index(&self, cancel: &CancelToken) -> Result<Arc<PackageIndex>> {
        self.index.get_or_try_init(|| {
            if !self.root.is_dir() {
                return Err(ContainerError::io(
                    &self.root,
                    std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
                ));
            }

            let mut index = PackageIndex::new();
            for entry in WalkDir::new(&self.root).sort_by_file_name() {
                if cancel.is_cancelled() {
                    return Err(ContainerError::Cancelled);
                }
                let entry = entry.map_err(|e| {
                    let path = e
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| self.root.clone());
                    ContainerError::io(path, e.into())
                })?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                    continue;
                };
                let relative = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if relative.starts_with("META-INF/") || relative.ends_with("module-info.class") {
                    continue;
                }
                if let Some(type_name) = naming::type_name_from_entry(&relative) {
                    index.insert(type_name, relative);
                }
            }
            debug!(
                "Indexed {} types under {}",
                index.len(),
                self.root.display()
            );
            Ok(index)
        })
    }

    fn root_for(&self, type_name: &str, entry: &str) -> TypeRoot {
        TypeRoot::new(
            type_name,
            Locator::File(self.root.join(entry)),
            self.origin.clone(),
            self.cache.clone(),
        )
    }

    pub fn find_type_root(&self, type_name: &str) -> Result<Option<TypeRoot>> {
        let index = self.index(&CancelToken::new())?;
        Ok(index
            .entry(type_name)
            .map(|entry| self.root_for(type_name, entry)))
    }

    pub fn list_package_names(&self) -> Result<Vec<String>> {
        let index = self.index(&CancelToken::new())?;
        Ok(index.package_names().map(str::to_string).collect())
    }

    pub(crate) fn roots(&self, package: &str) -> Result<Vec<TypeRoot>> {
        let index = self.index(&CancelToken::new())?;
        Ok(index
            .types(package)
            .map(|(name, entry)| self.root_for(name, entry))
            .collect())
    }

    /// Forgets the scan and evicts cached structures
    pub fn close(&self) {
        if let Some(index) = self.index.take() {
            let module = self.origin.cache_module();
            for name in index.type_names() {
                self.cache.evict(self.origin.baseline(), &module, name);
            }
        }
    }
}
