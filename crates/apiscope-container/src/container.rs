use std::fmt;

use apiscope_core::{naming, CancelToken};

use crate::archive::ArchiveContainer;
use crate::composite::CompositeContainer;
use crate::directory::DirectoryContainer;
use crate::error::Result;
use crate::root::TypeRoot;
use crate::visitor::ContainerVisitor;

/// A source of type roots rooted at one physical location
pub enum TypeContainer {
    Archive(ArchiveContainer),
    Directory(DirectoryContainer),
    Composite(CompositeContainer),
}

impl TypeContainer {
    /// Locates a type by qualified name. Absence is `Ok(None)`.
    pub fn find_type_root(&self, type_name: &str) -> Result<Option<TypeRoot>> {
        match self {
            Self::Archive(archive) => archive.find_type_root(type_name),
            Self::Directory(directory) => directory.find_type_root(type_name),
            Self::Composite(composite) => composite.find_type_root(type_name),
        }
    }

    /// Origin-aware lookup used for host and fragment groups
    pub fn find_type_root_from(
        &self,
        type_name: &str,
        origin_module_id: &str,
    ) -> Result<Option<TypeRoot>> {
        match self {
            Self::Composite(composite) => composite.find_type_root_from(type_name, origin_module_id),
            _ => self.find_type_root(type_name),
        }
    }

    /// Sorted package names, the default package as `""`
    pub fn list_package_names(&self) -> Result<Vec<String>> {
        match self {
            Self::Archive(archive) => archive.list_package_names(),
            Self::Directory(directory) => directory.list_package_names(),
            Self::Composite(composite) => composite.list_package_names(),
        }
    }

    pub fn contains_package(&self, package: &str) -> Result<bool> {
        let package = naming::normalize_package(package);
        match self {
            Self::Archive(archive) => Ok(archive
                .index(&CancelToken::new())?
                .contains_package(package)),
            Self::Directory(directory) => Ok(directory
                .index(&CancelToken::new())?
                .contains_package(package)),
            Self::Composite(composite) => composite.contains_package(package),
        }
    }

    /// Builds the package index ahead of use, observing `cancel`
    ///
    /// A cancelled scan leaves the container as it was before the call.
    pub fn open(&self, cancel: &CancelToken) -> Result<()> {
        match self {
            Self::Archive(archive) => archive.index(cancel).map(drop),
            Self::Directory(directory) => directory.index(cancel).map(drop),
            Self::Composite(composite) => {
                for child in composite.children() {
                    child.open(cancel)?;
                }
                Ok(())
            }
        }
    }

    /// Walks packages in order, and types sorted within each package
    pub fn visit(&self, visitor: &mut dyn ContainerVisitor) -> Result<()> {
        if let Self::Composite(composite) = self {
            return composite.visit(visitor);
        }
        for package in self.list_package_names()? {
            if visitor.visit_package(&package) {
                let roots = match self {
                    Self::Archive(archive) => archive.roots(&package)?,
                    Self::Directory(directory) => directory.roots(&package)?,
                    Self::Composite(_) => Vec::new(),
                };
                for root in &roots {
                    visitor.visit_type(&package, root);
                }
            }
            visitor.end_visit_package(&package);
        }
        Ok(())
    }

    /// Releases file handles and cached structures; the next query rescans
    pub fn close(&self) {
        match self {
            Self::Archive(archive) => archive.close(),
            Self::Directory(directory) => directory.close(),
            Self::Composite(composite) => composite.close(),
        }
    }

    /// Id of the module whose types this container supplies
    pub fn module_id(&self) -> &str {
        match self {
            Self::Archive(archive) => archive.origin().module_id(),
            Self::Directory(directory) => directory.origin().module_id(),
            Self::Composite(composite) => composite.module_id(),
        }
    }

    pub fn location(&self) -> String {
        match self {
            Self::Archive(archive) => match archive.prefix() {
                Some(prefix) => format!("{}!/{}", archive.path().display(), prefix),
                None => archive.path().display().to_string(),
            },
            Self::Directory(directory) => directory.path().display().to_string(),
            Self::Composite(composite) => format!("composite of {}", composite.module_id()),
        }
    }
}

impl From<ArchiveContainer> for TypeContainer {
    fn from(container: ArchiveContainer) -> Self {
        Self::Archive(container)
    }
}

impl From<DirectoryContainer> for TypeContainer {
    fn from(container: DirectoryContainer) -> Self {
        Self::Directory(container)
    }
}

impl From<CompositeContainer> for TypeContainer {
    fn from(container: CompositeContainer) -> Self {
        Self::Composite(container)
    }
}

impl fmt::Debug for TypeContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Composite(composite) => f
                .debug_struct("Composite")
                .field("module", &composite.module_id())
                .field("children", &composite.children())
                .finish(),
            other => f
                .debug_tuple("TypeContainer")
                .field(&other.location())
                .finish(),
        }
    }
}
