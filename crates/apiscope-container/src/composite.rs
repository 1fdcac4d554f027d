//! Ordered groups of containers
//!
//! A composite holds one child per bundle classpath entry, or one per
//! fragment contributing to a host. Declaration order decides which child
//! supplies a type when several could.

use std::collections::BTreeSet;

use tracing::trace;

use crate::container::TypeContainer;
use crate::error::Result;
use crate::root::TypeRoot;
use crate::visitor::ContainerVisitor;

pub struct CompositeContainer {
    module_id: String,
    children: Vec<TypeContainer>,
}

impl CompositeContainer {
    pub fn new(module_id: impl Into<String>, children: Vec<TypeContainer>) -> Self {
        Self {
            module_id: module_id.into(),
            children,
        }
    }

    /// Id of the module owning this composite
    pub fn module_id(&self) -> &str {
        &self.module_id
    }

    pub fn children(&self) -> &[TypeContainer] {
        &self.children
    }

    pub fn push(&mut self, child: TypeContainer) {
        self.children.push(child);
    }

    /// First child that knows the type wins
    pub fn find_type_root(&self, type_name: &str) -> Result<Option<TypeRoot>> {
        for child in &self.children {
            if let Some(root) = child.find_type_root(type_name)? {
                return Ok(Some(root));
            }
        }
        Ok(None)
    }

    /// Prefers the child owned by `origin_module_id`, then falls back to
    /// declaration order
    pub fn find_type_root_from(
        &self,
        type_name: &str,
        origin_module_id: &str,
    ) -> Result<Option<TypeRoot>> {
        for child in &self.children {
            if child.module_id() == origin_module_id {
                if let Some(root) = child.find_type_root_from(type_name, origin_module_id)? {
                    trace!("{} found in owning module {}", type_name, origin_module_id);
                    return Ok(Some(root));
                }
            }
        }
        self.find_type_root(type_name)
    }

    /// Union of the children's packages, sorted and deduplicated
    pub fn list_package_names(&self) -> Result<Vec<String>> {
        let mut packages = BTreeSet::new();
        for child in &self.children {
            packages.extend(child.list_package_names()?);
        }
        Ok(packages.into_iter().collect())
    }

    pub fn contains_package(&self, package: &str) -> Result<bool> {
        for child in &self.children {
            if child.contains_package(package)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn visit(&self, visitor: &mut dyn ContainerVisitor) -> Result<()> {
        for child in &self.children {
            child.visit(visitor)?;
        }
        Ok(())
    }

    pub fn close(&self) {
        for child in &self.children {
            child.close();
        }
    }
}
