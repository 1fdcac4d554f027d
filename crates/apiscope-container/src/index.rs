//! Package to type index shared by archive and directory containers

use std::collections::BTreeMap;

use apiscope_core::{naming, LazySlot};

/// Packages and the types they hold, both in lexicographic order
#[derive(Debug, Default)]
pub struct PackageIndex {
    packages: BTreeMap<String, BTreeMap<String, String>>,
}

impl PackageIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a type and the entry path it is read from
    pub fn insert(&mut self, type_name: String, entry: String) {
        let package = naming::package_name(&type_name).to_string();
        self.packages
            .entry(package)
            .or_default()
            .insert(type_name, entry);
    }

    pub fn package_names(&self) -> impl Iterator<Item = &str> {
        self.packages.keys().map(String::as_str)
    }

    pub fn contains_package(&self, package: &str) -> bool {
        self.packages.contains_key(package)
    }

    /// `(type name, entry)` pairs of one package
    pub fn types(&self, package: &str) -> impl Iterator<Item = (&str, &str)> {
        self.packages
            .get(package)
            .into_iter()
            .flat_map(|types| types.iter().map(|(t, e)| (t.as_str(), e.as_str())))
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.packages
            .values()
            .flat_map(|types| types.keys().map(String::as_str))
    }

    pub fn entry(&self, type_name: &str) -> Option<&str> {
        self.packages
            .get(naming::package_name(type_name))?
            .get(type_name)
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.packages.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

/// An index built on first use and kept until the container is closed
pub(crate) type LazyIndex = LazySlot<PackageIndex>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ContainerError;

    #[test]
    fn test_index_orders_packages_and_types() {
        let mut index = PackageIndex::new();
        index.insert("com.z.B".into(), "com/z/B.class".into());
        index.insert("com.a.Z".into(), "com/a/Z.class".into());
        index.insert("com.a.A".into(), "com/a/A.class".into());
        index.insert("Top".into(), "Top.class".into());

        assert_eq!(index.package_names().collect::<Vec<_>>(), vec!["", "com.a", "com.z"]);
        assert_eq!(
            index.types("com.a").map(|(t, _)| t).collect::<Vec<_>>(),
            vec!["com.a.A", "com.a.Z"]
        );
        assert_eq!(index.entry("com.z.B"), Some("com/z/B.class"));
        assert_eq!(index.entry("com.z.C"), None);
        assert_eq!(index.len(), 4);
    }

    #[test]
    fn test_failed_build_is_not_memoized() {
        let lazy = LazyIndex::default();
        assert!(lazy.get_or_try_init(|| Err(ContainerError::Cancelled)).is_err());
        let index = lazy
            .get_or_try_init(|| Ok::<_, ContainerError>(PackageIndex::new()))
            .unwrap();
        assert!(index.is_empty());
        assert!(lazy.take().is_some());
        assert!(lazy.take().is_none());
    }
}
