use crate::root::TypeRoot;

/// Depth-first traversal callbacks, package by package
///
/// Packages arrive in lexicographic order within one container and types
/// are sorted within a package. Returning `false` from
/// [`ContainerVisitor::visit_package`] skips the types of that package.
pub trait ContainerVisitor {
    fn visit_package(&mut self, _package: &str) -> bool {
        true
    }

    fn visit_type(&mut self, package: &str, root: &TypeRoot);

    fn end_visit_package(&mut self, _package: &str) {}
}

/// Collects every visited type root
#[derive(Debug, Default)]
pub struct CollectingVisitor {
    pub roots: Vec<TypeRoot>,
}

impl ContainerVisitor for CollectingVisitor {
    fn visit_type(&mut self, _package: &str, root: &TypeRoot) {
        self.roots.push(root.clone());
    }
}
