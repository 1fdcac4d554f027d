//! API visibility descriptions
//!
//! A module's description starts from its manifest: every package it
//! supplies is private until an export says otherwise. A `.api_description`
//! sidecar can then refine types, methods and fields with restrictions and
//! profile markers.

mod restrictions;
pub mod sidecar;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use apiscope_core::naming;

pub use restrictions::Restrictions;

/// Visibility of an element to other modules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visibility {
    Api,
    Private,
    Spi,
    PrivatePermissible,
}

impl Visibility {
    pub fn bits(self) -> u32 {
        match self {
            Self::Api => 0x01,
            Self::Private => 0x02,
            Self::Spi => 0x04,
            Self::PrivatePermissible => 0x08,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Api => "API",
            Self::Private => "PRIVATE",
            Self::Spi => "SPI",
            Self::PrivatePermissible => "PRIVATE_PERMISSABLE",
        }
    }

    /// Accepts the numeric form as well as the names written by older tools
    pub fn from_attribute(value: &str) -> Option<Self> {
        if let Ok(bits) = value.trim().parse::<u32>() {
            return match bits {
                0x01 => Some(Self::Api),
                0x02 => Some(Self::Private),
                0x04 => Some(Self::Spi),
                0x08 => Some(Self::PrivatePermissible),
                _ => None,
            };
        }
        match value.trim() {
            "API" => Some(Self::Api),
            "PRIVATE" => Some(Self::Private),
            "SPI" => Some(Self::Spi),
            "PRIVATE_PERMISSABLE" | "PRIVATE_PERMISSIBLE" => Some(Self::PrivatePermissible),
            _ => None,
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Path to an element of a module's API
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ElementDescriptor {
    Package(String),
    Type(String),
    Field {
        type_name: String,
        name: String,
    },
    Method {
        type_name: String,
        name: String,
        signature: String,
    },
}

impl ElementDescriptor {
    pub fn package(name: &str) -> Self {
        Self::Package(naming::normalize_package(name).to_string())
    }

    pub fn type_named(qualified: &str) -> Self {
        Self::Type(qualified.to_string())
    }

    pub fn field(type_name: &str, name: &str) -> Self {
        Self::Field {
            type_name: type_name.to_string(),
            name: name.to_string(),
        }
    }

    pub fn method(type_name: &str, name: &str, signature: &str) -> Self {
        Self::Method {
            type_name: type_name.to_string(),
            name: name.to_string(),
            signature: signature.to_string(),
        }
    }

    pub fn package_name(&self) -> &str {
        match self {
            Self::Package(name) => name,
            Self::Type(type_name)
            | Self::Field { type_name, .. }
            | Self::Method { type_name, .. } => naming::package_name(type_name),
        }
    }

    /// Members belong to their type, nested types to their enclosing type
    /// and top-level types to their package
    pub fn parent(&self) -> Option<Self> {
        match self {
            Self::Package(_) => None,
            Self::Type(name) => Some(match naming::enclosing_type_name(name) {
                Some(enclosing) => Self::Type(enclosing.to_string()),
                None => Self::Package(naming::package_name(name).to_string()),
            }),
            Self::Field { type_name, .. } | Self::Method { type_name, .. } => {
                Some(Self::Type(type_name.clone()))
            }
        }
    }
}

impl fmt::Display for ElementDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Package(name) if name.is_empty() => f.write_str("<default package>"),
            Self::Package(name) | Self::Type(name) => f.write_str(name),
            Self::Field { type_name, name } => write!(f, "{}#{}", type_name, name),
            Self::Method {
                type_name,
                name,
                signature,
            } => write!(f, "{}#{}{}", type_name, name, signature),
        }
    }
}

/// Settings recorded for one element
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Annotations {
    pub visibility: Option<Visibility>,
    pub restrictions: Restrictions,
    pub added_profile: Option<String>,
    pub removed_profile: Option<String>,
}

/// Visibility settings of one module
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiDescription {
    module_id: String,
    embedded_version: Option<String>,
    elements: BTreeMap<ElementDescriptor, Annotations>,
    friends: BTreeMap<String, BTreeSet<String>>,
}

impl ApiDescription {
    pub fn new(module_id: impl Into<String>) -> Self {
        Self {
            module_id: module_id.into(),
            ..Default::default()
        }
    }

    pub fn module_id(&self) -> &str {
        &self.module_id
    }

    /// Format version read from a sidecar
    pub fn embedded_version(&self) -> Option<&str> {
        self.embedded_version.as_deref()
    }

    pub fn set_embedded_version(&mut self, version: Option<String>) {
        self.embedded_version = version;
    }

    pub fn set_visibility(&mut self, element: ElementDescriptor, visibility: Visibility) {
        self.elements.entry(element).or_default().visibility = Some(visibility);
    }

    pub fn set_restrictions(&mut self, element: ElementDescriptor, restrictions: Restrictions) {
        self.elements.entry(element).or_default().restrictions = restrictions;
    }

    pub fn set_profiles(
        &mut self,
        element: ElementDescriptor,
        added: Option<String>,
        removed: Option<String>,
    ) {
        let annotations = self.elements.entry(element).or_default();
        annotations.added_profile = added;
        annotations.removed_profile = removed;
    }

    /// Grants `module_id` friend access to a package
    pub fn add_friend(&mut self, package: &str, module_id: &str) {
        self.friends
            .entry(naming::normalize_package(package).to_string())
            .or_default()
            .insert(module_id.to_string());
    }

    /// Settings recorded for exactly this element
    pub fn annotations(&self, element: &ElementDescriptor) -> Option<&Annotations> {
        self.elements.get(element)
    }

    /// Settings of an element, with visibility inherited from the closest
    /// ancestor that has one. `None` when nothing on the path is known.
    pub fn resolve(&self, element: &ElementDescriptor) -> Option<Annotations> {
        let mut resolved = self.elements.get(element).cloned();
        let mut parent = element.parent();
        while resolved.as_ref().map_or(true, |a| a.visibility.is_none()) {
            let Some(current) = parent else {
                break;
            };
            if let Some(visibility) = self.elements.get(&current).and_then(|a| a.visibility) {
                resolved.get_or_insert_with(Annotations::default).visibility = Some(visibility);
            }
            parent = current.parent();
        }
        resolved
    }

    pub fn visibility(&self, element: &ElementDescriptor) -> Option<Visibility> {
        self.resolve(element).and_then(|a| a.visibility)
    }

    pub fn is_api(&self, package: &str) -> bool {
        self.visibility(&ElementDescriptor::package(package)) == Some(Visibility::Api)
    }

    pub fn friends(&self, package: &str) -> impl Iterator<Item = &str> {
        self.friends
            .get(naming::normalize_package(package))
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    pub fn is_friend(&self, package: &str, module_id: &str) -> bool {
        self.friends(package).any(|friend| friend == module_id)
    }

    pub fn has_package(&self, package: &str) -> bool {
        self.elements
            .contains_key(&ElementDescriptor::package(package))
    }

    /// Packages with a recorded setting, sorted
    pub fn package_names(&self) -> impl Iterator<Item = &str> {
        self.elements.keys().filter_map(|element| match element {
            ElementDescriptor::Package(name) => Some(name.as_str()),
            _ => None,
        })
    }

    pub fn elements(&self) -> impl Iterator<Item = (&ElementDescriptor, &Annotations)> {
        self.elements.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// A host's own description followed by those of its resolved fragments
///
/// Each part only describes the packages its module supplies, so the first
/// part that knows an element answers for it.
#[derive(Debug, Clone)]
pub struct CompositeApiDescription {
    parts: Vec<Arc<ApiDescription>>,
}

impl CompositeApiDescription {
    pub fn new(parts: Vec<Arc<ApiDescription>>) -> Self {
        Self { parts }
    }

    pub fn parts(&self) -> &[Arc<ApiDescription>] {
        &self.parts
    }

    pub fn resolve(&self, element: &ElementDescriptor) -> Option<Annotations> {
        self.parts.iter().find_map(|part| part.resolve(element))
    }

    pub fn visibility(&self, element: &ElementDescriptor) -> Option<Visibility> {
        self.resolve(element).and_then(|a| a.visibility)
    }

    pub fn is_api(&self, package: &str) -> bool {
        self.visibility(&ElementDescriptor::package(package)) == Some(Visibility::Api)
    }

    pub fn is_friend(&self, package: &str, module_id: &str) -> bool {
        self.parts
            .iter()
            .any(|part| part.is_friend(package, module_id))
    }

    /// Friend-restricted: private, but with a friend list
    pub fn is_friend_restricted(&self, package: &str) -> bool {
        self.parts
            .iter()
            .any(|part| part.friends(package).next().is_some())
    }

    pub fn friends(&self, package: &str) -> BTreeSet<&str> {
        self.parts
            .iter()
            .flat_map(|part| part.friends(package))
            .collect()
    }

    pub fn package_names(&self) -> BTreeSet<&str> {
        self.parts
            .iter()
            .flat_map(|part| part.package_names())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visibility_inherits_from_package() {
        let mut desc = ApiDescription::new("m");
        desc.set_visibility(ElementDescriptor::package("com.x"), Visibility::Api);
        desc.set_restrictions(
            ElementDescriptor::type_named("com.x.A"),
            Restrictions::NO_EXTEND,
        );

        let resolved = desc.resolve(&ElementDescriptor::type_named("com.x.A")).unwrap();
        assert_eq!(resolved.visibility, Some(Visibility::Api));
        assert_eq!(resolved.restrictions, Restrictions::NO_EXTEND);

        let method = ElementDescriptor::method("com.x.A$B", "run", "()V");
        assert_eq!(desc.visibility(&method), Some(Visibility::Api));
        assert!(desc.resolve(&ElementDescriptor::type_named("org.y.C")).is_none());
    }

    #[test]
    fn test_default_package_marker() {
        let mut desc = ApiDescription::new("m");
        desc.set_visibility(ElementDescriptor::package("."), Visibility::Private);
        assert!(desc.has_package(""));
        assert_eq!(
            desc.visibility(&ElementDescriptor::type_named("Top")),
            Some(Visibility::Private)
        );
    }

    #[test]
    fn test_composite_first_part_wins() {
        let mut host = ApiDescription::new("host");
        host.set_visibility(ElementDescriptor::package("h"), Visibility::Api);
        let mut fragment = ApiDescription::new("frag");
        fragment.set_visibility(ElementDescriptor::package("f"), Visibility::Private);
        fragment.add_friend("f", "buddy");

        let composite = CompositeApiDescription::new(vec![Arc::new(host), Arc::new(fragment)]);
        assert!(composite.is_api("h"));
        assert!(!composite.is_api("f"));
        assert!(composite.is_friend("f", "buddy"));
        assert!(composite.is_friend_restricted("f"));
        assert_eq!(composite.package_names().into_iter().collect::<Vec<_>>(), vec!["f", "h"]);
    }

    #[test]
    fn test_visibility_attribute_forms() {
        assert_eq!(Visibility::from_attribute("1"), Some(Visibility::Api));
        assert_eq!(Visibility::from_attribute("PRIVATE"), Some(Visibility::Private));
        assert_eq!(Visibility::from_attribute("bogus"), None);
    }
}
