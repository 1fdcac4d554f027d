//! The `.api_description` sidecar document
//!
//! ```xml
//! <component name="a.b" version="1.2">
//!   <package name="a.b">
//!     <type name="Widget" restrictions="1">
//!       <method name="paint" signature="()V" restrictions="16"/>
//!       <field name="count" restrictions="8"/>
//!     </type>
//!   </package>
//! </component>
//! ```
//!
//! Type names are relative to their package. Package visibility always comes
//! from the manifest, so a `visibility` on a `package` element is written but
//! not read back.

use std::collections::BTreeMap;

use apiscope_core::{naming, ModuleVersion};
use serde::{Deserialize, Serialize};

use super::{ApiDescription, ElementDescriptor, Restrictions, Visibility};
use crate::error::{ModelError, Result};

/// Entry name of the sidecar at the root of a bundle
pub const API_DESCRIPTION_ENTRY: &str = ".api_description";

/// Format version written by [`to_xml`]
pub const CURRENT_VERSION: &str = "1.2";

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename = "component")]
struct ComponentXml {
    #[serde(rename = "@name", default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(rename = "@version", default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(rename = "package", default)]
    packages: Vec<PackageXml>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PackageXml {
    #[serde(rename = "@name", default)]
    name: String,
    #[serde(rename = "@visibility", default, skip_serializing_if = "Option::is_none")]
    visibility: Option<String>,
    #[serde(rename = "type", default)]
    types: Vec<ElementXml>,
}

/// A `type`, `method` or `field` element
#[derive(Debug, Default, Serialize, Deserialize)]
struct ElementXml {
    #[serde(rename = "@name", default)]
    name: String,
    #[serde(rename = "@signature", default, skip_serializing_if = "Option::is_none")]
    signature: Option<String>,
    #[serde(rename = "@visibility", default, skip_serializing_if = "Option::is_none")]
    visibility: Option<String>,
    #[serde(rename = "@restrictions", default, skip_serializing_if = "Option::is_none")]
    restrictions: Option<String>,
    #[serde(rename = "@addedprofile", default, skip_serializing_if = "Option::is_none")]
    added_profile: Option<String>,
    #[serde(rename = "@removedprofile", default, skip_serializing_if = "Option::is_none")]
    removed_profile: Option<String>,
    // boolean attributes written by tools predating `restrictions`
    #[serde(rename = "@extend", default, skip_serializing)]
    extend: Option<String>,
    #[serde(rename = "@subclass", default, skip_serializing)]
    subclass: Option<String>,
    #[serde(rename = "@implement", default, skip_serializing)]
    implement: Option<String>,
    #[serde(rename = "@instantiate", default, skip_serializing)]
    instantiate: Option<String>,
    #[serde(rename = "@reference", default, skip_serializing)]
    reference: Option<String>,
    #[serde(rename = "@override", default, skip_serializing)]
    override_: Option<String>,
    #[serde(rename = "method", default)]
    methods: Vec<ElementXml>,
    #[serde(rename = "field", default)]
    fields: Vec<ElementXml>,
}

#[derive(Clone, Copy)]
enum Kind {
    Type,
    Method { constructor: bool },
    Field,
}

/// A legacy boolean attribute set to anything but `true` adds `flag`
fn legacy(value: &Option<String>, flag: Restrictions, restrictions: &mut Restrictions) {
    if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
        if !value.eq_ignore_ascii_case("true") {
            restrictions.insert(flag);
        }
    }
}

impl ElementXml {
    fn restrictions(&self, kind: Kind, before_no_extend: bool) -> Restrictions {
        if let Some(bits) = self.restrictions.as_deref() {
            return Restrictions::from_bits_truncate(bits.trim().parse().unwrap_or(0));
        }
        let mut restrictions = Restrictions::empty();
        match kind {
            Kind::Field => legacy(&self.reference, Restrictions::NO_REFERENCE, &mut restrictions),
            Kind::Method { constructor } => {
                legacy(&self.reference, Restrictions::NO_REFERENCE, &mut restrictions);
                if !constructor {
                    legacy(&self.override_, Restrictions::NO_OVERRIDE, &mut restrictions);
                }
            }
            Kind::Type => {
                legacy(&self.implement, Restrictions::NO_IMPLEMENT, &mut restrictions);
                // older documents used @noimplement to also mean @noextend
                if before_no_extend && restrictions.contains(Restrictions::NO_IMPLEMENT) {
                    restrictions.insert(Restrictions::NO_EXTEND);
                }
                legacy(&self.extend, Restrictions::NO_EXTEND, &mut restrictions);
                if !restrictions.contains(Restrictions::NO_EXTEND) {
                    legacy(&self.subclass, Restrictions::NO_EXTEND, &mut restrictions);
                }
                legacy(&self.instantiate, Restrictions::NO_INSTANTIATE, &mut restrictions);
            }
        }
        restrictions
    }

    fn apply(
        &self,
        description: &mut ApiDescription,
        element: ElementDescriptor,
        kind: Kind,
        before_no_extend: bool,
    ) {
        if let Some(visibility) = self.visibility.as_deref().and_then(Visibility::from_attribute) {
            description.set_visibility(element.clone(), visibility);
        }
        description.set_restrictions(element.clone(), self.restrictions(kind, before_no_extend));
        if self.added_profile.is_some() || self.removed_profile.is_some() {
            description.set_profiles(
                element,
                self.added_profile.clone(),
                self.removed_profile.clone(),
            );
        }
    }

    fn from_annotations(name: &str, annotations: &super::Annotations) -> Self {
        Self {
            name: name.to_string(),
            visibility: annotations.visibility.map(|v| v.bits().to_string()),
            restrictions: (!annotations.restrictions.is_empty())
                .then(|| annotations.restrictions.bits().to_string()),
            added_profile: annotations.added_profile.clone(),
            removed_profile: annotations.removed_profile.clone(),
            ..Default::default()
        }
    }
}

fn qualify(package: &str, type_name: &str) -> String {
    if package.is_empty() {
        type_name.to_string()
    } else {
        format!("{}.{}", package, type_name)
    }
}

/// Refines `description` with the settings of a sidecar document
pub fn apply(description: &mut ApiDescription, xml: &str) -> Result<()> {
    let module = description.module_id().to_string();
    let component: ComponentXml =
        quick_xml::de::from_str(xml).map_err(|source| ModelError::ApiDescription {
            module: module.clone(),
            source,
        })?;

    let before_no_extend = component
        .version
        .as_deref()
        .and_then(|v| ModuleVersion::parse(v).ok())
        .is_some_and(|v| v < ModuleVersion::new(1, 2, 0));
    description.set_embedded_version(component.version.clone());

    for package in &component.packages {
        for ty in &package.types {
            if ty.name.is_empty() {
                return Err(ModelError::ApiDescriptionContent {
                    module,
                    reason: format!("type without a name in package '{}'", package.name),
                });
            }
            let type_name = qualify(&package.name, &ty.name);
            ty.apply(
                description,
                ElementDescriptor::type_named(&type_name),
                Kind::Type,
                before_no_extend,
            );
            for method in &ty.methods {
                // old documents use '.' in signatures
                let signature = method.signature.as_deref().unwrap_or_default().replace('.', "/");
                method.apply(
                    description,
                    ElementDescriptor::method(&type_name, &method.name, &signature),
                    Kind::Method {
                        constructor: method.name == "<init>",
                    },
                    before_no_extend,
                );
            }
            for field in &ty.fields {
                field.apply(
                    description,
                    ElementDescriptor::field(&type_name, &field.name),
                    Kind::Field,
                    before_no_extend,
                );
            }
        }
    }
    Ok(())
}

/// Writes a description as a sidecar document
pub fn to_xml(description: &ApiDescription) -> Result<String> {
    let mut packages: BTreeMap<&str, PackageXml> = BTreeMap::new();
    let mut types: BTreeMap<&str, ElementXml> = BTreeMap::new();

    for (element, annotations) in description.elements() {
        match element {
            ElementDescriptor::Package(name) => {
                let package = packages.entry(name).or_insert_with(|| PackageXml {
                    name: name.clone(),
                    ..Default::default()
                });
                package.visibility = annotations.visibility.map(|v| v.bits().to_string());
            }
            ElementDescriptor::Type(type_name) => {
                let methods = types
                    .remove(type_name.as_str())
                    .map(|ty| (ty.methods, ty.fields))
                    .unwrap_or_default();
                let mut ty = ElementXml::from_annotations(type_name, annotations);
                (ty.methods, ty.fields) = methods;
                types.insert(type_name, ty);
            }
            ElementDescriptor::Method {
                type_name,
                name,
                signature,
            } => {
                let mut method = ElementXml::from_annotations(name, annotations);
                method.signature = Some(signature.clone());
                types.entry(type_name).or_default().methods.push(method);
            }
            ElementDescriptor::Field { type_name, name } => types
                .entry(type_name)
                .or_default()
                .fields
                .push(ElementXml::from_annotations(name, annotations)),
        }
    }

    for (type_name, mut ty) in types {
        let package = naming::package_name(type_name);
        ty.name = match package {
            "" => type_name.to_string(),
            _ => type_name[package.len() + 1..].to_string(),
        };
        packages
            .entry(package)
            .or_insert_with(|| PackageXml {
                name: package.to_string(),
                ..Default::default()
            })
            .types
            .push(ty);
    }

    let component = ComponentXml {
        name: Some(description.module_id().to_string()),
        version: Some(CURRENT_VERSION.to_string()),
        packages: packages.into_values().collect(),
    };
    quick_xml::se::to_string(&component).map_err(|source| ModelError::ApiDescription {
        module: description.module_id().to_string(),
        source,
    })
}
