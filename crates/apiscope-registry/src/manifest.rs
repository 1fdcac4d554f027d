//! Bundle manifest headers
//!
//! `META-INF/MANIFEST.MF` is a list of `Name: value` headers. Lines starting
//! with a single space continue the previous header. Header values use the
//! OSGi clause grammar: clauses separated by `,`, each made of one or more
//! values, `key=value` attributes and `key:=value` directives separated by
//! `;`. Quoted strings may contain either separator.

use apiscope_core::{naming, ModuleVersion, VersionRange};
use indexmap::IndexMap;

use crate::error::{ModelError, Result};

pub const BUNDLE_SYMBOLIC_NAME: &str = "Bundle-SymbolicName";
pub const BUNDLE_VERSION: &str = "Bundle-Version";
pub const BUNDLE_NAME: &str = "Bundle-Name";
pub const BUNDLE_CLASSPATH: &str = "Bundle-ClassPath";
pub const FRAGMENT_HOST: &str = "Fragment-Host";
pub const EXPORT_PACKAGE: &str = "Export-Package";
pub const IMPORT_PACKAGE: &str = "Import-Package";
pub const REQUIRE_BUNDLE: &str = "Require-Bundle";
pub const REQUIRED_EXECUTION_ENVIRONMENT: &str = "Bundle-RequiredExecutionEnvironment";
pub const SOURCE_BUNDLE: &str = "Eclipse-SourceBundle";

pub const MANIFEST_ENTRY: &str = "META-INF/MANIFEST.MF";

/// Raw manifest headers in file order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    headers: IndexMap<String, String>,
}

impl Manifest {
    /// Parses the main section of a manifest
    pub fn parse(text: &str) -> Result<Self> {
        let mut headers: IndexMap<String, String> = IndexMap::new();
        let mut last: Option<String> = None;

        for line in text.lines() {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.is_empty() {
                // end of the main section
                break;
            }
            if let Some(rest) = line.strip_prefix(' ') {
                let Some(value) = last.as_ref().and_then(|name| headers.get_mut(name)) else {
                    return Err(ModelError::InvalidModule(
                        "manifest starts with a continuation line".into(),
                    ));
                };
                value.push_str(rest);
                continue;
            }
            let Some((name, value)) = line.split_once(':') else {
                return Err(ModelError::InvalidModule(format!(
                    "malformed manifest line '{}'",
                    line
                )));
            };
            let name = name.trim().to_string();
            headers.insert(name.clone(), value.trim_start().to_string());
            last = Some(name);
        }
        Ok(Self { headers })
    }

    /// Header lookup, ignoring ASCII case of the name
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parsed clauses of a header, empty when the header is absent
    pub fn elements(&self, name: &str) -> Result<Vec<ManifestElement>> {
        match self.get(name) {
            Some(value) => ManifestElement::parse_header(name, value),
            None => Ok(Vec::new()),
        }
    }
}

/// One clause of a header value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestElement {
    pub values: Vec<String>,
    pub attributes: IndexMap<String, String>,
    pub directives: IndexMap<String, String>,
}

impl ManifestElement {
    pub fn parse_header(header: &str, value: &str) -> Result<Vec<Self>> {
        let mut elements = Vec::new();
        for clause in split_unquoted(header, value, ',')? {
            if clause.trim().is_empty() {
                continue;
            }
            let mut element = ManifestElement::default();
            for part in split_unquoted(header, &clause, ';')? {
                let part = part.trim();
                if part.is_empty() {
                    continue;
                }
                if let Some((key, val)) = split_key_value(part, ":=") {
                    element.directives.insert(key, val);
                } else if let Some((key, val)) = split_key_value(part, "=") {
                    element.attributes.insert(key, val);
                } else {
                    element.values.push(unquote(part).to_string());
                }
            }
            if element.values.is_empty() {
                return Err(ModelError::header(header, value, "clause without a value"));
            }
            elements.push(element);
        }
        Ok(elements)
    }

    /// The first value of the clause
    pub fn value(&self) -> &str {
        self.values.first().map(String::as_str).unwrap_or_default()
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn directive(&self, key: &str) -> Option<&str> {
        self.directives.get(key).map(String::as_str)
    }
}

/// Splits at `separator` outside double quotes
fn split_unquoted(header: &str, value: &str, separator: char) -> Result<Vec<String>> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for c in value.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                current.push(c);
            }
            c if c == separator && !quoted => parts.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    if quoted {
        return Err(ModelError::header(header, value, "unterminated quoted string"));
    }
    parts.push(current);
    Ok(parts)
}

fn split_key_value(part: &str, operator: &str) -> Option<(String, String)> {
    let quote = part.find('"').unwrap_or(part.len());
    let idx = part.find(operator).filter(|idx| *idx < quote)?;
    // `:=` also contains `=`; keep attributes from swallowing directives
    if operator == "=" && idx > 0 && part.as_bytes()[idx - 1] == b':' {
        return None;
    }
    let key = part[..idx].trim().to_string();
    let value = unquote(part[idx + operator.len()..].trim()).to_string();
    Some((key, value))
}

fn unquote(value: &str) -> &str {
    let value = value.trim();
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

/// An `Export-Package` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPackage {
    pub name: String,
    pub version: ModuleVersion,
    pub internal: bool,
    pub friends: Option<Vec<String>>,
}

impl ExportPackage {
    /// Package name with the default-package marker translated
    pub fn package_name(&self) -> &str {
        naming::normalize_package(&self.name)
    }
}

/// An `Import-Package` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportPackage {
    pub name: String,
    pub range: VersionRange,
    pub optional: bool,
}

/// A `Require-Bundle` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequireBundle {
    pub name: String,
    pub range: VersionRange,
    pub optional: bool,
    pub reexport: bool,
}

/// The `Fragment-Host` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSpec {
    pub name: String,
    pub range: VersionRange,
}

/// Typed view of the bundle headers the model needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleManifest {
    pub headers: Manifest,
    pub symbolic_name: String,
    pub singleton: bool,
    pub version: ModuleVersion,
    pub name: Option<String>,
    pub classpath: Vec<String>,
    pub fragment_host: Option<HostSpec>,
    pub exports: Vec<ExportPackage>,
    pub imports: Vec<ImportPackage>,
    pub requires: Vec<RequireBundle>,
    pub execution_environments: Vec<String>,
    pub source_bundle: bool,
}

impl BundleManifest {
    pub fn parse(text: &str) -> Result<Self> {
        Self::from_manifest(Manifest::parse(text)?)
    }

    /// Fails with [`ModelError::InvalidModule`] unless the symbolic name and
    /// version headers are present
    pub fn from_manifest(headers: Manifest) -> Result<Self> {
        let Some(symbolic) = headers.elements(BUNDLE_SYMBOLIC_NAME)?.into_iter().next() else {
            return Err(ModelError::InvalidModule(format!(
                "missing {} header",
                BUNDLE_SYMBOLIC_NAME
            )));
        };
        let Some(version) = headers.get(BUNDLE_VERSION) else {
            return Err(ModelError::InvalidModule(format!(
                "{} has no {} header",
                symbolic.value(),
                BUNDLE_VERSION
            )));
        };
        let version = ModuleVersion::parse(version)
            .map_err(|e| ModelError::header(BUNDLE_VERSION, version, e.to_string()))?;

        let classpath: Vec<String> = headers
            .elements(BUNDLE_CLASSPATH)?
            .into_iter()
            .flat_map(|element| element.values)
            .collect();
        let classpath = if classpath.is_empty() {
            vec![".".to_string()]
        } else {
            classpath
        };

        let fragment_host = match headers.elements(FRAGMENT_HOST)?.into_iter().next() {
            Some(host) => Some(HostSpec {
                name: host.value().to_string(),
                range: range_attribute(&host, "bundle-version", FRAGMENT_HOST)?,
            }),
            None => None,
        };

        let mut exports = Vec::new();
        for element in headers.elements(EXPORT_PACKAGE)? {
            let version = match element.attribute("version") {
                Some(v) => ModuleVersion::parse(v)
                    .map_err(|e| ModelError::header(EXPORT_PACKAGE, v, e.to_string()))?,
                None => ModuleVersion::empty(),
            };
            let internal = element
                .directive("x-internal")
                .is_some_and(|v| v.eq_ignore_ascii_case("true"));
            let friends = element.directive("x-friends").map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            });
            for name in &element.values {
                exports.push(ExportPackage {
                    name: name.clone(),
                    version: version.clone(),
                    internal,
                    friends: friends.clone(),
                });
            }
        }

        let mut imports = Vec::new();
        for element in headers.elements(IMPORT_PACKAGE)? {
            let range = range_attribute(&element, "version", IMPORT_PACKAGE)?;
            let optional = element.directive("resolution") == Some("optional");
            for name in &element.values {
                imports.push(ImportPackage {
                    name: name.clone(),
                    range: range.clone(),
                    optional,
                });
            }
        }

        let mut requires = Vec::new();
        for element in headers.elements(REQUIRE_BUNDLE)? {
            requires.push(RequireBundle {
                name: element.value().to_string(),
                range: range_attribute(&element, "bundle-version", REQUIRE_BUNDLE)?,
                optional: element.directive("resolution") == Some("optional"),
                reexport: element.directive("visibility") == Some("reexport"),
            });
        }

        let execution_environments = headers
            .elements(REQUIRED_EXECUTION_ENVIRONMENT)?
            .into_iter()
            .flat_map(|element| element.values)
            .collect();

        Ok(Self {
            symbolic_name: symbolic.value().to_string(),
            singleton: symbolic.directive("singleton") == Some("true"),
            version,
            name: headers.get(BUNDLE_NAME).map(str::to_string),
            classpath,
            fragment_host,
            exports,
            imports,
            requires,
            execution_environments,
            source_bundle: headers.contains(SOURCE_BUNDLE),
            headers,
        })
    }

    pub fn is_fragment(&self) -> bool {
        self.fragment_host.is_some()
    }
}

fn range_attribute(element: &ManifestElement, key: &str, header: &str) -> Result<VersionRange> {
    match element.attribute(key) {
        Some(value) => VersionRange::parse(value)
            .map_err(|e| ModelError::header(header, value, e.to_string())),
        None => Ok(VersionRange::any()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_continuation_lines() {
        let manifest = Manifest::parse(
            "Manifest-Version: 1.0\r\nExport-Package: com.x,com.\r\n y.z\r\n\r\nName: ignored\r\n",
        )
        .unwrap();
        assert_eq!(manifest.get("export-package"), Some("com.x,com.y.z"));
        assert!(!manifest.contains("Name"));
    }

    #[test]
    fn test_clause_grammar() {
        let elements = ManifestElement::parse_header(
            EXPORT_PACKAGE,
            r#"com.a;com.b;version="1.2.0";x-friends:="f.one, f.two",com.c;x-internal:=true"#,
        )
        .unwrap();
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[0].values, vec!["com.a", "com.b"]);
        assert_eq!(elements[0].attribute("version"), Some("1.2.0"));
        assert_eq!(elements[0].directive("x-friends"), Some("f.one, f.two"));
        assert_eq!(elements[1].directive("x-internal"), Some("true"));
        assert!(elements[1].attribute("x-internal").is_none());
    }

    #[test]
    fn test_unterminated_quote() {
        let err = ManifestElement::parse_header(IMPORT_PACKAGE, r#"a;version="[1,2)"#).unwrap_err();
        assert!(err.to_string().contains("unterminated"));
    }

    #[test]
    fn test_bundle_manifest() {
        let manifest = BundleManifest::parse(concat!(
            "Bundle-SymbolicName: a.b;singleton:=true\n",
            "Bundle-Version: 1.2.3.qualifier\n",
            "Bundle-ClassPath: .,lib/util.jar\n",
            "Export-Package: a.b;version=\"1.0\",a.b.internal;x-internal:=true,\n",
            " a.b.friend;x-friends:=\"c.d\"\n",
            "Import-Package: org.x;version=\"[1.0,2.0)\";resolution:=optional\n",
            "Require-Bundle: c.d;bundle-version=\"3.0.0\";visibility:=reexport\n",
            "Bundle-RequiredExecutionEnvironment: JavaSE-11,JavaSE-17\n",
        ))
        .unwrap();

        assert_eq!(manifest.symbolic_name, "a.b");
        assert!(manifest.singleton);
        assert_eq!(manifest.version.to_string(), "1.2.3.qualifier");
        assert_eq!(manifest.classpath, vec![".", "lib/util.jar"]);
        assert_eq!(manifest.exports.len(), 3);
        assert!(manifest.exports[1].internal);
        assert_eq!(manifest.exports[2].friends, Some(vec!["c.d".to_string()]));
        assert!(manifest.imports[0].optional);
        assert!(manifest.imports[0].range.includes(&ModuleVersion::new(1, 5, 0)));
        assert!(!manifest.imports[0].range.includes(&ModuleVersion::new(2, 0, 0)));
        assert!(manifest.requires[0].reexport);
        assert_eq!(manifest.execution_environments, vec!["JavaSE-11", "JavaSE-17"]);
        assert!(!manifest.is_fragment());
        assert!(!manifest.source_bundle);
    }

    #[test]
    fn test_missing_version_is_invalid() {
        let err = BundleManifest::parse("Bundle-SymbolicName: a\n").unwrap_err();
        assert!(matches!(err, ModelError::InvalidModule(_)));
        let err = BundleManifest::parse("Manifest-Version: 1.0\n").unwrap_err();
        assert!(matches!(err, ModelError::InvalidModule(_)));
    }

    #[test]
    fn test_default_classpath_and_fragment_host() {
        let manifest = BundleManifest::parse(
            "Bundle-SymbolicName: frag\nBundle-Version: 1\nFragment-Host: host;bundle-version=\"[1.0.0,2.0.0)\"\n",
        )
        .unwrap();
        assert_eq!(manifest.classpath, vec!["."]);
        let host = manifest.fragment_host.unwrap();
        assert_eq!(host.name, "host");
        assert!(host.range.includes(&ModuleVersion::new(1, 9, 9)));
    }
}
