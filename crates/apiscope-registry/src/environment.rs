//! Execution-environment profiles and installed runtimes
//!
//! A profile is a `.properties` resource named after its environment id
//! (`JavaSE-11` → `JavaSE-11.profile`, `/` becomes `_`). Profiles are read
//! once per id and memoized for the life of the registry.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ModelError, Result};

pub const SYSTEM_PACKAGES_KEY: &str = "org.osgi.framework.system.packages";
pub const PROFILE_NAME_KEY: &str = "osgi.java.profile.name";
pub const EXECUTION_ENVIRONMENT_KEY: &str = "org.osgi.framework.executionenvironment";

/// Parses Java `.properties` text
///
/// Supports `#`/`!` comments, `=`, `:` or whitespace separators, backslash
/// line continuations and the usual escapes.
pub fn parse_properties(text: &str) -> BTreeMap<String, String> {
    let mut properties = BTreeMap::new();
    let mut logical = String::new();

    for raw in text.lines() {
        let line = if logical.is_empty() {
            raw.trim_start()
        } else {
            raw.trim_start()
        };
        if logical.is_empty() && (line.is_empty() || line.starts_with('#') || line.starts_with('!'))
        {
            continue;
        }
        let trailing = line.chars().rev().take_while(|c| *c == '\\').count();
        if trailing % 2 == 1 {
            logical.push_str(&line[..line.len() - 1]);
            continue;
        }
        logical.push_str(line);
        let (key, value) = split_property(&logical);
        properties.insert(key, value);
        logical.clear();
    }
    if !logical.is_empty() {
        let (key, value) = split_property(&logical);
        properties.insert(key, value);
    }
    properties
}

fn split_property(line: &str) -> (String, String) {
    let mut key_end = line.len();
    let mut escaped = false;
    for (idx, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' | ' ' | '\t' => {
                key_end = idx;
                break;
            }
            _ => {}
        }
    }
    let key = &line[..key_end];
    let mut rest = line[key_end..].trim_start_matches([' ', '\t']);
    if let Some(stripped) = rest.strip_prefix(['=', ':']) {
        rest = stripped.trim_start_matches([' ', '\t']);
    }
    (unescape(key), unescape(rest))
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\u{c}'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => out.push_str(&hex),
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// One execution environment: its name and the packages the runtime supplies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub id: String,
    pub profile_name: String,
    pub system_packages: BTreeSet<String>,
    pub execution_environments: Vec<String>,
}

impl Profile {
    pub fn from_properties(id: &str, text: &str) -> Result<Self> {
        let properties = parse_properties(text);
        let profile_name = properties
            .get(PROFILE_NAME_KEY)
            .cloned()
            .ok_or_else(|| ModelError::Profile {
                id: id.to_string(),
                reason: format!("missing '{}'", PROFILE_NAME_KEY),
            })?;
        let split = |key: &str| -> Vec<String> {
            properties
                .get(key)
                .map(|value| {
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|p| !p.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default()
        };
        Ok(Self {
            id: id.to_string(),
            profile_name,
            system_packages: split(SYSTEM_PACKAGES_KEY).into_iter().collect(),
            execution_environments: split(EXECUTION_ENVIRONMENT_KEY),
        })
    }

    pub fn file_name(id: &str) -> String {
        format!("{}.profile", id.replace('/', "_"))
    }
}

const JAVASE_8_PACKAGES: &str = "javax.accessibility,javax.activation,javax.annotation,\
javax.annotation.processing,javax.crypto,javax.crypto.spec,javax.imageio,javax.lang.model,\
javax.lang.model.element,javax.lang.model.type,javax.management,javax.naming,javax.net,\
javax.net.ssl,javax.script,javax.security.auth,javax.security.cert,javax.sql,javax.swing,\
javax.tools,javax.xml,javax.xml.bind,javax.xml.parsers,javax.xml.stream,javax.xml.transform,\
javax.xml.ws,javax.xml.xpath,org.ietf.jgss,org.w3c.dom,org.xml.sax,org.xml.sax.helpers";

const JAVASE_11_PACKAGES: &str = "javax.accessibility,javax.annotation.processing,\
javax.crypto,javax.crypto.spec,javax.imageio,javax.lang.model,javax.lang.model.element,\
javax.lang.model.type,javax.management,javax.naming,javax.net,javax.net.ssl,javax.script,\
javax.security.auth,javax.security.cert,javax.sql,javax.swing,javax.tools,javax.xml,\
javax.xml.parsers,javax.xml.stream,javax.xml.transform,javax.xml.xpath,org.ietf.jgss,\
org.w3c.dom,org.xml.sax,org.xml.sax.helpers";

/// Profiles known without any profile directory
const BUILT_IN: &[(&str, &str)] = &[
    ("JavaSE-1.8", JAVASE_8_PACKAGES),
    ("JavaSE-11", JAVASE_11_PACKAGES),
    ("JavaSE-17", JAVASE_11_PACKAGES),
    ("JavaSE-21", JAVASE_11_PACKAGES),
];

fn built_in(id: &str) -> Option<Profile> {
    BUILT_IN
        .iter()
        .find(|(known, _)| *known == id)
        .map(|(id, packages)| Profile {
            id: id.to_string(),
            profile_name: id.to_string(),
            system_packages: packages.split(',').map(str::to_string).collect(),
            execution_environments: vec![id.to_string()],
        })
}

/// Memoized profile lookup
#[derive(Debug, Default)]
pub struct ProfileRegistry {
    profile_dir: Option<PathBuf>,
    profiles: DashMap<String, Arc<Profile>>,
}

impl ProfileRegistry {
    pub fn new(profile_dir: Option<PathBuf>) -> Self {
        Self {
            profile_dir,
            profiles: DashMap::new(),
        }
    }

    /// Profile for an environment id: the profile directory first, then
    /// the built-in table. `Ok(None)` for unknown ids.
    pub fn profile(&self, id: &str) -> Result<Option<Arc<Profile>>> {
        if let Some(profile) = self.profiles.get(id) {
            return Ok(Some(profile.clone()));
        }

        let loaded = match self.read_profile_file(id)? {
            Some(profile) => Some(profile),
            None => built_in(id),
        };
        Ok(loaded.map(|profile| {
            debug!("Loaded execution environment profile {}", id);
            self.profiles
                .entry(id.to_string())
                .or_insert_with(|| Arc::new(profile))
                .clone()
        }))
    }

    fn read_profile_file(&self, id: &str) -> Result<Option<Profile>> {
        let Some(dir) = &self.profile_dir else {
            return Ok(None);
        };
        let path = dir.join(Profile::file_name(id));
        if !path.is_file() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path).map_err(|e| ModelError::io(&path, e))?;
        Profile::from_properties(id, &text).map(Some)
    }

    pub fn known_ids(&self) -> Vec<String> {
        let mut ids: BTreeSet<String> = BUILT_IN.iter().map(|(id, _)| id.to_string()).collect();
        if let Some(dir) = &self.profile_dir {
            if let Ok(entries) = fs::read_dir(dir) {
                for entry in entries.flatten() {
                    let name = entry.file_name().to_string_lossy().to_string();
                    if let Some(stem) = name.strip_suffix(".profile") {
                        ids.insert(stem.to_string());
                    }
                }
            }
        }
        ids.into_iter().collect()
    }
}

/// A runtime installed on this machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledRuntime {
    pub id: String,
    pub java_version: String,
    pub path: PathBuf,
    /// Environment ids this runtime can execute
    #[serde(default)]
    pub environments: Vec<String>,
}

impl InstalledRuntime {
    pub fn is_compatible(&self, environment: &str) -> bool {
        self.environments.iter().any(|e| e == environment)
    }
}

/// Enumerates installed runtimes
pub trait RuntimeProvider: Send + Sync {
    fn runtimes(&self) -> Vec<InstalledRuntime>;
}

/// A fixed list of runtimes, typically from configuration
#[derive(Debug, Clone, Default)]
pub struct StaticRuntimes {
    runtimes: Vec<InstalledRuntime>,
}

impl StaticRuntimes {
    pub fn new(runtimes: Vec<InstalledRuntime>) -> Self {
        Self { runtimes }
    }
}

impl RuntimeProvider for StaticRuntimes {
    fn runtimes(&self) -> Vec<InstalledRuntime> {
        self.runtimes.clone()
    }
}

/// Numeric segments of a version string and whether it had nothing else
fn version_segments(version: &str) -> (Vec<u64>, bool) {
    let mut numeric = true;
    let mut segments = Vec::new();
    for part in version.split(['.', '_', '-', '+']) {
        let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
        if digits.len() != part.len() {
            numeric = false;
        }
        if digits.is_empty() {
            break;
        }
        segments.push(digits.parse().unwrap_or(0));
    }
    (segments, numeric)
}

/// Orders runtime versions: higher numbers first, then fully numeric
/// versions, then the lexicographically newer string
pub fn compare_runtime_versions(a: &str, b: &str) -> Ordering {
    let (a_segments, a_numeric) = version_segments(a);
    let (b_segments, b_numeric) = version_segments(b);
    a_segments
        .cmp(&b_segments)
        .then(a_numeric.cmp(&b_numeric))
        .then_with(|| a.cmp(b))
}

/// Outcome of binding execution environments to runtimes
///
/// Unsatisfied requirements are advisory; resolution goes on without them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentStatus {
    pub bindings: BTreeMap<String, InstalledRuntime>,
    pub unsatisfied: BTreeSet<String>,
}

impl EnvironmentStatus {
    pub fn is_ok(&self) -> bool {
        self.unsatisfied.is_empty()
    }
}

/// Picks the highest compatible runtime for every requirement
pub fn select_runtimes(
    requirements: &BTreeSet<String>,
    runtimes: &[InstalledRuntime],
) -> EnvironmentStatus {
    let mut status = EnvironmentStatus::default();
    for requirement in requirements {
        let best = runtimes
            .iter()
            .filter(|runtime| runtime.is_compatible(requirement))
            .max_by(|a, b| compare_runtime_versions(&a.java_version, &b.java_version));
        match best {
            Some(runtime) => {
                debug!("{} bound to runtime {}", requirement, runtime.id);
                status.bindings.insert(requirement.clone(), runtime.clone());
            }
            None => {
                info!("No installed runtime satisfies {}", requirement);
                status.unsatisfied.insert(requirement.clone());
            }
        }
    }
    status
}

/// Whether `path` looks like a runtime home with `jmods/`
pub(crate) fn jmods_dir(path: &Path) -> Option<PathBuf> {
    let jmods = path.join("jmods");
    jmods.is_dir().then_some(jmods)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_properties_grammar() {
        let props = parse_properties(concat!(
            "# comment\n",
            "! also a comment\n",
            "a=1\n",
            "b : two words\n",
            "c three\n",
            "long = x,\\\n",
            "       y,\\\n",
            "       z\n",
            "esc=tab\\there\\u0041\n",
        ));
        assert_eq!(props["a"], "1");
        assert_eq!(props["b"], "two words");
        assert_eq!(props["c"], "three");
        assert_eq!(props["long"], "x,y,z");
        assert_eq!(props["esc"], "tab\thereA");
        assert_eq!(props.len(), 5);
    }

    #[test]
    fn test_profile_requires_name() {
        let profile = Profile::from_properties(
            "JavaSE-X",
            "osgi.java.profile.name = JavaSE-X\norg.osgi.framework.system.packages = javax.a,\\\n javax.b\n",
        )
        .unwrap();
        assert_eq!(profile.profile_name, "JavaSE-X");
        assert!(profile.system_packages.contains("javax.b"));

        let err = Profile::from_properties("bad", "a=b").unwrap_err();
        assert!(matches!(err, ModelError::Profile { .. }));
        assert_eq!(Profile::file_name("J2SE/1.5"), "J2SE_1.5.profile");
    }

    #[test]
    fn test_runtime_version_order() {
        assert_eq!(compare_runtime_versions("17.0.2", "11.0.20"), Ordering::Greater);
        assert_eq!(compare_runtime_versions("17", "17-ea"), Ordering::Greater);
        assert_eq!(compare_runtime_versions("1.8.0_292", "1.8.0_301"), Ordering::Less);
    }

    #[test]
    fn test_select_runtimes() {
        let runtime = |id: &str, version: &str, envs: &[&str]| InstalledRuntime {
            id: id.into(),
            java_version: version.into(),
            path: PathBuf::from(id),
            environments: envs.iter().map(|e| e.to_string()).collect(),
        };
        let runtimes = vec![
            runtime("jdk11", "11.0.2", &["JavaSE-11"]),
            runtime("jdk17", "17.0.1", &["JavaSE-11", "JavaSE-17"]),
            runtime("jdk17-ea", "17-ea", &["JavaSE-17"]),
        ];
        let requirements: BTreeSet<String> = ["JavaSE-11", "JavaSE-17", "JavaSE-99"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let status = select_runtimes(&requirements, &runtimes);
        assert_eq!(status.bindings["JavaSE-11"].id, "jdk17");
        assert_eq!(status.bindings["JavaSE-17"].id, "jdk17");
        assert_eq!(
            status.unsatisfied.iter().collect::<Vec<_>>(),
            vec!["JavaSE-99"]
        );
        assert!(!status.is_ok());
    }
}
