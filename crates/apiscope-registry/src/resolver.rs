//! Wiring of bundles, fragments and package imports
//!
//! The baseline does not resolve version constraints itself. It hands its
//! bundle manifests to a [`ModuleResolver`] and only consumes the resulting
//! [`ResolvedState`]: who hosts which fragment, which packages each module
//! can see, and what failed to resolve.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use apiscope_core::{naming, ModuleVersion, VersionRange};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use thiserror::Error;
use tracing::{debug, warn};

use crate::manifest::BundleManifest;

/// Identity of one module version inside a baseline
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleKey {
    pub id: String,
    pub version: ModuleVersion,
}

impl ModuleKey {
    pub fn new(id: impl Into<String>, version: ModuleVersion) -> Self {
        Self {
            id: id.into(),
            version,
        }
    }
}

impl fmt::Display for ModuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.version)
    }
}

/// A bundle handed to the resolver
#[derive(Debug, Clone)]
pub struct ResolverBundle {
    pub key: ModuleKey,
    pub manifest: Arc<BundleManifest>,
}

/// Why a constraint could not be satisfied
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolverError {
    #[error("Missing host {name} {range}")]
    MissingHost { name: String, range: String },

    #[error("Missing imported package {name} {range}")]
    MissingImport { name: String, range: String },

    #[error("Missing required bundle {name} {range}")]
    MissingRequire { name: String, range: String },
}

/// Kind of dependency between two resolved modules
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Wire {
    Host,
    Import(String),
    Require,
}

/// A package a module can load, with the module that exports it
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VisiblePackage {
    pub name: String,
    pub exporter: ModuleKey,
}

/// Output of a resolver run
#[derive(Debug, Clone, Default)]
pub struct ResolvedState {
    graph: DiGraph<ModuleKey, Wire>,
    nodes: HashMap<ModuleKey, NodeIndex>,
    hosts: BTreeMap<ModuleKey, Vec<ModuleKey>>,
    fragments: BTreeMap<ModuleKey, Vec<ModuleKey>>,
    visible: HashMap<ModuleKey, Vec<VisiblePackage>>,
    errors: BTreeMap<ModuleKey, Vec<ResolverError>>,
}

impl ResolvedState {
    fn add_node(&mut self, key: &ModuleKey) -> NodeIndex {
        if let Some(index) = self.nodes.get(key) {
            return *index;
        }
        let index = self.graph.add_node(key.clone());
        self.nodes.insert(key.clone(), index);
        index
    }

    fn add_wire(&mut self, from: &ModuleKey, to: &ModuleKey, wire: Wire) {
        let from = self.add_node(from);
        let to = self.add_node(to);
        if from != to {
            self.graph.add_edge(from, to, wire);
        }
    }

    fn add_error(&mut self, key: &ModuleKey, error: ResolverError) {
        warn!("{}: {}", key, error);
        self.errors.entry(key.clone()).or_default().push(error);
    }

    /// Hosts a fragment is attached to
    pub fn hosts(&self, fragment: &ModuleKey) -> &[ModuleKey] {
        self.hosts.get(fragment).map(Vec::as_slice).unwrap_or_default()
    }

    /// Fragments attached to a host
    pub fn fragments(&self, host: &ModuleKey) -> &[ModuleKey] {
        self.fragments.get(host).map(Vec::as_slice).unwrap_or_default()
    }

    /// Every module that is a resolved host or fragment
    pub fn wired_modules(&self) -> impl Iterator<Item = &ModuleKey> {
        self.hosts.keys().chain(self.fragments.keys())
    }

    pub fn visible_packages(&self, key: &ModuleKey) -> &[VisiblePackage] {
        self.visible.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn errors(&self, key: &ModuleKey) -> &[ResolverError] {
        self.errors.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn all_errors(&self) -> impl Iterator<Item = (&ModuleKey, &ResolverError)> {
        self.errors
            .iter()
            .flat_map(|(key, errors)| errors.iter().map(move |e| (key, e)))
    }

    pub fn is_resolved(&self, key: &ModuleKey) -> bool {
        self.nodes.contains_key(key) && !self.errors.contains_key(key)
    }

    /// The given modules and everything they transitively depend on
    pub fn prerequisites<'a>(
        &self,
        roots: impl IntoIterator<Item = &'a ModuleKey>,
    ) -> BTreeSet<ModuleKey> {
        self.reachable(roots, Direction::Outgoing)
    }

    /// The given modules and everything that transitively depends on them
    pub fn dependents<'a>(
        &self,
        roots: impl IntoIterator<Item = &'a ModuleKey>,
    ) -> BTreeSet<ModuleKey> {
        self.reachable(roots, Direction::Incoming)
    }

    fn reachable<'a>(
        &self,
        roots: impl IntoIterator<Item = &'a ModuleKey>,
        direction: Direction,
    ) -> BTreeSet<ModuleKey> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<NodeIndex> = roots
            .into_iter()
            .filter_map(|key| self.nodes.get(key).copied())
            .collect();
        while let Some(index) = queue.pop_front() {
            if !seen.insert(self.graph[index].clone()) {
                continue;
            }
            queue.extend(self.graph.neighbors_directed(index, direction));
        }
        seen
    }
}

/// Turns a set of bundle manifests into a [`ResolvedState`]
pub trait ModuleResolver: Send + Sync {
    fn resolve(
        &self,
        bundles: &[ResolverBundle],
        is_system_package: &dyn Fn(&str) -> bool,
    ) -> ResolvedState;
}

/// Resolver driven purely by manifest headers
///
/// Fragments attach to every host whose name and version match. Imports
/// wire to the highest exporting version in range. `Require-Bundle` makes
/// the required bundle's exports visible, plus those of anything it
/// re-exports.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestResolver;

struct Exporter<'a> {
    version: &'a ModuleVersion,
    attributed: ModuleKey,
}

impl ManifestResolver {
    fn best<'a>(
        bundles: &'a [ResolverBundle],
        name: &str,
        range: &VersionRange,
        fragments: bool,
    ) -> impl Iterator<Item = &'a ResolverBundle> + 'a {
        let name = name.to_string();
        let range = range.clone();
        bundles.iter().filter(move |b| {
            b.key.id == name && range.includes(&b.key.version) && b.manifest.is_fragment() == fragments
        })
    }

    /// Exports of `key`, reached through `Require-Bundle`, following
    /// re-exported requirements
    fn required_exports(
        state: &ResolvedState,
        by_key: &HashMap<&ModuleKey, &ResolverBundle>,
        bundles: &[ResolverBundle],
        key: &ModuleKey,
        seen: &mut BTreeSet<ModuleKey>,
        out: &mut Vec<VisiblePackage>,
    ) {
        if !seen.insert(key.clone()) {
            return;
        }
        let Some(bundle) = by_key.get(key) else {
            return;
        };
        let mut exporters = vec![bundle.key.clone()];
        exporters.extend(state.fragments(key).iter().cloned());
        for exporter in &exporters {
            if let Some(b) = by_key.get(exporter) {
                for export in &b.manifest.exports {
                    out.push(VisiblePackage {
                        name: export.package_name().to_string(),
                        exporter: key.clone(),
                    });
                }
            }
        }
        for require in bundle.manifest.requires.iter().filter(|r| r.reexport) {
            if let Some(next) = Self::best(bundles, &require.name, &require.range, false)
                .max_by(|a, b| a.key.version.cmp(&b.key.version))
            {
                Self::required_exports(state, by_key, bundles, &next.key, seen, out);
            }
        }
    }
}

impl ModuleResolver for ManifestResolver {
    fn resolve(
        &self,
        bundles: &[ResolverBundle],
        is_system_package: &dyn Fn(&str) -> bool,
    ) -> ResolvedState {
        let mut state = ResolvedState::default();
        for bundle in bundles {
            state.add_node(&bundle.key);
        }

        for fragment in bundles.iter().filter(|b| b.manifest.is_fragment()) {
            let Some(host) = &fragment.manifest.fragment_host else {
                continue;
            };
            let hosts: Vec<ModuleKey> = Self::best(bundles, &host.name, &host.range, false)
                .map(|b| b.key.clone())
                .collect();
            if hosts.is_empty() {
                state.add_error(
                    &fragment.key,
                    ResolverError::MissingHost {
                        name: host.name.clone(),
                        range: host.range.to_string(),
                    },
                );
                continue;
            }
            for key in &hosts {
                state.add_wire(&fragment.key, key, Wire::Host);
                state
                    .fragments
                    .entry(key.clone())
                    .or_default()
                    .push(fragment.key.clone());
            }
            state.hosts.insert(fragment.key.clone(), hosts);
        }

        let mut exporters: HashMap<String, Vec<Exporter<'_>>> = HashMap::new();
        for bundle in bundles {
            let attributed: Vec<ModuleKey> = if bundle.manifest.is_fragment() {
                state.hosts(&bundle.key).to_vec()
            } else {
                vec![bundle.key.clone()]
            };
            for export in &bundle.manifest.exports {
                for key in &attributed {
                    exporters
                        .entry(export.package_name().to_string())
                        .or_default()
                        .push(Exporter {
                            version: &export.version,
                            attributed: key.clone(),
                        });
                }
            }
        }

        let by_key: HashMap<&ModuleKey, &ResolverBundle> =
            bundles.iter().map(|b| (&b.key, b)).collect();

        for bundle in bundles {
            let mut visible: Vec<VisiblePackage> = bundle
                .manifest
                .exports
                .iter()
                .map(|export| VisiblePackage {
                    name: export.package_name().to_string(),
                    exporter: bundle.key.clone(),
                })
                .collect();

            for import in &bundle.manifest.imports {
                let package = naming::normalize_package(&import.name);
                if is_system_package(package) {
                    continue;
                }
                let supplier = exporters.get(package).and_then(|candidates| {
                    candidates
                        .iter()
                        .filter(|e| import.range.includes(e.version))
                        .max_by(|a, b| a.version.cmp(b.version))
                });
                match supplier {
                    Some(exporter) => {
                        state.add_wire(
                            &bundle.key,
                            &exporter.attributed,
                            Wire::Import(package.to_string()),
                        );
                        visible.push(VisiblePackage {
                            name: package.to_string(),
                            exporter: exporter.attributed.clone(),
                        });
                    }
                    None if import.optional => {
                        debug!("{}: optional import {} not available", bundle.key, package);
                    }
                    None => state.add_error(
                        &bundle.key,
                        ResolverError::MissingImport {
                            name: package.to_string(),
                            range: import.range.to_string(),
                        },
                    ),
                }
            }

            for require in &bundle.manifest.requires {
                let required = Self::best(bundles, &require.name, &require.range, false)
                    .max_by(|a, b| a.key.version.cmp(&b.key.version));
                match required {
                    Some(required) => {
                        state.add_wire(&bundle.key, &required.key, Wire::Require);
                        let mut seen = BTreeSet::new();
                        Self::required_exports(
                            &state,
                            &by_key,
                            bundles,
                            &required.key,
                            &mut seen,
                            &mut visible,
                        );
                    }
                    None if require.optional => {
                        debug!("{}: optional bundle {} not available", bundle.key, require.name);
                    }
                    None => state.add_error(
                        &bundle.key,
                        ResolverError::MissingRequire {
                            name: require.name.clone(),
                            range: require.range.to_string(),
                        },
                    ),
                }
            }

            visible.sort();
            visible.dedup();
            state.visible.insert(bundle.key.clone(), visible);
        }

        debug!(
            "Resolved {} bundles with {} wires",
            bundles.len(),
            state.graph.edge_count()
        );
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn bundle(text: &str) -> ResolverBundle {
        let manifest = BundleManifest::parse(text).unwrap();
        ResolverBundle {
            key: ModuleKey::new(manifest.symbolic_name.clone(), manifest.version.clone()),
            manifest: Arc::new(manifest),
        }
    }

    fn key(id: &str, version: &str) -> ModuleKey {
        ModuleKey::new(id, ModuleVersion::parse(version).unwrap())
    }

    fn names(visible: &[VisiblePackage]) -> Vec<(&str, &str)> {
        visible
            .iter()
            .map(|v| (v.name.as_str(), v.exporter.id.as_str()))
            .collect()
    }

    #[test]
    fn test_imports_pick_highest_exporter_in_range() {
        let bundles = vec![
            bundle("Bundle-SymbolicName: lib\nBundle-Version: 1.0.0\nExport-Package: com.lib;version=1.0\n"),
            bundle("Bundle-SymbolicName: lib\nBundle-Version: 2.0.0\nExport-Package: com.lib;version=2.0\n"),
            bundle(concat!(
                "Bundle-SymbolicName: app\n",
                "Bundle-Version: 1.0.0\n",
                "Import-Package: com.lib;version=\"[1.0,2.0)\",java.util,org.missing,\n",
                " org.maybe;resolution:=optional\n",
            )),
        ];
        let state = ManifestResolver.resolve(&bundles, &|p| p.starts_with("java."));
        let app = key("app", "1.0.0");

        assert_eq!(names(state.visible_packages(&app)), vec![("com.lib", "lib")]);
        assert_eq!(state.visible_packages(&app)[0].exporter.version.to_string(), "1.0.0");
        assert_eq!(
            state.errors(&app),
            &[ResolverError::MissingImport {
                name: "org.missing".into(),
                range: "0.0.0".into()
            }]
        );
        assert!(!state.is_resolved(&app));
        assert!(state.is_resolved(&key("lib", "2.0.0")));
    }

    #[test]
    fn test_fragments_attach_to_hosts() {
        let bundles = vec![
            bundle("Bundle-SymbolicName: host\nBundle-Version: 1.0.0\n"),
            bundle(concat!(
                "Bundle-SymbolicName: host.frag\n",
                "Bundle-Version: 1.0.0\n",
                "Fragment-Host: host;bundle-version=\"[1.0,2.0)\"\n",
                "Export-Package: com.frag\n",
            )),
            bundle("Bundle-SymbolicName: lost\nBundle-Version: 1.0.0\nFragment-Host: nobody\n"),
            bundle("Bundle-SymbolicName: user\nBundle-Version: 1.0.0\nImport-Package: com.frag\n"),
        ];
        let state = ManifestResolver.resolve(&bundles, &|_| false);

        let host = key("host", "1.0.0");
        let frag = key("host.frag", "1.0.0");
        assert_eq!(state.hosts(&frag), &[host.clone()]);
        assert_eq!(state.fragments(&host), &[frag.clone()]);
        assert_eq!(
            names(state.visible_packages(&key("user", "1.0.0"))),
            vec![("com.frag", "host")]
        );
        assert!(matches!(
            state.errors(&key("lost", "1.0.0")),
            [ResolverError::MissingHost { .. }]
        ));
    }

    #[test]
    fn test_require_bundle_follows_reexports() {
        let bundles = vec![
            bundle("Bundle-SymbolicName: base\nBundle-Version: 1.0.0\nExport-Package: com.base\n"),
            bundle(concat!(
                "Bundle-SymbolicName: mid\n",
                "Bundle-Version: 1.0.0\n",
                "Export-Package: com.mid\n",
                "Require-Bundle: base;visibility:=reexport\n",
            )),
            bundle("Bundle-SymbolicName: top\nBundle-Version: 1.0.0\nRequire-Bundle: mid\n"),
        ];
        let state = ManifestResolver.resolve(&bundles, &|_| false);
        let top = key("top", "1.0.0");

        assert_eq!(
            names(state.visible_packages(&top)),
            vec![("com.base", "base"), ("com.mid", "mid")]
        );

        let prereqs: Vec<String> = state
            .prerequisites([&top])
            .into_iter()
            .map(|k| k.id)
            .collect();
        assert_eq!(prereqs, vec!["base", "mid", "top"]);

        let dependents: Vec<String> = state
            .dependents([&key("base", "1.0.0")])
            .into_iter()
            .map(|k| k.id)
            .collect();
        assert_eq!(dependents, vec!["base", "mid", "top"]);
    }

    fn corpus() -> Vec<ResolverBundle> {
        vec![
            bundle("Bundle-SymbolicName: lib\nBundle-Version: 1.0.0\nExport-Package: com.lib;version=1.0\n"),
            bundle("Bundle-SymbolicName: lib\nBundle-Version: 2.0.0\nExport-Package: com.lib;version=2.0,com.extra\n"),
            bundle("Bundle-SymbolicName: host\nBundle-Version: 1.0.0\nRequire-Bundle: lib;visibility:=reexport\n"),
            bundle(concat!(
                "Bundle-SymbolicName: host.frag\n",
                "Bundle-Version: 1.0.0\n",
                "Fragment-Host: host\n",
                "Export-Package: com.frag\n",
            )),
            bundle("Bundle-SymbolicName: app\nBundle-Version: 1.0.0\nRequire-Bundle: host\nImport-Package: com.frag,org.gone\n"),
        ]
    }

    proptest! {
        #[test]
        fn test_resolution_ignores_input_order(
            order in Just((0..5).collect::<Vec<usize>>()).prop_shuffle()
        ) {
            let reference = ManifestResolver.resolve(&corpus(), &|_| false);
            let shuffled: Vec<ResolverBundle> = {
                let bundles = corpus();
                order.iter().map(|&i| bundles[i].clone()).collect()
            };
            let state = ManifestResolver.resolve(&shuffled, &|_| false);

            for bundle in corpus() {
                prop_assert_eq!(
                    names(state.visible_packages(&bundle.key)),
                    names(reference.visible_packages(&bundle.key))
                );
                prop_assert_eq!(state.errors(&bundle.key), reference.errors(&bundle.key));
            }
            let app = [key("app", "1.0.0")];
            prop_assert_eq!(state.prerequisites(&app), reference.prerequisites(&app));
        }
    }
}
