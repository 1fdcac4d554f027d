//! Modules: bundles and the runtime system library
//!
//! A module owns its type containers and its API description. Both are
//! computed on first use and released only by [`Module::dispose`]. Modules
//! reach their baseline through a weak back-reference that is set once when
//! the module joins it.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use apiscope_container::{
    ArchiveContainer, CompositeContainer, DirectoryContainer, TypeContainer, TypeRoot,
};
use apiscope_core::{
    module_cache_key, naming, CoreError, DisposalState, LazySlot, ModuleVersion, Type, TypeOrigin,
    TypeResolver,
};
use parking_lot::Mutex;
use tempfile::TempDir;
use tracing::{debug, info, warn};
use zip::result::ZipError;
use zip::ZipArchive;

use crate::baseline::Baseline;
use crate::config::ModelContext;
use crate::description::sidecar::{self, API_DESCRIPTION_ENTRY};
use crate::description::{
    ApiDescription, CompositeApiDescription, ElementDescriptor, Visibility,
};
use crate::environment::{self, InstalledRuntime, Profile};
use crate::error::{ModelError, Result};
use crate::manifest::{BundleManifest, Manifest, MANIFEST_ENTRY};
use crate::resolver::{ModuleKey, ResolverError};

/// What backs a module
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleKind {
    /// A bundle jar or directory with a manifest
    Bundle,
    /// The runtime library for one execution environment
    SystemLibrary { environment: String },
}

type DisposeHook = Box<dyn FnOnce(&Module) + Send>;

pub struct Module {
    id: String,
    version: ModuleVersion,
    kind: ModuleKind,
    location: PathBuf,
    manifest: Option<Arc<BundleManifest>>,
    system_packages: BTreeSet<String>,
    ctx: Arc<ModelContext>,
    this: Weak<Module>,
    baseline: OnceLock<Weak<Baseline>>,
    containers: LazySlot<TypeContainer>,
    packages: LazySlot<Vec<String>>,
    local_description: LazySlot<ApiDescription>,
    description: LazySlot<CompositeApiDescription>,
    has_api_description: AtomicBool,
    extracted: Mutex<Option<TempDir>>,
    disposal: DisposalState,
    dispose_hooks: Mutex<Vec<DisposeHook>>,
}

/// Reads one entry of a bundle directory or jar. `Ok(None)` when absent.
fn read_bundle_entry(location: &Path, entry: &str) -> Result<Option<Vec<u8>>> {
    if location.is_dir() {
        let path = location.join(entry);
        if !path.is_file() {
            return Ok(None);
        }
        return fs::read(&path).map(Some).map_err(|e| ModelError::io(path, e));
    }

    let file = File::open(location).map_err(|e| ModelError::io(location, e))?;
    let mut archive = ZipArchive::new(file).map_err(|e| ModelError::zip(location, e))?;
    let mut file = match archive.by_name(entry) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(ModelError::zip(location, e)),
    };
    let mut buffer = Vec::new();
    file.read_to_end(&mut buffer)
        .map_err(|e| ModelError::io(location, e))?;
    Ok(Some(buffer))
}

fn is_archive_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".jar") || lower.ends_with(".zip")
}

impl Module {
    fn create(
        id: String,
        version: ModuleVersion,
        kind: ModuleKind,
        location: PathBuf,
        manifest: Option<Arc<BundleManifest>>,
        system_packages: BTreeSet<String>,
        ctx: Arc<ModelContext>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            id,
            version,
            kind,
            location,
            manifest,
            system_packages,
            ctx,
            this: this.clone(),
            baseline: OnceLock::new(),
            containers: LazySlot::new(),
            packages: LazySlot::new(),
            local_description: LazySlot::new(),
            description: LazySlot::new(),
            has_api_description: AtomicBool::new(false),
            extracted: Mutex::new(None),
            disposal: DisposalState::new(),
            dispose_hooks: Mutex::new(Vec::new()),
        })
    }

    /// Opens the bundle at `location`
    ///
    /// Locations without a manifest, or whose manifest lacks a symbolic name
    /// or version, are not modules: they yield `Ok(None)` and a log entry.
    pub fn open(location: &Path, ctx: &Arc<ModelContext>) -> Result<Option<Arc<Self>>> {
        let Some(bytes) = read_bundle_entry(location, MANIFEST_ENTRY)? else {
            debug!("No manifest in {}", location.display());
            return Ok(None);
        };
        let text = String::from_utf8_lossy(&bytes);
        let manifest = match Manifest::parse(&text).and_then(BundleManifest::from_manifest) {
            Ok(manifest) => manifest,
            Err(e @ (ModelError::InvalidModule(_) | ModelError::InvalidHeader { .. })) => {
                warn!("Skipping {}: {}", location.display(), e);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        Ok(Some(Self::from_manifest(manifest, location, ctx)))
    }

    pub fn from_manifest(
        manifest: BundleManifest,
        location: &Path,
        ctx: &Arc<ModelContext>,
    ) -> Arc<Self> {
        Self::create(
            manifest.symbolic_name.clone(),
            manifest.version.clone(),
            ModuleKind::Bundle,
            location.to_path_buf(),
            Some(Arc::new(manifest)),
            BTreeSet::new(),
            ctx.clone(),
        )
    }

    /// The system library for an execution environment, optionally backed
    /// by an installed runtime's classes
    pub fn system_library(
        profile: &Profile,
        runtime: Option<&InstalledRuntime>,
        ctx: &Arc<ModelContext>,
    ) -> Arc<Self> {
        let version = runtime
            .and_then(|r| ModuleVersion::parse(&r.java_version).ok())
            .unwrap_or_default();
        Self::create(
            profile.id.clone(),
            version,
            ModuleKind::SystemLibrary {
                environment: profile.id.clone(),
            },
            runtime.map(|r| r.path.clone()).unwrap_or_default(),
            None,
            profile.system_packages.clone(),
            ctx.clone(),
        )
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> &ModuleVersion {
        &self.version
    }

    pub fn key(&self) -> ModuleKey {
        ModuleKey::new(self.id.clone(), self.version.clone())
    }

    pub fn kind(&self) -> &ModuleKind {
        &self.kind
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn manifest(&self) -> Option<&Arc<BundleManifest>> {
        self.manifest.as_ref()
    }

    /// Packages a system library exports on top of its classes
    pub fn system_packages(&self) -> &BTreeSet<String> {
        &self.system_packages
    }

    pub fn is_system_library(&self) -> bool {
        matches!(self.kind, ModuleKind::SystemLibrary { .. })
    }

    pub fn is_fragment(&self) -> bool {
        self.manifest.as_ref().is_some_and(|m| m.is_fragment())
    }

    pub fn is_source_bundle(&self) -> bool {
        self.manifest.as_ref().is_some_and(|m| m.source_bundle)
    }

    fn describe(&self) -> String {
        format!("module {} ({})", self.id, self.version)
    }

    fn check(&self) -> Result<()> {
        Ok(self.disposal.check(&self.describe())?)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposal.is_disposed()
    }

    /// Links the module to its baseline. A module belongs to one baseline
    /// for its whole life.
    pub(crate) fn attach(&self, baseline: &Arc<Baseline>) -> Result<()> {
        let weak = Arc::downgrade(baseline);
        let current = self.baseline.get_or_init(|| weak.clone());
        if Weak::ptr_eq(current, &weak) {
            return Ok(());
        }
        Err(ModelError::Reparented {
            module: self.describe(),
            baseline: current
                .upgrade()
                .map(|b| b.name().to_string())
                .unwrap_or_default(),
        })
    }

    pub fn baseline(&self) -> Option<Arc<Baseline>> {
        self.baseline.get().and_then(Weak::upgrade)
    }

    fn baseline_name(&self) -> String {
        self.baseline()
            .map(|b| b.name().to_string())
            .unwrap_or_default()
    }

    /// Origin of types contributed by `contributor` and resolved through
    /// this module
    fn origin_for(&self, contributor: &Module) -> TypeOrigin {
        let resolver: Weak<dyn TypeResolver> = self.this.clone();
        TypeOrigin::new(self.baseline_name(), &contributor.id)
            .with_version(contributor.version.to_string())
            .with_resolver(resolver)
    }

    /// Required execution environments, or the environment a system library
    /// stands for
    pub fn execution_environments(&self) -> Result<Vec<String>> {
        self.check()?;
        Ok(match (&self.kind, &self.manifest) {
            (ModuleKind::SystemLibrary { environment }, _) => vec![environment.clone()],
            (_, Some(manifest)) => manifest.execution_environments.clone(),
            (_, None) => Vec::new(),
        })
    }

    /// Resolved hosts of a fragment
    pub fn hosts(&self) -> Result<Vec<Arc<Module>>> {
        self.check()?;
        match self.baseline() {
            Some(baseline) => baseline.hosts_of(&self.key()),
            None => Ok(Vec::new()),
        }
    }

    /// Resolved fragments attached to this module
    pub fn fragments(&self) -> Result<Vec<Arc<Module>>> {
        self.check()?;
        match self.baseline() {
            Some(baseline) => baseline.fragments_of(&self.key()),
            None => Ok(Vec::new()),
        }
    }

    pub fn has_fragments(&self) -> Result<bool> {
        Ok(!self.fragments()?.is_empty())
    }

    /// Resolver errors reported for this module
    pub fn errors(&self) -> Result<Vec<ResolverError>> {
        self.check()?;
        match self.baseline() {
            Some(baseline) => baseline.module_errors(&self.key()),
            None => Ok(Vec::new()),
        }
    }

    /// The module's containers as one composite, built once
    ///
    /// Bundles list their classpath entries followed by those of their
    /// resolved fragments.
    pub fn type_containers(&self) -> Result<Arc<TypeContainer>> {
        self.check()?;
        self.containers.get_or_try_init(|| {
            let children = match &self.kind {
                ModuleKind::Bundle => self.bundle_containers()?,
                ModuleKind::SystemLibrary { .. } => self.runtime_containers(),
            };
            debug!("{} has {} type containers", self.describe(), children.len());
            Ok::<_, ModelError>(TypeContainer::Composite(CompositeContainer::new(
                self.id.clone(),
                children,
            )))
        })
    }

    fn bundle_containers(&self) -> Result<Vec<TypeContainer>> {
        let Some(this) = self.this.upgrade() else {
            return Ok(Vec::new());
        };
        let mut components = vec![this];
        if !self.is_fragment() {
            components.extend(self.fragments()?);
        }

        let mut seen: HashSet<String> = HashSet::new();
        let mut children = Vec::new();
        for component in &components {
            let Some(manifest) = component.manifest() else {
                continue;
            };
            for entry in &manifest.classpath {
                if entry != "." && seen.contains(entry) {
                    continue;
                }
                let mut container = component.classpath_container(entry, self)?;
                if container.is_none() {
                    for other in components.iter().filter(|o| !Arc::ptr_eq(o, component)) {
                        container = other.classpath_container(entry, self)?;
                        if container.is_some() {
                            break;
                        }
                    }
                }
                match container {
                    Some(container) => {
                        children.push(container);
                        if entry != "." {
                            seen.insert(entry.clone());
                        }
                    }
                    None => debug!("{}: classpath entry {} not found", self.describe(), entry),
                }
            }
        }
        Ok(children)
    }

    /// Container for one `Bundle-ClassPath` entry of this module's location,
    /// with types attributed to this module and resolved through `owner`
    fn classpath_container(&self, entry: &str, owner: &Module) -> Result<Option<TypeContainer>> {
        let origin = owner.origin_for(self);
        let cache = self.ctx.cache().clone();

        if self.location.is_dir() {
            let path = if entry == "." {
                self.location.clone()
            } else {
                self.location.join(entry)
            };
            return Ok(if path.is_file() {
                Some(ArchiveContainer::new(path, origin, cache).into())
            } else if path.is_dir() {
                Some(DirectoryContainer::new(path, origin, cache).into())
            } else {
                None
            });
        }

        if entry == "." {
            return Ok(Some(
                ArchiveContainer::new(self.location.clone(), origin, cache).into(),
            ));
        }

        let file = File::open(&self.location).map_err(|e| ModelError::io(&self.location, e))?;
        let mut archive = ZipArchive::new(file).map_err(|e| ModelError::zip(&self.location, e))?;
        let entry = entry.trim_end_matches('/');
        let is_file = archive.by_name(entry).is_ok_and(|f| !f.is_dir());
        if is_file {
            if !is_archive_name(entry) {
                return Ok(None);
            }
            let path = self.extract(&mut archive, entry)?;
            return Ok(Some(ArchiveContainer::new(path, origin, cache).into()));
        }

        let prefix = format!("{}/", entry);
        if archive.file_names().any(|name| name.starts_with(&prefix)) {
            return Ok(Some(
                ArchiveContainer::new(self.location.clone(), origin, cache)
                    .with_prefix(prefix)
                    .into(),
            ));
        }
        Ok(None)
    }

    /// Copies a nested jar into this module's scratch directory
    fn extract(&self, archive: &mut ZipArchive<File>, entry: &str) -> Result<PathBuf> {
        let mut extracted = self.extracted.lock();
        if extracted.is_none() {
            let dir = tempfile::Builder::new()
                .prefix("apiscope-")
                .tempdir()
                .map_err(|e| ModelError::io(std::env::temp_dir(), e))?;
            *extracted = Some(dir);
        }
        let Some(dir) = extracted.as_ref() else {
            return Err(CoreError::Internal("scratch directory missing".into()).into());
        };

        let target = dir.path().join(entry);
        if !target.is_file() {
            let mut file = archive
                .by_name(entry)
                .map_err(|e| ModelError::zip(&self.location, e))?;
            let mut bytes = Vec::new();
            file.read_to_end(&mut bytes)
                .map_err(|e| ModelError::io(&self.location, e))?;
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| ModelError::io(parent, e))?;
            }
            fs::write(&target, bytes).map_err(|e| ModelError::io(&target, e))?;
            debug!("Extracted {}!/{} to {}", self.location.display(), entry, target.display());
        }
        Ok(target)
    }

    fn runtime_containers(&self) -> Vec<TypeContainer> {
        let cache = self.ctx.cache();
        let origin = self.origin_for(self);
        if self.location.as_os_str().is_empty() {
            return Vec::new();
        }
        if let Some(jmods) = environment::jmods_dir(&self.location) {
            let mut paths: Vec<PathBuf> = fs::read_dir(&jmods)
                .map(|entries| {
                    entries
                        .flatten()
                        .map(|e| e.path())
                        .filter(|p| p.extension().is_some_and(|ext| ext == "jmod"))
                        .collect()
                })
                .unwrap_or_default();
            paths.sort();
            return paths
                .into_iter()
                .map(|path| ArchiveContainer::new(path, origin.clone(), cache.clone()).into())
                .collect();
        }
        let rt = self.location.join("lib").join("rt.jar");
        if rt.is_file() {
            return vec![ArchiveContainer::new(rt, origin, cache.clone()).into()];
        }
        // a module image directory or a single archive
        vec![ArchiveContainer::new(self.location.clone(), origin, cache.clone()).into()]
    }

    pub fn find_type_root(&self, qualified_name: &str) -> Result<Option<TypeRoot>> {
        Ok(self.type_containers()?.find_type_root(qualified_name)?)
    }

    /// Lookup preferring the containers contributed by `origin_module`
    pub fn find_type_root_from(
        &self,
        qualified_name: &str,
        origin_module: &str,
    ) -> Result<Option<TypeRoot>> {
        Ok(self
            .type_containers()?
            .find_type_root_from(qualified_name, origin_module)?)
    }

    /// Sorted names of the packages this module supplies itself, excluding
    /// those contributed by fragments
    pub fn package_names(&self) -> Result<Arc<Vec<String>>> {
        self.check()?;
        self.packages.get_or_try_init(|| {
            let containers = self.type_containers()?;
            let mut names = BTreeSet::new();
            let own: Vec<&TypeContainer> = match containers.as_ref() {
                TypeContainer::Composite(composite) => composite
                    .children()
                    .iter()
                    .filter(|c| c.module_id() == self.id)
                    .collect(),
                other => vec![other],
            };
            for container in own {
                names.extend(container.list_package_names()?);
            }
            Ok::<_, ModelError>(names.into_iter().collect())
        })
    }

    pub fn supplies_package(&self, package: &str) -> Result<bool> {
        let package = naming::normalize_package(package);
        Ok(self
            .package_names()?
            .binary_search_by(|name| name.as_str().cmp(package))
            .is_ok())
    }

    /// Whether a `.api_description` sidecar refined the description
    pub fn has_api_description(&self) -> Result<bool> {
        self.local_api_description()?;
        Ok(self.has_api_description.load(Ordering::Acquire))
    }

    /// Description of the packages this module supplies itself
    pub fn local_api_description(&self) -> Result<Arc<ApiDescription>> {
        self.check()?;
        self.local_description
            .get_or_try_init(|| self.build_local_description())
    }

    /// The module's description combined with those of its resolved
    /// fragments
    pub fn api_description(&self) -> Result<Arc<CompositeApiDescription>> {
        self.check()?;
        self.description.get_or_try_init(|| {
            let mut parts = vec![self.local_api_description()?];
            for fragment in self.fragments()? {
                parts.push(fragment.local_api_description()?);
            }
            Ok::<_, ModelError>(CompositeApiDescription::new(parts))
        })
    }

    fn build_local_description(&self) -> Result<ApiDescription> {
        let mut description = ApiDescription::new(self.id.clone());
        let packages = self.package_names()?;

        let Some(manifest) = &self.manifest else {
            for package in packages.iter().chain(self.system_packages.iter()) {
                description.set_visibility(ElementDescriptor::package(package), Visibility::Api);
            }
            return Ok(description);
        };

        for package in packages.iter() {
            description.set_visibility(ElementDescriptor::package(package), Visibility::Private);
        }

        let mut exports = manifest.exports.clone();
        for host in self.hosts()? {
            if let Some(m) = host.manifest() {
                exports.extend(m.exports.iter().cloned());
            }
        }
        for fragment in self.fragments()? {
            if let Some(m) = fragment.manifest() {
                exports.extend(m.exports.iter().cloned());
            }
        }

        for export in exports {
            let package = export.package_name();
            if packages.binary_search_by(|p| p.as_str().cmp(package)).is_err() {
                continue;
            }
            let element = ElementDescriptor::package(package);
            if export.internal {
                description.set_visibility(element.clone(), Visibility::Private);
            }
            if let Some(friends) = &export.friends {
                description.set_visibility(element.clone(), Visibility::Private);
                for friend in friends {
                    description.add_friend(package, friend);
                }
            }
            if !export.internal && export.friends.is_none() {
                description.set_visibility(element, Visibility::Api);
            }
        }

        if let Some(bytes) = read_bundle_entry(&self.location, API_DESCRIPTION_ENTRY)? {
            let xml = String::from_utf8_lossy(&bytes);
            sidecar::apply(&mut description, &xml)?;
            self.has_api_description.store(true, Ordering::Release);
            debug!("Applied {} of {}", API_DESCRIPTION_ENTRY, self.describe());
        }
        Ok(description)
    }

    /// Drops everything derived from the baseline wiring so it is rebuilt
    /// against the current hosts and fragments
    pub(crate) fn reset_wiring(&self) {
        if let Some(containers) = self.containers.take() {
            containers.close();
        }
        self.packages.take();
        self.local_description.take();
        self.description.take();
    }

    /// Registers a callback run once when the module is disposed
    pub fn on_dispose(&self, hook: impl FnOnce(&Module) + Send + 'static) {
        self.dispose_hooks.lock().push(Box::new(hook));
    }

    /// Releases containers, descriptions and extracted files
    ///
    /// Later calls are no-ops; every other operation fails afterwards with a
    /// disposed-state error naming this call site.
    #[track_caller]
    pub fn dispose(&self) {
        if !self.disposal.mark() {
            return;
        }
        if let Some(containers) = self.containers.take() {
            containers.close();
        }
        self.packages.take();
        self.local_description.take();
        self.description.take();
        let cache_module = module_cache_key(&self.id, Some(&self.version.to_string()));
        self.ctx
            .cache()
            .evict_module(&self.baseline_name(), &cache_module);
        if let Some(dir) = self.extracted.lock().take() {
            if let Err(e) = dir.close() {
                warn!("Failed to remove scratch files of {}: {}", self.describe(), e);
            }
        }
        let hooks: Vec<DisposeHook> = self.dispose_hooks.lock().drain(..).collect();
        for hook in hooks {
            hook(self);
        }
        info!("Disposed {}", self.describe());
    }

    fn resolve_type(&self, qualified_name: &str) -> Result<Option<TypeRoot>> {
        if let Some(root) = self.find_type_root(qualified_name)? {
            return Ok(Some(root));
        }
        let (Some(baseline), Some(this)) = (self.baseline(), self.this.upgrade()) else {
            return Ok(None);
        };
        let package = naming::package_name(qualified_name);
        for supplier in baseline.resolve_package(Some(&this), package)? {
            if Arc::ptr_eq(&supplier, &this) {
                continue;
            }
            if let Some(root) = supplier.find_type_root(qualified_name)? {
                return Ok(Some(root));
            }
        }
        Ok(None)
    }
}

impl TypeResolver for Module {
    fn find_type(&self, qualified_name: &str) -> std::result::Result<Option<Arc<Type>>, CoreError> {
        match self.resolve_type(qualified_name)? {
            Some(root) => Ok(root.structure()?),
            None => Ok(None),
        }
    }

    fn class_bytes(&self, qualified_name: &str) -> std::result::Result<Option<Vec<u8>>, CoreError> {
        match self.resolve_type(qualified_name)? {
            Some(root) => Ok(Some(root.bytes()?)),
            None => Ok(None),
        }
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("id", &self.id)
            .field("version", &self.version)
            .field("kind", &self.kind)
            .field("location", &self.location)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl Drop for Module {
    fn drop(&mut self) {
        if let Some(containers) = self.containers.take() {
            containers.close();
        }
    }
}
