//! Baselines: named sets of modules answering package resolution queries
//!
//! Analysis reads a baseline under a shared gate. Adding modules and
//! rebinding execution environments cancel in-flight analysis, take the
//! gate exclusively once it has drained, and swap the new state in whole.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;

use apiscope_core::{naming, CancelToken, CoreError, DisposalState, LazySlot, ModuleVersion};
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use tracing::{debug, info, warn};

use crate::config::ModelContext;
use crate::environment::{
    compare_runtime_versions, select_runtimes, EnvironmentStatus, Profile, RuntimeProvider,
};
use crate::error::{ModelError, Result};
use crate::listing;
use crate::module::Module;
use crate::resolver::{
    ManifestResolver, ModuleKey, ModuleResolver, ResolvedState, ResolverBundle, ResolverError,
};

type PackageCache = HashMap<String, HashMap<Option<ModuleKey>, Vec<Arc<Module>>>>;

#[derive(Default)]
struct BaselineState {
    /// Module versions per id, highest first
    modules: BTreeMap<String, Vec<Arc<Module>>>,
    /// Most recently added module per id
    latest: HashMap<String, Arc<Module>>,
    system_libraries: Vec<Arc<Module>>,
    resolved: Arc<ResolvedState>,
    environment: EnvironmentStatus,
    execution_environment: Option<String>,
    requirements: BTreeSet<String>,
}

/// Execution-environment binding computed off to the side before a swap
///
/// Holds no modules: the system library is created only once the swap can
/// no longer be cancelled.
struct Binding {
    status: EnvironmentStatus,
    environment: Option<String>,
    profile: Option<Arc<Profile>>,
}

fn push_unique(out: &mut Vec<Arc<Module>>, module: Arc<Module>) {
    if !out.iter().any(|m| Arc::ptr_eq(m, &module)) {
        out.push(module);
    }
}

/// Modules whose host or fragment wiring differs between two resolutions
fn fragment_groups(before: &ResolvedState, after: &ResolvedState) -> BTreeSet<ModuleKey> {
    let mut changed = BTreeSet::new();
    for state in [before, after] {
        for key in state.wired_modules() {
            if before.hosts(key) != after.hosts(key) || before.fragments(key) != after.fragments(key) {
                changed.insert(key.clone());
            }
        }
    }
    changed
}

/// Numeric part of an environment id such as `JavaSE-1.8`
fn environment_level(id: &str) -> &str {
    id.rsplit('-').next().unwrap_or(id)
}

pub struct BaselineBuilder {
    name: String,
    ctx: Arc<ModelContext>,
    resolver: Arc<dyn ModuleResolver>,
    runtimes: Arc<dyn RuntimeProvider>,
    location: Option<PathBuf>,
}

impl BaselineBuilder {
    pub fn resolver(mut self, resolver: Arc<dyn ModuleResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn runtimes(mut self, runtimes: Arc<dyn RuntimeProvider>) -> Self {
        self.runtimes = runtimes;
        self
    }

    pub fn location(mut self, location: impl Into<PathBuf>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Creates the empty baseline and binds its default environment
    pub fn build(self) -> Result<Arc<Baseline>> {
        let baseline = Arc::new_cyclic(|this| Baseline {
            name: self.name,
            location: self.location,
            ctx: self.ctx,
            resolver: self.resolver,
            runtimes: self.runtimes,
            this: this.clone(),
            state: RwLock::new(BaselineState::default()),
            package_cache: Mutex::new(HashMap::new()),
            system_packages: LazySlot::new(),
            analysis: RwLock::new(()),
            cancel: Mutex::new(CancelToken::new()),
            disposal: DisposalState::new(),
        });
        let binding = baseline.bind(&BTreeSet::new(), &CancelToken::new())?;
        let libraries = baseline.system_library_of(&binding, &baseline)?;
        baseline.install_binding(binding, libraries);
        debug!("Created baseline {}", baseline.name);
        Ok(baseline)
    }
}

pub struct Baseline {
    name: String,
    location: Option<PathBuf>,
    ctx: Arc<ModelContext>,
    resolver: Arc<dyn ModuleResolver>,
    runtimes: Arc<dyn RuntimeProvider>,
    this: Weak<Baseline>,
    state: RwLock<BaselineState>,
    package_cache: Mutex<PackageCache>,
    system_packages: LazySlot<BTreeSet<String>>,
    analysis: RwLock<()>,
    cancel: Mutex<CancelToken>,
    disposal: DisposalState,
}

/// Shared hold on a baseline for the duration of one analysis job
pub struct AnalysisGuard<'a> {
    _gate: RwLockReadGuard<'a, ()>,
    token: CancelToken,
}

impl AnalysisGuard<'_> {
    /// Cancelled when a rebind wants the baseline
    pub fn token(&self) -> &CancelToken {
        &self.token
    }
}

impl Baseline {
    pub fn builder(name: impl Into<String>, ctx: &Arc<ModelContext>) -> BaselineBuilder {
        BaselineBuilder {
            name: name.into(),
            ctx: ctx.clone(),
            resolver: Arc::new(ManifestResolver),
            runtimes: ctx.configured_runtimes(),
            location: None,
        }
    }

    /// Baseline of every bundle named in an artifact listing
    pub fn load_listing(
        name: impl Into<String>,
        listing_path: &Path,
        ctx: &Arc<ModelContext>,
    ) -> Result<Arc<Self>> {
        let artifacts = listing::read_listing(listing_path)?;
        let locations: Vec<PathBuf> = artifacts.into_iter().map(|a| a.path).collect();
        Self::load_locations(name.into(), listing_path, &locations, ctx)
    }

    /// Baseline of every bundle jar and bundle directory in `dir`
    pub fn load_directory(
        name: impl Into<String>,
        dir: &Path,
        ctx: &Arc<ModelContext>,
    ) -> Result<Arc<Self>> {
        let locations = listing::scan_directory(dir)?;
        Self::load_locations(name.into(), dir, &locations, ctx)
    }

    fn load_locations(
        name: String,
        location: &Path,
        candidates: &[PathBuf],
        ctx: &Arc<ModelContext>,
    ) -> Result<Arc<Self>> {
        let baseline = Self::builder(name, ctx).location(location).build()?;
        let mut modules = Vec::new();
        for candidate in candidates {
            if let Some(module) = Module::open(candidate, ctx)? {
                modules.push(module);
            }
        }
        info!(
            "Loaded {} modules from {} into baseline {}",
            modules.len(),
            location.display(),
            baseline.name
        );
        baseline.add_modules(modules)?;
        Ok(baseline)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Where the baseline was loaded from
    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    pub fn context(&self) -> &Arc<ModelContext> {
        &self.ctx
    }

    fn check(&self) -> Result<()> {
        Ok(self.disposal.check(&format!("baseline {}", self.name))?)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposal.is_disposed()
    }

    /// Enters an analysis job. Rebinding waits until the guard is dropped.
    pub fn begin_analysis(&self) -> Result<AnalysisGuard<'_>> {
        self.check()?;
        let gate = self.analysis.read_recursive();
        Ok(AnalysisGuard {
            _gate: gate,
            token: self.cancel.lock().clone(),
        })
    }

    /// Cancels in-flight analysis and hands out the token for the next
    /// exclusive operation
    fn interrupt(&self) -> CancelToken {
        let fresh = CancelToken::new();
        let previous = std::mem::replace(&mut *self.cancel.lock(), fresh.clone());
        previous.cancel();
        fresh
    }

    /// Cancels in-flight analysis and any add or rebind that has not yet
    /// swapped its state in. Does not wait.
    pub fn cancel_analysis(&self) {
        self.interrupt();
        debug!("Cancelled analysis of baseline {}", self.name);
    }

    fn this(&self) -> Result<Arc<Self>> {
        self.this
            .upgrade()
            .ok_or_else(|| CoreError::Internal(format!("baseline {} is being dropped", self.name)).into())
    }

    /// Adds modules, re-resolves the baseline and rebinds its environment
    ///
    /// Source bundles are skipped. A module with exactly the version of an
    /// existing one replaces it.
    pub fn add_modules(&self, modules: Vec<Arc<Module>>) -> Result<()> {
        self.check()?;
        let this = self.this()?;
        let token = self.interrupt();
        let _exclusive = self.analysis.write();

        let mut replaced = Vec::new();
        let (bundles, latest, requirements) = {
            let state = self.state.read();
            let mut all = state.modules.clone();
            let mut latest = state.latest.clone();
            for module in modules {
                if module.is_source_bundle() {
                    debug!("Skipping source bundle {}", module.id());
                    continue;
                }
                module.attach(&this)?;
                latest.insert(module.id().to_string(), module.clone());
                let versions = all.entry(module.id().to_string()).or_default();
                if let Some(pos) = versions.iter().position(|m| m.version() == module.version()) {
                    if !Arc::ptr_eq(&versions[pos], &module) {
                        replaced.push(std::mem::replace(&mut versions[pos], module));
                    }
                    continue;
                }
                if versions
                    .iter()
                    .any(|m| m.version().same_triple(module.version()))
                {
                    info!(
                        "Module {} has more than one version matching {}",
                        module.id(),
                        module.version().without_qualifier()
                    );
                }
                versions.push(module);
                versions.sort_by(|a, b| b.version().cmp(a.version()));
            }
            let mut requirements = BTreeSet::new();
            for module in all.values().flatten() {
                requirements.extend(module.execution_environments()?);
            }
            (all, latest, requirements)
        };

        let binding = self.bind(&requirements, &token)?;
        let resolved = self.resolve(&bundles, &binding);
        token.check()?;
        let libraries = self.system_library_of(&binding, &this)?;

        let affected = fragment_groups(&self.resolved(), &resolved);
        {
            let mut state = self.state.write();
            state.modules = bundles;
            state.latest = latest;
            state.resolved = Arc::new(resolved);
            state.requirements = requirements;
        }
        self.install_binding(binding, libraries);
        for key in &affected {
            if let Some(module) = self.by_key(key) {
                module.reset_wiring();
            }
        }
        for module in replaced {
            module.dispose();
        }
        Ok(())
    }

    fn resolve(
        &self,
        modules: &BTreeMap<String, Vec<Arc<Module>>>,
        binding: &Binding,
    ) -> ResolvedState {
        let bundles: Vec<ResolverBundle> = modules
            .values()
            .flatten()
            .filter_map(|module| {
                module.manifest().map(|manifest| ResolverBundle {
                    key: module.key(),
                    manifest: manifest.clone(),
                })
            })
            .collect();
        let system: BTreeSet<String> = binding
            .profile
            .iter()
            .flat_map(|profile| profile.system_packages.iter().cloned())
            .collect();
        let config = self.ctx.config();
        self.resolver
            .resolve(&bundles, &|package: &str| {
                config.is_system_package(package) || system.contains(package)
            })
    }

    /// Environments to bind: the modules' requirements, or the configured
    /// default when no module declares one
    fn wanted_environments(&self, requirements: &BTreeSet<String>) -> BTreeSet<String> {
        let mut wanted = requirements.clone();
        if wanted.is_empty() {
            if let Some(default) = &self.ctx.config().baseline.default_environment {
                wanted.insert(default.clone());
            }
        }
        wanted
    }

    /// Picks runtimes for `requirements` and the profile standing for them
    fn bind(&self, requirements: &BTreeSet<String>, cancel: &CancelToken) -> Result<Binding> {
        let wanted = self.wanted_environments(requirements);
        let status = select_runtimes(&wanted, &self.runtimes.runtimes());
        cancel.check()?;

        // newest environment with a known profile stands for the runtime
        let mut ordered: Vec<&String> = wanted.iter().collect();
        ordered.sort_by(|a, b| compare_runtime_versions(environment_level(b), environment_level(a)));
        let mut environment = None;
        let mut profile = None;
        for id in ordered {
            match self.ctx.profiles().profile(id)? {
                Some(found) => {
                    environment = Some(id.clone());
                    profile = Some(found);
                    break;
                }
                None => warn!("No profile for execution environment {}", id),
            }
        }
        cancel.check()?;
        Ok(Binding {
            status,
            environment,
            profile,
        })
    }

    /// The system library a binding stands for, attached to `this`
    fn system_library_of(&self, binding: &Binding, this: &Arc<Self>) -> Result<Vec<Arc<Module>>> {
        let (Some(profile), Some(id)) = (&binding.profile, &binding.environment) else {
            return Ok(Vec::new());
        };
        let library = Module::system_library(profile, binding.status.bindings.get(id), &self.ctx);
        if let Err(e) = library.attach(this) {
            library.dispose();
            return Err(e);
        }
        Ok(vec![library])
    }

    fn install_binding(&self, binding: Binding, libraries: Vec<Arc<Module>>) {
        let previous = {
            let mut state = self.state.write();
            state.environment = binding.status;
            state.execution_environment = binding.environment;
            std::mem::replace(&mut state.system_libraries, libraries)
        };
        self.package_cache.lock().clear();
        self.system_packages.take();
        for library in previous {
            library.dispose();
        }
    }

    /// Rebinds execution environments against the current runtimes
    ///
    /// In-flight analysis is cancelled and drained first. A cancelled rebind
    /// leaves the previous binding in place.
    pub fn rebind_environments(&self) -> Result<EnvironmentStatus> {
        self.check()?;
        let this = self.this()?;
        let token = self.interrupt();
        let _exclusive = self.analysis.write();
        let requirements = self.state.read().requirements.clone();

        let binding = self.bind(&requirements, &token)?;
        let modules = self.state.read().modules.clone();
        let resolved = self.resolve(&modules, &binding);
        token.check()?;
        let libraries = self.system_library_of(&binding, &this)?;

        let status = binding.status.clone();
        self.state.write().resolved = Arc::new(resolved);
        self.install_binding(binding, libraries);
        info!("Rebound execution environments of baseline {}", self.name);
        Ok(status)
    }

    /// Runs [`Baseline::rebind_environments`] on a background thread
    pub fn spawn_rebind(self: &Arc<Self>) -> Result<JoinHandle<Result<EnvironmentStatus>>> {
        let baseline = self.clone();
        std::thread::Builder::new()
            .name(format!("rebind-{}", self.name))
            .spawn(move || baseline.rebind_environments())
            .map_err(|e| CoreError::Internal(format!("cannot start rebind: {}", e)).into())
    }

    /// Starts a background rebind when the installed runtimes no longer
    /// give the bindings in place
    ///
    /// Returns `None` when nothing changed.
    pub fn refresh_runtimes(
        self: &Arc<Self>,
    ) -> Result<Option<JoinHandle<Result<EnvironmentStatus>>>> {
        self.check()?;
        let requirements = self.state.read().requirements.clone();
        let wanted = self.wanted_environments(&requirements);
        let selected = select_runtimes(&wanted, &self.runtimes.runtimes());
        if selected == self.state.read().environment {
            debug!("Runtimes of baseline {} are unchanged", self.name);
            return Ok(None);
        }
        info!("Runtimes of baseline {} changed, rebinding", self.name);
        self.spawn_rebind().map(Some)
    }

    /// Most recently added module with `id`, or the system library with
    /// that id
    pub fn module(&self, id: &str) -> Result<Option<Arc<Module>>> {
        self.check()?;
        let state = self.state.read();
        if let Some(module) = state.latest.get(id) {
            return Ok(Some(module.clone()));
        }
        Ok(state.system_libraries.iter().find(|m| m.id() == id).cloned())
    }

    /// The module whose major.minor.micro equals `version`'s
    pub fn module_version(&self, id: &str, version: &ModuleVersion) -> Result<Option<Arc<Module>>> {
        self.check()?;
        Ok(self
            .state
            .read()
            .modules
            .get(id)
            .and_then(|versions| {
                versions
                    .iter()
                    .find(|m| m.version().same_triple(version))
                    .cloned()
            }))
    }

    /// Every version of a module, highest first
    pub fn all_modules(&self, id: &str) -> Result<Vec<Arc<Module>>> {
        self.check()?;
        Ok(self.state.read().modules.get(id).cloned().unwrap_or_default())
    }

    /// Every module of the baseline followed by its system libraries
    pub fn modules(&self) -> Result<Vec<Arc<Module>>> {
        self.check()?;
        let state = self.state.read();
        Ok(state
            .modules
            .values()
            .flatten()
            .chain(state.system_libraries.iter())
            .cloned()
            .collect())
    }

    pub fn system_libraries(&self) -> Result<Vec<Arc<Module>>> {
        self.check()?;
        Ok(self.state.read().system_libraries.clone())
    }

    pub fn execution_environment(&self) -> Result<Option<String>> {
        self.check()?;
        Ok(self.state.read().execution_environment.clone())
    }

    /// Which environments are bound to runtimes and which are not
    pub fn environment_status(&self) -> Result<EnvironmentStatus> {
        self.check()?;
        Ok(self.state.read().environment.clone())
    }

    /// Every resolver error of the baseline
    pub fn errors(&self) -> Result<Vec<(ModuleKey, ResolverError)>> {
        self.check()?;
        Ok(self
            .state
            .read()
            .resolved
            .all_errors()
            .map(|(key, error)| (key.clone(), error.clone()))
            .collect())
    }

    fn by_key(&self, key: &ModuleKey) -> Option<Arc<Module>> {
        self.state
            .read()
            .modules
            .get(&key.id)
            .and_then(|versions| versions.iter().find(|m| m.version() == &key.version).cloned())
    }

    fn by_keys<'a>(&self, keys: impl IntoIterator<Item = &'a ModuleKey>) -> Vec<Arc<Module>> {
        keys.into_iter().filter_map(|key| self.by_key(key)).collect()
    }

    fn resolved(&self) -> Arc<ResolvedState> {
        self.state.read().resolved.clone()
    }

    pub fn hosts_of(&self, fragment: &ModuleKey) -> Result<Vec<Arc<Module>>> {
        self.check()?;
        Ok(self.by_keys(self.resolved().hosts(fragment)))
    }

    pub fn fragments_of(&self, host: &ModuleKey) -> Result<Vec<Arc<Module>>> {
        self.check()?;
        Ok(self.by_keys(self.resolved().fragments(host)))
    }

    pub fn module_errors(&self, key: &ModuleKey) -> Result<Vec<ResolverError>> {
        self.check()?;
        Ok(self.resolved().errors(key).to_vec())
    }

    /// The given modules and everything they depend on
    pub fn prerequisite_modules(&self, modules: &[Arc<Module>]) -> Result<Vec<Arc<Module>>> {
        self.check()?;
        let keys: Vec<ModuleKey> = modules.iter().map(|m| m.key()).collect();
        let resolved = self.resolved();
        Ok(self.by_keys(&resolved.prerequisites(&keys)))
    }

    /// The given modules and everything that depends on them
    pub fn dependent_modules(&self, modules: &[Arc<Module>]) -> Result<Vec<Arc<Module>>> {
        self.check()?;
        let keys: Vec<ModuleKey> = modules.iter().map(|m| m.key()).collect();
        let resolved = self.resolved();
        Ok(self.by_keys(&resolved.dependents(&keys)))
    }

    /// Whether the runtime supplies a package
    ///
    /// True for the configured prefixes (`java.` by default) and for the
    /// packages listed by the bound environment's profile.
    pub fn is_system_package(&self, package: &str) -> Result<bool> {
        self.check()?;
        if self.ctx.config().is_system_package(package) {
            return Ok(true);
        }
        let names = self.system_packages.get_or_try_init(|| {
            let state = self.state.read();
            Ok::<_, ModelError>(
                state
                    .system_libraries
                    .iter()
                    .flat_map(|lib| lib.system_packages().iter().cloned())
                    .collect(),
            )
        })?;
        Ok(names.contains(package))
    }

    /// Modules supplying `package` to `source`, in lookup order
    ///
    /// Results are cached per package and source until
    /// [`Baseline::clear_package`] or a rebind. An empty cached answer is
    /// derived again, against the memoized system-package set.
    pub fn resolve_package(
        &self,
        source: Option<&Arc<Module>>,
        package: &str,
    ) -> Result<Vec<Arc<Module>>> {
        self.check()?;
        let _gate = self.analysis.read_recursive();
        self.check()?;
        let package = naming::normalize_package(package);
        let key = source.map(|m| m.key());

        if let Some(hit) = self
            .package_cache
            .lock()
            .get(package)
            .and_then(|by_source| by_source.get(&key))
            .filter(|hit| !hit.is_empty())
        {
            return Ok(hit.clone());
        }

        let mut suppliers: Vec<Arc<Module>> = Vec::new();
        if let Some(source) = source {
            let resolved = self.resolved();
            let mut visited = BTreeSet::new();
            self.collect_suppliers(&resolved, source, package, &mut suppliers, &mut visited)?;
        }
        if self.is_system_package(package)? {
            for library in self.state.read().system_libraries.iter() {
                push_unique(&mut suppliers, library.clone());
            }
        }

        self.package_cache
            .lock()
            .entry(package.to_string())
            .or_default()
            .insert(key, suppliers.clone());
        Ok(suppliers)
    }

    fn collect_suppliers(
        &self,
        resolved: &ResolvedState,
        module: &Arc<Module>,
        package: &str,
        out: &mut Vec<Arc<Module>>,
        visited: &mut BTreeSet<ModuleKey>,
    ) -> Result<()> {
        let key = module.key();
        if !visited.insert(key.clone()) {
            return Ok(());
        }
        if !module.is_system_library() {
            for visible in resolved.visible_packages(&key) {
                if visible.name == package {
                    if let Some(exporter) = self.by_key(&visible.exporter) {
                        push_unique(out, exporter);
                    }
                }
            }
            if module.is_fragment() {
                for host in self.by_keys(resolved.hosts(&key)) {
                    self.collect_suppliers(resolved, &host, package, out, visited)?;
                }
            }
        }
        if module.supplies_package(package)? {
            push_unique(out, module.clone());
        }
        Ok(())
    }

    /// Forgets cached suppliers of one package
    pub fn clear_package(&self, package: &str) {
        self.package_cache
            .lock()
            .remove(naming::normalize_package(package));
    }

    /// Disposes every module and evicts the baseline's cached types
    ///
    /// Every later query fails with a disposed-state error that names this
    /// call site.
    #[track_caller]
    pub fn dispose(&self) {
        if !self.disposal.mark() {
            return;
        }
        self.cancel.lock().cancel();
        let _exclusive = self.analysis.write();
        let state = std::mem::take(&mut *self.state.write());
        self.package_cache.lock().clear();
        self.system_packages.take();
        for module in state.modules.values().flatten().chain(state.system_libraries.iter()) {
            module.dispose();
        }
        self.ctx.cache().evict_baseline(&self.name);
        info!("Disposed baseline {}", self.name);
    }
}

impl fmt::Debug for Baseline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Baseline")
            .field("name", &self.name)
            .field("location", &self.location)
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Baseline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
