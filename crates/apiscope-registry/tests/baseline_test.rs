use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::{Duration, Instant};

use apiscope_core::{CoreError, ModuleVersion};
use apiscope_registry::config::BaselineConfig;
use apiscope_registry::listing::read_listing;
use apiscope_registry::resolver::ResolverBundle;
use apiscope_registry::{
    Baseline, InstalledRuntime, ManifestResolver, ModelConfig, ModelContext, ModelError, Module,
    ModuleResolver, ResolvedState, ResolverError, RuntimeProvider,
};
use apiscope_test_fixtures::{BundleSpec, TestFixtures};
use pretty_assertions::assert_eq;

fn ctx() -> Arc<ModelContext> {
    ModelContext::new(ModelConfig::default())
}

fn ctx_with(baseline: BaselineConfig) -> Arc<ModelContext> {
    ModelContext::new(ModelConfig {
        baseline,
        ..Default::default()
    })
}

fn bundle(fixtures: &TestFixtures, spec: BundleSpec, ctx: &Arc<ModelContext>) -> Arc<Module> {
    Module::open(&fixtures.bundle_jar(&spec), ctx).unwrap().unwrap()
}

fn ids(modules: &[Arc<Module>]) -> Vec<String> {
    modules
        .iter()
        .map(|m| format!("{} {}", m.id(), m.version()))
        .collect()
}

fn runtime(id: &str, version: &str, environments: &[&str]) -> InstalledRuntime {
    InstalledRuntime {
        id: id.into(),
        java_version: version.into(),
        path: std::env::temp_dir().join(id),
        environments: environments.iter().map(|e| e.to_string()).collect(),
    }
}

/// Runtimes that can be installed and removed while a baseline is alive
#[derive(Default)]
struct MutableRuntimes {
    runtimes: parking_lot::Mutex<Vec<InstalledRuntime>>,
}

impl MutableRuntimes {
    fn install(&self, runtime: InstalledRuntime) {
        self.runtimes.lock().push(runtime);
    }
}

impl RuntimeProvider for MutableRuntimes {
    fn runtimes(&self) -> Vec<InstalledRuntime> {
        self.runtimes.lock().clone()
    }
}

/// Manifest resolution that cancels its baseline once when armed
#[derive(Default)]
struct CancellingResolver {
    baseline: OnceLock<Weak<Baseline>>,
    armed: AtomicBool,
}

impl ModuleResolver for CancellingResolver {
    fn resolve(
        &self,
        bundles: &[ResolverBundle],
        is_system_package: &dyn Fn(&str) -> bool,
    ) -> ResolvedState {
        if self.armed.swap(false, Ordering::SeqCst) {
            if let Some(baseline) = self.baseline.get().and_then(Weak::upgrade) {
                baseline.cancel_analysis();
            }
        }
        ManifestResolver.resolve(bundles, is_system_package)
    }
}

#[test]
fn test_version_lookup() {
    let fixtures = TestFixtures::new();
    let ctx = ctx();
    let old = bundle(&fixtures, BundleSpec::new("a", "1.0.0"), &ctx);
    let new = bundle(&fixtures, BundleSpec::new("a", "1.0.1"), &ctx);
    let baseline = Baseline::builder("versions", &ctx).build().unwrap();
    baseline.add_modules(vec![new.clone(), old.clone()]).unwrap();

    let found = baseline
        .module_version("a", &ModuleVersion::parse("1.0.0").unwrap())
        .unwrap()
        .unwrap();
    assert!(Arc::ptr_eq(&found, &old));

    // the qualifier is ignored when matching
    let qualified = baseline
        .module_version("a", &ModuleVersion::parse("1.0.1.v2024").unwrap())
        .unwrap()
        .unwrap();
    assert!(Arc::ptr_eq(&qualified, &new));

    assert_eq!(ids(&baseline.all_modules("a").unwrap()), vec!["a 1.0.1", "a 1.0.0"]);
    // the most recently added version answers for the id
    assert!(Arc::ptr_eq(&baseline.module("a").unwrap().unwrap(), &old));
    assert!(baseline.module("missing").unwrap().is_none());
    assert!(baseline.all_modules("missing").unwrap().is_empty());
}

#[test]
fn test_maven_listing_locates_one_artifact() {
    let fixtures = TestFixtures::new();
    let jar = fixtures.bundle_jar(&BundleSpec::new("test.bundle.a", "1.0.0"));
    let listing = fixtures.write_file(
        "maven.txt",
        format!("group:artifact:jar:1.0.0:{}\n", jar.display()),
    );

    let located = read_listing(&listing).unwrap();
    assert_eq!(located.len(), 1);
    assert_eq!(located[0].file_name(), Some("test.bundle.a_1.0.0.jar"));

    let baseline = Baseline::load_listing("maven", &listing, &ctx()).unwrap();
    assert_eq!(ids(&baseline.modules().unwrap()), vec!["test.bundle.a 1.0.0"]);
    assert_eq!(baseline.location(), Some(listing.as_path()));
}

#[test]
fn test_tycho_listing_locates_one_artifact() {
    let fixtures = TestFixtures::new();
    let jar = fixtures.bundle_jar(&BundleSpec::new("test.bundle.a", "1.0.0"));
    let listing = fixtures.write_file("tycho.txt", format!("{}\n", jar.display()));

    let located = read_listing(&listing).unwrap();
    assert_eq!(located.len(), 1);
    assert_eq!(located[0].file_name(), Some("test.bundle.a_1.0.0.jar"));

    let baseline = Baseline::load_listing("tycho", &listing, &ctx()).unwrap();
    assert_eq!(ids(&baseline.modules().unwrap()), vec!["test.bundle.a 1.0.0"]);
}

#[test]
fn test_load_directory_skips_source_bundles_and_junk() {
    let fixtures = TestFixtures::new();
    fixtures.bundle_jar(&BundleSpec::new("b", "1.0.0"));
    fixtures.bundle_directory(&BundleSpec::new("c", "1.0.0"));
    fixtures.bundle_jar(
        &BundleSpec::new("b.source", "1.0.0").header("Eclipse-SourceBundle", "b;version=1.0.0"),
    );
    fixtures.write_file("plugins/notes.txt", "not a bundle");

    let baseline =
        Baseline::load_directory("plugins", &fixtures.path().join("plugins"), &ctx()).unwrap();
    assert_eq!(ids(&baseline.modules().unwrap()), vec!["b 1.0.0", "c 1.0.0"]);
}

#[test]
fn test_resolve_package_is_idempotent() {
    let fixtures = TestFixtures::new();
    let ctx = ctx();
    let lib = bundle(
        &fixtures,
        BundleSpec::new("lib", "1.0.0")
            .export("com.lib;version=1.0.0")
            .class(TestFixtures::simple_class("com/lib/Lib")),
        &ctx,
    );
    let app = bundle(
        &fixtures,
        BundleSpec::new("app", "1.0.0")
            .import("com.lib")
            .class(TestFixtures::simple_class("com/app/App")),
        &ctx,
    );
    let baseline = Baseline::builder("idempotent", &ctx).build().unwrap();
    baseline.add_modules(vec![lib.clone(), app.clone()]).unwrap();

    let first = baseline.resolve_package(Some(&app), "com.lib").unwrap();
    assert_eq!(ids(&first), vec!["lib 1.0.0"]);
    let second = baseline.resolve_package(Some(&app), "com.lib").unwrap();
    assert_eq!(first.len(), second.len());
    assert!(first.iter().zip(&second).all(|(a, b)| Arc::ptr_eq(a, b)));

    assert_eq!(ids(&baseline.resolve_package(Some(&app), "com.app").unwrap()), vec!["app 1.0.0"]);
    assert!(baseline.resolve_package(Some(&app), "com.none").unwrap().is_empty());
    assert!(baseline.resolve_package(None, "com.lib").unwrap().is_empty());

    baseline.clear_package("com.lib");
    assert_eq!(ids(&baseline.resolve_package(Some(&app), "com.lib").unwrap()), vec!["lib 1.0.0"]);
}

#[test]
fn test_types_resolve_across_modules() {
    let fixtures = TestFixtures::new();
    let ctx = ctx();
    let lib = bundle(
        &fixtures,
        BundleSpec::new("lib", "1.0.0")
            .export("com.lib")
            .class(TestFixtures::simple_class("com/lib/Base")),
        &ctx,
    );
    let app = bundle(
        &fixtures,
        BundleSpec::new("app", "1.0.0").import("com.lib").class(
            TestFixtures::simple_class("com/app/App").superclass(Some("com/lib/Base")),
        ),
        &ctx,
    );
    let baseline = Baseline::builder("navigation", &ctx).build().unwrap();
    baseline.add_modules(vec![lib, app.clone()]).unwrap();

    let ty = app
        .find_type_root("com.app.App")
        .unwrap()
        .unwrap()
        .structure()
        .unwrap()
        .unwrap();
    let superclass = ty.superclass_type().unwrap().unwrap();
    assert_eq!(superclass.name(), "com.lib.Base");
    assert_eq!(superclass.module_id(), "lib");
}

#[test]
fn test_system_packages_resolve_to_system_library() {
    let fixtures = TestFixtures::new();
    let ctx = ctx_with(BaselineConfig {
        default_environment: Some("JavaSE-11".into()),
        ..Default::default()
    });
    let app = bundle(&fixtures, BundleSpec::new("app", "1.0.0").import("java.util,javax.xml.parsers"), &ctx);
    let baseline = Baseline::builder("system", &ctx).build().unwrap();
    baseline.add_modules(vec![app.clone()]).unwrap();

    assert_eq!(baseline.execution_environment().unwrap().as_deref(), Some("JavaSE-11"));
    assert!(baseline.is_system_package("java.util").unwrap());
    assert!(baseline.is_system_package("javax.xml.parsers").unwrap());
    assert!(!baseline.is_system_package("com.app").unwrap());

    let suppliers = baseline.resolve_package(Some(&app), "javax.xml.parsers").unwrap();
    assert_eq!(suppliers.len(), 1);
    assert!(suppliers[0].is_system_library());
    assert_eq!(suppliers[0].id(), "JavaSE-11");
    assert!(suppliers[0].api_description().unwrap().is_api("javax.xml.parsers"));
    assert!(baseline.errors().unwrap().is_empty());
}

#[test]
fn test_fragments_contribute_to_host() {
    let fixtures = TestFixtures::new();
    let ctx = ctx();
    let host = bundle(
        &fixtures,
        BundleSpec::new("host", "1.0.0")
            .export("com.host")
            .class(TestFixtures::simple_class("com/host/H")),
        &ctx,
    );
    let fragment = bundle(
        &fixtures,
        BundleSpec::new("host.frag", "1.0.0")
            .fragment_host("host;bundle-version=\"[1.0.0,2.0.0)\"")
            .export("com.frag")
            .class(TestFixtures::simple_class("com/frag/F")),
        &ctx,
    );
    let baseline = Baseline::builder("fragments", &ctx).build().unwrap();
    baseline.add_modules(vec![host.clone(), fragment.clone()]).unwrap();

    assert!(fragment.is_fragment());
    assert!(host.has_fragments().unwrap());
    assert_eq!(ids(&fragment.hosts().unwrap()), vec!["host 1.0.0"]);

    // the host's own record leaves fragment packages out
    assert!(!host.local_api_description().unwrap().has_package("com.frag"));
    let composite = host.api_description().unwrap();
    assert!(composite.is_api("com.host"));
    assert!(composite.is_api("com.frag"));

    let root = host.find_type_root("com.frag.F").unwrap().unwrap();
    assert_eq!(root.module_id(), "host.frag");
    assert!(host
        .find_type_root_from("com.frag.F", "host.frag")
        .unwrap()
        .is_some());

    assert_eq!(
        ids(&baseline.resolve_package(Some(&fragment), "com.host").unwrap()),
        vec!["host 1.0.0"]
    );
}

#[test]
fn test_prerequisites_dependents_and_errors() {
    let fixtures = TestFixtures::new();
    let ctx = ctx();
    let base = bundle(&fixtures, BundleSpec::new("base", "1.0.0").export("com.base"), &ctx);
    let mid = bundle(
        &fixtures,
        BundleSpec::new("mid", "1.0.0").require("base").export("com.mid"),
        &ctx,
    );
    let top = bundle(
        &fixtures,
        BundleSpec::new("top", "1.0.0").import("com.mid,com.gone"),
        &ctx,
    );
    let baseline = Baseline::builder("graph", &ctx).build().unwrap();
    baseline
        .add_modules(vec![base.clone(), mid.clone(), top.clone()])
        .unwrap();

    assert_eq!(
        ids(&baseline.prerequisite_modules(&[top.clone()]).unwrap()),
        vec!["base 1.0.0", "mid 1.0.0", "top 1.0.0"]
    );
    assert_eq!(
        ids(&baseline.dependent_modules(&[mid.clone()]).unwrap()),
        vec!["mid 1.0.0", "top 1.0.0"]
    );

    assert_eq!(
        top.errors().unwrap(),
        vec![ResolverError::MissingImport {
            name: "com.gone".into(),
            range: "0.0.0".into(),
        }]
    );
    assert_eq!(baseline.errors().unwrap().len(), 1);
    assert!(mid.errors().unwrap().is_empty());
}

#[test]
fn test_environment_binding_prefers_highest_runtime() {
    let fixtures = TestFixtures::new();
    let runtime = |id: &str, version: &str, envs: &[&str]| InstalledRuntime {
        id: id.into(),
        java_version: version.into(),
        path: fixtures.path().join(id),
        environments: envs.iter().map(|e| e.to_string()).collect(),
    };
    let ctx = ctx_with(BaselineConfig {
        runtime_images: vec![
            runtime("jdk11", "11.0.20", &["JavaSE-11"]),
            runtime("jdk17", "17.0.8", &["JavaSE-11", "JavaSE-17"]),
        ],
        ..Default::default()
    });
    let app = bundle(
        &fixtures,
        BundleSpec::new("app", "1.0.0").execution_environment("JavaSE-11,JavaSE-99"),
        &ctx,
    );
    let baseline = Baseline::builder("runtimes", &ctx).build().unwrap();
    baseline.add_modules(vec![app]).unwrap();

    let status = baseline.environment_status().unwrap();
    assert_eq!(status.bindings["JavaSE-11"].id, "jdk17");
    assert!(status.unsatisfied.contains("JavaSE-99"));
    assert!(!status.is_ok());
    // advisory only: the known environment is still bound
    assert_eq!(baseline.execution_environment().unwrap().as_deref(), Some("JavaSE-11"));
    let library = baseline.module("JavaSE-11").unwrap().unwrap();
    assert_eq!(library.version().to_string(), "17.0.8");
}

#[test]
fn test_rebind_waits_for_analysis_to_drain() {
    let ctx = ctx_with(BaselineConfig {
        default_environment: Some("JavaSE-17".into()),
        ..Default::default()
    });
    let baseline = Baseline::builder("rebind", &ctx).build().unwrap();
    let before = baseline.system_libraries().unwrap();

    let guard = baseline.begin_analysis().unwrap();
    let handle = baseline.spawn_rebind().unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    while !guard.token().is_cancelled() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert!(guard.token().is_cancelled());
    assert!(!handle.is_finished());
    drop(guard);

    let status = handle.join().unwrap().unwrap();
    assert!(status.unsatisfied.contains("JavaSE-17"));
    let after = baseline.system_libraries().unwrap();
    assert_eq!(after.len(), 1);
    assert!(!Arc::ptr_eq(&before[0], &after[0]));
    assert!(before[0].is_disposed());
}

#[test]
fn test_dispose_releases_every_module() {
    let fixtures = TestFixtures::new();
    let ctx = ctx();
    let modules: Vec<Arc<Module>> = ["a", "b", "c"]
        .iter()
        .map(|name| {
            bundle(
                &fixtures,
                BundleSpec::new(name, "1.0.0")
                    .export(&format!("com.{}", name))
                    .class(TestFixtures::simple_class(&format!("com/{}/T", name))),
                &ctx,
            )
        })
        .collect();
    let disposed = Arc::new(AtomicUsize::new(0));
    for module in &modules {
        let counter = disposed.clone();
        module.on_dispose(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
    }
    let baseline = Baseline::builder("disposable", &ctx).build().unwrap();
    baseline.add_modules(modules.clone()).unwrap();
    modules[0]
        .find_type_root("com.a.T")
        .unwrap()
        .unwrap()
        .structure()
        .unwrap();
    assert!(!ctx.cache().is_empty());

    baseline.dispose();
    baseline.dispose();

    assert_eq!(disposed.load(Ordering::SeqCst), 3);
    assert!(modules.iter().all(|m| m.is_disposed()));
    assert!(ctx.cache().is_empty());

    let err = baseline.resolve_package(None, "com.a").unwrap_err();
    assert!(err.is_disposed());
    assert!(err.to_string().contains("baseline_test.rs"), "{}", err);
    assert!(baseline.module("a").unwrap_err().is_disposed());
    assert!(baseline.modules().unwrap_err().is_disposed());
    assert!(baseline.add_modules(Vec::new()).unwrap_err().is_disposed());
    assert!(modules[1].package_names().unwrap_err().is_disposed());
}

#[test]
fn test_module_joins_one_baseline() {
    let fixtures = TestFixtures::new();
    let ctx = ctx();
    let module = bundle(&fixtures, BundleSpec::new("a", "1.0.0"), &ctx);
    let first = Baseline::builder("first", &ctx).build().unwrap();
    let second = Baseline::builder("second", &ctx).build().unwrap();

    first.add_modules(vec![module.clone()]).unwrap();
    let err = second.add_modules(vec![module.clone()]).unwrap_err();
    assert!(err.to_string().contains("first"), "{}", err);
    assert!(Arc::ptr_eq(&module.baseline().unwrap(), &first));
}

#[test]
fn test_late_fragment_refreshes_host() {
    let fixtures = TestFixtures::new();
    let ctx = ctx();
    let host = bundle(
        &fixtures,
        BundleSpec::new("host", "1.0.0")
            .export("com.host")
            .class(TestFixtures::simple_class("com/host/H")),
        &ctx,
    );
    let baseline = Baseline::builder("late", &ctx).build().unwrap();
    baseline.add_modules(vec![host.clone()]).unwrap();
    assert_eq!(host.package_names().unwrap().as_slice(), ["com.host".to_string()]);

    let fragment = bundle(
        &fixtures,
        BundleSpec::new("host.frag", "1.0.0")
            .fragment_host("host")
            .export("com.frag")
            .class(TestFixtures::simple_class("com/frag/F")),
        &ctx,
    );
    baseline.add_modules(vec![fragment, host.clone()]).unwrap();

    assert!(!host.is_disposed());
    assert!(host.find_type_root("com.frag.F").unwrap().is_some());
    assert!(host.api_description().unwrap().is_api("com.frag"));
}

#[test]
fn test_versions_of_one_module_keep_their_own_types() {
    let fixtures = TestFixtures::new();
    let ctx = ctx();
    let old = bundle(
        &fixtures,
        BundleSpec::new("a", "1.0.0")
            .export("com.x")
            .class(TestFixtures::simple_class("com/x/A")),
        &ctx,
    );
    let new = bundle(
        &fixtures,
        BundleSpec::new("a", "1.0.1")
            .export("com.x")
            .class(TestFixtures::simple_class("com/x/A").superclass(Some("java/lang/Exception"))),
        &ctx,
    );
    let baseline = Baseline::builder("two-versions", &ctx).build().unwrap();
    baseline.add_modules(vec![old.clone(), new.clone()]).unwrap();

    let structure = |version: &str| {
        baseline
            .module_version("a", &ModuleVersion::parse(version).unwrap())
            .unwrap()
            .unwrap()
            .find_type_root("com.x.A")
            .unwrap()
            .unwrap()
            .structure()
            .unwrap()
            .unwrap()
    };
    let old_type = structure("1.0.0");
    let new_type = structure("1.0.1");
    assert_eq!(old_type.superclass_name(), Some("java.lang.Object"));
    assert_eq!(new_type.superclass_name(), Some("java.lang.Exception"));
    assert_ne!(*old_type, *new_type);

    old.dispose();
    assert_eq!(structure("1.0.1").superclass_name(), Some("java.lang.Exception"));
    assert!(Arc::ptr_eq(&structure("1.0.1"), &new_type));
}

#[test]
fn test_refresh_runtimes_rebinds_on_change() {
    let runtimes = Arc::new(MutableRuntimes::default());
    let ctx = ctx_with(BaselineConfig {
        default_environment: Some("JavaSE-11".into()),
        ..Default::default()
    });
    let baseline = Baseline::builder("refresh", &ctx)
        .runtimes(runtimes.clone())
        .build()
        .unwrap();
    assert!(baseline.environment_status().unwrap().unsatisfied.contains("JavaSE-11"));
    assert!(baseline.refresh_runtimes().unwrap().is_none());
    let before = baseline.system_libraries().unwrap();

    runtimes.install(runtime("jdk11", "11.0.20", &["JavaSE-11"]));
    let handle = baseline.refresh_runtimes().unwrap().unwrap();
    let status = handle.join().unwrap().unwrap();

    assert_eq!(status.bindings["JavaSE-11"].id, "jdk11");
    assert!(status.is_ok());
    let after = baseline.system_libraries().unwrap();
    assert_eq!(after[0].version().to_string(), "11.0.20");
    assert!(before[0].is_disposed());
    assert!(baseline.refresh_runtimes().unwrap().is_none());
}

#[test]
fn test_cancelled_rebind_keeps_previous_binding() {
    let fixtures = TestFixtures::new();
    let runtimes = Arc::new(MutableRuntimes::default());
    runtimes.install(runtime("jdk11", "11.0.20", &["JavaSE-11"]));
    let resolver = Arc::new(CancellingResolver::default());
    let ctx = ctx();
    let baseline = Baseline::builder("cancelled", &ctx)
        .runtimes(runtimes.clone())
        .resolver(resolver.clone())
        .build()
        .unwrap();
    let _ = resolver.baseline.set(Arc::downgrade(&baseline));
    let app = bundle(
        &fixtures,
        BundleSpec::new("app", "1.0.0").execution_environment("JavaSE-11"),
        &ctx,
    );
    baseline.add_modules(vec![app]).unwrap();
    let before = baseline.system_libraries().unwrap();
    let status = baseline.environment_status().unwrap();

    runtimes.install(runtime("jdk11u", "11.0.24", &["JavaSE-11"]));
    resolver.armed.store(true, Ordering::SeqCst);
    let err = baseline.rebind_environments().unwrap_err();
    assert!(matches!(err, ModelError::Core(CoreError::Cancelled)), "{}", err);

    resolver.armed.store(true, Ordering::SeqCst);
    let late = bundle(&fixtures, BundleSpec::new("late", "1.0.0"), &ctx);
    let err = baseline.add_modules(vec![late]).unwrap_err();
    assert!(matches!(err, ModelError::Core(CoreError::Cancelled)), "{}", err);
    assert!(baseline.module("late").unwrap().is_none());

    let kept = baseline.system_libraries().unwrap();
    assert_eq!(kept.len(), 1);
    assert!(Arc::ptr_eq(&kept[0], &before[0]));
    assert!(!kept[0].is_disposed());
    assert_eq!(baseline.environment_status().unwrap(), status);
    assert_eq!(baseline.execution_environment().unwrap().as_deref(), Some("JavaSE-11"));

    let status = baseline.rebind_environments().unwrap();
    assert_eq!(status.bindings["JavaSE-11"].id, "jdk11u");
    assert!(before[0].is_disposed());
}

#[test]
fn test_resolve_package_fails_once_disposed() {
    let fixtures = TestFixtures::new();
    let ctx = ctx();
    let lib = bundle(
        &fixtures,
        BundleSpec::new("lib", "1.0.0")
            .export("com.lib")
            .class(TestFixtures::simple_class("com/lib/Lib")),
        &ctx,
    );
    let app = bundle(&fixtures, BundleSpec::new("app", "1.0.0").import("com.lib"), &ctx);
    let baseline = Baseline::builder("racing", &ctx).build().unwrap();
    baseline.add_modules(vec![lib, app.clone()]).unwrap();

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let baseline = baseline.clone();
            let app = app.clone();
            std::thread::spawn(move || loop {
                match baseline.resolve_package(Some(&app), "com.lib") {
                    Ok(suppliers) => {
                        assert_eq!(ids(&suppliers), vec!["lib 1.0.0"]);
                        std::thread::sleep(Duration::from_millis(1));
                    }
                    Err(e) => {
                        assert!(e.is_disposed(), "{}", e);
                        break;
                    }
                }
            })
        })
        .collect();
    std::thread::sleep(Duration::from_millis(20));
    baseline.dispose();
    for worker in workers {
        worker.join().unwrap();
    }
    assert!(baseline.resolve_package(Some(&app), "com.lib").unwrap_err().is_disposed());
}
