use std::sync::Arc;

use apiscope_container::{
    ArchiveContainer, ArchiveLayout, CollectingVisitor, CompositeContainer, ContainerError,
    ContainerVisitor, DirectoryContainer, TypeContainer, TypeRoot,
};
use apiscope_core::{CancelToken, ModelCache, TypeOrigin};
use apiscope_test_fixtures::{write_archive, TestFixtures};
use pretty_assertions::assert_eq;

fn class_entry(name: &str) -> (String, Vec<u8>) {
    (
        format!("{}.class", name),
        TestFixtures::simple_class(name).build(),
    )
}

fn prefixed_entry(prefix: &str, name: &str) -> (String, Vec<u8>) {
    (
        format!("{}{}.class", prefix, name),
        TestFixtures::simple_class(name).build(),
    )
}

fn archive(path: &std::path::Path, module: &str, cache: &Arc<ModelCache>) -> ArchiveContainer {
    ArchiveContainer::new(path, TypeOrigin::new("base", module), cache.clone())
}

#[test]
fn test_archive_lists_and_finds_types() {
    let fixtures = TestFixtures::new();
    let jar = write_archive(
        &fixtures.path().join("a.jar"),
        &[
            ("META-INF/MANIFEST.MF".into(), b"Manifest-Version: 1.0\r\n".to_vec()),
            class_entry("com/x/B"),
            class_entry("com/x/A"),
            class_entry("com/x/A$Inner"),
            class_entry("org/y/C"),
            ("com/x/readme.txt".into(), b"not a class".to_vec()),
        ],
    );
    let cache = Arc::new(ModelCache::default());
    let container = TypeContainer::from(archive(&jar, "a", &cache));

    assert_eq!(container.list_package_names().unwrap(), vec!["com.x", "org.y"]);
    assert!(container.contains_package("org.y").unwrap());
    assert!(!container.contains_package("org").unwrap());

    let root = container.find_type_root("com.x.A").unwrap().unwrap();
    assert_eq!(root.name(), "com.x.A");
    assert_eq!(root.package_name(), "com.x");
    assert!(root.location().ends_with("a.jar!/com/x/A.class"));
    assert!(container.find_type_root("com.x.Missing").unwrap().is_none());

    let ty = root.structure().unwrap().unwrap();
    assert_eq!(ty.name(), "com.x.A");
    let again = root.structure().unwrap().unwrap();
    assert!(Arc::ptr_eq(&ty, &again));
    assert!(cache.lookup("base", "a", "com.x.A").is_some());
}

#[test]
fn test_archive_prefix_restricts_entries() {
    let fixtures = TestFixtures::new();
    let jar = write_archive(
        &fixtures.path().join("b.jar"),
        &[
            class_entry("com/x/Outside"),
            prefixed_entry("bin/", "com/x/Inside"),
        ],
    );
    let cache = Arc::new(ModelCache::default());
    let container = TypeContainer::from(archive(&jar, "b", &cache).with_prefix("bin"));

    assert!(container.find_type_root("com.x.Inside").unwrap().is_some());
    assert!(container.find_type_root("com.x.Outside").unwrap().is_none());
    assert!(container.location().ends_with("b.jar!/bin/"));
}

#[test]
fn test_jmod_classes_directory() {
    let fixtures = TestFixtures::new();
    let jmod = write_archive(
        &fixtures.path().join("java.base.jmod"),
        &[
            prefixed_entry("classes/", "java/lang/Object"),
            prefixed_entry("classes/", "java/util/List"),
            ("classes/module-info.class".into(), vec![0xCA, 0xFE]),
            ("lib/libjava.so".into(), vec![0]),
        ],
    );
    let cache = Arc::new(ModelCache::default());
    let container = archive(&jmod, "jre", &cache);
    assert_eq!(container.layout(), ArchiveLayout::Jmod);

    let container = TypeContainer::from(container);
    assert_eq!(container.list_package_names().unwrap(), vec!["java.lang", "java.util"]);
    let root = container.find_type_root("java.lang.Object").unwrap().unwrap();
    assert_eq!(root.structure().unwrap().unwrap().name(), "java.lang.Object");
}

#[test]
fn test_module_image_directory_strips_module_segment() {
    let fixtures = TestFixtures::new();
    fixtures.write_file(
        "jre/modules/java.base/java/lang/String.class",
        TestFixtures::simple_class("java/lang/String").build(),
    );
    fixtures.write_file(
        "jre/modules/java.base/module-info.class",
        vec![0xCA, 0xFE],
    );
    fixtures.write_file(
        "jre/modules/java.sql/java/sql/Driver.class",
        TestFixtures::simple_class("java/sql/Driver").build(),
    );
    let cache = Arc::new(ModelCache::default());
    let image = archive(&fixtures.path().join("jre"), "jre", &cache);
    assert_eq!(image.layout(), ArchiveLayout::ModuleImage);

    let container = TypeContainer::from(image);
    assert_eq!(container.list_package_names().unwrap(), vec!["java.lang", "java.sql"]);
    let root = container.find_type_root("java.sql.Driver").unwrap().unwrap();
    assert_eq!(root.structure().unwrap().unwrap().name(), "java.sql.Driver");
}

#[test]
fn test_module_image_archive_strips_module_segment() {
    let fixtures = TestFixtures::new();
    let image = write_archive(
        &fixtures.path().join("modules.zip"),
        &[
            prefixed_entry("java.base/", "java/lang/Object"),
            prefixed_entry("java.desktop/", "java/awt/Color"),
        ],
    );
    let cache = Arc::new(ModelCache::default());
    let container = TypeContainer::from(ArchiveContainer::with_layout(
        &image,
        ArchiveLayout::ModuleImage,
        TypeOrigin::new("base", "jre"),
        cache,
    ));

    assert_eq!(container.list_package_names().unwrap(), vec!["java.awt", "java.lang"]);
    assert!(container.find_type_root("java.awt.Color").unwrap().is_some());
}

#[test]
fn test_directory_container() {
    let fixtures = TestFixtures::new();
    fixtures.write_file("bin/Top.class", TestFixtures::simple_class("Top").build());
    fixtures.write_file(
        "bin/com/x/A.class",
        TestFixtures::simple_class("com/x/A").build(),
    );
    fixtures.write_file("bin/com/x/notes.txt", "ignored");
    let cache = Arc::new(ModelCache::default());
    let container = TypeContainer::from(DirectoryContainer::new(
        fixtures.path().join("bin"),
        TypeOrigin::new("base", "dir"),
        cache,
    ));

    assert_eq!(container.list_package_names().unwrap(), vec!["", "com.x"]);
    assert!(container.contains_package(".").unwrap());
    let top = container.find_type_root("Top").unwrap().unwrap();
    assert_eq!(top.structure().unwrap().unwrap().name(), "Top");
}

#[test]
fn test_directory_rescans_after_close() {
    let fixtures = TestFixtures::new();
    fixtures.write_file("bin/p/A.class", TestFixtures::simple_class("p/A").build());
    let cache = Arc::new(ModelCache::default());
    let container = TypeContainer::from(DirectoryContainer::new(
        fixtures.path().join("bin"),
        TypeOrigin::new("base", "dir"),
        cache,
    ));
    assert!(container.find_type_root("p.B").unwrap().is_none());

    fixtures.write_file("bin/p/B.class", TestFixtures::simple_class("p/B").build());
    assert!(container.find_type_root("p.B").unwrap().is_none());
    container.close();
    assert!(container.find_type_root("p.B").unwrap().is_some());
}

#[test]
fn test_missing_archive_is_an_io_error() {
    let fixtures = TestFixtures::new();
    let cache = Arc::new(ModelCache::default());
    let container = TypeContainer::from(archive(&fixtures.path().join("nope.jar"), "x", &cache));
    let err = container.list_package_names().unwrap_err();
    assert!(matches!(err, ContainerError::Io { .. }));
    assert!(err.to_string().contains("nope.jar"));
}

#[test]
fn test_composite_first_match_and_union() {
    let fixtures = TestFixtures::new();
    let first = write_archive(
        &fixtures.path().join("first.jar"),
        &[class_entry("com/x/Shared"), class_entry("com/x/One")],
    );
    let second = write_archive(
        &fixtures.path().join("second.jar"),
        &[class_entry("com/x/Shared"), class_entry("org/y/Two")],
    );
    let cache = Arc::new(ModelCache::default());
    let composite = TypeContainer::from(CompositeContainer::new(
        "host",
        vec![
            archive(&first, "host", &cache).into(),
            archive(&second, "fragment", &cache).into(),
        ],
    ));

    assert_eq!(composite.list_package_names().unwrap(), vec!["com.x", "org.y"]);

    let shared = composite.find_type_root("com.x.Shared").unwrap().unwrap();
    assert_eq!(shared.module_id(), "host");
    let preferred = composite
        .find_type_root_from("com.x.Shared", "fragment")
        .unwrap()
        .unwrap();
    assert_eq!(preferred.module_id(), "fragment");
    let fallback = composite
        .find_type_root_from("com.x.One", "fragment")
        .unwrap()
        .unwrap();
    assert_eq!(fallback.module_id(), "host");
    assert!(composite.find_type_root("org.y.Three").unwrap().is_none());
}

#[test]
fn test_visit_orders_packages_and_types() {
    struct Recorder(Vec<String>);
    impl ContainerVisitor for Recorder {
        fn visit_package(&mut self, package: &str) -> bool {
            self.0.push(format!("+{}", package));
            package != "skip"
        }
        fn visit_type(&mut self, _package: &str, root: &TypeRoot) {
            self.0.push(root.name().to_string());
        }
        fn end_visit_package(&mut self, package: &str) {
            self.0.push(format!("-{}", package));
        }
    }

    let fixtures = TestFixtures::new();
    let jar = write_archive(
        &fixtures.path().join("v.jar"),
        &[
            class_entry("b/Z"),
            class_entry("b/A"),
            class_entry("a/M"),
            class_entry("skip/Hidden"),
        ],
    );
    let cache = Arc::new(ModelCache::default());
    let container = TypeContainer::from(archive(&jar, "v", &cache));
    let mut recorder = Recorder(Vec::new());
    container.visit(&mut recorder).unwrap();

    assert_eq!(
        recorder.0,
        vec!["+a", "a.M", "-a", "+b", "b.A", "b.Z", "-b", "+skip", "-skip"]
    );

    let mut collect = CollectingVisitor::default();
    container.visit(&mut collect).unwrap();
    assert_eq!(collect.roots.len(), 4);
}

#[test]
fn test_close_releases_roots_and_cache() {
    let fixtures = TestFixtures::new();
    let jar = write_archive(&fixtures.path().join("c.jar"), &[class_entry("p/A")]);
    let cache = Arc::new(ModelCache::default());
    let container = TypeContainer::from(archive(&jar, "c", &cache));

    let root = container.find_type_root("p.A").unwrap().unwrap();
    root.structure().unwrap().unwrap();
    assert!(cache.lookup("base", "c", "p.A").is_some());

    container.close();
    assert!(cache.lookup("base", "c", "p.A").is_none());
    assert!(matches!(root.bytes(), Err(ContainerError::Closed { .. })));

    // reopening hands out fresh roots
    let reopened = container.find_type_root("p.A").unwrap().unwrap();
    assert!(reopened.bytes().is_ok());
}

#[test]
fn test_cancelled_scan_leaves_container_unopened() {
    let fixtures = TestFixtures::new();
    let jar = write_archive(&fixtures.path().join("d.jar"), &[class_entry("p/A")]);
    let cache = Arc::new(ModelCache::default());
    let container = TypeContainer::from(archive(&jar, "d", &cache));

    let cancel = CancelToken::new();
    cancel.cancel();
    assert!(matches!(container.open(&cancel), Err(ContainerError::Cancelled)));

    container.open(&CancelToken::new()).unwrap();
    assert_eq!(container.list_package_names().unwrap(), vec!["p"]);
}

#[test]
fn test_malformed_class_has_no_structure() {
    let fixtures = TestFixtures::new();
    let jar = write_archive(
        &fixtures.path().join("e.jar"),
        &[("p/Broken.class".into(), vec![0xCA, 0xFE, 0xBA, 0xBE, 0, 0])],
    );
    let cache = Arc::new(ModelCache::default());
    let container = TypeContainer::from(archive(&jar, "e", &cache));
    let root = container.find_type_root("p.Broken").unwrap().unwrap();
    assert!(root.structure().unwrap().is_none());
}
