//! Test fixtures for apiscope
//!
//! Synthesizes class files, bundle jars and listing files on disk so tests
//! never need a JDK or a real plugin directory.

pub mod bundle;
pub mod classfile;

pub use bundle::{archive_bytes, write_archive, BundleSpec};
pub use classfile::{ClassFileBuilder, Constant, ElementValue, FieldSpec, Insn, MethodSpec};

use std::fs;
use std::path::{Path, PathBuf};

/// Scratch directory that lives as long as the fixture
pub struct TestFixtures {
    temp_dir: tempfile::TempDir,
}

impl Default for TestFixtures {
    fn default() -> Self {
        Self::new()
    }
}

impl TestFixtures {
    pub fn new() -> Self {
        Self {
            temp_dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes a file relative to the fixture root
    pub fn write_file(&self, relative: &str, contents: impl AsRef<[u8]>) -> PathBuf {
        let path = self.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, contents).unwrap();
        path
    }

    /// Writes a bundle jar under `plugins/`
    pub fn bundle_jar(&self, spec: &BundleSpec) -> PathBuf {
        spec.write_jar(&self.path().join("plugins"))
    }

    /// Writes an unpacked bundle directory under `plugins/`
    pub fn bundle_directory(&self, spec: &BundleSpec) -> PathBuf {
        spec.write_directory(&self.path().join("plugins"))
    }

    /// A plain class with one public method, handy as filler
    pub fn simple_class(name: &str) -> ClassFileBuilder {
        ClassFileBuilder::new(name).method(
            MethodSpec::new("run", "()V", classfile::ACC_PUBLIC)
                .code(vec![Insn::Return]),
        )
    }
}
