//! Bundle jars and directories with manifests

use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use zip::write::FileOptions;
use zip::ZipWriter;

use crate::classfile::ClassFileBuilder;

/// Writes a zip archive with the given entries
pub fn write_archive(path: &Path, entries: &[(String, Vec<u8>)]) -> PathBuf {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, archive_bytes(entries)).unwrap();
    path.to_path_buf()
}

/// Zip archive bytes for nesting inside another archive
pub fn archive_bytes(entries: &[(String, Vec<u8>)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default();
    for (name, data) in entries {
        if name.ends_with('/') {
            writer.add_directory(name.trim_end_matches('/'), options).unwrap();
        } else {
            writer.start_file(name.as_str(), options).unwrap();
            writer.write_all(data).unwrap();
        }
    }
    writer.finish().unwrap().into_inner()
}

/// Description of a bundle to materialize for a test
#[derive(Debug, Clone)]
pub struct BundleSpec {
    pub symbolic_name: String,
    pub version: String,
    pub headers: Vec<(String, String)>,
    pub entries: Vec<(String, Vec<u8>)>,
}

impl BundleSpec {
    pub fn new(symbolic_name: &str, version: &str) -> Self {
        Self {
            symbolic_name: symbolic_name.into(),
            version: version.into(),
            headers: Vec::new(),
            entries: Vec::new(),
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn export(self, clause: &str) -> Self {
        self.header("Export-Package", clause)
    }

    pub fn import(self, clause: &str) -> Self {
        self.header("Import-Package", clause)
    }

    pub fn require(self, clause: &str) -> Self {
        self.header("Require-Bundle", clause)
    }

    pub fn classpath(self, entries: &str) -> Self {
        self.header("Bundle-ClassPath", entries)
    }

    pub fn fragment_host(self, host: &str) -> Self {
        self.header("Fragment-Host", host)
    }

    pub fn execution_environment(self, ee: &str) -> Self {
        self.header("Bundle-RequiredExecutionEnvironment", ee)
    }

    /// Adds a class at its natural entry path
    pub fn class(self, class: ClassFileBuilder) -> Self {
        let entry = format!("{}.class", class_name(&class));
        self.file(&entry, class.build())
    }

    /// Adds a class under a prefix such as `bin/`
    pub fn class_at(self, prefix: &str, class: ClassFileBuilder) -> Self {
        let entry = format!("{}{}.class", prefix, class_name(&class));
        self.file(&entry, class.build())
    }

    pub fn file(mut self, path: &str, data: Vec<u8>) -> Self {
        self.entries.push((path.into(), data));
        self
    }

    /// `MANIFEST.MF` text with continuation lines for long values
    pub fn manifest(&self) -> String {
        let mut lines = vec![
            "Manifest-Version: 1.0".to_string(),
            "Bundle-ManifestVersion: 2".to_string(),
            format!("Bundle-SymbolicName: {}", self.symbolic_name),
            format!("Bundle-Version: {}", self.version),
        ];
        for (name, value) in &self.headers {
            lines.push(format!("{}: {}", name, value));
        }
        let mut out = String::new();
        for line in lines {
            let mut rest = line.as_str();
            let mut first = true;
            while !rest.is_empty() {
                let limit = if first { 70 } else { 69 };
                let mut cut = rest.len().min(limit);
                while !rest.is_char_boundary(cut) {
                    cut -= 1;
                }
                if !first {
                    out.push(' ');
                }
                out.push_str(&rest[..cut]);
                out.push_str("\r\n");
                rest = &rest[cut..];
                first = false;
            }
        }
        out
    }

    fn all_entries(&self) -> Vec<(String, Vec<u8>)> {
        let mut entries = vec![(
            "META-INF/MANIFEST.MF".to_string(),
            self.manifest().into_bytes(),
        )];
        entries.extend(self.entries.iter().cloned());
        entries
    }

    pub fn file_name(&self) -> String {
        format!("{}_{}", self.symbolic_name, self.version)
    }

    /// Writes `<dir>/<name>_<version>.jar`
    pub fn write_jar(&self, dir: &Path) -> PathBuf {
        write_archive(
            &dir.join(format!("{}.jar", self.file_name())),
            &self.all_entries(),
        )
    }

    /// Writes an unpacked bundle directory `<dir>/<name>_<version>/`
    pub fn write_directory(&self, dir: &Path) -> PathBuf {
        let root = dir.join(self.file_name());
        for (name, data) in self.all_entries() {
            let path = root.join(&name);
            if name.ends_with('/') {
                fs::create_dir_all(&path).unwrap();
                continue;
            }
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(path, data).unwrap();
        }
        root
    }
}

fn class_name(class: &ClassFileBuilder) -> String {
    class.name().to_string()
}
