//! Artifact listings produced by build tools
//!
//! Two line formats are understood. Maven dependency listings use
//! `group:artifact:type:version[:scope]:path`; tycho listings hold one bare
//! path per line. Blank lines and `#` comments are ignored. Relative paths
//! are taken relative to the listing file.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{ModelError, Result};

const MAVEN_SCOPES: &[&str] = &["compile", "provided", "runtime", "test", "system", "import"];

/// Maven coordinates of a listed artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MavenCoordinates {
    pub group: String,
    pub artifact: String,
    pub packaging: String,
    pub version: String,
    pub scope: Option<String>,
}

/// One line of a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedArtifact {
    pub coordinates: Option<MavenCoordinates>,
    pub path: PathBuf,
}

impl ListedArtifact {
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }
}

fn parse_line(line: &str) -> Option<ListedArtifact> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let fields: Vec<&str> = line.split(':').collect();
    if fields.len() >= 5 {
        let has_scope = fields.len() > 5 && MAVEN_SCOPES.contains(&fields[4]);
        let path_start = if has_scope { 5 } else { 4 };
        return Some(ListedArtifact {
            coordinates: Some(MavenCoordinates {
                group: fields[0].to_string(),
                artifact: fields[1].to_string(),
                packaging: fields[2].to_string(),
                version: fields[3].to_string(),
                scope: has_scope.then(|| fields[4].to_string()),
            }),
            path: PathBuf::from(fields[path_start..].join(":")),
        });
    }

    Some(ListedArtifact {
        coordinates: None,
        path: PathBuf::from(line),
    })
}

/// Parses listing text without touching the file system
pub fn parse_listing(text: &str) -> Vec<ListedArtifact> {
    text.lines().filter_map(parse_line).collect()
}

/// Reads a listing and keeps the artifacts that exist on disk
///
/// Missing artifacts are logged and skipped.
pub fn read_listing(path: &Path) -> Result<Vec<ListedArtifact>> {
    let text = fs::read_to_string(path).map_err(|e| ModelError::io(path, e))?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));

    let mut located = Vec::new();
    for mut artifact in parse_listing(&text) {
        if artifact.path.is_relative() {
            artifact.path = base.join(&artifact.path);
        }
        if artifact.path.exists() {
            located.push(artifact);
        } else {
            warn!(
                "Listed artifact {} does not exist, skipping",
                artifact.path.display()
            );
        }
    }
    debug!("{} lists {} artifacts", path.display(), located.len());
    Ok(located)
}

/// Bundle candidates in a plugins directory: jars and unpacked directories,
/// sorted by name
pub fn scan_directory(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf());
            ModelError::io(path, e.into())
        })?;
        let path = entry.path();
        let is_jar = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("jar"));
        if is_jar || path.is_dir() {
            paths.push(path.to_path_buf());
        }
    }
    Ok(paths)
}
