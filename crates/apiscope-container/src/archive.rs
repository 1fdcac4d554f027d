//! Containers over zip-like archives and runtime module images
//!
//! Archives are never watched for changes: the package index is built once
//! on first use and kept until [`ArchiveContainer::close`].

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use apiscope_core::{naming, CancelToken, ModelCache, TypeOrigin};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};
use walkdir::WalkDir;
use zip::ZipArchive;

use crate::error::{ContainerError, Result};
use crate::index::{LazyIndex, PackageIndex};
use crate::root::{Locator, TypeRoot};

/// How entry paths map to type names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveLayout {
    /// Plain jar: entry paths are package paths
    Jar,
    /// JDK `.jmod`: classes live under `classes/`
    Jmod,
    /// Runtime module image: every entry starts with a module name segment
    ModuleImage,
}

impl ArchiveLayout {
    /// Picks a layout from the file name
    pub fn detect(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("jmod") => Self::Jmod,
            _ if path.is_dir() => Self::ModuleImage,
            _ => Self::Jar,
        }
    }

    /// Path relative to the package root, or `None` for entries that are not
    /// types of this container
    fn relative<'a>(self, entry: &'a str, prefix: Option<&str>) -> Option<&'a str> {
        let entry = match self {
            Self::Jar => entry,
            Self::Jmod => entry.strip_prefix("classes/")?,
            Self::ModuleImage => entry.split_once('/')?.1,
        };
        let entry = match prefix {
            Some(prefix) => entry.strip_prefix(prefix)?,
            None => entry,
        };
        if entry.starts_with("META-INF/") || entry.rsplit('/').next() == Some("module-info.class") {
            return None;
        }
        Some(entry)
    }
}

/// Open zip file shared between a container and the roots it hands out
pub(crate) struct ZipHandle {
    path: PathBuf,
    archive: Mutex<ZipArchive<BufReader<File>>>,
}

impl ZipHandle {
    fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| ContainerError::io(path, e))?;
        let archive =
            ZipArchive::new(BufReader::new(file)).map_err(|e| ContainerError::zip(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            archive: Mutex::new(archive),
        })
    }

    pub(crate) fn read(&self, entry: &str) -> Result<Vec<u8>> {
        let mut archive = self.archive.lock();
        let mut file = archive
            .by_name(entry)
            .map_err(|e| ContainerError::zip(&self.path, e))?;
        let mut buffer = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut buffer)
            .map_err(|e| ContainerError::io(&self.path, e))?;
        Ok(buffer)
    }

    fn entry_names(&self) -> Vec<String> {
        self.archive.lock().file_names().map(str::to_string).collect()
    }
}

/// Type container backed by an archive file or a module image directory
pub struct ArchiveContainer {
    path: PathBuf,
    layout: ArchiveLayout,
    prefix: Option<String>,
    origin: TypeOrigin,
    cache: Arc<ModelCache>,
    handle: RwLock<Option<Arc<ZipHandle>>>,
    index: LazyIndex,
}

impl ArchiveContainer {
    pub fn new(
        path: impl Into<PathBuf>,
        origin: TypeOrigin,
        cache: Arc<ModelCache>,
    ) -> Self {
        let path = path.into();
        let layout = ArchiveLayout::detect(&path);
        Self::with_layout(path, layout, origin, cache)
    }

    pub fn with_layout(
        path: impl Into<PathBuf>,
        layout: ArchiveLayout,
        origin: TypeOrigin,
        cache: Arc<ModelCache>,
    ) -> Self {
        Self {
            path: path.into(),
            layout,
            prefix: None,
            origin,
            cache,
            handle: RwLock::new(None),
            index: LazyIndex::default(),
        }
    }

    /// Restricts the container to entries below a directory of the archive,
    /// as used by bundle classpath entries such as `bin/`
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        let mut prefix = prefix.into();
        if !prefix.is_empty() && !prefix.ends_with('/') {
            prefix.push('/');
        }
        self.prefix = if prefix.is_empty() { None } else { Some(prefix) };
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn layout(&self) -> ArchiveLayout {
        self.layout
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn origin(&self) -> &TypeOrigin {
        &self.origin
    }

    fn is_image_directory(&self) -> bool {
        self.layout == ArchiveLayout::ModuleImage && self.path.is_dir()
    }

    /// Module image directories keep their modules under `modules/` when present
    fn image_root(&self) -> PathBuf {
        let modules = self.path.join("modules");
        if modules.is_dir() {
            modules
        } else {
            self.path.clone()
        }
    }

    fn zip_handle(&self) -> Result<Arc<ZipHandle>> {
        if let Some(handle) = self.handle.read().as_ref() {
            return Ok(handle.clone());
        }
        let mut slot = self.handle.write();
        if let Some(handle) = slot.as_ref() {
            return Ok(handle.clone());
        }
        debug!("Opening archive {}", self.path.display());
        let handle = Arc::new(ZipHandle::open(&self.path)?);
        *slot = Some(handle.clone());
        Ok(handle)
    }

    /// Builds the package index if needed, observing `cancel`
    pub fn index(&self, cancel: &CancelToken) -> Result<Arc<PackageIndex>> {
        self.index.get_or_try_init(|| {
            let entries = if self.is_image_directory() {
                self.image_entries(cancel)?
            } else {
                self.zip_handle()?.entry_names()
            };

            let mut index = PackageIndex::new();
            for entry in entries {
                if cancel.is_cancelled() {
                    return Err(ContainerError::Cancelled);
                }
                let Some(relative) = self.layout.relative(&entry, self.prefix.as_deref()) else {
                    continue;
                };
                if let Some(type_name) = naming::type_name_from_entry(relative) {
                    index.insert(type_name, entry);
                }
            }
            info!(
                "Indexed {} types in {} packages from {}",
                index.len(),
                index.package_names().count(),
                self.path.display()
            );
            Ok(index)
        })
    }

    fn image_entries(&self, cancel: &CancelToken) -> Result<Vec<String>> {
        let root = self.image_root();
        let mut entries = Vec::new();
        for entry in WalkDir::new(&root).sort_by_file_name() {
            if cancel.is_cancelled() {
                return Err(ContainerError::Cancelled);
            }
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.clone());
                ContainerError::io(path, e.into())
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(relative) = entry.path().strip_prefix(&root) {
                let relative = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                entries.push(relative);
            }
        }
        Ok(entries)
    }

    fn root_for(&self, type_name: &str, entry: &str) -> Result<TypeRoot> {
        let locator = if self.is_image_directory() {
            Locator::File(self.image_root().join(entry))
        } else {
            Locator::Zip {
                handle: Arc::downgrade(&self.zip_handle()?),
                path: self.path.clone(),
                entry: entry.to_string(),
            }
        };
        Ok(TypeRoot::new(
            type_name,
            locator,
            self.origin.clone(),
            self.cache.clone(),
        ))
    }

    pub fn find_type_root(&self, type_name: &str) -> Result<Option<TypeRoot>> {
        let index = self.index(&CancelToken::new())?;
        match index.entry(type_name) {
            Some(entry) => self.root_for(type_name, entry).map(Some),
            None => Ok(None),
        }
    }

    pub fn list_package_names(&self) -> Result<Vec<String>> {
        let index = self.index(&CancelToken::new())?;
        Ok(index.package_names().map(str::to_string).collect())
    }

    pub(crate) fn roots(&self, package: &str) -> Result<Vec<TypeRoot>> {
        let index = self.index(&CancelToken::new())?;
        index
            .types(package)
            .map(|(name, entry)| self.root_for(name, entry))
            .collect()
    }

    /// Drops the index and the open archive and evicts cached structures
    pub fn close(&self) {
        if let Some(index) = self.index.take() {
            let module = self.origin.cache_module();
            for name in index.type_names() {
                self.cache.evict(self.origin.baseline(), &module, name);
            }
        }
        if self.handle.write().take().is_some() {
            debug!("Closed archive {}", self.path.display());
        }
    }
}
