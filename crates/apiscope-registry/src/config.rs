//! Model configuration and the shared context built from it

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use apiscope_core::cache::{DEFAULT_CAPACITY, DEFAULT_OVERFLOW};
use apiscope_core::ModelCache;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::environment::{InstalledRuntime, ProfileRegistry, RuntimeProvider, StaticRuntimes};
use crate::error::{ModelError, Result};

/// Settings read from `apiscope.toml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub baseline: BaselineConfig,
}

/// Bounds for every level of the type cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Entries a level may hold past `capacity` before it is trimmed
    #[serde(default = "default_overflow")]
    pub overflow: usize,
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_overflow() -> usize {
    DEFAULT_OVERFLOW
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            overflow: DEFAULT_OVERFLOW,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineConfig {
    /// Packages starting with one of these are always supplied by the runtime
    #[serde(default = "default_system_prefixes")]
    pub system_package_prefixes: Vec<String>,

    /// Directory of `<environment>.profile` files
    #[serde(default)]
    pub profile_dir: Option<PathBuf>,

    /// Environment used when no module declares one
    #[serde(default)]
    pub default_environment: Option<String>,

    /// Runtimes available to bind execution environments to
    #[serde(default)]
    pub runtime_images: Vec<InstalledRuntime>,
}

fn default_system_prefixes() -> Vec<String> {
    vec!["java.".to_string()]
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            system_package_prefixes: default_system_prefixes(),
            profile_dir: None,
            default_environment: None,
            runtime_images: Vec::new(),
        }
    }
}

impl ModelConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| ModelError::io(path, e))?;
        let config: Self = toml::from_str(&content).map_err(|source| ModelError::Config {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn is_system_package(&self, package: &str) -> bool {
        self.baseline
            .system_package_prefixes
            .iter()
            .any(|prefix| package.starts_with(prefix.as_str()))
    }
}

impl std::str::FromStr for ModelConfig {
    type Err = toml::de::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        toml::from_str(s)
    }
}

/// Process-wide state shared by every module and baseline
///
/// Built once at startup and handed around as `Arc<ModelContext>`.
pub struct ModelContext {
    config: ModelConfig,
    cache: Arc<ModelCache>,
    profiles: ProfileRegistry,
}

impl ModelContext {
    pub fn new(config: ModelConfig) -> Arc<Self> {
        let cache = Arc::new(ModelCache::new(config.cache.capacity, config.cache.overflow));
        let profiles = ProfileRegistry::new(config.baseline.profile_dir.clone());
        Arc::new(Self {
            config,
            cache,
            profiles,
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<ModelCache> {
        &self.cache
    }

    pub fn profiles(&self) -> &ProfileRegistry {
        &self.profiles
    }

    /// Runtimes listed in the configuration
    pub fn configured_runtimes(&self) -> Arc<dyn RuntimeProvider> {
        Arc::new(StaticRuntimes::new(self.config.baseline.runtime_images.clone()))
    }

    /// Drops every cached type structure
    pub fn flush(&self) {
        self.cache.flush();
    }
}

impl Default for ModelContext {
    fn default() -> Self {
        let config = ModelConfig::default();
        Self {
            cache: Arc::new(ModelCache::new(config.cache.capacity, config.cache.overflow)),
            profiles: ProfileRegistry::new(None),
            config,
        }
    }
}

impl std::fmt::Debug for ModelContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: ModelConfig = "".parse().unwrap();
        assert_eq!(config, ModelConfig::default());
        assert_eq!(config.cache.capacity, 100);
        assert_eq!(config.cache.overflow, 10);
        assert!(config.is_system_package("java.lang"));
        assert!(!config.is_system_package("javax.xml"));
    }

    #[test]
    fn test_full_config() {
        let config: ModelConfig = r#"
            [cache]
            capacity = 20

            [baseline]
            system_package_prefixes = ["java.", "sun."]
            default_environment = "JavaSE-17"

            [[baseline.runtime_images]]
            id = "jdk17"
            java_version = "17.0.2"
            path = "/opt/jdk-17"
            environments = ["JavaSE-11", "JavaSE-17"]
        "#
        .parse()
        .unwrap();

        assert_eq!(config.cache.capacity, 20);
        assert_eq!(config.cache.overflow, 10);
        assert!(config.is_system_package("sun.misc"));
        assert_eq!(config.baseline.default_environment.as_deref(), Some("JavaSE-17"));
        assert_eq!(config.baseline.runtime_images[0].environments.len(), 2);
    }

    #[test]
    fn test_load_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("apiscope.toml");
        fs::write(&path, "[cache\n").unwrap();
        let err = ModelConfig::load(&path).unwrap_err();
        assert!(matches!(err, ModelError::Config { .. }));
        assert!(err.to_string().contains("apiscope.toml"));
    }
}
