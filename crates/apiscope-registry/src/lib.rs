//! Modules, baselines and package resolution
//!
//! A [`Baseline`] is a named set of [`Module`]s. Modules are bundles read
//! from jars or directories, plus one system library standing for the
//! runtime. The baseline wires them together through a [`ModuleResolver`]
//! and answers which modules supply a package to which module.

pub mod baseline;
pub mod config;
pub mod description;
pub mod environment;
pub mod error;
pub mod listing;
pub mod manifest;
pub mod module;
pub mod resolver;

pub use baseline::{AnalysisGuard, Baseline, BaselineBuilder};
pub use config::{ModelConfig, ModelContext};
pub use description::{
    ApiDescription, CompositeApiDescription, ElementDescriptor, Restrictions, Visibility,
};
pub use environment::{EnvironmentStatus, InstalledRuntime, Profile, ProfileRegistry, RuntimeProvider};
pub use error::{ModelError, Result};
pub use listing::ListedArtifact;
pub use manifest::BundleManifest;
pub use module::{Module, ModuleKind};
pub use resolver::{ManifestResolver, ModuleKey, ModuleResolver, ResolvedState, ResolverError};
