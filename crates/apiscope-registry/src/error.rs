use std::io;
use std::path::PathBuf;

use apiscope_container::ContainerError;
use apiscope_core::CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error("IO error while reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("ZIP error while reading {path}: {source}")]
    Zip {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("Invalid {header} header '{value}': {reason}")]
    InvalidHeader {
        header: String,
        value: String,
        reason: String,
    },

    #[error("Not a valid module: {0}")]
    InvalidModule(String),

    #[error("Invalid execution environment profile {id}: {reason}")]
    Profile { id: String, reason: String },

    #[error("Unknown execution environment: {0}")]
    UnknownEnvironment(String),

    #[error("Invalid API description for {module}: {source}")]
    ApiDescription {
        module: String,
        #[source]
        source: quick_xml::DeError,
    },

    #[error("Invalid API description for {module}: {reason}")]
    ApiDescriptionContent { module: String, reason: String },

    #[error("Failed to parse configuration {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("{module} already belongs to baseline {baseline}")]
    Reparented { module: String, baseline: String },

    #[error("Invalid artifact listing {path}: {reason}")]
    Listing { path: PathBuf, reason: String },
}

impl ModelError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn zip(path: impl Into<PathBuf>, source: zip::result::ZipError) -> Self {
        Self::Zip {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn header(header: &str, value: &str, reason: impl Into<String>) -> Self {
        Self::InvalidHeader {
            header: header.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether this error reports use of a disposed module or baseline
    pub fn is_disposed(&self) -> bool {
        match self {
            Self::Core(core) => core.is_disposed(),
            Self::Container(ContainerError::Core(core)) => core.is_disposed(),
            _ => false,
        }
    }
}

impl From<ModelError> for CoreError {
    fn from(error: ModelError) -> Self {
        match error {
            ModelError::Core(core) => core,
            ModelError::Container(container) => container.into(),
            ModelError::Io { path, source } => CoreError::Io { path, source },
            other => CoreError::Storage(Box::new(other)),
        }
    }
}

pub type Result<T> = std::result::Result<T, ModelError>;
