use std::io;
use std::path::PathBuf;

use apiscope_core::CoreError;
use thiserror::Error;
use zip::result::ZipError;

#[derive(Error, Debug)]
pub enum ContainerError {
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
        source: ZipError,
    },

    #[error("Container {path} has been closed")]
    Closed { path: PathBuf },

    #[error("Container scan cancelled")]
    Cancelled,

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl ContainerError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn zip(path: impl Into<PathBuf>, source: ZipError) -> Self {
        Self::Zip {
            path: path.into(),
            source,
        }
    }
}

impl From<ContainerError> for CoreError {
    fn from(error: ContainerError) -> Self {
        match error {
            ContainerError::Core(core) => core,
            ContainerError::Cancelled => CoreError::Cancelled,
            ContainerError::Io { path, source } => CoreError::Io { path, source },
            other => CoreError::Storage(Box::new(other)),
        }
    }
}

pub type Result<T> = std::result::Result<T, ContainerError>;
