use std::path::PathBuf;
use thiserror::Error;

use crate::lifecycle::DisposalSite;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error while reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{element} has been disposed ({site})")]
    Disposed { element: String, site: DisposalSite },

    #[error("Unable to resolve {reference} required by {from}")]
    Resolution { from: String, reference: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid version: {0}")]
    InvalidVersion(String),

    #[error("Storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Whether this error reports use of a disposed module or baseline
    pub fn is_disposed(&self) -> bool {
        matches!(self, Self::Disposed { .. })
    }
}
