use providers::ProviderError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("metadata error in {path:?}: {reason}")]
    Metadata { path: PathBuf, reason: String },
    #[error("no embedded offset and no fallback timezone for {0}")]
    UnresolvedOffset(String),
    #[error("{stem:?} matches {} local files", .candidates.len())]
    AmbiguousMatch {
        stem: String,
        candidates: Vec<PathBuf>,
    },
    #[error("update of asset {id} failed: {source}")]
    RemoteUpdate {
        id: String,
        #[source]
        source: ProviderError,
    },
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("remote service error: {0}")]
    Remote(#[from] ProviderError),
}

impl ReconcileError {
    pub fn metadata(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        ReconcileError::Metadata {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn config(reason: impl Into<String>) -> Self {
        ReconcileError::Configuration(reason.into())
    }

    /// Errors that end the run rather than a single asset.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ReconcileError::Configuration(_) | ReconcileError::Remote(_)
        )
    }
}
