//! Error types for foldermirror-sync.

use std::path::PathBuf;

use thiserror::Error;

use foldermirror_core::ConfigError;

/// Errors from the non-per-path parts of a sync: loading state, scanning
/// the local root, building the remote client.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid API base URL {url}: {reason}")]
    InvalidApiBase { url: String, reason: String },

    /// JSON serialization/deserialization error (state store).
    #[error("state store JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
