use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the engine, the daemon runtime, and the control protocol.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("config error: {0}")]
    Config(#[from] foldermirror_core::ConfigError),

    #[error("rejected path: {0}")]
    Path(#[from] foldermirror_core::PathError),

    #[error("sync error: {0}")]
    Sync(#[from] foldermirror_sync::SyncError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("engine is shut down; event for {path} rejected")]
    EngineClosed { path: PathBuf },

    #[error("daemon protocol error: {0}")]
    Protocol(String),

    #[error("daemon is not running (socket missing: {socket})")]
    DaemonNotRunning { socket: PathBuf },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
