//! Error types for foldermirror-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from config operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure (file not found, permission denied, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization error (write/save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load — includes file path and line context from serde_yaml.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None` — cannot locate `~/.foldermirror/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// The config file did not exist at the expected path.
    #[error("config not found at {path}; run `foldermirror init` first")]
    ConfigNotFound { path: PathBuf },

    #[error("invalid repository '{0}'; expected <owner>/<name>")]
    InvalidRepository(String),

    /// The env var named by `token_env` is unset or empty.
    #[error("API token missing: environment variable {var} is not set")]
    MissingToken { var: String },
}

/// A local path that cannot be expressed as a [`crate::PathIdentifier`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("{path} is outside the monitored root {root}")]
    OutsideRoot { path: PathBuf, root: PathBuf },

    #[error("{path} escapes the monitored root")]
    EscapesRoot { path: String },

    #[error("path is empty or names the monitored root itself")]
    Empty,

    #[error("{path} has a name that is not valid UTF-8")]
    NonUtf8 { path: PathBuf },
}
