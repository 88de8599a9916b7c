//! Foldermirror core library — domain types, config persistence, errors.
//!
//! - [`types`] — path identifiers, event and action kinds, repository names
//! - [`error`] — [`ConfigError`], [`PathError`]
//! - [`config`] — load / save / init of `~/.foldermirror/config.yaml`

pub mod config;
pub mod error;
pub mod types;

pub use config::MirrorConfig;
pub use error::{ConfigError, PathError};
pub use types::{ActionKind, BranchName, EventKind, PathIdentifier, PendingAction, RepoSlug};
