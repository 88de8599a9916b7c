//! Remote repository contract.
//!
//! Every operation is keyed to one fixed branch chosen when the store is
//! built. `update` and `delete` take the revision token observed by the
//! immediately preceding `read`; a stale token fails with
//! [`RemoteError::RevisionMismatch`].

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use foldermirror_core::types::PathIdentifier;

/// Opaque content revision issued by the remote (a blob sha on GitHub).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevisionToken(pub String);

impl fmt::Display for RevisionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for RevisionToken {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for RevisionToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A file that currently exists on the remote branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFileRef {
    pub path: PathIdentifier,
    pub revision: RevisionToken,
}

/// Result of a successful `read`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub reference: RemoteFileRef,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The path does not exist on the branch. `read` reports absence as
    /// `Ok(None)`; this variant comes from `delete`/`update` racing a removal.
    #[error("{path} not found on remote")]
    NotFound { path: PathIdentifier },

    #[error("revision mismatch for {path}: remote changed since lookup")]
    RevisionMismatch { path: PathIdentifier },

    #[error("network error: {0}")]
    Network(String),

    #[error("remote API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("unexpected remote response: {0}")]
    Decode(String),
}

/// Blocking access to the remote branch.
pub trait RemoteStore: Send + Sync {
    /// Fetch current content and revision, or `None` if the path is absent.
    fn read(&self, path: &PathIdentifier) -> Result<Option<RemoteFile>, RemoteError>;

    fn create(&self, path: &PathIdentifier, content: &[u8]) -> Result<RevisionToken, RemoteError>;

    fn update(
        &self,
        path: &PathIdentifier,
        content: &[u8],
        expected: &RevisionToken,
    ) -> Result<RevisionToken, RemoteError>;

    fn delete(&self, path: &PathIdentifier, expected: &RevisionToken) -> Result<(), RemoteError>;
}
