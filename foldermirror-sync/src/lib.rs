//! # foldermirror-sync
//!
//! Change reconciliation and per-path synchronization against the remote
//! repository.
//!
//! [`PathReconciler`] folds raw events into one pending action per path;
//! [`SyncExecutor::apply`] drains a [`Batch`] against a [`RemoteStore`] and
//! returns a [`FlushReport`] with one result per path.

pub mod error;
pub mod executor;
pub mod github;
pub mod local;
pub mod memory;
pub mod reconciler;
pub mod remote;
pub mod scan;
pub mod state_store;

pub use error::SyncError;
pub use executor::{ApplyError, FlushReport, Outcome, PathResult, SkipReason, SyncExecutor};
pub use local::{LocalDisk, LocalFileAccess};
pub use reconciler::{Batch, PathReconciler};
pub use remote::{RemoteError, RemoteFile, RemoteFileRef, RemoteStore, RevisionToken};
