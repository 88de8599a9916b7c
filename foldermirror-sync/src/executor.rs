//! Applies one flushed [`Batch`] against the remote store.
//!
//! ## Per-path protocol
//!
//! Upload:
//! 1. Re-check local existence; gone → `Skipped`.
//! 2. Read the full local bytes.
//! 3. Read the remote file fresh (never a cached revision).
//! 4. Identical bytes → `Unchanged`; present → `update`; absent → `create`.
//!
//! Delete:
//! 1. Re-check local existence; back again → `Skipped`.
//! 2. Read the remote file fresh; absent → `AlreadyAbsent`.
//! 3. `delete` with the fresh revision; `NotFound` → `AlreadyAbsent`.
//!
//! A failure on one path is recorded in its [`PathResult`] and the loop moves
//! on. Nothing is retried here.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use foldermirror_core::types::{ActionKind, PathIdentifier, PendingAction};

use crate::local::LocalFileAccess;
use crate::reconciler::Batch;
use crate::remote::{RemoteError, RemoteStore, RevisionToken};
use crate::state_store::content_digest;

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Why a path was left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Upload queued, but the file was deleted again before apply.
    LocalFileMissing,
    /// Delete queued, but the file exists again at apply time.
    LocalFilePresent,
}

/// Per-path failure, reported rather than propagated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApplyError {
    #[error("local read failed: {message}")]
    Io { message: String },

    #[error("remote changed since lookup")]
    RevisionMismatch,

    #[error("network error: {message}")]
    Network { message: String },

    #[error("remote error: {message}")]
    Remote { message: String },
}

impl From<RemoteError> for ApplyError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::RevisionMismatch { .. } => ApplyError::RevisionMismatch,
            RemoteError::Network(message) => ApplyError::Network { message },
            other => ApplyError::Remote {
                message: other.to_string(),
            },
        }
    }
}

/// What happened to one path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Created { revision: RevisionToken, digest: String },
    Updated { revision: RevisionToken, digest: String },
    /// Remote content already matched the local bytes; nothing was written.
    Unchanged { digest: String },
    Deleted,
    /// Delete requested for a path the remote does not have.
    AlreadyAbsent,
    Skipped { reason: SkipReason },
    Failed { error: ApplyError },
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed { .. })
    }

    /// Digest of the bytes now mirrored remotely, for upload outcomes.
    pub fn uploaded_digest(&self) -> Option<&str> {
        match self {
            Outcome::Created { digest, .. }
            | Outcome::Updated { digest, .. }
            | Outcome::Unchanged { digest } => Some(digest),
            _ => None,
        }
    }

    /// `true` when the remote no longer holds the path.
    pub fn removed_remotely(&self) -> bool {
        matches!(self, Outcome::Deleted | Outcome::AlreadyAbsent)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathResult {
    pub path: PathIdentifier,
    pub action: ActionKind,
    pub outcome: Outcome,
}

/// Complete result of one flush: exactly one entry per action in the batch.
#[derive(Debug, Clone, Serialize)]
pub struct FlushReport {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u128,
    pub results: Vec<PathResult>,
}

impl FlushReport {
    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.is_failure()).count()
    }

    pub fn skipped(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, Outcome::Skipped { .. }))
            .count()
    }

    pub fn succeeded(&self) -> usize {
        self.results.len() - self.failed() - self.skipped()
    }

    pub fn get(&self, path: &PathIdentifier) -> Option<&PathResult> {
        self.results.iter().find(|r| &r.path == path)
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct SyncExecutor {
    remote: Arc<dyn RemoteStore>,
    local: Arc<dyn LocalFileAccess>,
}

impl SyncExecutor {
    pub fn new(remote: Arc<dyn RemoteStore>, local: Arc<dyn LocalFileAccess>) -> Self {
        Self { remote, local }
    }

    /// Apply every action in `batch`, best effort. Blocking.
    pub fn apply(&self, batch: Batch) -> FlushReport {
        let started_at = Utc::now();
        let started = Instant::now();
        tracing::info!("applying {} pending change(s)", batch.len());

        let results: Vec<PathResult> = batch
            .into_iter()
            .map(|action| {
                let outcome = self.apply_one(&action);
                log_outcome(&action, &outcome);
                PathResult {
                    path: action.path,
                    action: action.kind,
                    outcome,
                }
            })
            .collect();

        let report = FlushReport {
            started_at,
            duration_ms: started.elapsed().as_millis(),
            results,
        };
        tracing::info!(
            "flush complete: {} ok, {} skipped, {} failed",
            report.succeeded(),
            report.skipped(),
            report.failed()
        );
        report
    }

    fn apply_one(&self, action: &PendingAction) -> Outcome {
        let result = match action.kind {
            ActionKind::Upload => self.upload(&action.path),
            ActionKind::Delete => self.delete(&action.path),
        };
        result.unwrap_or_else(|error| Outcome::Failed { error })
    }

    fn upload(&self, path: &PathIdentifier) -> Result<Outcome, ApplyError> {
        if !self.local.exists(path) {
            return Ok(Outcome::Skipped {
                reason: SkipReason::LocalFileMissing,
            });
        }
        let content = match self.local.read_all(path) {
            Ok(content) => content,
            // Removed between the existence check and the read.
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Outcome::Skipped {
                    reason: SkipReason::LocalFileMissing,
                });
            }
            Err(err) => {
                return Err(ApplyError::Io {
                    message: err.to_string(),
                })
            }
        };
        let digest = content_digest(&content);

        match self.remote.read(path)? {
            Some(existing) if existing.content == content => Ok(Outcome::Unchanged { digest }),
            Some(existing) => {
                let revision = self
                    .remote
                    .update(path, &content, &existing.reference.revision)?;
                Ok(Outcome::Updated { revision, digest })
            }
            None => {
                let revision = self.remote.create(path, &content)?;
                Ok(Outcome::Created { revision, digest })
            }
        }
    }

    fn delete(&self, path: &PathIdentifier) -> Result<Outcome, ApplyError> {
        if self.local.exists(path) {
            return Ok(Outcome::Skipped {
                reason: SkipReason::LocalFilePresent,
            });
        }
        let Some(existing) = self.remote.read(path)? else {
            return Ok(Outcome::AlreadyAbsent);
        };
        match self.remote.delete(path, &existing.reference.revision) {
            Ok(()) => Ok(Outcome::Deleted),
            Err(RemoteError::NotFound { .. }) => Ok(Outcome::AlreadyAbsent),
            Err(err) => Err(err.into()),
        }
    }
}

fn log_outcome(action: &PendingAction, outcome: &Outcome) {
    match outcome {
        Outcome::Created { .. } => tracing::info!("created: {}", action.path),
        Outcome::Updated { .. } => tracing::info!("updated: {}", action.path),
        Outcome::Deleted => tracing::info!("deleted: {}", action.path),
        Outcome::Unchanged { .. } => tracing::debug!("unchanged: {}", action.path),
        Outcome::AlreadyAbsent => tracing::debug!("already absent: {}", action.path),
        Outcome::Skipped { reason } => {
            tracing::debug!("skipped {} {}: {:?}", action.kind, action.path, reason)
        }
        Outcome::Failed { error } => {
            tracing::error!("{} {} failed: {}", action.kind, action.path, error)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalDisk;
    use crate::memory::{MemoryStore, Mutation};
    use foldermirror_core::types::EventKind;
    use std::fs;
    use tempfile::TempDir;

    fn id(s: &str) -> PathIdentifier {
        PathIdentifier::parse(s).unwrap()
    }

    fn setup() -> (TempDir, Arc<MemoryStore>, SyncExecutor) {
        let _ = env_logger::builder().is_test(true).try_init();
        let root = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        let executor = SyncExecutor::new(store.clone(), Arc::new(LocalDisk::new(root.path())));
        (root, store, executor)
    }

    fn batch(events: &[(&str, EventKind)]) -> Batch {
        events.iter().map(|(p, k)| (id(p), *k)).collect()
    }

    #[test]
    fn upload_creates_missing_remote_file() {
        let (root, store, executor) = setup();
        fs::write(root.path().join("a.txt"), "hello").unwrap();

        let report = executor.apply(batch(&[("a.txt", EventKind::Created)]));

        assert!(matches!(report.results[0].outcome, Outcome::Created { .. }));
        assert_eq!(store.content(&id("a.txt")).as_deref(), Some(&b"hello"[..]));
    }

    #[test]
    fn upload_updates_with_freshly_read_revision() {
        let (root, store, executor) = setup();
        store.seed(&id("a.txt"), b"old");
        store.seed(&id("a.txt"), b"edited remotely");
        fs::write(root.path().join("a.txt"), "new").unwrap();

        let report = executor.apply(batch(&[("a.txt", EventKind::Modified)]));

        assert!(matches!(report.results[0].outcome, Outcome::Updated { .. }));
        assert_eq!(store.content(&id("a.txt")).as_deref(), Some(&b"new"[..]));
    }

    #[test]
    fn identical_content_is_left_alone() {
        let (root, store, executor) = setup();
        store.seed(&id("same.txt"), b"same");
        fs::write(root.path().join("same.txt"), "same").unwrap();

        let report = executor.apply(batch(&[("same.txt", EventKind::Modified)]));

        assert!(matches!(report.results[0].outcome, Outcome::Unchanged { .. }));
        assert!(store.mutations().is_empty());
    }

    #[test]
    fn upload_of_file_deleted_before_apply_is_skipped() {
        let (_root, store, executor) = setup();

        let report = executor.apply(batch(&[("gone.txt", EventKind::Created)]));

        assert_eq!(
            report.results[0].outcome,
            Outcome::Skipped { reason: SkipReason::LocalFileMissing }
        );
        assert_eq!(report.failed(), 0);
        assert!(store.mutations().is_empty());
    }

    #[test]
    fn delete_removes_remote_file() {
        let (_root, store, executor) = setup();
        store.seed(&id("old.txt"), b"bye");

        let report = executor.apply(batch(&[("old.txt", EventKind::Deleted)]));

        assert_eq!(report.results[0].outcome, Outcome::Deleted);
        assert!(store.content(&id("old.txt")).is_none());
    }

    #[test]
    fn delete_of_remote_absent_path_succeeds_without_mutation() {
        let (_root, store, executor) = setup();

        let report = executor.apply(batch(&[("a.txt", EventKind::Created), ("a.txt", EventKind::Deleted)]));

        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].action, ActionKind::Delete);
        assert_eq!(report.results[0].outcome, Outcome::AlreadyAbsent);
        assert_eq!(report.succeeded(), 1);
        assert!(store.mutations().is_empty());
    }

    #[test]
    fn delete_racing_remote_removal_counts_as_absent() {
        let (_root, store, executor) = setup();
        store.seed(&id("racy.txt"), b"x");
        store.fail_on_mutation(&id("racy.txt"), RemoteError::NotFound { path: id("racy.txt") });

        let report = executor.apply(batch(&[("racy.txt", EventKind::Deleted)]));

        assert_eq!(report.results[0].outcome, Outcome::AlreadyAbsent);
    }

    #[test]
    fn delete_of_recreated_file_is_skipped() {
        let (root, store, executor) = setup();
        store.seed(&id("back.txt"), b"remote");
        fs::write(root.path().join("back.txt"), "local again").unwrap();

        let report = executor.apply(batch(&[("back.txt", EventKind::Deleted)]));

        assert_eq!(
            report.results[0].outcome,
            Outcome::Skipped { reason: SkipReason::LocalFilePresent }
        );
        assert_eq!(store.content(&id("back.txt")).as_deref(), Some(&b"remote"[..]));
    }

    #[test]
    fn failure_on_one_path_does_not_stop_the_others() {
        let (root, store, executor) = setup();
        for name in ["a.txt", "b.txt", "c.txt"] {
            fs::write(root.path().join(name), name).unwrap();
        }
        store.fail_next(&id("a.txt"), RemoteError::Network("connection reset".to_string()));

        let report = executor.apply(batch(&[
            ("a.txt", EventKind::Created),
            ("b.txt", EventKind::Created),
            ("c.txt", EventKind::Created),
        ]));

        assert_eq!(report.results.len(), 3);
        assert_eq!(report.failed(), 1);
        assert!(matches!(
            report.get(&id("a.txt")).unwrap().outcome,
            Outcome::Failed { error: ApplyError::Network { .. } }
        ));
        assert!(store.content(&id("b.txt")).is_some());
        assert!(store.content(&id("c.txt")).is_some());
    }

    #[test]
    fn revision_mismatch_is_reported_not_retried() {
        let (root, store, executor) = setup();
        store.seed(&id("a.txt"), b"v1");
        fs::write(root.path().join("a.txt"), "v2").unwrap();
        store.fail_on_mutation(&id("a.txt"), RemoteError::RevisionMismatch { path: id("a.txt") });

        let report = executor.apply(batch(&[("a.txt", EventKind::Modified)]));

        assert_eq!(
            report.results[0].outcome,
            Outcome::Failed { error: ApplyError::RevisionMismatch }
        );
        assert_eq!(store.content(&id("a.txt")).as_deref(), Some(&b"v1"[..]));
        assert_eq!(store.mutations(), vec![]);
    }

    #[test]
    #[cfg(unix)]
    fn unreadable_local_file_reports_io_error() {
        use std::os::unix::fs::PermissionsExt;

        let (root, store, executor) = setup();
        let path = root.path().join("secret.txt");
        fs::write(&path, "x").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o000)).unwrap();
        if fs::read(&path).is_ok() {
            // Running as root; permissions are not enforced.
            return;
        }

        let report = executor.apply(batch(&[("secret.txt", EventKind::Modified)]));

        assert!(matches!(
            report.results[0].outcome,
            Outcome::Failed { error: ApplyError::Io { .. } }
        ));
        assert!(store.mutations().is_empty());
    }

    #[test]
    fn report_serializes_with_status_tags() {
        let (root, _store, executor) = setup();
        fs::write(root.path().join("a.txt"), "x").unwrap();
        let report = executor.apply(batch(&[("a.txt", EventKind::Created)]));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["results"][0]["path"], "a.txt");
        assert_eq!(json["results"][0]["action"], "upload");
        assert_eq!(json["results"][0]["outcome"]["status"], "created");
    }

    #[test]
    fn mutation_log_records_create() {
        let (root, store, executor) = setup();
        fs::write(root.path().join("n.txt"), "x").unwrap();
        executor.apply(batch(&[("n.txt", EventKind::Created)]));
        assert_eq!(store.mutations(), vec![Mutation::Create(id("n.txt"))]);
    }
}
