//! Change-coalescing engine: reconciler + debounce timer + executor.
//!
//! # Locking
//!
//! ```text
//! state       (tokio Mutex)  reconciler map, timer slot, closed flag,
//!                            paths believed to exist remotely
//! apply_gate  (tokio Mutex)  held for the whole of one flush
//! ```
//!
//! `record_event` takes only `state`, for O(1) work. A flush takes
//! `apply_gate` first, then `state` just long enough to disarm the timer and
//! swap the pending batch for an empty one; the network-bound apply runs on
//! the blocking pool with only the gate held. New events therefore land in a
//! fresh batch while a flush is in progress, and flushes never overlap, so a
//! path's actions reach the remote in the order they were reconciled.
//!
//! A folder that disappears arrives as a single delete for the folder path.
//! The engine expands it into one delete per file it knows beneath that
//! folder, taken from the remote paths it tracks and the pending batch.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use foldermirror_core::types::{EventKind, PathIdentifier};
use foldermirror_core::types::ActionKind;
use foldermirror_sync::{FlushReport, Outcome, PathReconciler, SyncExecutor};

use crate::error::DaemonError;
use crate::scheduler::DebounceScheduler;

/// Called once per completed flush, on the blocking pool.
pub type ReportSink = Arc<dyn Fn(&FlushReport) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlushTrigger {
    Timer,
    Manual,
    Shutdown,
}

/// Counts from the most recent flush, for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlushSummary {
    pub trigger: FlushTrigger,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u128,
    pub total: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl FlushSummary {
    pub fn from_report(trigger: FlushTrigger, report: &FlushReport) -> Self {
        Self {
            trigger,
            started_at: report.started_at,
            duration_ms: report.duration_ms,
            total: report.results.len(),
            succeeded: report.succeeded(),
            skipped: report.skipped(),
            failed: report.failed(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub pending: usize,
    pub timer_armed: bool,
    pub closed: bool,
    pub quiet_period_secs: u64,
    pub last_flush: Option<FlushSummary>,
}

#[derive(Debug, Clone, Copy)]
enum Trigger {
    Timer { generation: u64 },
    Manual,
    Shutdown,
}

impl Trigger {
    fn label(self) -> FlushTrigger {
        match self {
            Trigger::Timer { .. } => FlushTrigger::Timer,
            Trigger::Manual => FlushTrigger::Manual,
            Trigger::Shutdown => FlushTrigger::Shutdown,
        }
    }
}

struct EngineState {
    reconciler: PathReconciler,
    scheduler: DebounceScheduler,
    closed: bool,
    last_flush: Option<FlushSummary>,
    remote_files: BTreeSet<PathIdentifier>,
}

struct Shared {
    root: PathBuf,
    executor: SyncExecutor,
    state: Mutex<EngineState>,
    apply_gate: Mutex<()>,
    sink: ReportSink,
}

/// Cheap to clone; every clone drives the same pending batch.
#[derive(Clone)]
pub struct ChangeCoalescingEngine {
    shared: Arc<Shared>,
}

impl ChangeCoalescingEngine {
    pub fn new(root: PathBuf, executor: SyncExecutor, quiet_period: Duration) -> Self {
        Self::with_report_sink(root, executor, quiet_period, |_| {})
    }

    pub fn with_report_sink<F>(
        root: PathBuf,
        executor: SyncExecutor,
        quiet_period: Duration,
        sink: F,
    ) -> Self
    where
        F: Fn(&FlushReport) + Send + Sync + 'static,
    {
        let state = EngineState {
            reconciler: PathReconciler::new(),
            scheduler: DebounceScheduler::new(quiet_period),
            closed: false,
            last_flush: None,
            remote_files: BTreeSet::new(),
        };
        Self {
            shared: Arc::new(Shared {
                root,
                executor,
                state: Mutex::new(state),
                apply_gate: Mutex::new(()),
                sink: Arc::new(sink),
            }),
        }
    }

    pub fn root(&self) -> &Path {
        &self.shared.root
    }

    /// Seed the set of paths the remote is believed to hold, so a later
    /// folder delete can be expanded to the files beneath it.
    pub async fn track_remote_files<I>(&self, paths: I)
    where
        I: IntoIterator<Item = PathIdentifier>,
    {
        self.shared.state.lock().await.remote_files.extend(paths);
    }

    /// Record one filesystem event for an absolute local path.
    ///
    /// Paths outside the root are rejected with [`DaemonError::Path`];
    /// nothing is queued for them.
    pub async fn record_event(&self, path: &Path, kind: EventKind) -> Result<(), DaemonError> {
        let mut state = self.shared.state.lock().await;
        let id = PathIdentifier::from_local(&self.shared.root, path)?;
        self.record_locked(&mut state, id, kind)
    }

    /// Record an event for an identifier that is already normalized.
    pub async fn record(&self, path: PathIdentifier, kind: EventKind) -> Result<(), DaemonError> {
        let mut state = self.shared.state.lock().await;
        self.record_locked(&mut state, path, kind)
    }

    fn record_locked(
        &self,
        state: &mut EngineState,
        path: PathIdentifier,
        kind: EventKind,
    ) -> Result<(), DaemonError> {
        if state.closed {
            return Err(DaemonError::EngineClosed {
                path: path.to_local(&self.shared.root),
            });
        }
        let beneath = if kind == EventKind::Deleted {
            files_beneath(state, &path)
        } else {
            Vec::new()
        };
        if beneath.is_empty() {
            tracing::debug!(path = %path, event = %kind, "recorded change");
            state.reconciler.record(path, kind);
        } else {
            tracing::debug!(folder = %path, files = beneath.len(), "folder delete expanded");
            for file in beneath {
                state.reconciler.record(file, EventKind::Deleted);
            }
        }

        let pending = state.reconciler.pending_len();
        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        state.scheduler.on_activity(pending, move |generation| async move {
            if let Some(shared) = weak.upgrade() {
                shared.flush(Trigger::Timer { generation }).await;
            }
        });
        Ok(())
    }

    /// Cancel the armed timer and flush the pending batch immediately.
    /// Returns `None` when there was nothing to apply.
    pub async fn flush_now(&self) -> Option<FlushReport> {
        self.shared.flush(Trigger::Manual).await
    }

    /// Final flush. Waits for any in-flight apply, applies whatever is still
    /// pending, and rejects every later event.
    pub async fn shutdown(&self) -> Option<FlushReport> {
        tracing::info!("engine shutting down; flushing pending changes");
        self.shared.flush(Trigger::Shutdown).await
    }

    pub async fn pending_len(&self) -> usize {
        self.shared.state.lock().await.reconciler.pending_len()
    }

    pub async fn status(&self) -> EngineStatus {
        let state = self.shared.state.lock().await;
        EngineStatus {
            pending: state.reconciler.pending_len(),
            timer_armed: state.scheduler.is_armed(),
            closed: state.closed,
            quiet_period_secs: state.scheduler.quiet_period().as_secs(),
            last_flush: state.last_flush.clone(),
        }
    }
}

fn files_beneath(state: &EngineState, dir: &PathIdentifier) -> Vec<PathIdentifier> {
    let pending = state.reconciler.pending().iter().map(|action| action.path);
    let known: BTreeSet<PathIdentifier> = state
        .remote_files
        .iter()
        .cloned()
        .chain(pending)
        .filter(|path| path.is_inside(dir))
        .collect();
    known.into_iter().collect()
}

impl Shared {
    async fn flush(&self, trigger: Trigger) -> Option<FlushReport> {
        let _gate = self.apply_gate.lock().await;

        let batch = {
            let mut state = self.state.lock().await;
            match trigger {
                Trigger::Timer { generation } => {
                    if !state.scheduler.take_if_current(generation) {
                        return None;
                    }
                }
                Trigger::Manual => {
                    state.scheduler.flush_now();
                }
                Trigger::Shutdown => {
                    state.scheduler.flush_now();
                    state.closed = true;
                }
            }
            let batch = state.reconciler.take_batch();
            // Uploads may land remotely even if the flush later fails.
            state.remote_files.extend(
                batch
                    .iter()
                    .filter(|action| action.kind == ActionKind::Upload)
                    .map(|action| action.path),
            );
            batch
        };

        if batch.is_empty() {
            return None;
        }

        let executor = self.executor.clone();
        let sink = self.sink.clone();
        let applied = tokio::task::spawn_blocking(move || {
            let report = executor.apply(batch);
            sink(&report);
            report
        })
        .await;

        let report = match applied {
            Ok(report) => report,
            Err(err) => {
                tracing::error!(error = %err, "flush task failed");
                return None;
            }
        };

        let summary = FlushSummary::from_report(trigger.label(), &report);
        tracing::info!(
            trigger = ?summary.trigger,
            total = summary.total,
            succeeded = summary.succeeded,
            skipped = summary.skipped,
            failed = summary.failed,
            duration_ms = summary.duration_ms,
            "flush completed",
        );
        let mut state = self.state.lock().await;
        for result in &report.results {
            if matches!(result.outcome, Outcome::Deleted | Outcome::AlreadyAbsent) {
                state.remote_files.remove(&result.path);
            }
        }
        state.last_flush = Some(summary);
        drop(state);
        Some(report)
    }
}
