//! Event coalescing: one pending action per path, latest event wins.
//!
//! Pure in-memory bookkeeping; nothing here touches the filesystem or the
//! network.

use std::collections::BTreeMap;

use foldermirror_core::types::{ActionKind, EventKind, PathIdentifier, PendingAction};

/// Pending actions accumulated since the last flush.
///
/// Keyed by path, so it can never hold two actions for the same path.
/// Iteration is in path order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    actions: BTreeMap<PathIdentifier, ActionKind>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn get(&self, path: &PathIdentifier) -> Option<ActionKind> {
        self.actions.get(path).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = PendingAction> + '_ {
        self.actions.iter().map(|(path, kind)| PendingAction {
            path: path.clone(),
            kind: *kind,
        })
    }
}

impl IntoIterator for Batch {
    type Item = PendingAction;
    type IntoIter = std::vec::IntoIter<PendingAction>;

    fn into_iter(self) -> Self::IntoIter {
        self.actions
            .into_iter()
            .map(|(path, kind)| PendingAction { path, kind })
            .collect::<Vec<_>>()
            .into_iter()
    }
}

impl FromIterator<(PathIdentifier, EventKind)> for Batch {
    fn from_iter<I: IntoIterator<Item = (PathIdentifier, EventKind)>>(iter: I) -> Self {
        let mut reconciler = PathReconciler::new();
        for (path, kind) in iter {
            reconciler.record(path, kind);
        }
        reconciler.take_batch()
    }
}

/// Folds raw filesystem events into the current [`Batch`].
#[derive(Debug, Default)]
pub struct PathReconciler {
    pending: Batch,
}

impl PathReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one event. A later event for a path overwrites the earlier
    /// one's action: a delete followed by a re-create ends as `Upload`.
    pub fn record(&mut self, path: PathIdentifier, event: EventKind) {
        let action = event.action();
        if let Some(previous) = self.pending.actions.insert(path.clone(), action) {
            if previous != action {
                tracing::debug!("{path}: pending {previous} replaced by {action}");
            }
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn pending(&self) -> &Batch {
        &self.pending
    }

    /// Hand off everything recorded so far and start a fresh, empty batch.
    pub fn take_batch(&mut self) -> Batch {
        std::mem::take(&mut self.pending)
    }
}
