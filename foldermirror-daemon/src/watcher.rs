//! notify → engine event translation and the watcher task.

use std::path::{Path, PathBuf};

use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{recommended_watcher, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};

use foldermirror_core::types::EventKind;
use foldermirror_sync::scan::collect_files;

use crate::engine::ChangeCoalescingEngine;
use crate::error::DaemonError;

/// Map one notify event to the `(absolute path, kind)` pairs the engine
/// understands.
///
/// Moves become a delete of the source and a create of the destination. A
/// folder that appears (created or moved in) yields a `Created` for every
/// file beneath it. Access and metadata-only events produce nothing, as do
/// paths outside `root`.
pub fn translate(event: &Event, root: &Path) -> Vec<(PathBuf, EventKind)> {
    let mut out = Vec::new();

    match &event.kind {
        notify::EventKind::Create(CreateKind::File) => {
            for path in &event.paths {
                out.push((path.clone(), EventKind::Created));
            }
        }
        notify::EventKind::Create(_) => {
            for path in &event.paths {
                arrived(path, &mut out);
            }
        }
        notify::EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            if let [from, to] = event.paths.as_slice() {
                out.push((from.clone(), EventKind::Deleted));
                arrived(to, &mut out);
            }
        }
        notify::EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            for path in &event.paths {
                out.push((path.clone(), EventKind::Deleted));
            }
        }
        notify::EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            for path in &event.paths {
                arrived(path, &mut out);
            }
        }
        // Backends that cannot tell the two halves of a rename apart.
        notify::EventKind::Modify(ModifyKind::Name(_)) => {
            for path in &event.paths {
                if path.exists() {
                    arrived(path, &mut out);
                } else {
                    out.push((path.clone(), EventKind::Deleted));
                }
            }
        }
        notify::EventKind::Modify(ModifyKind::Metadata(_)) => {}
        notify::EventKind::Modify(_) => {
            for path in &event.paths {
                if path.is_file() {
                    out.push((path.clone(), EventKind::Modified));
                }
            }
        }
        notify::EventKind::Remove(_) => {
            for path in &event.paths {
                out.push((path.clone(), EventKind::Deleted));
            }
        }
        notify::EventKind::Access(_) | notify::EventKind::Any | notify::EventKind::Other => {}
    }

    out.retain(|(path, _)| {
        let inside = path.starts_with(root);
        if !inside {
            tracing::warn!(path = %path.display(), "ignoring event outside the monitored root");
        }
        inside
    });
    out
}

fn arrived(path: &Path, out: &mut Vec<(PathBuf, EventKind)>) {
    if path.is_dir() {
        match collect_files(path) {
            Ok(files) => out.extend(files.into_iter().map(|file| (file, EventKind::Created))),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to scan new folder")
            }
        }
    } else {
        out.push((path.to_path_buf(), EventKind::Created));
    }
}

/// Watch the engine's root recursively and feed translated events into it
/// until shutdown is broadcast.
pub(crate) async fn watcher_task(
    engine: ChangeCoalescingEngine,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let root = engine.root().to_path_buf();

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher: RecommendedWatcher = recommended_watcher(move |event| {
        let _ = event_tx.send(event);
    })?;
    watcher.watch(&root, RecursiveMode::Recursive)?;
    tracing::info!(root = %root.display(), "watching local folder");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                let event = match event {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(error = %err, "watcher event error");
                        continue;
                    }
                };
                for (path, kind) in translate(&event, &root) {
                    if let Err(err) = engine.record_event(&path, kind).await {
                        tracing::warn!(path = %path.display(), error = %err, "event not recorded");
                    }
                }
            }
        }
    }

    if let Err(err) = watcher.unwatch(&root) {
        tracing::debug!(error = %err, "unwatch on shutdown failed");
    }
    Ok(())
}
