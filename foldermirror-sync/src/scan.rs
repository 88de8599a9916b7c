//! Startup scan: bring the remote up to date with changes made while no
//! watcher was running.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use foldermirror_core::types::{EventKind, PathIdentifier};

use crate::error::{io_err, SyncError};
use crate::state_store::{content_digest, MirrorState};

/// Every regular file under `root`, sorted. Symlinks are not followed.
pub fn collect_files(root: &Path) -> Result<Vec<PathBuf>, SyncError> {
    let mut dirs = vec![root.to_path_buf()];
    let mut files = Vec::new();
    let mut cursor = 0;
    while cursor < dirs.len() {
        let current = dirs[cursor].clone();
        cursor += 1;
        let entries = match std::fs::read_dir(&current) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
            Err(err) => return Err(io_err(&current, err)),
        };
        for entry in entries {
            let entry = entry.map_err(|e| io_err(&current, e))?;
            let ty = entry.file_type().map_err(|e| io_err(entry.path(), e))?;
            if ty.is_dir() {
                dirs.push(entry.path());
            } else if ty.is_file() {
                files.push(entry.path());
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Events that reconcile the remote with the local tree, given what the
/// mirror state says was last synced.
///
/// - file present, digest differs or unknown → `Created`
/// - file present, digest matches → nothing
/// - state entry without a local file → `Deleted`
pub fn plan_initial_sync(
    root: &Path,
    state: &MirrorState,
) -> Result<Vec<(PathIdentifier, EventKind)>, SyncError> {
    let mut events = Vec::new();
    let mut seen = BTreeSet::new();

    for file in collect_files(root)? {
        let id = match PathIdentifier::from_local(root, &file) {
            Ok(id) => id,
            Err(err) => {
                tracing::warn!("skipping {}: {err}", file.display());
                continue;
            }
        };
        seen.insert(id.as_str().to_string());

        let unchanged = match std::fs::read(&file) {
            Ok(content) => state.files.get(id.as_str()) == Some(&content_digest(&content)),
            // Let the executor report the read failure for this path.
            Err(_) => false,
        };
        if !unchanged {
            events.push((id, EventKind::Created));
        }
    }

    for known in state.files.keys() {
        if seen.contains(known) {
            continue;
        }
        match PathIdentifier::parse(known) {
            Ok(id) => events.push((id, EventKind::Deleted)),
            Err(err) => tracing::warn!("ignoring malformed state entry {known}: {err}"),
        }
    }

    tracing::info!("initial scan of {} queued {} change(s)", root.display(), events.len());
    Ok(events)
}
