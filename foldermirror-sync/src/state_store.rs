//! Mirror state — SHA-256 digests of what the remote branch holds.
//!
//! Persists a [`MirrorState`] JSON document at `<home>/.foldermirror/state.json`.
//! Writes use the same atomic `.tmp` + rename pattern as the config.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use foldermirror_core::config::mirror_dir_at;

use crate::error::{io_err, SyncError};
use crate::executor::FlushReport;

/// On-disk mirror state: relative path → hex digest of the last content
/// known to be on the remote branch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MirrorState {
    pub synced_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub files: BTreeMap<String, String>,
}

impl MirrorState {
    pub fn empty() -> Self {
        Self {
            synced_at: None,
            files: BTreeMap::new(),
        }
    }

    /// Fold one flush into the state. Failed and skipped paths keep
    /// whatever entry they had.
    pub fn apply_report(&mut self, report: &FlushReport) {
        for result in &report.results {
            let key = result.path.as_str().to_string();
            if let Some(digest) = result.outcome.uploaded_digest() {
                self.files.insert(key, digest.to_string());
            } else if result.outcome.removed_remotely() {
                self.files.remove(&key);
            }
        }
        self.synced_at = Some(report.started_at);
    }
}

/// Hex SHA-256 of `content`.
pub fn content_digest(content: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(content);
    hex::encode(h.finalize())
}

/// `~/.foldermirror/state.json`
pub fn store_path_at(home: &Path) -> PathBuf {
    mirror_dir_at(home).join("state.json")
}

/// Load the mirror state. Returns an empty state if the file does not yet exist.
pub fn load_at(home: &Path) -> Result<MirrorState, SyncError> {
    let path = store_path_at(home);
    if !path.exists() {
        return Ok(MirrorState::empty());
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    Ok(serde_json::from_str(&contents)?)
}

/// Save the mirror state atomically (`state.json.tmp` then rename).
pub fn save_at(home: &Path, state: &MirrorState) -> Result<(), SyncError> {
    let path = store_path_at(home);
    let Some(dir) = path.parent() else {
        return Err(io_err(
            path,
            std::io::Error::other("invalid state store path"),
        ));
    };
    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

    let json = serde_json::to_string_pretty(state)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
    std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
    Ok(())
}

/// Load, fold in `report`, save.
pub fn record_flush_at(home: &Path, report: &FlushReport) -> Result<MirrorState, SyncError> {
    let mut state = load_at(home)?;
    state.apply_report(report);
    save_at(home, &state)?;
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{ApplyError, Outcome, PathResult, SkipReason};
    use crate::remote::RevisionToken;
    use foldermirror_core::types::{ActionKind, PathIdentifier};
    use tempfile::TempDir;

    fn result(path: &str, action: ActionKind, outcome: Outcome) -> PathResult {
        PathResult {
            path: PathIdentifier::parse(path).unwrap(),
            action,
            outcome,
        }
    }

    #[test]
    fn empty_state_when_file_missing() {
        let tmp = TempDir::new().unwrap();
        let state = load_at(tmp.path()).unwrap();
        assert!(state.files.is_empty());
        assert!(state.synced_at.is_none());
    }

    #[test]
    fn tmp_file_cleaned_up_after_save() {
        let tmp = TempDir::new().unwrap();
        save_at(tmp.path(), &MirrorState::empty()).unwrap();
        assert!(store_path_at(tmp.path()).exists());
        assert!(
            !store_path_at(tmp.path()).with_extension("json.tmp").exists(),
            "tmp file should be removed after atomic rename"
        );
    }

    #[test]
    fn digest_is_sha256_hex() {
        assert_eq!(
            content_digest(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn report_updates_only_settled_paths() {
        let tmp = TempDir::new().unwrap();
        let mut state = MirrorState::empty();
        state.files.insert("gone.txt".into(), "d0".into());
        state.files.insert("broken.txt".into(), "d1".into());
        state.files.insert("back.txt".into(), "d2".into());
        save_at(tmp.path(), &state).unwrap();

        let report = FlushReport {
            started_at: Utc::now(),
            duration_ms: 3,
            results: vec![
                result(
                    "new.txt",
                    ActionKind::Upload,
                    Outcome::Created { revision: RevisionToken::from("r1"), digest: "d9".into() },
                ),
                result("gone.txt", ActionKind::Delete, Outcome::Deleted),
                result(
                    "broken.txt",
                    ActionKind::Upload,
                    Outcome::Failed { error: ApplyError::RevisionMismatch },
                ),
                result(
                    "back.txt",
                    ActionKind::Delete,
                    Outcome::Skipped { reason: SkipReason::LocalFilePresent },
                ),
            ],
        };

        let saved = record_flush_at(tmp.path(), &report).unwrap();
        let reloaded = load_at(tmp.path()).unwrap();
        assert_eq!(saved, reloaded);
        assert_eq!(reloaded.files.get("new.txt").map(String::as_str), Some("d9"));
        assert!(!reloaded.files.contains_key("gone.txt"));
        assert_eq!(reloaded.files.get("broken.txt").map(String::as_str), Some("d1"));
        assert_eq!(reloaded.files.get("back.txt").map(String::as_str), Some("d2"));
        assert_eq!(reloaded.synced_at, Some(report.started_at));
    }
}
