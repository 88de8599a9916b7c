//! Domain types for the folder mirror.
//!
//! Local filesystem paths stay `PathBuf`; anything addressed on the remote
//! side goes through [`PathIdentifier`], which is always relative to the
//! monitored root and forward-slash separated.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, PathError};

// ---------------------------------------------------------------------------
// Path identifier
// ---------------------------------------------------------------------------

/// A normalized, OS-independent path relative to the monitored root.
///
/// Never empty and never contains `.`/`..` segments.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PathIdentifier(String);

impl PathIdentifier {
    /// Derive an identifier from an absolute local path under `root`.
    pub fn from_local(root: &Path, path: &Path) -> Result<Self, PathError> {
        let relative = path
            .strip_prefix(root)
            .map_err(|_| PathError::OutsideRoot {
                path: path.to_path_buf(),
                root: root.to_path_buf(),
            })?;

        let mut segments: Vec<String> = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => {
                    let part = part.to_str().ok_or_else(|| PathError::NonUtf8 {
                        path: path.to_path_buf(),
                    })?;
                    segments.push(part.to_string());
                }
                Component::CurDir => {}
                Component::ParentDir => {
                    if segments.pop().is_none() {
                        return Err(PathError::EscapesRoot {
                            path: relative.display().to_string(),
                        });
                    }
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(PathError::EscapesRoot {
                        path: relative.display().to_string(),
                    });
                }
            }
        }
        Self::from_segments(segments)
    }

    /// Parse an already-relative identifier such as `docs/readme.md`.
    ///
    /// Backslashes are accepted as separators so Windows-style input
    /// normalizes to the same identifier.
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        if raw.starts_with('/') || raw.starts_with('\\') {
            return Err(PathError::EscapesRoot {
                path: raw.to_string(),
            });
        }
        let mut segments: Vec<String> = Vec::new();
        for part in raw.split(['/', '\\']) {
            match part {
                "" | "." => {}
                ".." => {
                    if segments.pop().is_none() {
                        return Err(PathError::EscapesRoot {
                            path: raw.to_string(),
                        });
                    }
                }
                other => segments.push(other.to_string()),
            }
        }
        Self::from_segments(segments)
    }

    fn from_segments(segments: Vec<String>) -> Result<Self, PathError> {
        if segments.is_empty() {
            return Err(PathError::Empty);
        }
        Ok(Self(segments.join("/")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when `self` lies strictly beneath the folder `dir`.
    pub fn is_inside(&self, dir: &PathIdentifier) -> bool {
        self.0
            .strip_prefix(dir.as_str())
            .is_some_and(|rest| rest.starts_with('/'))
    }

    /// Absolute local path of this identifier under `root`.
    pub fn to_local(&self, root: &Path) -> PathBuf {
        self.0.split('/').fold(root.to_path_buf(), |acc, seg| acc.join(seg))
    }
}

impl fmt::Display for PathIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl TryFrom<String> for PathIdentifier {
    type Error = PathError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<PathIdentifier> for String {
    fn from(p: PathIdentifier) -> Self {
        p.0
    }
}

// ---------------------------------------------------------------------------
// Events and actions
// ---------------------------------------------------------------------------

/// A filesystem event as seen by the engine. Moves are split into a
/// `Deleted` + `Created` pair before they get here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Created,
    Modified,
    Deleted,
}

impl EventKind {
    /// The pending action this event implies.
    pub fn action(self) -> ActionKind {
        match self {
            EventKind::Created | EventKind::Modified => ActionKind::Upload,
            EventKind::Deleted => ActionKind::Delete,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Created => write!(f, "created"),
            EventKind::Modified => write!(f, "modified"),
            EventKind::Deleted => write!(f, "deleted"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Upload,
    Delete,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Upload => write!(f, "upload"),
            ActionKind::Delete => write!(f, "delete"),
        }
    }
}

/// The single reconciled action queued for one path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAction {
    pub path: PathIdentifier,
    pub kind: ActionKind,
}

// ---------------------------------------------------------------------------
// Repository naming
// ---------------------------------------------------------------------------

/// `<owner>/<name>` of the remote repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoSlug {
    pub owner: String,
    pub name: String,
}

impl FromStr for RepoSlug {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().split_once('/') {
            Some((owner, name))
                if !owner.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(Self {
                    owner: owner.to_string(),
                    name: name.to_string(),
                })
            }
            _ => Err(ConfigError::InvalidRepository(s.to_string())),
        }
    }
}

impl TryFrom<String> for RepoSlug {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<RepoSlug> for String {
    fn from(r: RepoSlug) -> Self {
        r.to_string()
    }
}

impl fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// The single branch every remote operation is keyed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BranchName(pub String);

impl Default for BranchName {
    fn default() -> Self {
        Self("main".to_string())
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for BranchName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for BranchName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("/watch/a.txt", "a.txt")]
    #[case("/watch/docs/notes/today.md", "docs/notes/today.md")]
    #[case("/watch/docs/./today.md", "docs/today.md")]
    #[case("/watch/docs/../today.md", "today.md")]
    fn from_local_normalizes(#[case] local: &str, #[case] expected: &str) {
        let id = PathIdentifier::from_local(Path::new("/watch"), Path::new(local)).unwrap();
        assert_eq!(id.as_str(), expected);
    }

    #[test]
    fn from_local_rejects_path_outside_root() {
        let err = PathIdentifier::from_local(Path::new("/watch"), Path::new("/elsewhere/a.txt"))
            .unwrap_err();
        assert!(matches!(err, PathError::OutsideRoot { .. }));
    }

    #[test]
    fn from_local_rejects_climbing_out() {
        let err = PathIdentifier::from_local(Path::new("/watch"), Path::new("/watch/../etc/passwd"))
            .unwrap_err();
        assert!(matches!(err, PathError::EscapesRoot { .. }));
    }

    #[test]
    fn from_local_rejects_root_itself() {
        let err = PathIdentifier::from_local(Path::new("/watch"), Path::new("/watch")).unwrap_err();
        assert_eq!(err, PathError::Empty);
    }

    #[cfg(unix)]
    #[test]
    fn from_local_rejects_non_utf8_names() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let local = Path::new("/watch").join(OsStr::from_bytes(b"bad\xff.txt"));
        let err = PathIdentifier::from_local(Path::new("/watch"), &local).unwrap_err();
        assert_eq!(err, PathError::NonUtf8 { path: local });
    }

    #[rstest]
    #[case("a\\b\\c.txt", "a/b/c.txt")]
    #[case("a//b/", "a/b")]
    #[case("./a/../b", "b")]
    fn parse_normalizes(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(PathIdentifier::parse(raw).unwrap().as_str(), expected);
    }

    #[rstest]
    #[case("../x")]
    #[case("/abs")]
    #[case("a/../../x")]
    fn parse_rejects_escapes(#[case] raw: &str) {
        assert!(matches!(
            PathIdentifier::parse(raw),
            Err(PathError::EscapesRoot { .. })
        ));
    }

    #[rstest]
    #[case("photos/a.jpg", "photos", true)]
    #[case("photos/2024/b.jpg", "photos", true)]
    #[case("photos", "photos", false)]
    #[case("photos-old/a.jpg", "photos", false)]
    #[case("a.jpg", "photos", false)]
    fn is_inside_matches_whole_segments(
        #[case] path: &str,
        #[case] dir: &str,
        #[case] expected: bool,
    ) {
        let path = PathIdentifier::parse(path).unwrap();
        let dir = PathIdentifier::parse(dir).unwrap();
        assert_eq!(path.is_inside(&dir), expected);
    }

    #[test]
    fn to_local_joins_segments() {
        let id = PathIdentifier::parse("docs/a.txt").unwrap();
        assert_eq!(id.to_local(Path::new("/watch")), PathBuf::from("/watch/docs/a.txt"));
    }

    #[test]
    fn event_kinds_map_to_actions() {
        assert_eq!(EventKind::Created.action(), ActionKind::Upload);
        assert_eq!(EventKind::Modified.action(), ActionKind::Upload);
        assert_eq!(EventKind::Deleted.action(), ActionKind::Delete);
    }

    #[test]
    fn repo_slug_parses_owner_and_name() {
        let slug: RepoSlug = "octo/mirror".parse().unwrap();
        assert_eq!(slug.owner, "octo");
        assert_eq!(slug.name, "mirror");
        assert_eq!(slug.to_string(), "octo/mirror");
    }

    #[rstest]
    #[case("nodelimiter")]
    #[case("/missing-owner")]
    #[case("owner/")]
    #[case("a/b/c")]
    fn repo_slug_rejects_malformed(#[case] raw: &str) {
        assert!(matches!(
            raw.parse::<RepoSlug>(),
            Err(ConfigError::InvalidRepository(_))
        ));
    }

    #[test]
    fn path_identifier_serializes_as_plain_string() {
        let id = PathIdentifier::parse("x/y.txt").unwrap();
        let yaml = serde_yaml::to_string(&id).unwrap();
        assert_eq!(yaml.trim(), "x/y.txt");
        let back: PathIdentifier = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, id);
    }
}
