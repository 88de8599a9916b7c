//! Local filesystem access, resolved against the monitored root.

use std::path::{Path, PathBuf};

use foldermirror_core::types::PathIdentifier;

/// What the executor needs from the local side.
pub trait LocalFileAccess: Send + Sync {
    /// `true` only for regular files; directories count as absent.
    fn exists(&self, path: &PathIdentifier) -> bool;

    fn read_all(&self, path: &PathIdentifier) -> std::io::Result<Vec<u8>>;
}

/// [`LocalFileAccess`] over the real disk under `root`.
#[derive(Debug, Clone)]
pub struct LocalDisk {
    root: PathBuf,
}

impl LocalDisk {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl LocalFileAccess for LocalDisk {
    fn exists(&self, path: &PathIdentifier) -> bool {
        path.to_local(&self.root).is_file()
    }

    fn read_all(&self, path: &PathIdentifier) -> std::io::Result<Vec<u8>> {
        std::fs::read(path.to_local(&self.root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn directories_do_not_count_as_existing() {
        let root = TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("docs")).unwrap();
        std::fs::write(root.path().join("docs/a.txt"), "hi").unwrap();

        let disk = LocalDisk::new(root.path());
        assert!(!disk.exists(&PathIdentifier::parse("docs").unwrap()));
        assert!(disk.exists(&PathIdentifier::parse("docs/a.txt").unwrap()));
        assert_eq!(
            disk.read_all(&PathIdentifier::parse("docs/a.txt").unwrap()).unwrap(),
            b"hi"
        );
    }
}
