//! In-process [`RemoteStore`] used by tests across the workspace.
//!
//! Revisions are `rev-<n>` from a store-wide counter, so every write yields
//! a token no earlier read has seen.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use foldermirror_core::types::PathIdentifier;

use crate::remote::{RemoteError, RemoteFile, RemoteFileRef, RemoteStore, RevisionToken};

/// A successful remote write, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Create(PathIdentifier),
    Update(PathIdentifier),
    Delete(PathIdentifier),
}

#[derive(Default)]
struct Inner {
    files: BTreeMap<PathIdentifier, (Vec<u8>, RevisionToken)>,
    next_revision: u64,
    fail_next: HashMap<PathIdentifier, RemoteError>,
    fail_on_mutation: HashMap<PathIdentifier, RemoteError>,
    mutations: Vec<Mutation>,
}

impl Inner {
    fn bump(&mut self) -> RevisionToken {
        self.next_revision += 1;
        RevisionToken(format!("rev-{}", self.next_revision))
    }

    fn injected(&mut self, path: &PathIdentifier, mutation: bool) -> Result<(), RemoteError> {
        if let Some(err) = self.fail_next.remove(path) {
            return Err(err);
        }
        if mutation {
            if let Some(err) = self.fail_on_mutation.remove(path) {
                return Err(err);
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put content on the "remote" directly, bypassing the mutation log.
    pub fn seed(&self, path: &PathIdentifier, content: &[u8]) -> RevisionToken {
        let mut inner = self.lock();
        let revision = inner.bump();
        inner
            .files
            .insert(path.clone(), (content.to_vec(), revision.clone()));
        revision
    }

    pub fn content(&self, path: &PathIdentifier) -> Option<Vec<u8>> {
        self.lock().files.get(path).map(|(content, _)| content.clone())
    }

    pub fn paths(&self) -> Vec<PathIdentifier> {
        self.lock().files.keys().cloned().collect()
    }

    /// Fail the next operation of any kind on `path` with `err`.
    pub fn fail_next(&self, path: &PathIdentifier, err: RemoteError) {
        self.lock().fail_next.insert(path.clone(), err);
    }

    /// Fail the next create/update/delete on `path` with `err`.
    pub fn fail_on_mutation(&self, path: &PathIdentifier, err: RemoteError) {
        self.lock().fail_on_mutation.insert(path.clone(), err);
    }

    pub fn mutations(&self) -> Vec<Mutation> {
        self.lock().mutations.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A panicking test thread must not hide the store from the others.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl RemoteStore for MemoryStore {
    fn read(&self, path: &PathIdentifier) -> Result<Option<RemoteFile>, RemoteError> {
        let mut inner = self.lock();
        inner.injected(path, false)?;
        Ok(inner.files.get(path).map(|(content, revision)| RemoteFile {
            reference: RemoteFileRef {
                path: path.clone(),
                revision: revision.clone(),
            },
            content: content.clone(),
        }))
    }

    fn create(&self, path: &PathIdentifier, content: &[u8]) -> Result<RevisionToken, RemoteError> {
        let mut inner = self.lock();
        inner.injected(path, true)?;
        if inner.files.contains_key(path) {
            return Err(RemoteError::RevisionMismatch { path: path.clone() });
        }
        let revision = inner.bump();
        inner
            .files
            .insert(path.clone(), (content.to_vec(), revision.clone()));
        inner.mutations.push(Mutation::Create(path.clone()));
        Ok(revision)
    }

    fn update(
        &self,
        path: &PathIdentifier,
        content: &[u8],
        expected: &RevisionToken,
    ) -> Result<RevisionToken, RemoteError> {
        let mut inner = self.lock();
        inner.injected(path, true)?;
        match inner.files.get(path) {
            None => return Err(RemoteError::NotFound { path: path.clone() }),
            Some((_, current)) if current != expected => {
                return Err(RemoteError::RevisionMismatch { path: path.clone() })
            }
            Some(_) => {}
        }
        let revision = inner.bump();
        inner
            .files
            .insert(path.clone(), (content.to_vec(), revision.clone()));
        inner.mutations.push(Mutation::Update(path.clone()));
        Ok(revision)
    }

    fn delete(&self, path: &PathIdentifier, expected: &RevisionToken) -> Result<(), RemoteError> {
        let mut inner = self.lock();
        inner.injected(path, true)?;
        match inner.files.get(path) {
            None => return Err(RemoteError::NotFound { path: path.clone() }),
            Some((_, current)) if current != expected => {
                return Err(RemoteError::RevisionMismatch { path: path.clone() })
            }
            Some(_) => {}
        }
        inner.files.remove(path);
        inner.mutations.push(Mutation::Delete(path.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_revision_is_rejected() {
        let store = MemoryStore::new();
        let path = PathIdentifier::parse("a.txt").unwrap();
        let first = store.seed(&path, b"one");
        store.seed(&path, b"two");

        let err = store.update(&path, b"three", &first).unwrap_err();
        assert!(matches!(err, RemoteError::RevisionMismatch { .. }));
        assert_eq!(store.content(&path).unwrap(), b"two");
    }
}
