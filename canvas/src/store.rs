//! In-memory holder of one session's canonical document.

use crate::core::types::SharedState;

/// Canonical document plus a commit counter and a dirty flag for persistence.
///
/// Mutation only happens through [`StateStore::replace`] and
/// [`StateStore::apply_patch`]; both commit whole documents, so readers never
/// observe a half-applied change.
#[derive(Debug, Clone, PartialEq)]
pub struct StateStore {
    doc: SharedState,
    revision: u64,
    dirty: bool,
}

impl StateStore {
    pub fn new(doc: SharedState) -> Self {
        Self {
            doc,
            revision: 0,
            dirty: false,
        }
    }

    pub fn get(&self) -> &SharedState {
        &self.doc
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// True when committed changes have not been persisted yet.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Replace the whole document.
    pub fn replace(&mut self, doc: SharedState) {
        self.doc = doc;
        self.commit();
    }

    /// Run `mutator` against a working copy and commit it only on `Ok`.
    ///
    /// An `Err` (or a panic inside `mutator`) leaves the store untouched.
    pub fn apply_patch<R, E>(
        &mut self,
        mutator: impl FnOnce(&mut SharedState) -> Result<R, E>,
    ) -> Result<R, E> {
        let mut working = self.doc.clone();
        let output = mutator(&mut working)?;
        self.doc = working;
        self.commit();
        Ok(output)
    }

    fn commit(&mut self) {
        self.revision += 1;
        self.dirty = true;
    }
}
