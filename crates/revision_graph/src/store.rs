use smallvec::SmallVec;

use crate::revision::{ParentPair, Revision};

#[cfg(any(test, feature = "test-support"))]
pub use fake::*;

/// A failed lookup against the [`RevisionStore`].
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("revision {0} is filtered out of the repository view")]
    Filtered(Revision),
    #[error("unknown revision {0}")]
    Unknown(Revision),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LookupError {
    /// Whether the layout may skip the revision and continue.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, LookupError::Filtered(_) | LookupError::Unknown(_))
    }
}

/// Read-only view of the version control backend that the layout consumes.
pub trait RevisionStore {
    /// The newest committed revision, or `None` for an empty repository.
    fn last_revision(&self) -> Option<Revision>;

    fn parents_of(&self, revision: Revision) -> Result<ParentPair, LookupError>;

    /// Whether `revision` matches the filter `revset`.
    fn is_in_filter_set(&self, revset: &str, revision: Revision) -> Result<bool, LookupError>;

    /// Parents of the working copy, first parent first.
    fn working_copy_parents(&self) -> SmallVec<[Revision; 2]>;

    /// Revisions `revision` was rewritten from. The outer error means
    /// `revision` itself could not be read; each predecessor carries its own
    /// lookup result.
    fn first_known_predecessors(
        &self,
        revision: Revision,
    ) -> Result<SmallVec<[Result<Revision, LookupError>; 2]>, LookupError>;

    fn first_known_successors(
        &self,
        revision: Revision,
    ) -> Result<SmallVec<[Revision; 2]>, LookupError>;

    fn branch_of(&self, revision: Revision) -> Result<String, LookupError>;
}

/// Parents of any revision including the working copy, whose live parent list
/// is padded to a pair.
pub fn parent_pair(
    store: &dyn RevisionStore,
    revision: Revision,
) -> Result<ParentPair, LookupError> {
    if !revision.is_working_copy() {
        return store.parents_of(revision);
    }

    let mut pair = [None, None];
    for (slot, parent) in pair.iter_mut().zip(store.working_copy_parents()) {
        *slot = Some(parent);
    }
    Ok(pair)
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use std::sync::Arc;

    use collections::{HashMap, HashSet};
    use parking_lot::Mutex;
    use smallvec::SmallVec;

    use super::{LookupError, RevisionStore};
    use crate::revision::{ParentPair, Revision};

    pub const DEFAULT_BRANCH: &str = "default";

    pub struct FakeRevisionStore {
        state: Arc<Mutex<FakeRevisionStoreState>>,
    }

    #[derive(Debug, Clone, Default)]
    pub struct FakeRevisionStoreState {
        /// Parents indexed by revision number.
        pub parents: Vec<ParentPair>,
        pub branches: HashMap<Revision, String>,
        pub revsets: HashMap<String, HashSet<Revision>>,
        pub working_copy_parents: SmallVec<[Revision; 2]>,
        pub predecessors: HashMap<Revision, SmallVec<[Revision; 2]>>,
        /// Revisions every lookup reports as filtered.
        pub filtered: HashSet<Revision>,
    }

    impl FakeRevisionStore {
        pub fn open(state: Arc<Mutex<FakeRevisionStoreState>>) -> Arc<dyn RevisionStore> {
            Arc::new(FakeRevisionStore { state })
        }
    }

    impl FakeRevisionStoreState {
        /// A store whose revisions form a single line `0 <- 1 <- ... <- len - 1`,
        /// with the working copy on top.
        pub fn linear(len: u32) -> Self {
            let mut state = Self::default();
            for revision in 0..len {
                state.commit(&revision.checked_sub(1).into_iter().collect::<Vec<_>>());
            }
            state
        }

        /// Appends a revision with the given parents and moves the working copy
        /// onto it.
        pub fn commit(&mut self, parents: &[u32]) -> Revision {
            let revision = Revision(self.parents.len() as u32);
            let mut pair = [None, None];
            for (slot, parent) in pair.iter_mut().zip(parents) {
                assert!(*parent < revision.0, "parents must be older than {revision}");
                *slot = Some(Revision(*parent));
            }
            self.parents.push(pair);
            self.working_copy_parents = SmallVec::from_slice(&[revision]);
            revision
        }

        pub fn set_branch(&mut self, revision: u32, branch: &str) {
            self.branches.insert(Revision(revision), branch.to_string());
        }

        pub fn define_revset(&mut self, revset: &str, revisions: impl IntoIterator<Item = u32>) {
            self.revsets.insert(
                revset.to_string(),
                revisions.into_iter().map(Revision).collect(),
            );
        }

        pub fn obsolete(&mut self, predecessor: u32, successor: u32) {
            self.predecessors
                .entry(Revision(successor))
                .or_default()
                .push(Revision(predecessor));
        }

        fn check(&self, revision: Revision) -> Result<(), LookupError> {
            if self.filtered.contains(&revision) {
                Err(LookupError::Filtered(revision))
            } else if revision.is_working_copy() || (revision.0 as usize) < self.parents.len() {
                Ok(())
            } else {
                Err(LookupError::Unknown(revision))
            }
        }
    }

    impl RevisionStore for FakeRevisionStore {
        fn last_revision(&self) -> Option<Revision> {
            let state = self.state.lock();
            state
                .parents
                .len()
                .checked_sub(1)
                .map(|revision| Revision(revision as u32))
        }

        fn parents_of(&self, revision: Revision) -> Result<ParentPair, LookupError> {
            let state = self.state.lock();
            state.check(revision)?;
            state
                .parents
                .get(revision.0 as usize)
                .copied()
                .ok_or(LookupError::Unknown(revision))
        }

        fn is_in_filter_set(&self, revset: &str, revision: Revision) -> Result<bool, LookupError> {
            let state = self.state.lock();
            let members = state
                .revsets
                .get(revset)
                .ok_or_else(|| anyhow::anyhow!("unknown revset {revset:?}"))?;
            Ok(members.contains(&revision))
        }

        fn working_copy_parents(&self) -> SmallVec<[Revision; 2]> {
            self.state.lock().working_copy_parents.clone()
        }

        fn first_known_predecessors(
            &self,
            revision: Revision,
        ) -> Result<SmallVec<[Result<Revision, LookupError>; 2]>, LookupError> {
            let state = self.state.lock();
            state.check(revision)?;
            Ok(state
                .predecessors
                .get(&revision)
                .into_iter()
                .flatten()
                .map(|predecessor| state.check(*predecessor).map(|()| *predecessor))
                .collect())
        }

        fn first_known_successors(
            &self,
            revision: Revision,
        ) -> Result<SmallVec<[Revision; 2]>, LookupError> {
            let state = self.state.lock();
            state.check(revision)?;
            let mut successors = state
                .predecessors
                .iter()
                .filter(|(_, predecessors)| predecessors.contains(&revision))
                .map(|(successor, _)| *successor)
                .collect::<SmallVec<[Revision; 2]>>();
            successors.sort_unstable_by(|a, b| b.cmp(a));
            Ok(successors)
        }

        fn branch_of(&self, revision: Revision) -> Result<String, LookupError> {
            let state = self.state.lock();
            if revision.is_working_copy() {
                let first_parent = state.working_copy_parents.first().copied();
                return Ok(first_parent
                    .and_then(|parent| state.branches.get(&parent).cloned())
                    .unwrap_or_else(|| DEFAULT_BRANCH.to_string()));
            }
            state.check(revision)?;
            Ok(state
                .branches
                .get(&revision)
                .cloned()
                .unwrap_or_else(|| DEFAULT_BRANCH.to_string()))
        }
    }
}
