use std::sync::Arc;

use collections::HashSet;

use crate::{
    GraphError,
    options::GraphOptions,
    revision::Revision,
    store::{RevisionStore, parent_pair},
};

/// The revisions a filtered session shows, newest first.
#[derive(Debug, Clone)]
pub struct RevisionSet {
    revisions: Vec<Revision>,
    members: HashSet<Revision>,
}

impl RevisionSet {
    pub fn from_revisions(revisions: impl IntoIterator<Item = Revision>) -> Self {
        let mut revisions = revisions.into_iter().collect::<Vec<_>>();
        revisions.sort_unstable_by(|a, b| b.cmp(a));
        revisions.dedup();
        let members = revisions.iter().copied().collect();
        Self { revisions, members }
    }

    /// Evaluates the revset and branch restriction of `options` against the
    /// store. Returns `None` when the options do not filter anything.
    pub fn build(
        store: &dyn RevisionStore,
        options: &GraphOptions,
    ) -> Result<Option<Self>, GraphError> {
        if !options.is_filtered() {
            return Ok(None);
        }

        let mut revisions = Vec::new();
        // Ancestors of branch revisions still to be reached by the scan.
        let mut wanted_ancestors = HashSet::default();
        let mut next = store.last_revision();
        while let Some(revision) = next {
            next = revision.older();

            let in_branch = match options.branch.as_deref() {
                Some(branch) => {
                    let reached = wanted_ancestors.remove(&revision);
                    let on_branch = reached || store.branch_of(revision)? == branch;
                    if on_branch && options.all_parents {
                        wanted_ancestors.extend(store.parents_of(revision)?.into_iter().flatten());
                    }
                    on_branch
                }
                None => true,
            };
            if !in_branch {
                continue;
            }

            let in_revset = match options.revset.as_deref() {
                Some(revset) => store.is_in_filter_set(revset, revision)?,
                None => true,
            };
            if in_revset {
                revisions.push(revision);
            }
        }

        let mut set = Self::from_revisions(revisions);
        let working_copy_parents = parent_pair(store, Revision::WORKING_COPY)?;
        if working_copy_parents
            .iter()
            .flatten()
            .any(|parent| set.contains(*parent))
        {
            set.revisions.insert(0, Revision::WORKING_COPY);
            set.members.insert(Revision::WORKING_COPY);
        }

        log::debug!(
            "revset {:?} on branch {:?} selected {} revisions",
            options.revset,
            options.branch,
            set.len()
        );
        Ok(Some(set))
    }

    pub fn contains(&self, revision: Revision) -> bool {
        self.members.contains(&revision)
    }

    pub fn revisions(&self) -> &[Revision] {
        &self.revisions
    }

    pub fn len(&self) -> usize {
        self.revisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }

    pub fn lowest(&self) -> Option<Revision> {
        self.revisions.last().copied()
    }
}

/// The ordered sequence of revisions a session lays out, one per row.
#[derive(Debug, Clone)]
pub enum RevisionSpace {
    /// The working copy followed by every committed revision from newest to 0.
    All { last_revision: Option<Revision> },
    Filtered(Arc<RevisionSet>),
}

impl RevisionSpace {
    pub fn new(store: &dyn RevisionStore, options: &GraphOptions) -> Result<Self, GraphError> {
        Ok(match RevisionSet::build(store, options)? {
            Some(set) => RevisionSpace::Filtered(Arc::new(set)),
            None => RevisionSpace::All {
                last_revision: store.last_revision(),
            },
        })
    }

    pub fn len(&self) -> usize {
        match self {
            RevisionSpace::All { last_revision } => {
                1 + last_revision.map_or(0, |revision| revision.0 as usize + 1)
            }
            RevisionSpace::Filtered(set) => set.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn filter(&self) -> Option<&Arc<RevisionSet>> {
        match self {
            RevisionSpace::All { .. } => None,
            RevisionSpace::Filtered(set) => Some(set),
        }
    }

    /// Whether `revision` is shown. Every revision is shown when nothing is
    /// filtered.
    pub fn contains(&self, revision: Revision) -> bool {
        match self {
            RevisionSpace::All { last_revision } => {
                revision.is_working_copy() || last_revision.is_some_and(|last| revision <= last)
            }
            RevisionSpace::Filtered(set) => set.contains(revision),
        }
    }

    pub fn revision_at(&self, row: usize) -> Option<Revision> {
        match self {
            RevisionSpace::All { last_revision } => {
                if row == 0 {
                    return Some(Revision::WORKING_COPY);
                }
                let last = (*last_revision)?;
                let offset = u32::try_from(row - 1).ok()?;
                last.0.checked_sub(offset).map(Revision)
            }
            RevisionSpace::Filtered(set) => set.revisions.get(row).copied(),
        }
    }

    pub fn row_of(&self, revision: Revision) -> Option<usize> {
        match self {
            RevisionSpace::All { last_revision } => {
                if revision.is_working_copy() {
                    return Some(0);
                }
                let last = (*last_revision)?;
                (revision <= last).then(|| (last.0 - revision.0) as usize + 1)
            }
            RevisionSpace::Filtered(set) => {
                if !set.contains(revision) {
                    return None;
                }
                set.revisions
                    .binary_search_by(|probe| revision.cmp(probe))
                    .ok()
            }
        }
    }

    /// A fresh walk over the space. Walks are independent of each other.
    pub fn iter(&self) -> Revisions {
        Revisions {
            space: self.clone(),
            row: 0,
        }
    }
}

/// A suspendable, newest-first walk over a [`RevisionSpace`].
#[derive(Debug, Clone)]
pub struct Revisions {
    space: RevisionSpace,
    row: usize,
}

impl Revisions {
    /// Row of the revision the next call to `next` returns.
    pub fn position(&self) -> usize {
        self.row
    }
}

impl Iterator for Revisions {
    type Item = Revision;

    fn next(&mut self) -> Option<Revision> {
        let revision = self.space.revision_at(self.row)?;
        self.row += 1;
        Some(revision)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.space.len().saturating_sub(self.row);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Revisions {}
