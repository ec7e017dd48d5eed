//! Family lines connect a shown revision to its nearest shown ancestors when a
//! parent in between is hidden by the filter.
//!
//! The resolver is fed every relevant revision once, children before parents.
//! A revision whose parents are all shown resolves immediately. A revision with
//! hidden parents waits on them: each hidden parent counts as one pending link,
//! and once that parent has itself resolved its destinations are handed down to
//! every revision waiting on it. Hidden revisions are only tracked while some
//! shown revision is waiting on them.

use std::cmp::Reverse;

use collections::HashMap;
use smallvec::SmallVec;

use crate::{
    GraphError,
    revision::{LinkType, ParentPair, Revision},
    revision_space::RevisionSet,
    store::{RevisionStore, parent_pair},
};

/// An ancestor a shown revision connects to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Destination {
    pub revision: Revision,
    pub link_type: LinkType,
    /// Whether the line descends from the first parent side.
    pub is_first_parent: bool,
}

/// Resolution state of one revision.
#[derive(Debug)]
pub struct FamilyLineRev {
    pending: usize,
    destinations: SmallVec<[Destination; 2]>,
    parents: ParentPair,
    visible: bool,
}

impl FamilyLineRev {
    fn new(parents: ParentPair, visible: bool) -> Self {
        Self {
            pending: 0,
            destinations: SmallVec::new(),
            parents,
            visible,
        }
    }

    /// Number of hidden parent links still waiting for resolution.
    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn is_resolved(&self) -> bool {
        self.pending == 0
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn parents(&self) -> ParentPair {
        self.parents
    }

    /// Destinations collected so far, before ancestor pruning.
    pub fn destinations(&self) -> &[Destination] {
        &self.destinations
    }

    fn add_destination(&mut self, destination: Destination) {
        if let Some(existing) = self
            .destinations
            .iter_mut()
            .find(|existing| existing.revision == destination.revision)
        {
            existing.link_type = existing.link_type.min(destination.link_type);
            existing.is_first_parent |= destination.is_first_parent;
        } else {
            self.destinations.push(destination);
        }
    }
}

#[derive(Copy, Clone, Debug)]
struct Waiter {
    revision: Revision,
    is_first_parent: bool,
}

#[derive(Debug, Default)]
pub struct FamilyLineResolver {
    revs: HashMap<Revision, FamilyLineRev>,
    /// Hidden revision -> revisions waiting for it to resolve.
    waiters: HashMap<Revision, SmallVec<[Waiter; 1]>>,
}

impl FamilyLineResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs the resolver over the store, from the newest shown revision down to
    /// the point where nothing shown is left and nothing is waiting.
    pub fn precompute(store: &dyn RevisionStore, set: &RevisionSet) -> Result<Self, GraphError> {
        let mut resolver = Self::new();
        let Some(lowest) = set.lowest() else {
            return Ok(resolver);
        };

        let mut visited = 0;
        let mut next = set.revisions().first().copied();
        while let Some(revision) = next {
            next = if revision.is_working_copy() {
                store.last_revision()
            } else {
                revision.older()
            };

            if revision < lowest && resolver.waiters.is_empty() {
                break;
            }
            let visible = set.contains(revision);
            if !visible && !resolver.is_awaited(revision) {
                continue;
            }

            let parents = match parent_pair(store, revision) {
                Ok(parents) => parents,
                Err(error) if !visible && error.is_recoverable() => {
                    log::debug!("ending family lines at {revision}: {error}");
                    [None, None]
                }
                Err(error) => return Err(error.into()),
            };
            resolver.proceed(revision, parents, |parent| set.contains(parent));
            visited += 1;
        }

        log::debug!(
            "family lines resolved for {} revisions after visiting {visited}",
            resolver.revs.len()
        );
        Ok(resolver)
    }

    /// Feeds `revision` with its real parents to the resolver. Must be called at
    /// most once per revision, and before any of its ancestors.
    pub fn proceed(
        &mut self,
        revision: Revision,
        parents: ParentPair,
        is_visible: impl Fn(Revision) -> bool,
    ) {
        let visible = is_visible(revision);
        if !visible && !self.is_awaited(revision) {
            return;
        }
        if self.revs.contains_key(&revision) {
            log::warn!("family line resolver saw {revision} twice");
            return;
        }

        let mut rev = FamilyLineRev::new(parents, visible);
        for (side, parent) in parents.iter().enumerate() {
            let Some(parent) = *parent else {
                continue;
            };
            if side == 1 && parents[0] == Some(parent) {
                continue;
            }

            let is_first_parent = side == 0;
            if is_visible(parent) {
                rev.add_destination(Destination {
                    revision: parent,
                    link_type: LinkType::Parent,
                    is_first_parent,
                });
            } else {
                rev.pending += 1;
                self.waiters.entry(parent).or_default().push(Waiter {
                    revision,
                    is_first_parent,
                });
            }
        }

        let resolved = rev.is_resolved();
        self.revs.insert(revision, rev);
        if resolved {
            self.propagate(revision);
        }
    }

    fn propagate(&mut self, revision: Revision) {
        let mut resolved = vec![revision];
        while let Some(revision) = resolved.pop() {
            let Some(waiters) = self.waiters.remove(&revision) else {
                continue;
            };
            // Only hidden revisions are waited on, so nothing reads this record
            // once it has been handed down.
            let Some(hidden) = self.revs.remove(&revision) else {
                continue;
            };

            for waiter in waiters {
                let Some(rev) = self.revs.get_mut(&waiter.revision) else {
                    continue;
                };
                for destination in &hidden.destinations {
                    rev.add_destination(Destination {
                        revision: destination.revision,
                        link_type: LinkType::Family,
                        is_first_parent: waiter.is_first_parent,
                    });
                }
                rev.pending -= 1;
                if rev.pending == 0 {
                    resolved.push(waiter.revision);
                }
            }
        }
    }

    pub fn is_awaited(&self, revision: Revision) -> bool {
        self.waiters.contains_key(&revision)
    }

    pub fn get(&self, revision: Revision) -> Option<&FamilyLineRev> {
        self.revs.get(&revision)
    }

    /// Final destinations of a resolved revision, or `None` while it is
    /// pending or unknown.
    pub fn destinations(&self, revision: Revision) -> Option<SmallVec<[Destination; 2]>> {
        let rev = self.revs.get(&revision)?;
        rev.is_resolved().then(|| self.finalize(rev))
    }

    /// Like [`Self::destinations`], but releases the record afterwards.
    pub fn take_destinations(&mut self, revision: Revision) -> Option<SmallVec<[Destination; 2]>> {
        let destinations = self.destinations(revision)?;
        self.revs.remove(&revision);
        Some(destinations)
    }

    /// Drops family candidates that are a parent of another family candidate
    /// of the same revision, then orders the result: parent lines before
    /// family lines, first parent side first, newest first.
    fn finalize(&self, rev: &FamilyLineRev) -> SmallVec<[Destination; 2]> {
        let family = rev
            .destinations
            .iter()
            .filter(|destination| destination.link_type == LinkType::Family)
            .map(|destination| destination.revision)
            .collect::<SmallVec<[Revision; 4]>>();

        let mut destinations = rev
            .destinations
            .iter()
            .filter(|destination| {
                destination.link_type != LinkType::Family
                    || !self.is_parent_of_any(destination.revision, &family)
            })
            .copied()
            .collect::<SmallVec<[Destination; 2]>>();
        destinations.sort_by_key(|destination| {
            (
                destination.link_type,
                !destination.is_first_parent,
                Reverse(destination.revision),
            )
        });
        destinations
    }

    fn is_parent_of_any(&self, candidate: Revision, others: &[Revision]) -> bool {
        others.iter().any(|other| {
            *other != candidate
                && self
                    .revs
                    .get(other)
                    .is_some_and(|rev| rev.parents.contains(&Some(candidate)))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use collections::{BTreeMap, HashSet};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use rand::prelude::*;

    use super::*;
    use crate::store::{FakeRevisionStore, FakeRevisionStoreState};

    fn pair(parents: &[u32]) -> ParentPair {
        let mut pair = [None, None];
        for (slot, parent) in pair.iter_mut().zip(parents) {
            *slot = Some(Revision(*parent));
        }
        pair
    }

    fn dest(revision: u32, link_type: LinkType, is_first_parent: bool) -> Destination {
        Destination {
            revision: Revision(revision),
            link_type,
            is_first_parent,
        }
    }

    struct Dag {
        parents: BTreeMap<u32, ParentPair>,
        hidden: HashSet<Revision>,
    }

    impl Dag {
        fn new(edges: &[(u32, &[u32])], hidden: &[u32]) -> Self {
            Self {
                parents: edges
                    .iter()
                    .map(|(revision, parents)| (*revision, pair(parents)))
                    .collect(),
                hidden: hidden.iter().copied().map(Revision).collect(),
            }
        }

        fn proceed(&self, resolver: &mut FamilyLineResolver, revision: u32) {
            resolver.proceed(Revision(revision), self.parents[&revision], |revision| {
                !self.hidden.contains(&revision)
            });
        }

        fn resolve(&self) -> FamilyLineResolver {
            let mut resolver = FamilyLineResolver::new();
            for revision in self.parents.keys().rev() {
                self.proceed(&mut resolver, *revision);
            }
            resolver
        }
    }

    fn destinations(resolver: &FamilyLineResolver, revision: u32) -> Vec<Destination> {
        resolver
            .destinations(Revision(revision))
            .map(|destinations| destinations.into_vec())
            .unwrap_or_default()
    }

    #[test]
    fn test_root_resolves_immediately() {
        let dag = Dag::new(&[(0, &[])], &[]);
        let mut resolver = FamilyLineResolver::new();
        dag.proceed(&mut resolver, 0);
        let rev = resolver.get(Revision(0)).unwrap();
        assert_eq!(rev.pending(), 0);
        assert!(rev.destinations().is_empty());
        assert!(destinations(&resolver, 0).is_empty());
    }

    #[test]
    fn test_visible_parents_are_tagged_by_side() {
        let dag = Dag::new(&[(9, &[3, 5]), (8, &[7]), (7, &[]), (5, &[]), (3, &[])], &[]);
        let mut resolver = FamilyLineResolver::new();
        dag.proceed(&mut resolver, 9);
        dag.proceed(&mut resolver, 8);
        assert_eq!(resolver.get(Revision(8)).unwrap().pending(), 0);
        assert_eq!(
            destinations(&resolver, 8),
            vec![dest(7, LinkType::Parent, true)]
        );
        // The first parent tag follows declaration order, not revision order.
        assert_eq!(
            destinations(&resolver, 9),
            vec![
                dest(3, LinkType::Parent, true),
                dest(5, LinkType::Parent, false)
            ]
        );
    }

    #[test]
    fn test_hidden_parent_resolves_through_family_line() {
        let dag = Dag::new(&[(9, &[8]), (8, &[7]), (7, &[6]), (6, &[])], &[8]);
        let mut resolver = FamilyLineResolver::new();

        dag.proceed(&mut resolver, 9);
        assert_eq!(resolver.get(Revision(9)).unwrap().pending(), 1);
        assert_eq!(resolver.destinations(Revision(9)), None);

        dag.proceed(&mut resolver, 8);
        dag.proceed(&mut resolver, 7);
        let rev = resolver.get(Revision(9)).unwrap();
        assert_eq!(rev.pending(), 0);
        assert_eq!(
            destinations(&resolver, 9),
            vec![dest(7, LinkType::Family, true)]
        );
        assert_eq!(
            destinations(&resolver, 7),
            vec![dest(6, LinkType::Parent, true)]
        );
        // The hidden revision is released once handed down.
        assert!(resolver.get(Revision(8)).is_none());
    }

    #[test]
    fn test_family_lines_span_multiple_hidden_hops() {
        let dag = Dag::new(&[(10, &[9]), (9, &[8]), (8, &[7]), (7, &[])], &[9, 8]);
        let mut resolver = FamilyLineResolver::new();
        dag.proceed(&mut resolver, 10);
        dag.proceed(&mut resolver, 9);
        assert_eq!(resolver.get(Revision(10)).unwrap().pending(), 1);
        let hidden = resolver.get(Revision(9)).unwrap();
        assert!(!hidden.is_visible());
        assert_eq!(hidden.parents(), pair(&[8]));
        assert!(resolver.get(Revision(10)).unwrap().is_visible());
        dag.proceed(&mut resolver, 8);
        assert_eq!(resolver.get(Revision(10)).unwrap().pending(), 0);
        assert_eq!(
            destinations(&resolver, 10),
            vec![dest(7, LinkType::Family, true)]
        );
    }

    #[test]
    fn test_hidden_parent_already_reachable_directly() {
        let dag = Dag::new(&[(9, &[7, 8]), (8, &[7]), (7, &[])], &[8]);
        let resolver = dag.resolve();
        assert_eq!(
            destinations(&resolver, 9),
            vec![dest(7, LinkType::Parent, true)]
        );
    }

    #[test]
    fn test_diamond_is_deduplicated() {
        let dag = Dag::new(&[(10, &[9, 8]), (9, &[7]), (8, &[7]), (7, &[])], &[9, 8]);
        let resolver = dag.resolve();
        assert_eq!(
            destinations(&resolver, 10),
            vec![dest(7, LinkType::Family, true)]
        );
    }

    #[test]
    fn test_second_parent_side_keeps_its_tag() {
        let dag = Dag::new(&[(10, &[7, 8]), (8, &[6]), (7, &[]), (6, &[])], &[8]);
        let resolver = dag.resolve();
        assert_eq!(
            destinations(&resolver, 10),
            vec![
                dest(7, LinkType::Parent, true),
                dest(6, LinkType::Family, false)
            ]
        );
    }

    #[test]
    fn test_parent_of_another_candidate_is_dropped() {
        let dag = Dag::new(
            &[(10, &[9, 8]), (9, &[7]), (8, &[6]), (7, &[6]), (6, &[])],
            &[9, 8],
        );
        let resolver = dag.resolve();
        let rev = resolver.get(Revision(10)).unwrap();
        assert_eq!(rev.destinations().len(), 2);
        assert_eq!(
            destinations(&resolver, 10),
            vec![dest(7, LinkType::Family, true)]
        );
    }

    #[test]
    fn test_hidden_chain_without_visible_ancestor() {
        let dag = Dag::new(&[(2, &[1]), (1, &[0]), (0, &[])], &[1, 0]);
        let resolver = dag.resolve();
        assert_eq!(resolver.get(Revision(2)).unwrap().pending(), 0);
        assert!(destinations(&resolver, 2).is_empty());
        assert!(!resolver.is_awaited(Revision(0)));
    }

    #[test]
    fn test_take_destinations_releases_record() {
        let dag = Dag::new(&[(1, &[0]), (0, &[])], &[]);
        let mut resolver = dag.resolve();
        assert_eq!(
            resolver.take_destinations(Revision(1)).unwrap().into_vec(),
            vec![dest(0, LinkType::Parent, true)]
        );
        assert!(resolver.get(Revision(1)).is_none());
        assert_eq!(resolver.take_destinations(Revision(1)), None);
    }

    #[test]
    fn test_precompute_from_store() {
        let mut state = FakeRevisionStoreState::default();
        state.commit(&[]); // 0
        state.commit(&[0]); // 1
        state.commit(&[1]); // 2, hidden
        state.commit(&[2]); // 3
        state.commit(&[2]); // 4, hidden and unreadable
        state.commit(&[4, 3]); // 5
        state.define_revset("shown", [0, 1, 3, 5]);
        state.filtered.insert(Revision(4));
        let store = FakeRevisionStore::open(Arc::new(Mutex::new(state)));
        let options = crate::GraphOptions {
            revset: Some("shown".into()),
            show_family_lines: true,
            ..Default::default()
        };
        let set = RevisionSet::build(&*store, &options).unwrap().unwrap();
        assert_eq!(set.revisions()[0], Revision::WORKING_COPY);

        let resolver = FamilyLineResolver::precompute(&*store, &set).unwrap();
        assert_eq!(
            destinations(&resolver, 3),
            vec![dest(1, LinkType::Family, true)]
        );
        // 4 cannot be read, so its side of the merge ends there.
        assert_eq!(
            destinations(&resolver, 5),
            vec![dest(3, LinkType::Parent, false)]
        );
        assert_eq!(
            resolver
                .destinations(Revision::WORKING_COPY)
                .unwrap()
                .into_vec(),
            vec![dest(5, LinkType::Parent, true)]
        );
    }

    #[test]
    fn test_random_topological_orders_agree() {
        let iterations = std::env::var("ITERATIONS")
            .map(|i| i.parse().expect("invalid `ITERATIONS` variable"))
            .unwrap_or(50);
        for seed in 0..iterations {
            let mut rng = StdRng::seed_from_u64(seed);
            let count = rng.gen_range(1..40u32);

            let mut parents = BTreeMap::new();
            for revision in 0..count {
                let mut revision_parents = Vec::new();
                if revision > 0 {
                    revision_parents.push(rng.gen_range(0..revision));
                    if revision > 1 && rng.gen_bool(0.3) {
                        revision_parents.push(rng.gen_range(0..revision));
                    }
                }
                parents.insert(revision, pair(&revision_parents));
            }
            let hidden = (0..count)
                .filter(|_| rng.gen_bool(0.4))
                .map(Revision)
                .collect::<HashSet<_>>();
            let dag = Dag { parents, hidden };

            let expected = dag.resolve();

            // Any order visiting children before their parents.
            let mut remaining_children = BTreeMap::<u32, usize>::new();
            for pair in dag.parents.values() {
                let mut pair = *pair;
                if pair[0] == pair[1] {
                    pair[1] = None;
                }
                for parent in pair.into_iter().flatten() {
                    *remaining_children.entry(parent.0).or_default() += 1;
                }
            }
            let mut ready = dag
                .parents
                .keys()
                .copied()
                .filter(|revision| !remaining_children.contains_key(revision))
                .collect::<Vec<_>>();
            let mut resolver = FamilyLineResolver::new();
            while !ready.is_empty() {
                let revision = ready.swap_remove(rng.gen_range(0..ready.len()));
                dag.proceed(&mut resolver, revision);
                let mut pair = dag.parents[&revision];
                if pair[0] == pair[1] {
                    pair[1] = None;
                }
                for parent in pair.into_iter().flatten() {
                    let children = remaining_children.get_mut(&parent.0).unwrap();
                    *children -= 1;
                    if *children == 0 {
                        ready.push(parent.0);
                    }
                }
            }

            for revision in 0..count {
                assert_eq!(
                    destinations(&resolver, revision),
                    destinations(&expected, revision),
                    "seed {seed}, revision {revision}"
                );
            }
        }
    }
}
