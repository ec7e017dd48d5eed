use std::{cell::Cell, cmp::Reverse, fmt, rc::Rc, sync::Arc};

use collections::{HashMap, IndexMap};
use smallvec::SmallVec;

use crate::{
    GraphError,
    branch_color::BranchColor,
    family_line::FamilyLineResolver,
    options::GraphOptions,
    revision::{LinkType, ParentPair, Revision},
    revision_space::{RevisionSpace, Revisions},
    store::{RevisionStore, parent_pair},
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct EdgeKey {
    pub start: Revision,
    pub end: Revision,
    pub link_type: LinkType,
}

/// A line from a revision to one of its parents or ancestors. Edges are shared
/// by every row they cross.
pub struct Edge {
    pub start: Revision,
    pub end: Revision,
    pub link_type: LinkType,
    color: Cell<Option<BranchColor>>,
}

impl Edge {
    fn new(key: EdgeKey) -> Self {
        Self {
            start: key.start,
            end: key.end,
            link_type: key.link_type,
            color: Cell::new(None),
        }
    }

    pub fn key(&self) -> EdgeKey {
        EdgeKey {
            start: self.start,
            end: self.end,
            link_type: self.link_type,
        }
    }

    /// Sort key of overlapping edges; the greatest one is drawn last.
    pub fn importance(&self) -> (Reverse<LinkType>, Reverse<Revision>) {
        (Reverse(self.link_type), Reverse(self.end))
    }

    pub fn color(&self) -> Option<BranchColor> {
        self.color.get()
    }

    pub(crate) fn resolve_color(
        &self,
        color_of: impl FnOnce(Revision) -> BranchColor,
    ) -> BranchColor {
        if let Some(color) = self.color.get() {
            return color;
        }
        let color = color_of(self.end);
        self.color.set(Some(color));
        color
    }
}

impl PartialEq for Edge {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Edge {}

impl fmt::Debug for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{} ({:?})", self.start, self.end, self.link_type)
    }
}

/// Layout state captured for one row.
#[derive(Debug, Clone)]
pub struct RawLayoutEntry {
    pub revision: Revision,
    /// Column of `revision` in `columns`.
    pub column: usize,
    /// Revisions occupying the columns as the row is entered.
    pub columns: Rc<[Revision]>,
    /// Revisions occupying the columns as the row is left, with the row's
    /// revision replaced by the parents it introduced.
    pub next_columns: Rc<[Revision]>,
    /// Every edge crossing from this row to the next one.
    pub edges: Rc<[Rc<Edge>]>,
}

/// Incremental column and edge assignment over a [`RevisionSpace`].
///
/// Each call to [`LayoutBuilder::step`] lays out the next row; the builder can
/// be driven as far as the caller needs and resumed later.
pub struct LayoutBuilder {
    store: Arc<dyn RevisionStore>,
    space: RevisionSpace,
    revisions: Revisions,
    family_lines: Option<FamilyLineResolver>,
    show_obsolete_sources: bool,
    columns: Rc<[Revision]>,
    active_edges: IndexMap<EdgeKey, Rc<Edge>>,
    active_edges_by_end: HashMap<Revision, SmallVec<[EdgeKey; 2]>>,
    entries: Vec<Rc<RawLayoutEntry>>,
    max_columns: usize,
}

impl LayoutBuilder {
    pub fn new(
        store: Arc<dyn RevisionStore>,
        space: &RevisionSpace,
        options: &GraphOptions,
    ) -> Result<Self, GraphError> {
        let family_lines = match space.filter() {
            Some(set) if options.show_family_lines => {
                Some(FamilyLineResolver::precompute(&*store, set)?)
            }
            _ => None,
        };

        Ok(Self {
            store,
            space: space.clone(),
            revisions: space.iter(),
            family_lines,
            show_obsolete_sources: options.show_obsolete_sources,
            columns: Vec::new().into(),
            active_edges: IndexMap::default(),
            active_edges_by_end: HashMap::default(),
            entries: Vec::new(),
            max_columns: 0,
        })
    }

    /// Number of rows laid out so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.entries.len() == self.space.len()
    }

    pub fn entry(&self, row: usize) -> Option<&Rc<RawLayoutEntry>> {
        self.entries.get(row)
    }

    /// Widest column list seen so far.
    pub fn max_columns(&self) -> usize {
        self.max_columns
    }

    /// Lays out up to `steps` more rows and returns how many were added.
    pub fn advance(&mut self, steps: usize) -> Result<usize, GraphError> {
        let mut advanced = 0;
        while advanced < steps && self.step()?.is_some() {
            advanced += 1;
        }
        Ok(advanced)
    }

    /// Lays out rows until `row` is available. Returns false if the space ends
    /// before it.
    pub fn advance_to_row(&mut self, row: usize) -> Result<bool, GraphError> {
        while self.entries.len() <= row {
            if self.step()?.is_none() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn advance_to_end(&mut self) -> Result<(), GraphError> {
        while self.step()?.is_some() {}
        Ok(())
    }

    /// Lays out the next row, or returns `None` once every row is done.
    pub fn step(&mut self) -> Result<Option<Rc<RawLayoutEntry>>, GraphError> {
        let Some(revision) = self.revisions.next() else {
            return Ok(None);
        };

        let (column, columns) = match self.columns.iter().position(|c| *c == revision) {
            Some(column) => (column, self.columns.clone()),
            None => {
                // A new head.
                let mut columns = self.columns.to_vec();
                columns.push(revision);
                (columns.len() - 1, Rc::from(columns))
            }
        };

        if let Some(ending) = self.active_edges_by_end.remove(&revision) {
            for key in ending {
                self.active_edges.shift_remove(&key);
            }
        }

        let parents = self.filtered_parents(revision)?;
        let mut targets = self.parent_targets(revision, parents);
        if self.show_obsolete_sources {
            self.add_obsolete_targets(revision, &mut targets)?;
        }

        let mut new_columns = SmallVec::<[Revision; 2]>::new();
        for (end, link_type) in targets {
            let key = EdgeKey {
                start: revision,
                end,
                link_type,
            };
            self.active_edges.insert(key, Rc::new(Edge::new(key)));
            self.active_edges_by_end.entry(end).or_default().push(key);
            if !columns.contains(&end) && !new_columns.contains(&end) {
                new_columns.push(end);
            }
        }

        let mut next_columns = columns.to_vec();
        next_columns.splice(column..column + 1, new_columns);
        let next_columns: Rc<[Revision]> = Rc::from(next_columns);

        self.max_columns = self
            .max_columns
            .max(columns.len())
            .max(next_columns.len());
        let entry = Rc::new(RawLayoutEntry {
            revision,
            column,
            columns,
            next_columns: next_columns.clone(),
            edges: self.active_edges.values().cloned().collect(),
        });
        log::trace!(
            "laid out {revision} in column {column} with {} active edges",
            entry.edges.len()
        );

        self.columns = next_columns;
        self.entries.push(entry.clone());
        Ok(Some(entry))
    }

    /// Parents of `revision` with hidden ones removed. A parent that would be
    /// drawn twice is only kept on the first side.
    fn filtered_parents(&self, revision: Revision) -> Result<ParentPair, GraphError> {
        let mut parents = parent_pair(&*self.store, revision)?;
        for parent in &mut parents {
            if parent.is_some_and(|parent| !self.space.contains(parent)) {
                *parent = None;
            }
        }
        if parents[0] == parents[1] {
            parents[1] = None;
        }
        Ok(parents)
    }

    fn parent_targets(
        &mut self,
        revision: Revision,
        parents: ParentPair,
    ) -> SmallVec<[(Revision, LinkType); 3]> {
        let direct_parents = || -> SmallVec<[(Revision, LinkType); 3]> {
            parents
                .iter()
                .flatten()
                .map(|parent| (*parent, LinkType::Parent))
                .collect()
        };

        let Some(resolver) = self.family_lines.as_mut() else {
            return direct_parents();
        };
        match resolver.take_destinations(revision) {
            Some(destinations) => destinations
                .into_iter()
                .map(|destination| {
                    let link_type = if parents.contains(&Some(destination.revision)) {
                        LinkType::Parent
                    } else {
                        LinkType::Family
                    };
                    (destination.revision, link_type)
                })
                .collect(),
            None => {
                log::warn!("no resolved family lines for {revision}, using its parents");
                direct_parents()
            }
        }
    }

    fn add_obsolete_targets(
        &self,
        revision: Revision,
        targets: &mut SmallVec<[(Revision, LinkType); 3]>,
    ) -> Result<(), GraphError> {
        if revision.is_working_copy() {
            return Ok(());
        }
        let predecessors = match self.store.first_known_predecessors(revision) {
            Ok(predecessors) => predecessors,
            Err(error) if error.is_recoverable() => {
                log::debug!("skipping predecessors of {revision}: {error}");
                return Ok(());
            }
            Err(error) => return Err(error.into()),
        };

        for predecessor in predecessors {
            let predecessor = match predecessor {
                Ok(predecessor) => predecessor,
                Err(error) if error.is_recoverable() => {
                    log::debug!("skipping a predecessor of {revision}: {error}");
                    continue;
                }
                Err(error) => return Err(error.into()),
            };
            // Only older revisions are still ahead of the walk.
            if predecessor < revision
                && self.space.contains(predecessor)
                && !targets.contains(&(predecessor, LinkType::Obsolete))
            {
                targets.push((predecessor, LinkType::Obsolete));
            }
        }
        Ok(())
    }
}
