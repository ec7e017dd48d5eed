mod branch_color;
mod family_line;
mod graph;
mod graph_node;
mod node_cache;
mod options;
mod revision;
mod revision_space;
mod store;

#[cfg(test)]
mod revision_graph_tests;

use std::{rc::Rc, sync::Arc};

use smallvec::SmallVec;

pub use branch_color::{BranchColor, EdgeColorAssigner};
pub use family_line::{Destination, FamilyLineResolver, FamilyLineRev};
pub use graph::{Edge, EdgeKey, LayoutBuilder, RawLayoutEntry};
pub use graph_node::{GraphNode, LineSegment};
pub use node_cache::{LruCache, NodeCache};
pub use options::{DEFAULT_NODE_CACHE_CAPACITY, DEFAULT_PALETTE_SIZE, GraphOptions};
pub use revision::{LinkType, ParentPair, Revision};
pub use revision_space::{RevisionSet, RevisionSpace, Revisions};
pub use store::*;

use graph_node::line_segments;

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("revision {0} is not shown in the graph")]
    NotFound(Revision),
    #[error("row {row} is out of range for a graph of {row_count} rows")]
    RowOutOfRange { row: usize, row_count: usize },
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error(transparent)]
    Backend(#[from] LookupError),
}

/// How far [`RevisionGraph::advance_layout`] should drive the layout.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AdvanceTarget {
    /// Lay out this many more rows.
    Steps(usize),
    /// Lay out rows up to and including the row of this revision.
    Revision(Revision),
    /// Lay out every remaining row.
    End,
}

/// A single display item of a row, see [`RevisionGraph::node_data`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeData {
    Revision(Revision),
    Branch(String),
    Column(usize),
    Color(BranchColor),
    Revisions(SmallVec<[Revision; 2]>),
}

/// One graph layout session over a revision store.
///
/// Rows are laid out on demand: asking for a row drives the layout forward just
/// far enough, then renders the row into a [`GraphNode`] that stays cached
/// until it is evicted. Evicted rows are rendered again from their layout
/// entries, which are kept for the whole session.
pub struct RevisionGraph {
    store: Arc<dyn RevisionStore>,
    options: GraphOptions,
    space: RevisionSpace,
    builder: LayoutBuilder,
    nodes: NodeCache,
    colors: EdgeColorAssigner,
}

impl RevisionGraph {
    pub fn new(store: Arc<dyn RevisionStore>, options: GraphOptions) -> Result<Self, GraphError> {
        options.validate()?;
        let space = RevisionSpace::new(&*store, &options)?;
        let builder = LayoutBuilder::new(store.clone(), &space, &options)?;
        log::debug!(
            "created revision graph of {} rows (family lines: {}, obsolete sources: {})",
            space.len(),
            options.family_lines_active(),
            options.show_obsolete_sources,
        );

        Ok(Self {
            store,
            nodes: NodeCache::new(options.node_cache_capacity),
            colors: EdgeColorAssigner::new(options.palette_size),
            options,
            space,
            builder,
        })
    }

    pub fn options(&self) -> &GraphOptions {
        &self.options
    }

    /// Number of rows, known up front without laying any of them out.
    pub fn row_count(&self) -> usize {
        self.space.len()
    }

    pub fn is_layout_complete(&self) -> bool {
        self.builder.is_complete()
    }

    pub fn laid_out_rows(&self) -> usize {
        self.builder.len()
    }

    pub fn max_columns(&self) -> usize {
        self.builder.max_columns()
    }

    /// Drives the layout towards `target`. Returns whether the target was
    /// reached; stepping past the last row only lays out what is left.
    pub fn advance_layout(&mut self, target: AdvanceTarget) -> Result<bool, GraphError> {
        match target {
            AdvanceTarget::Steps(steps) => Ok(self.builder.advance(steps)? == steps),
            AdvanceTarget::Revision(revision) => {
                let row = self.row_index_of(revision)?;
                self.builder.advance_to_row(row)
            }
            AdvanceTarget::End => {
                self.builder.advance_to_end()?;
                Ok(true)
            }
        }
    }

    pub fn row_index_of(&self, revision: Revision) -> Result<usize, GraphError> {
        self.space
            .row_of(revision)
            .ok_or(GraphError::NotFound(revision))
    }

    pub fn row(&mut self, row: usize) -> Result<Rc<GraphNode>, GraphError> {
        let revision = self.revision_at(row)?;
        if let Some(node) = self.nodes.get(&revision) {
            return Ok(node.clone());
        }

        let entry = self.entry(row)?;
        let incoming = match row.checked_sub(1) {
            None => Vec::new().into(),
            Some(previous_row) => {
                let previous = self.revision_at(previous_row)?;
                match self.nodes.peek(&previous) {
                    Some(node) => node.outgoing.clone(),
                    None => {
                        let previous_entry = self.entry(previous_row)?;
                        line_segments(&previous_entry, |revision| {
                            branch_color(&*self.store, &mut self.colors, revision)
                        })
                    }
                }
            }
        };
        let outgoing = line_segments(&entry, |revision| {
            branch_color(&*self.store, &mut self.colors, revision)
        });
        let color = branch_color(&*self.store, &mut self.colors, revision);

        let node = Rc::new(GraphNode::new(&entry, color, incoming, outgoing));
        if let Some((evicted, _)) = self.nodes.insert(revision, node.clone()) {
            log::trace!("evicted rendered row of {evicted}");
        }
        Ok(node)
    }

    /// Looks up one display item of a row. Unknown keys are rejected with
    /// [`GraphError::InvalidConfiguration`].
    pub fn node_data(&mut self, row: usize, key: &str) -> Result<NodeData, GraphError> {
        let revision = self.revision_at(row)?;
        Ok(match key {
            "revision" => NodeData::Revision(revision),
            "branch" => NodeData::Branch(self.store.branch_of(revision)?),
            "column" => NodeData::Column(self.row(row)?.column),
            "color" => NodeData::Color(self.row(row)?.color),
            "parents" => NodeData::Revisions(
                parent_pair(&*self.store, revision)?
                    .into_iter()
                    .flatten()
                    .collect(),
            ),
            "predecessors" if revision.is_working_copy() => NodeData::Revisions(SmallVec::new()),
            "predecessors" => NodeData::Revisions(self.readable_predecessors(revision)?),
            "successors" if revision.is_working_copy() => NodeData::Revisions(SmallVec::new()),
            "successors" => NodeData::Revisions(self.store.first_known_successors(revision)?),
            _ => {
                return Err(GraphError::InvalidConfiguration(format!(
                    "unknown node data key {key:?}"
                )));
            }
        })
    }

    fn readable_predecessors(
        &self,
        revision: Revision,
    ) -> Result<SmallVec<[Revision; 2]>, GraphError> {
        let mut predecessors = SmallVec::new();
        for predecessor in self.store.first_known_predecessors(revision)? {
            match predecessor {
                Ok(predecessor) => predecessors.push(predecessor),
                Err(error) if error.is_recoverable() => {
                    log::debug!("skipping a predecessor of {revision}: {error}");
                }
                Err(error) => return Err(error.into()),
            }
        }
        Ok(predecessors)
    }

    fn revision_at(&self, row: usize) -> Result<Revision, GraphError> {
        self.space
            .revision_at(row)
            .ok_or(GraphError::RowOutOfRange {
                row,
                row_count: self.space.len(),
            })
    }

    fn entry(&mut self, row: usize) -> Result<Rc<RawLayoutEntry>, GraphError> {
        self.builder.advance_to_row(row)?;
        self.builder
            .entry(row)
            .cloned()
            .ok_or(GraphError::RowOutOfRange {
                row,
                row_count: self.space.len(),
            })
    }
}

fn branch_color(
    store: &dyn RevisionStore,
    colors: &mut EdgeColorAssigner,
    revision: Revision,
) -> BranchColor {
    match store.branch_of(revision) {
        Ok(branch) => colors.color_for_branch(&branch),
        Err(error) => {
            log::debug!("using the default color for {revision}: {error}");
            BranchColor::default()
        }
    }
}
