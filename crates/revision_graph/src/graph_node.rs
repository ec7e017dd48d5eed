use std::rc::Rc;

use crate::{
    branch_color::BranchColor,
    graph::RawLayoutEntry,
    revision::{LinkType, Revision},
};

/// One line crossing the boundary between two adjacent rows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineSegment {
    pub start: Revision,
    pub end: Revision,
    pub link_type: LinkType,
    /// Column the line leaves the upper row from.
    pub from_column: usize,
    /// Column the line enters the lower row at.
    pub to_column: usize,
    pub color: BranchColor,
}

/// A rendered row of the graph.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GraphNode {
    pub revision: Revision,
    pub column: usize,
    pub color: BranchColor,
    /// Lines coming in from the previous row, in drawing order.
    pub incoming: Rc<[LineSegment]>,
    /// Lines going out to the next row, in drawing order.
    pub outgoing: Rc<[LineSegment]>,
    /// Number of columns in use at this row.
    pub width: usize,
}

impl GraphNode {
    pub(crate) fn new(
        entry: &RawLayoutEntry,
        color: BranchColor,
        incoming: Rc<[LineSegment]>,
        outgoing: Rc<[LineSegment]>,
    ) -> Self {
        Self {
            revision: entry.revision,
            column: entry.column,
            color,
            incoming,
            outgoing,
            width: entry.columns.len().max(entry.next_columns.len()),
        }
    }
}

/// Line geometry between the row of `entry` and the row after it. Segments
/// are ordered by edge importance, so the most important one comes last.
pub(crate) fn line_segments(
    entry: &RawLayoutEntry,
    mut color_of: impl FnMut(Revision) -> BranchColor,
) -> Rc<[LineSegment]> {
    let mut edges = entry.edges.iter().collect::<Vec<_>>();
    edges.sort_by_key(|edge| edge.importance());

    edges
        .into_iter()
        .filter_map(|edge| {
            let from_column = if edge.start == entry.revision {
                Some(entry.column)
            } else {
                entry.columns.iter().position(|column| *column == edge.end)
            };
            let to_column = entry
                .next_columns
                .iter()
                .position(|column| *column == edge.end);
            let (Some(from_column), Some(to_column)) = (from_column, to_column) else {
                log::error!(
                    "edge {edge:?} has no column at row of {}",
                    entry.revision
                );
                return None;
            };

            Some(LineSegment {
                start: edge.start,
                end: edge.end,
                link_type: edge.link_type,
                from_column,
                to_column,
                color: edge.resolve_color(&mut color_of),
            })
        })
        .collect()
}
