use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::GraphError;

pub const DEFAULT_NODE_CACHE_CAPACITY: usize = 1000;
pub const DEFAULT_PALETTE_SIZE: usize = 16;

/// Display options of one graph session. They are fixed once the session is
/// created; changing any of them means building a new session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct GraphOptions {
    /// Only show revisions matching this revset.
    pub revset: Option<String>,
    /// Only show revisions on this named branch.
    pub branch: Option<String>,
    /// Together with `branch`, also show revisions outside the branch that are
    /// ancestors of revisions on it.
    pub all_parents: bool,
    /// Draw family lines to the nearest shown ancestors of hidden parents.
    pub show_family_lines: bool,
    /// Draw lines from rewritten revisions to their predecessors.
    pub show_obsolete_sources: bool,
    /// How many rendered rows are kept around.
    pub node_cache_capacity: usize,
    /// Number of distinct branch colors.
    pub palette_size: usize,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            revset: None,
            branch: None,
            all_parents: false,
            show_family_lines: false,
            show_obsolete_sources: false,
            node_cache_capacity: DEFAULT_NODE_CACHE_CAPACITY,
            palette_size: DEFAULT_PALETTE_SIZE,
        }
    }
}

impl GraphOptions {
    pub fn is_filtered(&self) -> bool {
        self.revset.is_some() || self.branch.is_some()
    }

    pub fn family_lines_active(&self) -> bool {
        self.show_family_lines && self.is_filtered()
    }

    pub(crate) fn validate(&self) -> Result<(), GraphError> {
        if self.node_cache_capacity == 0 {
            return Err(GraphError::InvalidConfiguration(
                "node_cache_capacity must be at least 1".into(),
            ));
        }
        if self.palette_size == 0 {
            return Err(GraphError::InvalidConfiguration(
                "palette_size must be at least 1".into(),
            ));
        }
        if self.all_parents && self.branch.is_none() {
            log::warn!("all_parents has no effect without a branch");
        }
        Ok(())
    }
}
