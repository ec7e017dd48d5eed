use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A revision number in the store's dense, totally ordered revision space.
///
/// Higher numbers are newer. [`Revision::WORKING_COPY`] stands for the
/// uncommitted working directory and sorts after every committed revision, so a
/// newest-first walk always meets it first.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct Revision(pub u32);

impl Revision {
    pub const WORKING_COPY: Revision = Revision(u32::MAX);

    pub fn is_working_copy(self) -> bool {
        self == Self::WORKING_COPY
    }

    /// The next older committed revision, if any.
    pub fn older(self) -> Option<Revision> {
        if self.is_working_copy() {
            None
        } else {
            self.0.checked_sub(1).map(Revision)
        }
    }
}

impl From<u32> for Revision {
    fn from(revision: u32) -> Self {
        Self(revision)
    }
}

impl fmt::Debug for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_working_copy() {
            f.write_str("wdir")
        } else {
            self.0.fmt(f)
        }
    }
}

/// First and second parent of a revision. A missing parent is `None`.
pub type ParentPair = [Option<Revision>; 2];

/// The relation an edge draws. The declaration order is the importance order:
/// a `Parent` edge outranks a `Family` edge, which outranks an `Obsolete` one.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    Parent,
    Family,
    Obsolete,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_working_copy_sorts_newest() {
        let mut revisions = vec![Revision(3), Revision::WORKING_COPY, Revision(7)];
        revisions.sort_by(|a, b| b.cmp(a));
        assert_eq!(
            revisions,
            vec![Revision::WORKING_COPY, Revision(7), Revision(3)]
        );
        assert_eq!(Revision::WORKING_COPY.older(), None);
        assert_eq!(Revision(0).older(), None);
        assert_eq!(Revision(5).older(), Some(Revision(4)));
        assert_eq!(Revision::WORKING_COPY.to_string(), "wdir");
    }

    #[test]
    fn test_link_type_importance_order() {
        assert!(LinkType::Parent < LinkType::Family);
        assert!(LinkType::Family < LinkType::Obsolete);
    }
}
