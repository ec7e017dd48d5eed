use collections::HashMap;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Index into the renderer's palette of branch colors.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub struct BranchColor(pub usize);

/// Maps branch names to palette entries. The mapping is a pure function of the
/// name and the palette size, memoized for the lifetime of the session.
pub struct EdgeColorAssigner {
    palette_size: usize,
    colors: HashMap<String, BranchColor>,
}

impl EdgeColorAssigner {
    pub fn new(palette_size: usize) -> Self {
        Self {
            palette_size: palette_size.max(1),
            colors: HashMap::default(),
        }
    }

    pub fn palette_size(&self) -> usize {
        self.palette_size
    }

    pub fn color_for_branch(&mut self, branch: &str) -> BranchColor {
        if let Some(color) = self.colors.get(branch) {
            return *color;
        }
        let color = BranchColor((branch_hash(branch) % self.palette_size as u64) as usize);
        self.colors.insert(branch.to_string(), color);
        color
    }

    /// Number of branches resolved so far.
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }
}

fn branch_hash(branch: &str) -> u64 {
    let digest = Sha256::digest(branch.as_bytes());
    let mut bytes = [0; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_colors_are_stable_and_memoized() {
        let mut assigner = EdgeColorAssigner::new(8);
        let default = assigner.color_for_branch("default");
        let stable = assigner.color_for_branch("stable");
        assert!(default.0 < 8);
        assert!(stable.0 < 8);
        assert_eq!(assigner.len(), 2);

        assert_eq!(assigner.color_for_branch("default"), default);
        assert_eq!(assigner.len(), 2);

        // A fresh assigner agrees, since the mapping only depends on the name.
        let mut other = EdgeColorAssigner::new(8);
        assert_eq!(other.color_for_branch("stable"), stable);
    }

    #[test]
    fn test_single_color_palette() {
        assert_eq!(EdgeColorAssigner::new(0).palette_size(), 1);
        let mut assigner = EdgeColorAssigner::new(1);
        assert_eq!(assigner.palette_size(), 1);
        assert_eq!(assigner.color_for_branch("a"), BranchColor(0));
        assert_eq!(assigner.color_for_branch("b"), BranchColor(0));
    }
}
