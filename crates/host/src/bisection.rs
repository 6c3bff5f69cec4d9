//! Bisection logic for dispute resolution

use emo_core::{Hash, Node};
use serde::{Deserialize, Serialize};

/// Position of a bisection game inside the commitment trees.
///
/// `depth` counts completed rounds from the root. `disagreement_point` is the
/// index of the disputed node at that depth: each round shifts it left and
/// appends the chosen direction, so after `tree_depth` rounds it is a leaf index.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bisection {
    pub depth: usize,
    pub disagreement_point: u64,
    pub go_right: bool,
}

impl Bisection {
    pub const fn new() -> Self {
        Self { depth: 0, disagreement_point: 0, go_right: false }
    }

    /// Compare both parties' nodes at the current position and descend.
    ///
    /// Equal left children mean the disagreement lies to the right.
    pub fn advance(&mut self, prosecutor: &Node, defendant: &Node) {
        self.go_right = prosecutor.left == defendant.left;
        self.disagreement_point = (self.disagreement_point << 1) | u64::from(self.go_right);
        self.depth += 1;
    }

    pub const fn is_complete(&self, tree_depth: usize) -> bool {
        self.depth >= tree_depth
    }

    /// Child of `node` selected by the last direction
    pub const fn chosen_child(&self, node: &Node) -> Hash {
        node.child(self.go_right)
    }
}
