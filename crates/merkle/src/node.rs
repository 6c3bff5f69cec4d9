//! Two children of a tree position

use serde::{Deserialize, Serialize};

use crate::{hasher::Keccak256Hasher, Hash, ZERO_HASH};

/// `{left, right}` children of one tree position.
///
/// This is the move a party submits in every bisection round.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Node {
    pub left: Hash,
    pub right: Hash,
}

impl Node {
    pub const fn new(left: Hash, right: Hash) -> Self {
        Self { left, right }
    }

    /// The all-zero node an untouched dispute field holds
    pub const fn zero() -> Self {
        Self { left: ZERO_HASH, right: ZERO_HASH }
    }

    /// Parent digest `H(left || right)`
    pub fn hash(&self) -> Hash {
        Keccak256Hasher::hash_pair(&self.left, &self.right)
    }

    /// Child selected by a bisection direction
    pub const fn child(&self, go_right: bool) -> Hash {
        if go_right {
            self.right
        } else {
            self.left
        }
    }
}
