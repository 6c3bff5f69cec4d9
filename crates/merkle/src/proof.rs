//! Merkle inclusion proof generation and verification

use serde::{Deserialize, Serialize};

use crate::{hasher::Keccak256Hasher, Hash};

/// Inclusion proof for one leaf
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    /// The leaf digest being proven
    pub leaf: Hash,
    /// Sibling hashes from leaf to root (`depth` elements)
    pub data: Vec<Hash>,
    /// Leaf index; bit `i` tells whether the running hash is the right child at level `i`
    pub path: u64,
}

impl MerkleProof {
    /// Verify this proof against a root hash
    pub fn verify(&self, root: &Hash) -> bool {
        if self.data.len() < u64::BITS as usize && self.path >> self.data.len() != 0 {
            return false;
        }
        self.compute_root() == *root
    }

    /// Compute root from proof
    pub fn compute_root(&self) -> Hash {
        let mut current_hash = self.leaf;

        for (level, sibling) in self.data.iter().enumerate() {
            let is_right = level < u64::BITS as usize && (self.path >> level) & 1 == 1;

            current_hash = if is_right {
                Keccak256Hasher::hash_pair(sibling, &current_hash)
            } else {
                Keccak256Hasher::hash_pair(&current_hash, sibling)
            };
        }

        current_hash
    }
}
