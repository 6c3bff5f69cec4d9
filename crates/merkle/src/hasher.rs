//! Keccak256 hasher for the state tree

use tiny_keccak::{Hasher, Keccak};

use crate::{Hash, ZERO_HASH};

/// Keccak256 over the concatenation of its inputs
#[derive(Debug, Clone, Copy)]
pub struct Keccak256Hasher;

impl Keccak256Hasher {
    /// Interior node digest: `keccak(left ++ right)`
    pub fn hash_pair(left: &Hash, right: &Hash) -> Hash {
        Self::digest(&[left.as_slice(), right.as_slice()])
    }

    /// Leaf digest of an arbitrary encoding
    pub fn hash(data: &[u8]) -> Hash {
        Self::digest(&[data])
    }

    fn digest(parts: &[&[u8]]) -> Hash {
        let mut keccak = Keccak::v256();
        for part in parts {
            keccak.update(part);
        }
        let mut out = ZERO_HASH;
        keccak.finalize(&mut out);
        out
    }
}
