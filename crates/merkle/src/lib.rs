//! Fixed-depth sparse Merkle tree over an execution trace.
//!
//! Leaves are addressed by their step index. Every position that was never
//! populated resolves to a precomputed default node for its level, so a tree
//! over a handful of states still behaves like a full `2^depth` tree:
//! - Default nodes: `D[0] = H(0^32)`, `D[k] = H(D[k-1] || D[k-1])`
//! - Node lookup by parent coordinates, counted from the root
//! - Inclusion proofs with an LSB-first bit path

mod error;
mod hasher;
mod node;
mod proof;
mod tree;

pub use error::MerkleError;
pub use hasher::Keccak256Hasher;
pub use node::Node;
pub use proof::MerkleProof;
pub use tree::{default_nodes, MerkleTree};

/// 32-byte digest
pub type Hash = [u8; 32];

/// All-zero digest, the value of an unset field
pub const ZERO_HASH: Hash = [0u8; 32];

/// Deepest supported tree.
///
/// With this bound the child index `2 * i + 1` of the deepest parent still fits in a `u64`.
pub const MAX_TREE_DEPTH: usize = 63;
