//! Common types

pub use emo_merkle::{Hash, MerkleProof, Node, ZERO_HASH};

/// Index of a state in a trace, also its leaf index in the state tree
pub type StepIndex = u64;

/// Opaque identifier of a dispute participant
pub type PartyId = String;
