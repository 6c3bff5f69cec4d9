use thiserror::Error;

/// Errors raised by tree construction and queries.
///
/// All of them are caller mistakes detectable before any machine call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MerkleError {
    #[error("tree depth {depth} exceeds the maximum of {max}")]
    DepthTooLarge { depth: usize, max: usize },

    #[error("leaf index {index} does not fit in a tree of depth {depth}")]
    LeafIndexOutOfRange { index: u64, depth: usize },

    #[error("parentLevel {parent_level} must be below the tree depth {depth}")]
    ParentLevelOutOfRange { parent_level: usize, depth: usize },

    #[error("parentIndex {parent_index} couldn't be in level {parent_level} of the tree")]
    ParentIndexOutOfRange { parent_index: u64, parent_level: usize },
}
