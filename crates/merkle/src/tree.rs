//! Sparse Merkle tree implementation

use std::collections::{BTreeMap, HashMap};

use crate::{
    error::MerkleError, hasher::Keccak256Hasher, node::Node, proof::MerkleProof, Hash,
    MAX_TREE_DEPTH, ZERO_HASH,
};

/// Default (empty subtree) digests for levels `0..=depth`.
///
/// `D[0]` is the hash of an all-zero leaf, every level above hashes two copies of the one below.
pub fn default_nodes(depth: usize) -> Vec<Hash> {
    let mut nodes = Vec::with_capacity(depth + 1);
    nodes.push(Keccak256Hasher::hash(&ZERO_HASH));
    for level in 1..=depth {
        let below = nodes[level - 1];
        nodes.push(Keccak256Hasher::hash_pair(&below, &below));
    }
    nodes
}

/// Fixed-depth sparse Merkle tree, built once and read-only afterwards
#[derive(Clone, Debug)]
pub struct MerkleTree {
    depth: usize,
    /// Present nodes per level, leaves first. Empty when no leaves were supplied.
    levels: Vec<HashMap<u64, Hash>>,
    default_nodes: Vec<Hash>,
    root: Hash,
}

impl MerkleTree {
    /// Build a tree of `depth` levels over a leaf-index -> digest mapping
    pub fn new(depth: usize, leaves: BTreeMap<u64, Hash>) -> Result<Self, MerkleError> {
        if depth > MAX_TREE_DEPTH {
            return Err(MerkleError::DepthTooLarge { depth, max: MAX_TREE_DEPTH });
        }
        if let Some((&index, _)) = leaves.iter().next_back() {
            if index >> depth != 0 {
                return Err(MerkleError::LeafIndexOutOfRange { index, depth });
            }
        }

        let default_nodes = default_nodes(depth);

        if leaves.is_empty() {
            return Ok(Self {
                depth,
                levels: Vec::new(),
                root: default_nodes[depth],
                default_nodes,
            });
        }

        let mut levels: Vec<HashMap<u64, Hash>> = Vec::with_capacity(depth + 1);
        levels.push(leaves.into_iter().collect());

        for level in 0..depth {
            let current = &levels[level];
            let default = &default_nodes[level];
            let mut next = HashMap::with_capacity(current.len() / 2 + 1);

            for (&index, value) in current {
                let parent = index >> 1;
                if index & 1 == 0 {
                    let sibling = current.get(&(index | 1)).unwrap_or(default);
                    next.insert(parent, Keccak256Hasher::hash_pair(value, sibling));
                } else if !current.contains_key(&(index ^ 1)) {
                    // Left sibling was never populated, otherwise it already wrote the parent
                    next.insert(parent, Keccak256Hasher::hash_pair(default, value));
                }
            }
            levels.push(next);
        }

        let root = levels[depth].get(&0).copied().unwrap_or(default_nodes[depth]);

        Ok(Self { depth, levels, default_nodes, root })
    }

    /// Build a tree over dense leaves `0..leaves.len()`
    pub fn from_leaves(depth: usize, leaves: &[Hash]) -> Result<Self, MerkleError> {
        let mapping = leaves
            .iter()
            .enumerate()
            .map(|(index, leaf)| (index as u64, *leaf))
            .collect();
        Self::new(depth, mapping)
    }

    pub const fn depth(&self) -> usize {
        self.depth
    }

    pub const fn root(&self) -> Hash {
        self.root
    }

    pub fn default_nodes(&self) -> &[Hash] {
        &self.default_nodes
    }

    /// Number of populated leaves
    pub fn len(&self) -> usize {
        self.levels.first().map_or(0, HashMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Leaf digest at `index`, or the default leaf if it was never populated
    pub fn leaf(&self, index: u64) -> Hash {
        self.node_at(0, index)
    }

    /// Children of the node at `(parent_level, parent_index)`, levels counted from the root.
    ///
    /// The returned pair lives at tree level `depth - parent_level - 1` (leaves are level 0).
    pub fn get_node_by_parent(
        &self,
        parent_level: usize,
        parent_index: u64,
    ) -> Result<Node, MerkleError> {
        if parent_level >= self.depth {
            return Err(MerkleError::ParentLevelOutOfRange { parent_level, depth: self.depth });
        }
        if parent_index > 1u64 << parent_level {
            return Err(MerkleError::ParentIndexOutOfRange { parent_index, parent_level });
        }

        let child_level = self.depth - parent_level - 1;
        let left_index = parent_index << 1;

        Ok(Node {
            left: self.node_at(child_level, left_index),
            right: self.node_at(child_level, left_index + 1),
        })
    }

    /// Sibling digests from leaf to root for the leaf at `index`
    pub fn create_merkle_proof(&self, index: u64) -> Result<Vec<Hash>, MerkleError> {
        self.check_leaf_index(index)?;

        let mut index = index;
        let mut siblings = Vec::with_capacity(self.depth);
        for level in 0..self.depth {
            siblings.push(self.node_at(level, index ^ 1));
            index >>= 1;
        }
        Ok(siblings)
    }

    /// Full inclusion proof for the leaf at `index`
    pub fn create_proof_for(&self, index: u64) -> Result<MerkleProof, MerkleError> {
        Ok(MerkleProof {
            leaf: self.leaf(index),
            data: self.create_merkle_proof(index)?,
            path: index,
        })
    }

    fn check_leaf_index(&self, index: u64) -> Result<(), MerkleError> {
        if index >> self.depth != 0 {
            return Err(MerkleError::LeafIndexOutOfRange { index, depth: self.depth });
        }
        Ok(())
    }

    /// Node at `(level, index)` counted from the leaves; absent nodes are the level default
    fn node_at(&self, level: usize, index: u64) -> Hash {
        self.levels
            .get(level)
            .and_then(|nodes| nodes.get(&index))
            .copied()
            .unwrap_or(self.default_nodes[level])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn leaf(i: u8) -> Hash {
        Keccak256Hasher::hash(&[i])
    }

    fn h(left: &Hash, right: &Hash) -> Hash {
        Keccak256Hasher::hash_pair(left, right)
    }

    #[test]
    fn test_default_leaf_is_hash_of_zero_word() {
        let defaults = default_nodes(2);
        assert_eq!(
            hex::encode(defaults[0]),
            "290decd9548b62a8d60345a988386fc84ba6bc95484008f6362f93160ef3e563"
        );
        assert_eq!(defaults[1], h(&defaults[0], &defaults[0]));
        assert_eq!(defaults[2], h(&defaults[1], &defaults[1]));
    }

    #[test]
    fn test_four_leaf_tree() {
        let leaves = [leaf(0), leaf(1), leaf(2), leaf(3)];
        let tree = MerkleTree::from_leaves(2, &leaves).unwrap();

        let left = h(&leaves[0], &leaves[1]);
        let right = h(&leaves[2], &leaves[3]);
        assert_eq!(tree.root(), h(&left, &right));

        assert_eq!(tree.get_node_by_parent(0, 0).unwrap(), Node::new(left, right));
        assert_eq!(tree.get_node_by_parent(1, 0).unwrap(), Node::new(leaves[0], leaves[1]));
        assert_eq!(tree.get_node_by_parent(1, 1).unwrap(), Node::new(leaves[2], leaves[3]));
        assert_eq!(tree.create_merkle_proof(0).unwrap(), vec![leaves[1], right]);
    }

    #[test]
    fn test_missing_siblings_use_defaults() {
        let leaves = [leaf(0), leaf(1), leaf(2)];
        let tree = MerkleTree::from_leaves(3, &leaves).unwrap();
        let d = tree.default_nodes().to_vec();

        let n01 = h(&leaves[0], &leaves[1]);
        let n23 = h(&leaves[2], &d[0]);
        let n0 = h(&n01, &n23);
        assert_eq!(tree.root(), h(&n0, &d[2]));

        // odd leaf with no left neighbour
        let mut sparse = BTreeMap::new();
        sparse.insert(1u64, leaf(9));
        let tree = MerkleTree::new(1, sparse).unwrap();
        assert_eq!(tree.root(), h(&d[0], &leaf(9)));
    }

    #[test]
    fn test_empty_tree_uses_defaults_only() {
        let tree = MerkleTree::from_leaves(5, &[]).unwrap();
        let d = tree.default_nodes().to_vec();

        assert!(tree.is_empty());
        assert_eq!(tree.root(), d[5]);
        assert_eq!(tree.get_node_by_parent(0, 0).unwrap(), Node::new(d[4], d[4]));
        assert_eq!(tree.get_node_by_parent(4, 3).unwrap(), Node::new(d[0], d[0]));

        for index in [0u64, 7, 31] {
            let proof = tree.create_proof_for(index).unwrap();
            assert_eq!(proof.data, d[..5].to_vec());
            assert!(proof.verify(&tree.root()));
        }
    }

    #[test]
    fn test_every_proof_verifies() {
        let leaves: Vec<Hash> = (0..11).map(leaf).collect();
        let tree = MerkleTree::from_leaves(4, &leaves).unwrap();

        for (index, expected) in leaves.iter().enumerate() {
            let proof = tree.create_proof_for(index as u64).unwrap();
            assert_eq!(proof.leaf, *expected);
            assert_eq!(proof.data.len(), 4);
            assert!(proof.verify(&tree.root()), "proof for leaf {index} must verify");
        }
        // padding leaves past the trace are provable as default leaves
        let padding = tree.create_proof_for(15).unwrap();
        assert_eq!(padding.leaf, tree.default_nodes()[0]);
        assert!(padding.verify(&tree.root()));
    }

    #[test]
    fn test_node_parent_consistency() {
        let leaves: Vec<Hash> = (0..13).map(leaf).collect();
        let tree = MerkleTree::from_leaves(4, &leaves).unwrap();

        for level in 1..4usize {
            for index in 0..(1u64 << level) {
                let node = tree.get_node_by_parent(level, index).unwrap();
                let parent = tree.get_node_by_parent(level - 1, index >> 1).unwrap();
                assert_eq!(node.hash(), parent.child(index & 1 == 1));
            }
        }
        assert_eq!(tree.get_node_by_parent(0, 0).unwrap().hash(), tree.root());
    }

    #[test]
    fn test_node_children_are_provable() {
        let leaves: Vec<Hash> = (0..8).map(leaf).collect();
        let tree = MerkleTree::from_leaves(3, &leaves).unwrap();

        // bottom level nodes are leaf pairs: each child verifies on its own
        for index in 0..4u64 {
            let node = tree.get_node_by_parent(2, index).unwrap();
            let left = tree.create_proof_for(index << 1).unwrap();
            let right = tree.create_proof_for((index << 1) + 1).unwrap();
            assert_eq!(left.leaf, node.left);
            assert_eq!(right.leaf, node.right);
            assert!(left.verify(&tree.root()) && right.verify(&tree.root()));
        }
    }

    #[test]
    fn test_query_range_errors() {
        let tree = MerkleTree::from_leaves(3, &[leaf(0)]).unwrap();

        assert_eq!(
            tree.get_node_by_parent(3, 0),
            Err(MerkleError::ParentLevelOutOfRange { parent_level: 3, depth: 3 })
        );
        assert_eq!(
            tree.get_node_by_parent(1, 3),
            Err(MerkleError::ParentIndexOutOfRange { parent_index: 3, parent_level: 1 })
        );
        assert!(tree.get_node_by_parent(1, 2).is_ok());
        assert_eq!(
            tree.create_merkle_proof(8),
            Err(MerkleError::LeafIndexOutOfRange { index: 8, depth: 3 })
        );
    }

    #[test]
    fn test_construction_errors() {
        assert_eq!(
            MerkleTree::from_leaves(64, &[]).unwrap_err(),
            MerkleError::DepthTooLarge { depth: 64, max: MAX_TREE_DEPTH }
        );
        let leaves: Vec<Hash> = (0..5).map(leaf).collect();
        assert_eq!(
            MerkleTree::from_leaves(2, &leaves).unwrap_err(),
            MerkleError::LeafIndexOutOfRange { index: 4, depth: 2 }
        );
    }

    #[test]
    fn test_deep_tree_indices() {
        let tree = MerkleTree::from_leaves(MAX_TREE_DEPTH, &[leaf(0), leaf(1)]).unwrap();
        let last_parent = 1u64 << (MAX_TREE_DEPTH - 1);

        let node = tree.get_node_by_parent(MAX_TREE_DEPTH - 1, last_parent).unwrap();
        assert_eq!(node, Node::new(tree.default_nodes()[0], tree.default_nodes()[0]));

        let proof = tree.create_proof_for(1).unwrap();
        assert_eq!(proof.data.len(), MAX_TREE_DEPTH);
        assert!(proof.verify(&tree.root()));
    }

    #[test]
    fn test_single_divergence_changes_one_path() {
        let mut rng = rand::thread_rng();
        let leaves: Vec<Hash> = (0..20).map(leaf).collect();
        let tree = MerkleTree::from_leaves(5, &leaves).unwrap();

        let k = rng.gen_range(0..leaves.len());
        let mut other = leaves.clone();
        other[k] = leaf(200);
        let other_tree = MerkleTree::from_leaves(5, &other).unwrap();

        assert_ne!(tree.root(), other_tree.root());
        for index in (0..leaves.len()).filter(|i| *i != k) {
            let proof = other_tree.create_proof_for(index as u64).unwrap();
            assert_eq!(proof.leaf, leaves[index]);
            assert!(proof.verify(&other_tree.root()));
            assert!(!proof.verify(&tree.root()));
        }
    }
}
