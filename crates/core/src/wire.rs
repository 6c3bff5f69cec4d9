//! Positional wire shapes exchanged with the dispute verifier.
//!
//! Digests travel as `0x`-prefixed 32-byte hex strings, nodes as `[left, right]`,
//! proofs as `[leaf, [data...], path]`. No named fields on the wire.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::types::{Hash, MerkleProof, Node};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("digest must be 0x-prefixed: {0}")]
    MissingPrefix(String),

    #[error("digest must be 32 bytes, got {0}")]
    InvalidLength(usize),

    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("abi payload too short: need {needed} bytes, got {actual}")]
    Truncated { needed: usize, actual: usize },

    #[error("abi word does not fit in u64")]
    WordOverflow,
}

pub fn encode_hash(hash: &Hash) -> String {
    format!("0x{}", hex::encode(hash))
}

pub fn decode_hash(value: &str) -> Result<Hash, WireError> {
    let digits = value
        .strip_prefix("0x")
        .ok_or_else(|| WireError::MissingPrefix(value.to_string()))?;
    let bytes = hex::decode(digits).map_err(|e| WireError::InvalidHex(e.to_string()))?;
    bytes.as_slice().try_into().map_err(|_| WireError::InvalidLength(bytes.len()))
}

/// `[left, right]`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireNode(pub String, pub String);

impl From<&Node> for WireNode {
    fn from(node: &Node) -> Self {
        Self(encode_hash(&node.left), encode_hash(&node.right))
    }
}

impl TryFrom<&WireNode> for Node {
    type Error = WireError;

    fn try_from(wire: &WireNode) -> Result<Self, Self::Error> {
        Ok(Self { left: decode_hash(&wire.0)?, right: decode_hash(&wire.1)? })
    }
}

/// Leaf index on the wire.
///
/// Written as a JSON integer; read back from an integer, a decimal string or a
/// `0x` hex quantity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WirePath(pub u64);

impl Serialize for WirePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.0)
    }
}

impl<'de> Deserialize<'de> for WirePath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawPath {
            Number(u64),
            Text(String),
        }

        match RawPath::deserialize(deserializer)? {
            RawPath::Number(value) => Ok(Self(value)),
            RawPath::Text(text) => parse_quantity(&text).map(Self).map_err(serde::de::Error::custom),
        }
    }
}

fn parse_quantity(text: &str) -> Result<u64, WireError> {
    let parsed = match text.strip_prefix("0x") {
        Some("") => return Err(WireError::InvalidPath(text.to_string())),
        Some(digits) => u64::from_str_radix(digits, 16),
        None => text.parse(),
    };
    parsed.map_err(|_| WireError::InvalidPath(text.to_string()))
}

/// `[leaf, [data...], path]`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireProof(pub String, pub Vec<String>, pub WirePath);

impl From<&MerkleProof> for WireProof {
    fn from(proof: &MerkleProof) -> Self {
        Self(
            encode_hash(&proof.leaf),
            proof.data.iter().map(encode_hash).collect(),
            WirePath(proof.path),
        )
    }
}

impl TryFrom<&WireProof> for MerkleProof {
    type Error = WireError;

    fn try_from(wire: &WireProof) -> Result<Self, Self::Error> {
        Ok(Self {
            leaf: decode_hash(&wire.0)?,
            data: wire.1.iter().map(|d| decode_hash(d)).collect::<Result<_, _>>()?,
            path: wire.2 .0,
        })
    }
}

/// 32-byte ABI words
pub mod abi {
    use super::WireError;
    use crate::types::{Hash, MerkleProof, Node};

    const WORD: usize = 32;

    /// `uint256` word holding `value` big-endian
    pub fn u64_word(value: u64) -> [u8; 32] {
        let mut word = [0u8; 32];
        word[24..].copy_from_slice(&value.to_be_bytes());
        word
    }

    pub fn word_to_u64(word: &[u8]) -> Result<u64, WireError> {
        if word.len() != WORD {
            return Err(WireError::Truncated { needed: WORD, actual: word.len() });
        }
        if word[..24].iter().any(|b| *b != 0) {
            return Err(WireError::WordOverflow);
        }
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&word[24..]);
        Ok(u64::from_be_bytes(bytes))
    }

    /// `(bytes32 left, bytes32 right)`
    pub fn encode_node(node: &Node) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 * WORD);
        out.extend_from_slice(&node.left);
        out.extend_from_slice(&node.right);
        out
    }

    pub fn decode_node(bytes: &[u8]) -> Result<Node, WireError> {
        let left = read_hash(bytes, 0)?;
        let right = read_hash(bytes, WORD)?;
        Ok(Node { left, right })
    }

    /// `(bytes32 leaf, bytes32[] data, uint256 path)` head/tail layout
    pub fn encode_proof(proof: &MerkleProof) -> Vec<u8> {
        let mut out = Vec::with_capacity((4 + proof.data.len()) * WORD);
        out.extend_from_slice(&proof.leaf);
        out.extend_from_slice(&u64_word(3 * WORD as u64));
        out.extend_from_slice(&u64_word(proof.path));
        out.extend_from_slice(&u64_word(proof.data.len() as u64));
        for sibling in &proof.data {
            out.extend_from_slice(sibling);
        }
        out
    }

    pub fn decode_proof(bytes: &[u8]) -> Result<MerkleProof, WireError> {
        let leaf = read_hash(bytes, 0)?;
        let offset = read_usize(bytes, WORD)?;
        let path = word_to_u64(slice(bytes, 2 * WORD, WORD)?)?;
        let len = read_usize(bytes, offset)?;

        let data = (0..len)
            .map(|i| read_hash(bytes, offset + WORD + i * WORD))
            .collect::<Result<_, _>>()?;

        Ok(MerkleProof { leaf, data, path })
    }

    fn slice(bytes: &[u8], start: usize, len: usize) -> Result<&[u8], WireError> {
        let end = start.checked_add(len).ok_or(WireError::WordOverflow)?;
        bytes
            .get(start..end)
            .ok_or(WireError::Truncated { needed: end, actual: bytes.len() })
    }

    fn read_hash(bytes: &[u8], start: usize) -> Result<Hash, WireError> {
        let mut hash = [0u8; 32];
        hash.copy_from_slice(slice(bytes, start, WORD)?);
        Ok(hash)
    }

    fn read_usize(bytes: &[u8], start: usize) -> Result<usize, WireError> {
        let value = word_to_u64(slice(bytes, start, WORD)?)?;
        usize::try_from(value).map_err(|_| WireError::WordOverflow)
    }
}
