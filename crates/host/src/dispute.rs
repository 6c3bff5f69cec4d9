//! Dispute records kept by the referee

use std::fmt;

use emo_core::{Hash, Node, PartyId, WireNode, WireProof, ZERO_HASH};
use serde::{Deserialize, Serialize};

use crate::bisection::Bisection;

/// Lifecycle of a dispute. Discriminants match the on-chain enum.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum DisputeState {
    #[default]
    DoesNotExist = 0,
    Opened = 1,
    ProsecutorTurn = 2,
    DefendantTurn = 3,
    Bottom = 4,
}

/// Side of a dispute
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Party {
    Defendant,
    Prosecutor,
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Defendant => f.write_str("defendant"),
            Self::Prosecutor => f.write_str("prosecutor"),
        }
    }
}

/// A registered claim: the defendant's commitment root maps to one of these
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub initial_state_hash: Hash,
    pub image_hash: Hash,
    pub claim_time: u64,
    /// Seconds each party has to act
    pub timeout: u64,
}

/// Per-dispute state, keyed by the prosecutor root.
///
/// A removed dispute reads back as `Dispute::default()`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dispute {
    pub defendant_root: Hash,
    pub prosecutor_root: Hash,
    pub prosecutor: PartyId,
    pub last_action_timestamp: u64,
    /// Leaf index of the defendant's terminal state
    pub number_of_steps: u64,
    #[serde(flatten)]
    pub bisection: Bisection,
    pub first_divergent_state_hash: Hash,
    pub defendant_node: Node,
    pub prosecutor_node: Node,
    pub state: DisputeState,
}

impl Dispute {
    pub(crate) fn open(defendant_root: Hash, prosecutor_node: Node, prosecutor: PartyId, now: u64) -> Self {
        Self {
            defendant_root,
            prosecutor_root: prosecutor_node.hash(),
            prosecutor,
            last_action_timestamp: now,
            number_of_steps: 0,
            bisection: Bisection::new(),
            first_divergent_state_hash: ZERO_HASH,
            defendant_node: Node::zero(),
            prosecutor_node,
            state: DisputeState::Opened,
        }
    }

    pub const fn disagreement_point(&self) -> u64 {
        self.bisection.disagreement_point
    }

    pub const fn depth(&self) -> usize {
        self.bisection.depth
    }

    pub const fn go_right(&self) -> bool {
        self.bisection.go_right
    }
}

/// How a simulated dispute ended
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeOutcome {
    pub prosecutor_root: Hash,
    pub winner: Party,
    /// Leaf index the bisection converged on, `None` if it never got there
    pub bottom: Option<u64>,
    /// Completed prosecutor/defendant exchanges after the reveal
    pub rounds: usize,
    /// Every referee call in the order it was made, accepted or not
    pub moves: Vec<Move>,
}

/// A referee call as it would go over the wire
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "move", rename_all = "snake_case")]
pub enum Move {
    Claim { at: u64, root: String },
    NewDispute { at: u64, node: WireNode },
    Reveal { at: u64, node: WireNode, proof_left: WireProof, proof_right: WireProof },
    ProsecutorRespond { at: u64, node: WireNode },
    DefendantRespond { at: u64, node: WireNode },
    RevealBottom { at: u64, proof: Option<WireProof> },
    Timeout { at: u64, winner: Party },
    ResolveClaim { at: u64 },
}
