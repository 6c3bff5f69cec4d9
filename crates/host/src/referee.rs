//! In-process referee mirroring the dispute contract.
//!
//! Claims are registered under the defendant's commitment root and disputes
//! under the prosecutor root `H(prosecutor_node)`. Every call takes the current
//! time from the caller; nothing here owns a timer.

use std::collections::HashMap;
use std::sync::Arc;

use emo_core::{Hash, Machine, MachineError, MerkleProof, Node, PartyId};
use emo_merkle::default_nodes;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::dispute::{Claim, Dispute, DisputeState, Party};

/// Rejections, worded like the contract's revert reasons
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DisputeError {
    #[error("Claim already exists.")]
    ClaimAlreadyExists,

    #[error("Claim does not exist.")]
    ClaimDoesNotExist,

    #[error("Dispute already exists.")]
    DisputeAlreadyExists,

    #[error("Dispute does not exist.")]
    DisputeDoesNotExist,

    #[error("There is not enough time left for a dispute.")]
    NotEnoughTime,

    #[error("Dispute is in state {actual:?}, expected {expected:?}.")]
    WrongState { expected: DisputeState, actual: DisputeState },

    #[error("Defendant node does not match defendant root.")]
    DefendantRootMismatch,

    #[error("Left proof must start at leaf 0.")]
    LeftPathNotZero,

    #[error("Left leaf does not match initial state hash.")]
    LeftLeafMismatch,

    #[error("Left proof does not match defendant root.")]
    InvalidLeftProof,

    #[error("Right proof does not match defendant root.")]
    InvalidRightProof,

    #[error("The revealed final state does not match the right leaf.")]
    FinalStateMismatch,

    #[error("The revealed final state does not produce the image hash submitted in the claim.")]
    ImageHashMismatch,

    #[error("The {0} node does not match the previous commitment.")]
    NodeMismatch(Party),

    #[error("Divergent state hash does not match the expected leaf.")]
    DivergentHashMismatch,

    #[error("A predecessor state and proof are required at leaf {disagreement_point}.")]
    MissingPredecessor { disagreement_point: u64 },

    #[error("Proof path must be {expected}, got {actual}.")]
    BottomPathMismatch { expected: u64, actual: u64 },

    #[error("Bottom proof does not match defendant root.")]
    InvalidBottomProof,

    #[error("Revealed state does not match the proven leaf.")]
    PredecessorMismatch,

    #[error("Next computed state is not the one committed to.")]
    NextStateMismatch,

    #[error("Too early to resolve.")]
    TooEarly,

    #[error("Claim has {0} open dispute(s).")]
    DisputesPending(usize),

    #[error("Proof must have {expected} siblings, got {actual}.")]
    ProofDepthMismatch { expected: usize, actual: usize },

    #[error(transparent)]
    Machine(#[from] MachineError),
}

/// Claim and dispute book for one machine and tree depth
pub struct Referee<M: Machine> {
    machine: Arc<M>,
    max_tree_depth: usize,
    /// Hash of an empty leaf, committed past the end of every trace
    empty_leaf: Hash,
    claims: HashMap<Hash, Claim>,
    disputes: HashMap<Hash, Dispute>,
}

impl<M: Machine> std::fmt::Debug for Referee<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Referee")
            .field("max_tree_depth", &self.max_tree_depth)
            .field("claims", &self.claims.len())
            .field("disputes", &self.disputes.len())
            .finish_non_exhaustive()
    }
}

impl<M: Machine> Referee<M> {
    pub fn new(machine: Arc<M>, max_tree_depth: usize) -> Self {
        Self {
            machine,
            max_tree_depth,
            empty_leaf: default_nodes(0)[0],
            claims: HashMap::new(),
            disputes: HashMap::new(),
        }
    }

    pub const fn max_tree_depth(&self) -> usize {
        self.max_tree_depth
    }

    pub fn claim(&self, commitment_root: &Hash) -> Option<&Claim> {
        self.claims.get(commitment_root)
    }

    /// Current record, or the zeroed `DoesNotExist` record once removed
    pub fn dispute(&self, prosecutor_root: &Hash) -> Dispute {
        self.disputes.get(prosecutor_root).cloned().unwrap_or_default()
    }

    pub fn make_claim(
        &mut self,
        commitment_root: Hash,
        initial_state_hash: Hash,
        image_hash: Hash,
        now: u64,
        timeout: u64,
    ) -> Result<(), DisputeError> {
        if self.claims.contains_key(&commitment_root) {
            return Err(DisputeError::ClaimAlreadyExists);
        }
        self.claims.insert(
            commitment_root,
            Claim { initial_state_hash, image_hash, claim_time: now, timeout },
        );
        info!(root = %hex::encode(commitment_root), timeout, "claim registered");
        Ok(())
    }

    /// Open a dispute against `defendant_root`; returns the prosecutor root
    pub fn new_dispute(
        &mut self,
        defendant_root: Hash,
        prosecutor_node: Node,
        prosecutor: PartyId,
        now: u64,
    ) -> Result<Hash, DisputeError> {
        let claim = self.claims.get(&defendant_root).ok_or(DisputeError::ClaimDoesNotExist)?;
        let prosecutor_root = prosecutor_node.hash();
        if self.disputes.contains_key(&prosecutor_root) {
            return Err(DisputeError::DisputeAlreadyExists);
        }
        if now >= claim.claim_time.saturating_add(claim.timeout) {
            return Err(DisputeError::NotEnoughTime);
        }

        self.disputes.insert(
            prosecutor_root,
            Dispute::open(defendant_root, prosecutor_node, prosecutor, now),
        );
        info!(
            defendant_root = %hex::encode(defendant_root),
            prosecutor_root = %hex::encode(prosecutor_root),
            "dispute opened"
        );
        Ok(prosecutor_root)
    }

    /// Defendant's first move: its top node plus proofs of the first and last leaf
    pub async fn reveal(
        &mut self,
        prosecutor_root: &Hash,
        defendant_node: Node,
        proof_left: &MerkleProof,
        proof_right: &MerkleProof,
        final_state: &M::State,
        now: u64,
    ) -> Result<DisputeState, DisputeError> {
        let (dispute, claim) = self.dispute_with_claim(prosecutor_root, DisputeState::Opened)?;
        let defendant_root = dispute.defendant_root;
        let initial_state_hash = claim.initial_state_hash;
        let image_hash = claim.image_hash;

        if defendant_node.hash() != defendant_root {
            return Err(DisputeError::DefendantRootMismatch);
        }
        check_depth(proof_left, self.max_tree_depth)?;
        check_depth(proof_right, self.max_tree_depth)?;
        if proof_left.path != 0 {
            return Err(DisputeError::LeftPathNotZero);
        }
        if proof_left.leaf != initial_state_hash {
            return Err(DisputeError::LeftLeafMismatch);
        }
        if !proof_left.verify(&defendant_root) {
            return Err(DisputeError::InvalidLeftProof);
        }
        if !proof_right.verify(&defendant_root) {
            return Err(DisputeError::InvalidRightProof);
        }
        if self.machine.state_hash(final_state).await? != proof_right.leaf {
            return Err(DisputeError::FinalStateMismatch);
        }
        let image = self.machine.project(final_state).await?;
        if self.machine.image_hash(&image).await? != image_hash {
            return Err(DisputeError::ImageHashMismatch);
        }

        let max_tree_depth = self.max_tree_depth;
        let dispute = self.dispute_mut(prosecutor_root)?;
        dispute.number_of_steps = proof_right.path;
        dispute.defendant_node = defendant_node;
        dispute.last_action_timestamp = now;
        let prosecutor_node = dispute.prosecutor_node;
        descend(dispute, &prosecutor_node, &defendant_node, max_tree_depth);

        info!(
            number_of_steps = dispute.number_of_steps,
            depth = dispute.depth(),
            disagreement_point = dispute.disagreement_point(),
            "defendant revealed"
        );
        Ok(dispute.state)
    }

    pub fn prosecutor_respond(
        &mut self,
        prosecutor_root: &Hash,
        node: Node,
        now: u64,
    ) -> Result<DisputeState, DisputeError> {
        let dispute = self.dispute_in(prosecutor_root, DisputeState::ProsecutorTurn)?;
        if node.hash() != dispute.bisection.chosen_child(&dispute.prosecutor_node) {
            return Err(DisputeError::NodeMismatch(Party::Prosecutor));
        }

        dispute.prosecutor_node = node;
        dispute.last_action_timestamp = now;
        dispute.state = DisputeState::DefendantTurn;
        debug!(depth = dispute.depth(), "prosecutor responded");
        Ok(dispute.state)
    }

    pub fn defendant_respond(
        &mut self,
        prosecutor_root: &Hash,
        node: Node,
        now: u64,
    ) -> Result<DisputeState, DisputeError> {
        let max_tree_depth = self.max_tree_depth;
        let dispute = self.dispute_in(prosecutor_root, DisputeState::DefendantTurn)?;
        if node.hash() != dispute.bisection.chosen_child(&dispute.defendant_node) {
            return Err(DisputeError::NodeMismatch(Party::Defendant));
        }

        dispute.defendant_node = node;
        dispute.last_action_timestamp = now;
        let prosecutor_node = dispute.prosecutor_node;
        descend(dispute, &prosecutor_node, &node, max_tree_depth);

        debug!(
            depth = dispute.depth(),
            disagreement_point = dispute.disagreement_point(),
            go_right = dispute.go_right(),
            "defendant responded"
        );
        Ok(dispute.state)
    }

    /// Final defendant move: prove that one step from the committed predecessor
    /// yields the divergent state.
    ///
    /// `predecessor` may be `None` when the disagreement is at leaf 0 or past the
    /// defendant's last step; both are settled from the record alone.
    pub async fn defendant_reveal_bottom(
        &mut self,
        prosecutor_root: &Hash,
        predecessor: Option<(&MerkleProof, &M::State)>,
        now: u64,
    ) -> Result<Party, DisputeError> {
        let (dispute, claim) = self.dispute_with_claim(prosecutor_root, DisputeState::Bottom)?;
        let point = dispute.disagreement_point();
        let divergent = dispute.first_divergent_state_hash;

        if point == 0 {
            if divergent != claim.initial_state_hash {
                return Err(DisputeError::DivergentHashMismatch);
            }
        } else if point > dispute.number_of_steps {
            if divergent != self.empty_leaf {
                return Err(DisputeError::DivergentHashMismatch);
            }
        } else {
            let (proof, state) = predecessor
                .ok_or(DisputeError::MissingPredecessor { disagreement_point: point })?;
            if proof.path != point - 1 {
                return Err(DisputeError::BottomPathMismatch { expected: point - 1, actual: proof.path });
            }
            check_depth(proof, self.max_tree_depth)?;
            if !proof.verify(&dispute.defendant_root) {
                return Err(DisputeError::InvalidBottomProof);
            }
            if self.machine.state_hash(state).await? != proof.leaf {
                return Err(DisputeError::PredecessorMismatch);
            }
            let (next, _) = self.machine.next(state).await?;
            if self.machine.state_hash(&next).await? != divergent {
                return Err(DisputeError::NextStateMismatch);
            }
        }

        self.disputes.remove(prosecutor_root);
        info!(
            prosecutor_root = %hex::encode(prosecutor_root),
            disagreement_point = point,
            at = now,
            "defendant won at bottom"
        );
        Ok(Party::Defendant)
    }

    /// Resolve a stalled dispute against the party whose move it was.
    ///
    /// A prosecutor win falsifies the claim: the claim and every other dispute
    /// against it are removed with it.
    pub fn timeout(&mut self, prosecutor_root: &Hash, now: u64) -> Result<Party, DisputeError> {
        let dispute = self.disputes.get(prosecutor_root).ok_or(DisputeError::DisputeDoesNotExist)?;
        let claim = self.claims.get(&dispute.defendant_root).ok_or(DisputeError::ClaimDoesNotExist)?;
        if now <= dispute.last_action_timestamp.saturating_add(claim.timeout) {
            return Err(DisputeError::TooEarly);
        }

        let winner = match dispute.state {
            DisputeState::ProsecutorTurn => Party::Defendant,
            _ => Party::Prosecutor,
        };
        let defendant_root = dispute.defendant_root;
        let state = dispute.state;

        self.disputes.remove(prosecutor_root);
        if winner == Party::Prosecutor {
            self.claims.remove(&defendant_root);
            let before = self.disputes.len();
            self.disputes.retain(|_, d| d.defendant_root != defendant_root);
            let dropped = before - self.disputes.len();
            if dropped > 0 {
                info!(
                    defendant_root = %hex::encode(defendant_root),
                    dropped,
                    "disputes against falsified claim dropped"
                );
            }
        }
        warn!(
            prosecutor_root = %hex::encode(prosecutor_root),
            ?state,
            %winner,
            "dispute resolved by timeout"
        );
        Ok(winner)
    }

    /// Retire a claim that survived its dispute window, returning the record
    pub fn resolve_true_claim(&mut self, commitment_root: &Hash, now: u64) -> Result<Claim, DisputeError> {
        let claim = self.claims.get(commitment_root).ok_or(DisputeError::ClaimDoesNotExist)?;
        if now < claim.claim_time.saturating_add(claim.timeout) {
            return Err(DisputeError::TooEarly);
        }
        let pending = self.disputes.values().filter(|d| d.defendant_root == *commitment_root).count();
        if pending > 0 {
            return Err(DisputeError::DisputesPending(pending));
        }

        let claim = self.claims.remove(commitment_root).ok_or(DisputeError::ClaimDoesNotExist)?;
        info!(root = %hex::encode(commitment_root), at = now, "claim resolved as true");
        Ok(claim)
    }

    fn dispute_with_claim(
        &self,
        prosecutor_root: &Hash,
        expected: DisputeState,
    ) -> Result<(&Dispute, &Claim), DisputeError> {
        let dispute = self.disputes.get(prosecutor_root).ok_or(DisputeError::DisputeDoesNotExist)?;
        check_state(dispute, expected)?;
        let claim = self.claims.get(&dispute.defendant_root).ok_or(DisputeError::ClaimDoesNotExist)?;
        Ok((dispute, claim))
    }

    fn dispute_in(&mut self, prosecutor_root: &Hash, expected: DisputeState) -> Result<&mut Dispute, DisputeError> {
        let dispute = self.dispute_mut(prosecutor_root)?;
        check_state(dispute, expected)?;
        Ok(dispute)
    }

    fn dispute_mut(&mut self, prosecutor_root: &Hash) -> Result<&mut Dispute, DisputeError> {
        self.disputes.get_mut(prosecutor_root).ok_or(DisputeError::DisputeDoesNotExist)
    }
}

fn check_depth(proof: &MerkleProof, depth: usize) -> Result<(), DisputeError> {
    if proof.data.len() != depth {
        return Err(DisputeError::ProofDepthMismatch { expected: depth, actual: proof.data.len() });
    }
    Ok(())
}

fn check_state(dispute: &Dispute, expected: DisputeState) -> Result<(), DisputeError> {
    if dispute.state != expected {
        return Err(DisputeError::WrongState { expected, actual: dispute.state });
    }
    Ok(())
}

/// Apply one bisection step and pick the next turn
fn descend(dispute: &mut Dispute, prosecutor_node: &Node, defendant_node: &Node, max_tree_depth: usize) {
    let bisection = &mut dispute.bisection;
    bisection.advance(prosecutor_node, defendant_node);

    if bisection.is_complete(max_tree_depth) {
        dispute.first_divergent_state_hash = bisection.chosen_child(defendant_node);
        dispute.state = DisputeState::Bottom;
    } else {
        dispute.state = DisputeState::ProsecutorTurn;
    }
}
