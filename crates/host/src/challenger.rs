//! Challenger logic
//!
//! Holds the correct trace of a seed and a deliberately incorrect copy, commits
//! to both with Merkle trees and answers every query a dispute round needs from
//! either side.

use std::fmt;
use std::sync::Arc;

use emo_core::{Hash, Machine, MachineError, MerkleProof, Node, StepIndex, Trace, TraceBuilder, TraceError};
use emo_merkle::{MerkleError, MerkleTree};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChallengerError {
    #[error(transparent)]
    Machine(#[from] MachineError),

    #[error(transparent)]
    Trace(#[from] TraceError),

    #[error(transparent)]
    Merkle(#[from] MerkleError),

    #[error("trace index {index} is out of range for a trace of {len} state(s)")]
    IndexOutOfRange { index: StepIndex, len: usize },
}

/// A trace and the tree committing to it
#[derive(Debug)]
struct Commitment<S> {
    trace: Trace<S>,
    tree: MerkleTree,
}

#[derive(Debug)]
struct Commitments<S> {
    correct: Commitment<S>,
    incorrect: Commitment<S>,
}

impl<S> Commitments<S> {
    const fn select(&self, is_correct: bool) -> &Commitment<S> {
        if is_correct {
            &self.correct
        } else {
            &self.incorrect
        }
    }
}

/// Dispute driver for one seed.
///
/// Traces and trees are built on the first query and read-only afterwards, so
/// one `Arc<Challenger>` can serve several disputes at once.
pub struct Challenger<M: Machine> {
    machine: Arc<M>,
    seed: M::Seed,
    tree_depth: usize,
    max_steps: Option<u64>,
    commitments: OnceCell<Commitments<M::State>>,
}

impl<M: Machine> fmt::Debug for Challenger<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Challenger")
            .field("seed", &self.seed)
            .field("tree_depth", &self.tree_depth)
            .field("max_steps", &self.max_steps)
            .field("built", &self.commitments.initialized())
            .finish_non_exhaustive()
    }
}

impl<M: Machine> Challenger<M> {
    /// Create a new challenger
    pub fn new(machine: Arc<M>, seed: M::Seed, tree_depth: usize) -> Self {
        Self { machine, seed, tree_depth, max_steps: None, commitments: OnceCell::new() }
    }

    /// Bound trace construction to `max_steps` transitions
    pub fn with_max_steps(mut self, max_steps: Option<u64>) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn machine(&self) -> &Arc<M> {
        &self.machine
    }

    pub const fn seed(&self) -> &M::Seed {
        &self.seed
    }

    pub const fn tree_depth(&self) -> usize {
        self.tree_depth
    }

    async fn commitments(&self) -> Result<&Commitments<M::State>, ChallengerError> {
        self.commitments.get_or_try_init(|| self.build()).await
    }

    async fn build(&self) -> Result<Commitments<M::State>, ChallengerError> {
        let mut builder = TraceBuilder::new(self.machine.as_ref());
        if let Some(max_steps) = self.max_steps {
            builder = builder.with_max_steps(max_steps);
        }

        let correct = builder.build(&self.seed).await?;
        let incorrect = correct.derive_incorrect()?;

        let correct = self.commit(correct).await?;
        let incorrect = self.commit(incorrect).await?;

        info!(
            states = correct.trace.len(),
            depth = self.tree_depth,
            correct_root = %hex::encode(correct.tree.root()),
            incorrect_root = %hex::encode(incorrect.tree.root()),
            "commitment trees built"
        );
        Ok(Commitments { correct, incorrect })
    }

    async fn commit(&self, trace: Trace<M::State>) -> Result<Commitment<M::State>, ChallengerError> {
        let leaves = trace.leaf_hashes(self.machine.as_ref()).await?;
        let tree = MerkleTree::from_leaves(self.tree_depth, &leaves)?;
        Ok(Commitment { trace, tree })
    }

    /// Root of the correct or the incorrect tree
    pub async fn commitment_root(&self, is_correct: bool) -> Result<Hash, ChallengerError> {
        Ok(self.commitments().await?.select(is_correct).tree.root())
    }

    /// Node a party submits at bisection position `(depth, disagreement_point)`
    pub async fn disagreement_node(
        &self,
        is_correct: bool,
        depth: usize,
        disagreement_point: u64,
    ) -> Result<Node, ChallengerError> {
        let tree = &self.commitments().await?.select(is_correct).tree;
        debug!(is_correct, depth, disagreement_point, "disagreement node");
        Ok(tree.get_node_by_parent(depth, disagreement_point)?)
    }

    /// Inclusion proof of trace entry `index` in the selected tree
    pub async fn proof_by_index(
        &self,
        is_correct: bool,
        index: StepIndex,
    ) -> Result<MerkleProof, ChallengerError> {
        let commitment = self.commitments().await?.select(is_correct);
        let state = trace_entry(&commitment.trace, index)?;

        Ok(MerkleProof {
            leaf: self.machine.state_hash(state).await?,
            data: commitment.tree.create_merkle_proof(index)?,
            path: index,
        })
    }

    /// Index and value of the terminal state of the selected trace
    pub async fn final_state(&self, is_correct: bool) -> Result<(StepIndex, M::State), ChallengerError> {
        let trace = &self.commitments().await?.select(is_correct).trace;
        let index = trace
            .last_index()
            .ok_or(ChallengerError::IndexOutOfRange { index: 0, len: 0 })?;
        let state = trace_entry(trace, index)?;
        Ok((index, state.clone()))
    }

    /// Trace entry `index` of the selected trace
    pub async fn state_at(&self, is_correct: bool, index: StepIndex) -> Result<M::State, ChallengerError> {
        let trace = &self.commitments().await?.select(is_correct).trace;
        trace_entry(trace, index).cloned()
    }

    pub async fn incorrect_image(&self) -> Result<M::Image, ChallengerError> {
        let (_, state) = self.final_state(false).await?;
        Ok(self.machine.project(&state).await?)
    }

    /// Image hash of the selected trace's terminal state
    pub async fn image_hash(&self, is_correct: bool) -> Result<Hash, ChallengerError> {
        let (_, state) = self.final_state(is_correct).await?;
        let image = self.machine.project(&state).await?;
        Ok(self.machine.image_hash(&image).await?)
    }

    pub async fn initial_state_hash(&self) -> Result<Hash, ChallengerError> {
        Ok(self.machine.initial_state_hash(&self.seed).await?)
    }
}

fn trace_entry<S>(trace: &Trace<S>, index: StepIndex) -> Result<&S, ChallengerError> {
    trace
        .get(index)
        .ok_or(ChallengerError::IndexOutOfRange { index, len: trace.len() })
}
