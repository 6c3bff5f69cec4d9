//! Capability interface of the machine under dispute

use std::fmt::Debug;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::Hash;

/// Failure of a call into the machine evaluator. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MachineError {
    #[error("failed to connect to machine evaluator: {0}")]
    Connect(String),

    #[error("machine call `{call}` failed: {reason}")]
    Evaluation { call: &'static str, reason: String },

    #[error("machine call `{call}` returned malformed data: {reason}")]
    Malformed { call: &'static str, reason: String },
}

impl MachineError {
    pub fn evaluation(call: &'static str, reason: impl Into<String>) -> Self {
        Self::Evaluation { call, reason: reason.into() }
    }

    pub fn malformed(call: &'static str, reason: impl Into<String>) -> Self {
        Self::Malformed { call, reason: reason.into() }
    }
}

/// A deterministic, replayable state-transition system.
///
/// Implementations may be in-process functions or handles to a remote evaluator;
/// every call can suspend.
#[async_trait]
pub trait Machine: Send + Sync {
    type Seed: Clone + Debug + Send + Sync;
    type State: Clone + Debug + Send + Sync;
    type Image: Clone + Debug + Send + Sync;

    /// Initial state for a seed
    async fn create(&self, seed: &Self::Seed) -> Result<Self::State, MachineError>;

    /// One computation step. The flag mirrors `is_terminal` of the new state.
    async fn next(&self, state: &Self::State) -> Result<(Self::State, bool), MachineError>;

    async fn is_terminal(&self, state: &Self::State) -> Result<bool, MachineError>;

    /// The answer carried by a terminal state
    async fn project(&self, state: &Self::State) -> Result<Self::Image, MachineError>;

    async fn state_hash(&self, state: &Self::State) -> Result<Hash, MachineError>;

    async fn image_hash(&self, image: &Self::Image) -> Result<Hash, MachineError>;

    /// Run from `seed` to the first terminal state and project it.
    ///
    /// Unbounded: a machine that never terminates never returns.
    async fn run(&self, seed: &Self::Seed) -> Result<Self::Image, MachineError> {
        let mut state = self.create(seed).await?;
        while !self.is_terminal(&state).await? {
            state = self.next(&state).await?.0;
        }
        self.project(&state).await
    }

    /// Image and image hash for `seed`
    async fn compute_answer(&self, seed: &Self::Seed) -> Result<(Self::Image, Hash), MachineError> {
        let image = self.run(seed).await?;
        let image_hash = self.image_hash(&image).await?;
        Ok((image, image_hash))
    }

    /// Hash of `create(seed)`, the first leaf every honest trace commits to
    async fn initial_state_hash(&self, seed: &Self::Seed) -> Result<Hash, MachineError> {
        let state = self.create(seed).await?;
        self.state_hash(&state).await
    }
}
