//! Execution traces for bisection

use thiserror::Error;
use tracing::{debug, info};

use crate::machine::{Machine, MachineError};
use crate::types::{Hash, StepIndex};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TraceError {
    #[error(transparent)]
    Machine(#[from] MachineError),

    #[error("machine did not reach a terminal state within {max_steps} steps")]
    StepLimitExceeded { max_steps: u64 },

    #[error("trace of {len} state(s) has no adjacent pair to swap")]
    TooShort { len: usize },
}

/// Ordered states from `create(seed)` to the first terminal state.
///
/// Index `i` is execution step `i` and leaf `i` of the state tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Trace<S> {
    states: Vec<S>,
}

impl<S> Trace<S> {
    pub fn from_states(states: Vec<S>) -> Self {
        Self { states }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn get(&self, index: StepIndex) -> Option<&S> {
        usize::try_from(index).ok().and_then(|i| self.states.get(i))
    }

    pub fn states(&self) -> &[S] {
        &self.states
    }

    /// Index of the terminal state, `None` for an empty trace
    pub fn last_index(&self) -> Option<StepIndex> {
        self.states.len().checked_sub(1).map(|i| i as StepIndex)
    }

    pub fn final_state(&self) -> Option<&S> {
        self.states.last()
    }

    /// `state_hash` of every entry, in order
    pub async fn leaf_hashes<M>(&self, machine: &M) -> Result<Vec<Hash>, MachineError>
    where
        M: Machine<State = S> + ?Sized,
    {
        let mut hashes = Vec::with_capacity(self.states.len());
        for state in &self.states {
            hashes.push(machine.state_hash(state).await?);
        }
        Ok(hashes)
    }
}

impl<S: Clone> Trace<S> {
    /// Copy of this trace with the two states around the midpoint swapped.
    ///
    /// Swaps `len/2 - 1` and `len/2`: the result holds the same states but
    /// first diverges from this trace at index `len/2 - 1`. This is a test
    /// fixture for a dishonest claim, not a general adversary.
    pub fn derive_incorrect(&self) -> Result<Self, TraceError> {
        if self.states.len() < 2 {
            return Err(TraceError::TooShort { len: self.states.len() });
        }
        let index = self.states.len() / 2 - 1;
        let mut states = self.states.clone();
        states.swap(index, index + 1);
        Ok(Self { states })
    }
}

/// Runs a machine from a seed to its first terminal state
#[derive(Debug)]
pub struct TraceBuilder<'a, M: ?Sized> {
    machine: &'a M,
    max_steps: Option<u64>,
}

impl<'a, M: Machine + ?Sized> TraceBuilder<'a, M> {
    /// Unbounded builder: the caller owns termination
    pub const fn new(machine: &'a M) -> Self {
        Self { machine, max_steps: None }
    }

    /// Fail with [`TraceError::StepLimitExceeded`] after `max_steps` transitions
    pub const fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    /// Materialise the full trace for `seed`.
    ///
    /// Termination is read from `is_terminal` after every step; `next` is never
    /// called on a terminal state.
    pub async fn build(&self, seed: &M::Seed) -> Result<Trace<M::State>, TraceError> {
        let mut state = self.machine.create(seed).await?;
        let mut states = Vec::new();
        let mut steps = 0u64;

        loop {
            if self.machine.is_terminal(&state).await? {
                states.push(state);
                break;
            }
            if self.max_steps.is_some_and(|max| steps >= max) {
                return Err(TraceError::StepLimitExceeded { max_steps: steps });
            }

            let (next, _) = self.machine.next(&state).await?;
            states.push(std::mem::replace(&mut state, next));
            steps += 1;

            if steps % 10_000 == 0 {
                debug!(steps, "trace still running");
            }
        }

        info!(states = states.len(), "trace built");
        Ok(Trace { states })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sum_machine::{SumMachine, SumSeed, SumState};

    fn seed() -> SumSeed {
        SumSeed { nums: vec![1, 2, 3, 12, 55] }
    }

    #[tokio::test]
    async fn test_build_trace() {
        let trace = TraceBuilder::new(&SumMachine).build(&seed()).await.unwrap();

        assert_eq!(trace.len(), 6);
        assert_eq!(trace.last_index(), Some(5));
        assert_eq!(trace.get(0), Some(&SumState { stack: vec![1, 2, 3, 12, 55], sum: 0 }));
        assert_eq!(trace.get(2), Some(&SumState { stack: vec![1, 2, 3], sum: 0x43 }));
        assert_eq!(trace.final_state(), Some(&SumState { stack: vec![], sum: 0x49 }));
    }

    #[tokio::test]
    async fn test_terminal_seed_yields_single_state() {
        let trace = TraceBuilder::new(&SumMachine)
            .build(&SumSeed { nums: vec![] })
            .await
            .unwrap();
        assert_eq!(trace.len(), 1);
        assert_eq!(trace.derive_incorrect(), Err(TraceError::TooShort { len: 1 }));
    }

    #[tokio::test]
    async fn test_build_is_deterministic() {
        let builder = TraceBuilder::new(&SumMachine);
        let first = builder.build(&seed()).await.unwrap();
        let second = builder.build(&seed()).await.unwrap();

        assert_eq!(
            first.leaf_hashes(&SumMachine).await.unwrap(),
            second.leaf_hashes(&SumMachine).await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_step_limit() {
        let builder = TraceBuilder::new(&SumMachine).with_max_steps(3);
        assert_eq!(
            builder.build(&seed()).await,
            Err(TraceError::StepLimitExceeded { max_steps: 3 })
        );

        let exact = TraceBuilder::new(&SumMachine).with_max_steps(5);
        assert_eq!(exact.build(&seed()).await.unwrap().len(), 6);
    }

    #[test]
    fn test_derive_incorrect_swaps_midpoint() {
        let trace = Trace::from_states(vec!["s0", "s1", "s2", "s3"]);
        assert_eq!(trace.derive_incorrect().unwrap().states(), &["s0", "s2", "s1", "s3"]);

        let odd = Trace::from_states(vec!["s0", "s1", "s2", "s3", "s4"]);
        assert_eq!(odd.derive_incorrect().unwrap().states(), &["s0", "s2", "s1", "s3", "s4"]);

        let pair = Trace::from_states(vec!["s0", "s1"]);
        assert_eq!(pair.derive_incorrect().unwrap().states(), &["s1", "s0"]);
    }
}
