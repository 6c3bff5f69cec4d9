//! Reference machine: sums a stack of numbers, one pop per step.
//!
//! Seed `{nums}` becomes the initial stack. Each step pops the top value and adds
//! it to the running sum; the state with an empty stack is terminal and its
//! image is the sum.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::adapter::{Connector, Identity};
use crate::machine::{Machine, MachineError};
use crate::types::Hash;
use crate::wire::abi::u64_word;
use emo_merkle::Keccak256Hasher;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SumSeed {
    pub nums: Vec<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SumState {
    /// Top of the stack is the last element
    pub stack: Vec<u64>,
    pub sum: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SumImage {
    pub sum: u64,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SumMachine;

#[async_trait]
impl Machine for SumMachine {
    type Seed = SumSeed;
    type State = SumState;
    type Image = SumImage;

    async fn create(&self, seed: &SumSeed) -> Result<SumState, MachineError> {
        Ok(SumState { stack: seed.nums.clone(), sum: 0 })
    }

    async fn next(&self, state: &SumState) -> Result<(SumState, bool), MachineError> {
        let mut stack = state.stack.clone();
        let top = stack
            .pop()
            .ok_or_else(|| MachineError::evaluation("next", "stack is empty"))?;
        let sum = state
            .sum
            .checked_add(top)
            .ok_or_else(|| MachineError::evaluation("next", "sum overflows u64"))?;

        let is_terminal = stack.is_empty();
        Ok((SumState { stack, sum }, is_terminal))
    }

    async fn is_terminal(&self, state: &SumState) -> Result<bool, MachineError> {
        Ok(state.stack.is_empty())
    }

    async fn project(&self, state: &SumState) -> Result<SumImage, MachineError> {
        Ok(SumImage { sum: state.sum })
    }

    /// `keccak256(len || stack... || sum)`, every value a 32-byte big-endian word
    async fn state_hash(&self, state: &SumState) -> Result<Hash, MachineError> {
        let mut encoded = Vec::with_capacity((state.stack.len() + 2) * 32);
        encoded.extend_from_slice(&u64_word(state.stack.len() as u64));
        for value in &state.stack {
            encoded.extend_from_slice(&u64_word(*value));
        }
        encoded.extend_from_slice(&u64_word(state.sum));
        Ok(Keccak256Hasher::hash(&encoded))
    }

    async fn image_hash(&self, image: &SumImage) -> Result<Hash, MachineError> {
        Ok(Keccak256Hasher::hash(&u64_word(image.sum)))
    }
}

/// Connector for [`SumMachine`]; counts connections so reuse can be observed
#[derive(Debug, Default)]
pub struct SumConnector {
    connections: AtomicUsize,
}

impl SumConnector {
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for SumConnector {
    type Machine = SumMachine;

    async fn connect(&self, identity: &Identity) -> Result<SumMachine, MachineError> {
        if identity.balance == 0 {
            return Err(MachineError::Connect("evaluator account is not funded".to_string()));
        }
        let attempt = self.connections.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(attempt, "sum machine connected");
        Ok(SumMachine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_step_pops_top() {
        let machine = SumMachine;
        let state = machine.create(&SumSeed { nums: vec![1, 2, 3, 12, 55] }).await.unwrap();

        let (next, terminal) = machine.next(&state).await.unwrap();
        assert_eq!(next, SumState { stack: vec![1, 2, 3, 12], sum: 55 });
        assert!(!terminal);
    }

    #[tokio::test]
    async fn test_next_on_terminal_state_fails() {
        let machine = SumMachine;
        let state = SumState { stack: vec![], sum: 9 };

        assert!(machine.is_terminal(&state).await.unwrap());
        assert!(matches!(
            machine.next(&state).await,
            Err(MachineError::Evaluation { call: "next", .. })
        ));
    }

    #[tokio::test]
    async fn test_state_hash_distinguishes_stack_and_sum() {
        let machine = SumMachine;
        let a = SumState { stack: vec![1, 2], sum: 3 };
        let b = SumState { stack: vec![2, 1], sum: 3 };
        let c = SumState { stack: vec![1, 2], sum: 4 };

        let ha = machine.state_hash(&a).await.unwrap();
        assert_eq!(ha, machine.state_hash(&a.clone()).await.unwrap());
        assert_ne!(ha, machine.state_hash(&b).await.unwrap());
        assert_ne!(ha, machine.state_hash(&c).await.unwrap());
    }

    #[tokio::test]
    async fn test_run_sums_everything() {
        let (image, hash) = SumMachine
            .compute_answer(&SumSeed { nums: vec![1, 2, 3, 12, 55] })
            .await
            .unwrap();
        assert_eq!(image, SumImage { sum: 0x49 });
        assert_eq!(hash, Keccak256Hasher::hash(&u64_word(0x49)));
    }
}
