//! Machine abstraction and execution traces for bisection disputes
//!
//! This crate contains the pieces shared by every dispute participant:
//! - The `Machine` capability interface and its lazily connected adapter
//! - Trace construction from a seed
//! - Wire shapes for nodes and proofs

pub mod types;
pub mod machine;
pub mod adapter;
pub mod trace;
pub mod wire;
pub mod sum_machine;

pub use types::*;
pub use machine::{Machine, MachineError};
pub use adapter::{Connector, Identity, MachineAdapter};
pub use trace::{Trace, TraceBuilder, TraceError};
pub use wire::{WireError, WireNode, WirePath, WireProof};
pub use sum_machine::{SumConnector, SumImage, SumMachine, SumSeed, SumState};
