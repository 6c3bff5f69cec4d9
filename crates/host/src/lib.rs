//! Host-side logic for bisection disputes

pub mod bisection;
pub mod challenger;
pub mod config;
pub mod dispute;
pub mod referee;
pub mod simulation;

pub use bisection::Bisection;
pub use challenger::{Challenger, ChallengerError};
pub use config::Config;
pub use dispute::{Claim, Dispute, DisputeOutcome, DisputeState, Move, Party};
pub use referee::{DisputeError, Referee};
pub use simulation::{simulate_dispute, SimulationError};
