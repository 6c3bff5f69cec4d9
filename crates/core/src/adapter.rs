//! Lazily connected machine adapter

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::machine::{Machine, MachineError};
use crate::types::Hash;

/// Funding/identity context the evaluator runs under.
///
/// Supplied by configuration, never compiled in.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Key of the account the evaluator executes as
    pub key: Option<String>,
    /// Balance the account is funded with before the first call
    pub balance: u128,
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .field("balance", &self.balance)
            .finish()
    }
}

/// Produces a connected evaluator
#[async_trait]
pub trait Connector: Send + Sync {
    type Machine: Machine;

    async fn connect(&self, identity: &Identity) -> Result<Self::Machine, MachineError>;
}

/// Machine adapter that connects on first use and reuses the evaluator afterwards.
///
/// A failed connection is not cached: the error reaches the caller of the
/// call that triggered it, and the next call connects again.
pub struct MachineAdapter<C: Connector> {
    connector: C,
    identity: Identity,
    evaluator: OnceCell<C::Machine>,
}

impl<C: Connector> fmt::Debug for MachineAdapter<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MachineAdapter")
            .field("identity", &self.identity)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl<C: Connector> MachineAdapter<C> {
    pub fn new(connector: C, identity: Identity) -> Self {
        Self { connector, identity, evaluator: OnceCell::new() }
    }

    pub fn is_connected(&self) -> bool {
        self.evaluator.initialized()
    }

    pub const fn connector(&self) -> &C {
        &self.connector
    }

    async fn evaluator(&self) -> Result<&C::Machine, MachineError> {
        self.evaluator
            .get_or_try_init(|| async {
                debug!(balance = self.identity.balance, "connecting machine evaluator");
                let machine = self.connector.connect(&self.identity).await?;
                info!("machine evaluator connected");
                Ok(machine)
            })
            .await
    }
}

#[async_trait]
impl<C: Connector> Machine for MachineAdapter<C> {
    type Seed = <C::Machine as Machine>::Seed;
    type State = <C::Machine as Machine>::State;
    type Image = <C::Machine as Machine>::Image;

    async fn create(&self, seed: &Self::Seed) -> Result<Self::State, MachineError> {
        self.evaluator().await?.create(seed).await
    }

    async fn next(&self, state: &Self::State) -> Result<(Self::State, bool), MachineError> {
        self.evaluator().await?.next(state).await
    }

    async fn is_terminal(&self, state: &Self::State) -> Result<bool, MachineError> {
        self.evaluator().await?.is_terminal(state).await
    }

    async fn project(&self, state: &Self::State) -> Result<Self::Image, MachineError> {
        self.evaluator().await?.project(state).await
    }

    async fn state_hash(&self, state: &Self::State) -> Result<Hash, MachineError> {
        self.evaluator().await?.state_hash(state).await
    }

    async fn image_hash(&self, image: &Self::Image) -> Result<Hash, MachineError> {
        self.evaluator().await?.image_hash(image).await
    }
}
