//! Challenger binary
//!
//! Builds the correct and incorrect commitments for the configured seed and
//! plays one dispute between them on an in-process referee.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use emo_core::{MachineAdapter, SumConnector};
use emo_host::{simulate_dispute, Challenger, Config, Referee};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("===========================================");
    info!("        EMO Dispute Challenger");
    info!("===========================================");

    let config = Config::from_env().context("failed to load configuration")?;

    info!("Configuration:");
    info!("  Tree depth:       {}", config.tree_depth);
    info!("  Max steps:        {:?}", config.max_steps);
    info!("  Dispute timeout:  {}s", config.dispute_timeout);
    info!("  Seed:             {:?}", config.seed.nums);
    info!("  Honest defendant: {}", config.defendant_honest);
    info!("  Identity:         {:?}", config.identity);

    let machine = Arc::new(MachineAdapter::new(SumConnector::default(), config.identity.clone()));
    let challenger = Challenger::new(Arc::clone(&machine), config.seed.clone(), config.tree_depth)
        .with_max_steps(config.max_steps);
    let mut referee = Referee::new(machine, config.tree_depth);

    let correct_root = challenger.commitment_root(true).await?;
    let incorrect_root = challenger.commitment_root(false).await?;
    info!("Correct root:   0x{}", hex::encode(correct_root));
    info!("Incorrect root: 0x{}", hex::encode(incorrect_root));

    let outcome = simulate_dispute(
        &challenger,
        &mut referee,
        config.defendant_honest,
        0,
        config.dispute_timeout,
    )
    .await?;

    info!("");
    info!("Dispute resolved:");
    info!("  Prosecutor root:  0x{}", hex::encode(outcome.prosecutor_root));
    info!("  Winner:           {}", outcome.winner);
    match outcome.bottom {
        Some(leaf) => info!("  Bottom leaf:      {}", leaf),
        None => info!("  Bottom leaf:      not reached"),
    }
    info!("  Rounds:           {}", outcome.rounds);
    info!("  Moves:            {}", outcome.moves.len());
    for mv in &outcome.moves {
        debug!("{}", serde_json::to_string(mv)?);
    }

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
