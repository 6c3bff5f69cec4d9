//! End-to-end dispute between two challenger-driven parties

use emo_core::wire::encode_hash;
use emo_core::{Hash, Machine, MerkleProof, WireNode, WireProof};
use thiserror::Error;
use tracing::{info, warn};

use crate::challenger::{Challenger, ChallengerError};
use crate::dispute::{DisputeOutcome, DisputeState, Move, Party};
use crate::referee::{DisputeError, Referee};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimulationError {
    #[error(transparent)]
    Challenger(#[from] ChallengerError),

    #[error(transparent)]
    Dispute(#[from] DisputeError),

    #[error("both parties commit to the same root, there is nothing to dispute")]
    IdenticalCommitments,
}

/// Play a full dispute on `referee`.
///
/// The defendant claims the correct trace when `defendant_honest` is set and
/// the incorrect one otherwise; the prosecutor always takes the other tree.
/// Time starts at `start_time` and advances one second per move. A defendant
/// move the referee rejects is treated as no move at all, and the prosecutor
/// then claims the timeout. A claim the defendant upheld is resolved as true
/// once its window closes.
pub async fn simulate_dispute<M: Machine>(
    challenger: &Challenger<M>,
    referee: &mut Referee<M>,
    defendant_honest: bool,
    start_time: u64,
    timeout: u64,
) -> Result<DisputeOutcome, SimulationError> {
    let defendant = defendant_honest;
    let prosecutor = !defendant_honest;

    let defendant_root = challenger.commitment_root(defendant).await?;
    if defendant_root == challenger.commitment_root(prosecutor).await? {
        return Err(SimulationError::IdenticalCommitments);
    }

    let mut moves = Vec::new();
    let mut now = start_time;
    referee.make_claim(
        defendant_root,
        challenger.initial_state_hash().await?,
        challenger.image_hash(defendant).await?,
        now,
        timeout,
    )?;
    moves.push(Move::Claim { at: now, root: encode_hash(&defendant_root) });

    now += 1;
    let prosecutor_node = challenger.disagreement_node(prosecutor, 0, 0).await?;
    let root = referee.new_dispute(defendant_root, prosecutor_node, "prosecutor".to_string(), now)?;
    moves.push(Move::NewDispute { at: now, node: WireNode::from(&prosecutor_node) });

    now += 1;
    let (last_index, final_state) = challenger.final_state(defendant).await?;
    let node = challenger.disagreement_node(defendant, 0, 0).await?;
    let proof_left = challenger.proof_by_index(defendant, 0).await?;
    let proof_right = challenger.proof_by_index(defendant, last_index).await?;
    moves.push(Move::Reveal {
        at: now,
        node: WireNode::from(&node),
        proof_left: WireProof::from(&proof_left),
        proof_right: WireProof::from(&proof_right),
    });
    let revealed = referee.reveal(&root, node, &proof_left, &proof_right, &final_state, now).await;
    if let Err(err) = revealed {
        let winner = claim_timeout(referee, &root, err, timeout, &mut moves)?;
        return Ok(DisputeOutcome { prosecutor_root: root, winner, bottom: None, rounds: 0, moves });
    }

    let mut rounds = 0;
    while referee.dispute(&root).state == DisputeState::ProsecutorTurn {
        let record = referee.dispute(&root);
        let (depth, point) = (record.depth(), record.disagreement_point());

        now += 1;
        let node = challenger.disagreement_node(prosecutor, depth, point).await?;
        referee.prosecutor_respond(&root, node, now)?;
        moves.push(Move::ProsecutorRespond { at: now, node: WireNode::from(&node) });

        now += 1;
        let node = challenger.disagreement_node(defendant, depth, point).await?;
        referee.defendant_respond(&root, node, now)?;
        moves.push(Move::DefendantRespond { at: now, node: WireNode::from(&node) });
        rounds += 1;
    }

    let record = referee.dispute(&root);
    let bottom = record.disagreement_point();
    info!(bottom, rounds, "bisection reached the bottom");

    now += 1;
    let predecessor = match bottom {
        0 => None,
        point if point > record.number_of_steps => None,
        point => Some(bottom_witness(challenger, defendant, point - 1).await?),
    };
    moves.push(Move::RevealBottom {
        at: now,
        proof: predecessor.as_ref().map(|(proof, _)| WireProof::from(proof)),
    });
    let revealed = referee
        .defendant_reveal_bottom(&root, predecessor.as_ref().map(|(proof, state)| (proof, state)), now)
        .await;

    let winner = match revealed {
        Ok(winner) => winner,
        Err(err) => claim_timeout(referee, &root, err, timeout, &mut moves)?,
    };
    if winner == Party::Defendant {
        let at = now.max(start_time.saturating_add(timeout));
        referee.resolve_true_claim(&defendant_root, at)?;
        moves.push(Move::ResolveClaim { at });
    }
    Ok(DisputeOutcome { prosecutor_root: root, winner, bottom: Some(bottom), rounds, moves })
}

/// Proof and state of the leaf just before the disagreement point
async fn bottom_witness<M: Machine>(
    challenger: &Challenger<M>,
    is_correct: bool,
    index: u64,
) -> Result<(MerkleProof, M::State), ChallengerError> {
    let proof = challenger.proof_by_index(is_correct, index).await?;
    let state = challenger.state_at(is_correct, index).await?;
    Ok((proof, state))
}

/// Let the clock run out on a rejected defendant move and claim the timeout.
///
/// Machine failures are not moves and propagate.
fn claim_timeout<M: Machine>(
    referee: &mut Referee<M>,
    root: &Hash,
    rejection: DisputeError,
    timeout: u64,
    moves: &mut Vec<Move>,
) -> Result<Party, SimulationError> {
    if matches!(rejection, DisputeError::Machine(_)) {
        return Err(rejection.into());
    }
    warn!(%rejection, "defendant move rejected, waiting for timeout");

    let deadline = referee.dispute(root).last_action_timestamp.saturating_add(timeout).saturating_add(1);
    let winner = referee.timeout(root, deadline)?;
    moves.push(Move::Timeout { at: deadline, winner });
    info!(%winner, "dispute settled by timeout");
    Ok(winner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use emo_core::{Node, SumMachine, SumSeed};
    use rand::Rng;
    use std::sync::Arc;

    fn challenger(nums: Vec<u64>, depth: usize) -> Challenger<SumMachine> {
        Challenger::new(Arc::new(SumMachine), SumSeed { nums }, depth)
    }

    fn referee(depth: usize) -> Referee<SumMachine> {
        Referee::new(Arc::new(SumMachine), depth)
    }

    #[tokio::test]
    async fn test_honest_defendant_wins() {
        let c = challenger(vec![1, 2, 3, 12, 55], 3);
        let mut referee = referee(3);
        let outcome = simulate_dispute(&c, &mut referee, true, 1_000, 60).await.unwrap();

        assert_eq!(outcome.winner, Party::Defendant);
        assert_eq!(outcome.bottom, Some(2));
        assert_eq!(outcome.rounds, 2);
        assert_eq!(outcome.moves.last(), Some(&Move::ResolveClaim { at: 1_060 }));
        assert!(referee.claim(&c.commitment_root(true).await.unwrap()).is_none());
    }

    #[tokio::test]
    async fn test_transcript_carries_wire_moves() {
        let c = challenger(vec![1, 2, 3, 12, 55], 3);
        let outcome = simulate_dispute(&c, &mut referee(3), true, 0, 60).await.unwrap();

        // claim, dispute, reveal, two rounds, bottom, resolution
        assert_eq!(outcome.moves.len(), 9);
        let Move::Reveal { node, proof_left, proof_right, .. } = &outcome.moves[2] else {
            panic!("expected reveal, got {:?}", outcome.moves[2]);
        };
        let revealed = Node::try_from(node).unwrap();
        assert_eq!(revealed.hash(), c.commitment_root(true).await.unwrap());
        assert_eq!(MerkleProof::try_from(proof_left).unwrap(), c.proof_by_index(true, 0).await.unwrap());
        assert_eq!(proof_right.2 .0, 5);

        let Move::RevealBottom { proof: Some(proof), .. } = &outcome.moves[7] else {
            panic!("expected bottom proof, got {:?}", outcome.moves[7]);
        };
        assert_eq!(proof.2 .0, 1);

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["moves"][0]["move"], "claim");
        assert_eq!(json["moves"][3]["move"], "prosecutor_respond");
        assert_eq!(json["moves"][4]["node"].as_array().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn test_dishonest_defendant_loses() {
        let c = challenger(vec![1, 2, 3, 12, 55], 3);
        let mut referee = referee(3);
        let outcome = simulate_dispute(&c, &mut referee, false, 1_000, 60).await.unwrap();

        assert_eq!(outcome.winner, Party::Prosecutor);
        assert_eq!(outcome.bottom, Some(2));
        assert!(referee.claim(&c.commitment_root(false).await.unwrap()).is_none());
        assert!(matches!(
            outcome.moves.last(),
            Some(Move::Timeout { winner: Party::Prosecutor, .. })
        ));
    }

    #[tokio::test]
    async fn test_four_states_converge_on_second_leaf() {
        // [s0, s1, s2, s3] against [s0, s2, s1, s3]
        let c = challenger(vec![5, 6, 7], 2);
        let outcome = simulate_dispute(&c, &mut referee(2), true, 0, 10).await.unwrap();
        assert_eq!(outcome.bottom, Some(1));
        assert_eq!(outcome.winner, Party::Defendant);
    }

    #[tokio::test]
    async fn test_deep_tree() {
        let c = challenger(vec![1, 2, 3, 12, 55], 16);
        let outcome = simulate_dispute(&c, &mut referee(16), true, 0, 60).await.unwrap();
        assert_eq!(outcome.bottom, Some(2));
        assert_eq!(outcome.rounds, 15);
    }

    #[tokio::test]
    async fn test_two_states_dishonest_fails_reveal() {
        let c = challenger(vec![9], 1);
        let outcome = simulate_dispute(&c, &mut referee(1), false, 0, 60).await.unwrap();
        assert_eq!(outcome.winner, Party::Prosecutor);
        assert_eq!(outcome.bottom, None);
    }

    #[tokio::test]
    async fn test_random_seeds() {
        let mut rng = rand::thread_rng();
        for _ in 0..10 {
            let len = rng.gen_range(1..40);
            let nums: Vec<u64> = (0..len).map(|_| rng.gen_range(0..1_000)).collect();
            let c = challenger(nums, 6);

            let honest = simulate_dispute(&c, &mut referee(6), true, 0, 60).await.unwrap();
            assert_eq!(honest.winner, Party::Defendant);

            let dishonest = simulate_dispute(&c, &mut referee(6), false, 0, 60).await.unwrap();
            assert_eq!(dishonest.winner, Party::Prosecutor);
        }
    }

    #[tokio::test]
    async fn test_concurrent_disputes_share_challenger() {
        let c = Arc::new(challenger(vec![1, 2, 3, 12, 55], 8));

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let c = Arc::clone(&c);
                tokio::spawn(async move {
                    let mut referee = referee(8);
                    simulate_dispute(&c, &mut referee, i % 2 == 0, i * 100, 60).await
                })
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            let outcome = handle.await.unwrap().unwrap();
            let expected = if i % 2 == 0 { Party::Defendant } else { Party::Prosecutor };
            assert_eq!(outcome.winner, expected);
            assert_eq!(outcome.bottom, Some(2));
        }
    }
}
