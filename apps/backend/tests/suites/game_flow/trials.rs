// Vote proposals, trials and their vitality effects

use std::time::Duration;

use oracle_backend::{AppError, ClientAction, GameConfig, ServerEvent};
use tokio::time::Instant;

use crate::support::table::{answer_proposal, play_first_cards, seat, start_game, Table};
use crate::support::{test_config, ScriptedJudge, TestNode};

const SCORE: i32 = 4;

/// Play round 1 through to an open trial; returns vitality after the trial
/// cost.
async fn open_trial(node: &TestNode, table: &mut Table, start_vitality: i32) -> i32 {
    play_first_cards(table).await;
    answer_proposal(table, |i| i < 2).await;

    let mut vitality = 0;
    for client in &mut table.clients {
        let ServerEvent::TrialStarted {
            round, vitality: v, ..
        } = client.expect("TRIAL_STARTED").await
        else {
            unreachable!()
        };
        assert_eq!(round, 1);
        vitality = v;
    }
    assert_eq!(vitality, start_vitality + SCORE - node.config.trial_cost);
    vitality
}

async fn vote(table: &Table, voter: usize, target: Option<usize>) {
    table.clients[voter]
        .act(ClientAction::CastVote {
            target_session_id: target.map(|t| table.session(t)),
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn quorum_of_two_is_required() -> Result<(), AppError> {
    let node = TestNode::start(test_config(), ScriptedJudge::always(SCORE)).await?;
    let mut table = seat(&[&node], 4).await;
    let started = start_game(&mut table).await;
    play_first_cards(&mut table).await;

    answer_proposal(&mut table, |i| i == 0).await;
    let ServerEvent::VoteProposalFailed { agree, needed } =
        table.host().expect("VOTE_PROPOSAL_FAILED").await
    else {
        unreachable!()
    };
    assert_eq!((agree, needed), (1, 2));
    let failed_at = Instant::now();

    // The next round waits out the failure pause.
    let pause = node.config.proposal_failed_delay;
    tokio::time::sleep(pause - Duration::from_millis(10)).await;
    assert!(!table.host().drain_names().iter().any(|n| n == "NEXT_ROUND"));

    let ServerEvent::NextRound { round } = table.host().expect("NEXT_ROUND").await else {
        unreachable!()
    };
    assert_eq!(round, 2);
    assert!(failed_at.elapsed() >= pause);

    let room = node
        .state
        .flow
        .load_room(&table.room_id)
        .await?
        .expect("room exists");
    assert_eq!(room.vitality, started.vitality + SCORE);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn configured_quorum_of_one_opens_a_trial() -> Result<(), AppError> {
    let config = GameConfig {
        proposal_quorum: 1,
        ..test_config()
    };
    let node = TestNode::start(config, ScriptedJudge::always(SCORE)).await?;
    let mut table = seat(&[&node], 4).await;
    start_game(&mut table).await;
    play_first_cards(&mut table).await;

    answer_proposal(&mut table, |i| i == 3).await;
    table.all_expect("TRIAL_STARTED").await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn proposal_ballots_are_counted_once() -> Result<(), AppError> {
    let node = TestNode::start(test_config(), ScriptedJudge::always(SCORE)).await?;
    let mut table = seat(&[&node], 4).await;
    start_game(&mut table).await;
    play_first_cards(&mut table).await;

    table.all_expect("VOTE_PROPOSAL_STARTED").await;
    table.host().act(ClientAction::ProposeVote { agree: true }).await;
    table.host().act(ClientAction::ProposeVote { agree: true }).await;
    assert_eq!(table.host().expect_error().await, "ALREADY_VOTED");

    let ServerEvent::VoteProposalUpdated {
        ballots,
        agree,
        needed,
    } = table.clients[1].expect("VOTE_PROPOSAL_UPDATED").await
    else {
        unreachable!()
    };
    assert_eq!((ballots, agree, needed), (1, 1, 2));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn convicting_the_traitor_rewards_and_ends_voting() -> Result<(), AppError> {
    let node = TestNode::start(test_config(), ScriptedJudge::always(SCORE)).await?;
    let mut table = seat(&[&node], 4).await;
    let started = start_game(&mut table).await;
    let after_cost = open_trial(&node, &mut table, started.vitality).await;

    let traitor = started.traitor;
    let traitor_id = table.session(traitor);
    let scapegoat = (traitor + 1) % 4;
    for voter in 0..4 {
        let target = if voter == traitor { scapegoat } else { traitor };
        vote(&table, voter, Some(target)).await;
    }

    for client in &mut table.clients {
        let ServerEvent::TrialResult {
            accused,
            votes,
            was_traitor,
            vitality_delta,
            vitality,
            voting_disabled,
        } = client.expect("TRIAL_RESULT").await
        else {
            unreachable!()
        };
        assert_eq!(accused.as_deref(), Some(traitor_id.as_str()));
        assert_eq!(votes, 3);
        assert_eq!(was_traitor, Some(true));
        assert_eq!(vitality_delta, node.config.traitor_reward);
        assert_eq!(vitality, after_cost + node.config.traitor_reward);
        assert!(voting_disabled);
    }

    // Round 2 skips the proposal entirely.
    table.all_expect("NEXT_ROUND").await;
    play_first_cards(&mut table).await;
    table.all_expect("ROUND_RESULT").await;
    let ServerEvent::VoteProposalSkipped { round } =
        table.host().expect("VOTE_PROPOSAL_SKIPPED").await
    else {
        unreachable!()
    };
    assert_eq!(round, 2);
    let ServerEvent::NextRound { round } = table.host().expect("NEXT_ROUND").await else {
        unreachable!()
    };
    assert_eq!(round, 3);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn convicting_a_citizen_costs_vitality() -> Result<(), AppError> {
    let node = TestNode::start(test_config(), ScriptedJudge::always(SCORE)).await?;
    let mut table = seat(&[&node], 4).await;
    let started = start_game(&mut table).await;
    let after_cost = open_trial(&node, &mut table, started.vitality).await;

    let citizen = (started.traitor + 1) % 4;
    let other = (started.traitor + 2) % 4;
    for voter in 0..4 {
        let target = if voter == citizen { other } else { citizen };
        vote(&table, voter, Some(target)).await;
    }

    let ServerEvent::TrialResult {
        accused,
        was_traitor,
        vitality_delta,
        vitality,
        voting_disabled,
        ..
    } = table.host().expect("TRIAL_RESULT").await
    else {
        unreachable!()
    };
    assert_eq!(accused, Some(table.session(citizen)));
    assert_eq!(was_traitor, Some(false));
    assert_eq!(vitality_delta, -node.config.wrong_accusation_penalty);
    assert_eq!(vitality, after_cost - node.config.wrong_accusation_penalty);
    assert!(!voting_disabled);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn tied_trial_convicts_the_smallest_session_id() -> Result<(), AppError> {
    let node = TestNode::start(test_config(), ScriptedJudge::always(SCORE)).await?;
    let mut table = seat(&[&node], 4).await;
    let started = start_game(&mut table).await;
    open_trial(&node, &mut table, started.vitality).await;

    // Two votes each for seats 0 and 2.
    vote(&table, 0, Some(2)).await;
    vote(&table, 1, Some(2)).await;
    vote(&table, 2, Some(0)).await;
    vote(&table, 3, Some(0)).await;

    let expected = std::cmp::min(table.session(0), table.session(2));
    let ServerEvent::TrialResult { accused, votes, .. } =
        table.host().expect("TRIAL_RESULT").await
    else {
        unreachable!()
    };
    assert_eq!(accused, Some(expected));
    assert_eq!(votes, 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn all_abstain_changes_nothing() -> Result<(), AppError> {
    let node = TestNode::start(test_config(), ScriptedJudge::always(SCORE)).await?;
    let mut table = seat(&[&node], 4).await;
    let started = start_game(&mut table).await;
    let after_cost = open_trial(&node, &mut table, started.vitality).await;

    for voter in 0..4 {
        vote(&table, voter, None).await;
    }

    let ServerEvent::TrialResult {
        accused,
        votes,
        was_traitor,
        vitality_delta,
        vitality,
        ..
    } = table.host().expect("TRIAL_RESULT").await
    else {
        unreachable!()
    };
    assert_eq!(accused, None);
    assert_eq!(votes, 0);
    assert_eq!(was_traitor, None);
    assert_eq!(vitality_delta, 0);
    assert_eq!(vitality, after_cost);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn invalid_trial_ballots_are_rejected() -> Result<(), AppError> {
    let node = TestNode::start(test_config(), ScriptedJudge::always(SCORE)).await?;
    let mut table = seat(&[&node], 4).await;
    let started = start_game(&mut table).await;
    open_trial(&node, &mut table, started.vitality).await;

    vote(&table, 1, Some(1)).await;
    assert_eq!(table.clients[1].expect_error().await, "INVALID_TARGET");

    table.clients[1]
        .act(ClientAction::CastVote {
            target_session_id: Some("nobody".to_string()),
        })
        .await;
    assert_eq!(table.clients[1].expect_error().await, "INVALID_TARGET");

    vote(&table, 1, Some(0)).await;
    vote(&table, 1, Some(2)).await;
    assert_eq!(table.clients[1].expect_error().await, "ALREADY_VOTED");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn trial_deadline_counts_the_ballots_in() -> Result<(), AppError> {
    let node = TestNode::start(test_config(), ScriptedJudge::always(SCORE)).await?;
    let mut table = seat(&[&node], 4).await;
    let started = start_game(&mut table).await;
    open_trial(&node, &mut table, started.vitality).await;

    let citizen = (started.traitor + 1) % 4;
    let voter = (started.traitor + 2) % 4;
    vote(&table, voter, Some(citizen)).await;

    let ServerEvent::TrialResult { accused, votes, .. } =
        table.host().expect("TRIAL_RESULT").await
    else {
        unreachable!()
    };
    assert_eq!(accused, Some(table.session(citizen)));
    assert_eq!(votes, 1);
    Ok(())
}
