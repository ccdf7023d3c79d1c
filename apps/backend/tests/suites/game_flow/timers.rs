// Deadlines, and timers that outlive their phase

use std::time::Duration;

use oracle_backend::lock::{LeaseBackend, LockOutcome};
use oracle_backend::services::scheduler::{FlowEvent, FlowHandler, ScheduledEvent};
use oracle_backend::store::keys;
use oracle_backend::{AppError, ClientAction, ServerEvent};
use tokio::time::Instant;

use crate::support::table::{answer_proposal, play_first_cards, seat, start_game};
use crate::support::{test_config, ScriptedJudge, SharedBackends, TestNode};

#[tokio::test(start_paused = true)]
async fn card_deadline_fills_in_for_idle_players() -> Result<(), AppError> {
    let node = TestNode::start(test_config(), ScriptedJudge::always(1)).await?;
    let mut table = seat(&[&node], 4).await;
    start_game(&mut table).await;

    table.host().expect("ROUND_STARTED").await;
    let round_started = Instant::now();

    // One player acts; the other three sit out the clock.
    let ServerEvent::CardsDealt { cards, .. } = table.clients[2].expect("CARDS_DEALT").await
    else {
        unreachable!()
    };
    table.clients[2]
        .act(oracle_backend::ClientAction::SelectCard {
            card: cards[0].clone(),
        })
        .await;

    let ServerEvent::CardsAutoFilled { session_ids } =
        table.host().expect("CARDS_AUTO_FILLED").await
    else {
        unreachable!()
    };
    assert!(round_started.elapsed() >= node.config.card_select_timeout);
    assert_eq!(session_ids.len(), 3);
    assert!(!session_ids.contains(&table.session(2)));

    table.all_expect("ROUND_RESULT").await;
    assert_eq!(node.judge.calls(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn previous_round_deadline_is_ignored() -> Result<(), AppError> {
    let node = TestNode::start(test_config(), ScriptedJudge::always(1)).await?;
    let mut table = seat(&[&node], 4).await;
    start_game(&mut table).await;

    // Round 1 finishes early; its card deadline is still armed.
    play_first_cards(&mut table).await;
    answer_proposal(&mut table, |_| false).await;
    table.all_expect("VOTE_PROPOSAL_FAILED").await;

    let ServerEvent::RoundStarted { round, .. } = table.host().expect("ROUND_STARTED").await
    else {
        unreachable!()
    };
    assert_eq!(round, 2);
    let round_two = Instant::now();

    // Nobody plays in round 2. The round 1 deadline passes first and must
    // change nothing; only round 2's own deadline fills the cards.
    let ServerEvent::CardsAutoFilled { session_ids } =
        table.host().expect("CARDS_AUTO_FILLED").await
    else {
        unreachable!()
    };
    assert!(round_two.elapsed() >= node.config.card_select_timeout);
    assert_eq!(session_ids.len(), 4);

    table.host().expect("ROUND_RESULT").await;
    assert_eq!(node.judge.calls(), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn stale_stamp_is_skipped() -> Result<(), AppError> {
    let node = TestNode::start(test_config(), ScriptedJudge::always(1)).await?;
    let mut table = seat(&[&node], 4).await;
    start_game(&mut table).await;
    table.host().expect("CARDS_DEALT").await;

    let room = node
        .state
        .flow
        .load_room(&table.room_id)
        .await?
        .expect("room exists");

    let mut stale = ScheduledEvent::new(&room, FlowEvent::CardTimeout);
    stale.stamp.generation += 1;
    let outcome = node.state.flow.handle(&stale).await?;
    assert!(matches!(outcome, LockOutcome::Skipped(_)));

    let mut old_round = ScheduledEvent::new(&room, FlowEvent::StartRound);
    old_round.stamp.round -= 1;
    let outcome = node.state.flow.handle(&old_round).await?;
    assert!(matches!(outcome, LockOutcome::Skipped(_)));

    let after = node
        .state
        .flow
        .load_room(&table.room_id)
        .await?
        .expect("room exists");
    assert_eq!(after, room);
    assert!(table
        .host()
        .drain_names()
        .iter()
        .all(|n| n != "CARDS_AUTO_FILLED"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn unanswered_proposal_fails_at_the_deadline() -> Result<(), AppError> {
    let node = TestNode::start(test_config(), ScriptedJudge::always(1)).await?;
    let mut table = seat(&[&node], 4).await;
    start_game(&mut table).await;
    play_first_cards(&mut table).await;

    table.all_expect("VOTE_PROPOSAL_STARTED").await;
    let opened = Instant::now();
    table.clients[1]
        .act(oracle_backend::ClientAction::ProposeVote { agree: true })
        .await;

    let ServerEvent::VoteProposalFailed { agree, needed } =
        table.host().expect("VOTE_PROPOSAL_FAILED").await
    else {
        unreachable!()
    };
    assert!(opened.elapsed() >= node.config.vote_proposal_timeout);
    assert_eq!((agree, needed), (1, 2));

    let ServerEvent::NextRound { round } = table.host().expect("NEXT_ROUND").await else {
        unreachable!()
    };
    assert_eq!(round, 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn deadline_waits_out_a_long_held_lease() -> Result<(), AppError> {
    let config = test_config();
    let shared = SharedBackends::new(&config);
    let node = TestNode::join(&shared, "node-a", config, ScriptedJudge::always(1)).await?;
    let mut table = seat(&[&node], 4).await;
    start_game(&mut table).await;
    table.host().expect("CARDS_DEALT").await;

    // Another holder sits on the room far past the card deadline.
    let held_for = Duration::from_secs(150);
    assert!(
        shared
            .leases
            .try_acquire(&keys::room_lock(&table.room_id), "other-holder", held_for)
            .await?
    );
    let taken = Instant::now();

    let ServerEvent::CardsAutoFilled { session_ids } =
        table.host().expect("CARDS_AUTO_FILLED").await
    else {
        unreachable!()
    };
    assert!(taken.elapsed() >= held_for);
    assert_eq!(session_ids.len(), 4);

    table.host().expect("ROUND_RESULT").await;
    assert_eq!(node.judge.calls(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn last_card_racing_the_deadline_judges_once() -> Result<(), AppError> {
    for head_start in 0..8 {
        let node = TestNode::start(test_config(), ScriptedJudge::always(1)).await?;
        let mut table = seat(&[&node], 4).await;
        start_game(&mut table).await;

        let mut last_card = None;
        for (i, client) in table.clients.iter_mut().enumerate() {
            let ServerEvent::CardsDealt { cards, .. } = client.expect("CARDS_DEALT").await else {
                unreachable!()
            };
            if i == 3 {
                last_card = Some(cards[0].clone());
            } else {
                client
                    .act(ClientAction::SelectCard {
                        card: cards[0].clone(),
                    })
                    .await;
            }
        }
        let card = last_card.expect("four players were dealt");

        let room = node
            .state
            .flow
            .load_room(&table.room_id)
            .await?
            .expect("room exists");
        let deadline = ScheduledEvent::new(&room, FlowEvent::CardTimeout);

        // Vary which side reaches the lease first.
        let select = async {
            if head_start % 2 == 1 {
                for _ in 0..head_start {
                    tokio::task::yield_now().await;
                }
            }
            table.clients[3].act(ClientAction::SelectCard { card }).await;
        };
        let timeout = async {
            if head_start % 2 == 0 {
                for _ in 0..head_start {
                    tokio::task::yield_now().await;
                }
            }
            node.state.flow.handle(&deadline).await
        };
        let ((), timed_out) = tokio::join!(select, timeout);
        timed_out?;

        table.host().expect("ROUND_RESULT").await;
        table.host().expect("VOTE_PROPOSAL_STARTED").await;
        assert_eq!(node.judge.calls(), 1, "head start {head_start}");

        let after = node
            .state
            .flow
            .load_room(&table.room_id)
            .await?
            .expect("room exists");
        assert_eq!(after.history.len(), 1, "head start {head_start}");
    }
    Ok(())
}
