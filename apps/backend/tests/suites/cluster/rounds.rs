use std::collections::BTreeSet;

use oracle_backend::{AppError, ServerEvent};

use super::pair;
use crate::support::table::{answer_proposal, play_first_cards, seat, start_game};
use crate::support::ScriptedJudge;

#[tokio::test(start_paused = true)]
async fn round_with_players_split_across_nodes_is_judged_once() -> Result<(), AppError> {
    let (a, b) = pair(|| ScriptedJudge::always(4)).await?;
    let mut table = seat(&[&a, &b], 4).await;
    let started = start_game(&mut table).await;

    play_first_cards(&mut table).await;

    let results = table.all_expect("ROUND_RESULT").await;
    for result in &results {
        let ServerEvent::RoundResult {
            round, vitality, ..
        } = result
        else {
            unreachable!()
        };
        assert_eq!(*round, 1);
        assert_eq!(*vitality, started.vitality + 4);
    }
    assert_eq!(a.judge.calls() + b.judge.calls(), 1);

    answer_proposal(&mut table, |_| false).await;
    let ServerEvent::NextRound { round } = table.host().expect("NEXT_ROUND").await else {
        unreachable!()
    };
    assert_eq!(round, 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn slots_are_dealt_once_across_nodes() -> Result<(), AppError> {
    let (a, b) = pair(|| ScriptedJudge::always(0)).await?;
    let mut table = seat(&[&a, &b], 4).await;
    start_game(&mut table).await;

    let mut slots = BTreeSet::new();
    for client in &mut table.clients {
        let ServerEvent::CardsDealt { slot, cards, .. } = client.expect("CARDS_DEALT").await
        else {
            unreachable!()
        };
        assert!(!cards.is_empty());
        slots.insert(format!("{slot:?}"));
    }
    assert_eq!(slots.len(), 4);
    Ok(())
}
