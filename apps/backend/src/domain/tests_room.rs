use std::collections::BTreeSet;

use super::content::WordSlot;
use super::player::{Role, TrialVote};
use super::room::test_helpers::room_with_players;
use super::room::{Phase, RoomStatus};
use crate::errors::domain::{DomainError, ValidationKind};

fn playing(n: usize) -> super::room::Room {
    let mut room = room_with_players(n);
    room.set_status(RoomStatus::Playing);
    room.assign_roles(0);
    room.current_round = 1;
    room
}

#[test]
fn add_player_respects_capacity_and_unique_colors() {
    let mut room = room_with_players(3);
    room.add_player("p3", "Guest3", 4).unwrap();
    let err = room.add_player("p4", "Guest4", 4).unwrap_err();
    assert!(matches!(
        err,
        DomainError::Validation(ValidationKind::RoomFull, _)
    ));

    let colors: BTreeSet<_> = room.players.iter().map(|p| format!("{:?}", p.color)).collect();
    assert_eq!(colors.len(), 4);
}

#[test]
fn removing_host_hands_flag_to_next_player() {
    let mut room = room_with_players(3);
    room.remove_player("p0");

    let hosts: Vec<_> = room.players.iter().filter(|p| p.is_host).collect();
    assert_eq!(hosts.len(), 1);
    assert_eq!(room.host_session_id, "p1");
    assert!(room.player("p1").unwrap().is_host);
}

#[test]
fn disconnected_host_is_replaced_by_connected_player() {
    let mut room = playing(3);
    room.mark_disconnected("p0");

    assert_eq!(room.host_session_id, "p1");
    assert_eq!(room.connected_count(), 2);
    // Seat and role are kept for the rest of the game.
    assert_eq!(room.player("p0").unwrap().role, Some(Role::Traitor));
}

#[test]
fn phase_change_clears_scratch_data() {
    let mut room = playing(4);
    room.set_phase(Some(Phase::VoteProposal));
    room.record_proposal("p1", true).unwrap();
    assert_eq!(room.agree_count(), 1);

    room.set_phase(Some(Phase::TrialVote));
    assert!(room.phase_data.is_empty());
    room.record_trial_vote("p1", TrialVote::Target("p2".into()))
        .unwrap();

    room.set_phase(None);
    assert!(room.players.iter().all(|p| p.vote_target.is_none()));
}

#[test]
fn enter_phase_rejects_reentry() {
    let mut room = playing(4);
    room.enter_phase(Phase::Judging).unwrap();
    assert!(room.enter_phase(Phase::Judging).is_err());
}

#[test]
fn selection_requires_card_in_hand_and_phase() {
    let mut room = playing(2);
    assert!(matches!(
        room.record_selection("p0", "x"),
        Err(DomainError::Validation(ValidationKind::PhaseMismatch, _))
    ));

    room.set_phase(Some(Phase::CardSelect));
    room.assign_slots(&[WordSlot::Who, WordSlot::What]);
    assert!(matches!(
        room.record_selection("p0", "x"),
        Err(DomainError::Validation(ValidationKind::CardsNotDealt, _))
    ));

    room.player_mut("p0").unwrap().hand = vec!["a cat".into()];
    assert!(matches!(
        room.record_selection("p0", "a dog"),
        Err(DomainError::Validation(ValidationKind::CardNotInHand, _))
    ));
    room.record_selection("p0", "a cat").unwrap();
    assert!(matches!(
        room.record_selection("p0", "a cat"),
        Err(DomainError::Validation(ValidationKind::AlreadySelected, _))
    ));
}

#[test]
fn sentence_follows_slot_order() {
    let mut room = playing(3);
    room.set_phase(Some(Phase::CardSelect));
    room.assign_slots(&[WordSlot::What, WordSlot::Who, WordSlot::Where]);
    for (sid, card) in [("p0", "sang"), ("p1", "a cat"), ("p2", "on the moon")] {
        room.player_mut(sid).unwrap().hand = vec![card.into()];
        room.record_selection(sid, card).unwrap();
    }
    assert!(room.all_selected());
    assert_eq!(room.compose_sentence(), "a cat on the moon sang");
}

#[test]
fn trial_verdict_breaks_ties_lexically() {
    let mut room = playing(4);
    room.set_phase(Some(Phase::TrialVote));
    room.record_trial_vote("p0", TrialVote::Target("p3".into()))
        .unwrap();
    room.record_trial_vote("p1", TrialVote::Target("p2".into()))
        .unwrap();
    room.record_trial_vote("p2", TrialVote::Abstain).unwrap();

    assert_eq!(room.trial_verdict(), Some(("p2".to_string(), 1)));
}

#[test]
fn trial_vote_rejects_self_and_strangers() {
    let mut room = playing(3);
    room.set_phase(Some(Phase::TrialVote));
    assert!(room
        .record_trial_vote("p1", TrialVote::Target("p1".into()))
        .is_err());
    assert!(room
        .record_trial_vote("p1", TrialVote::Target("nobody".into()))
        .is_err());
}

#[test]
fn winner_requires_caught_traitor_and_positive_vitality() {
    let mut room = playing(4);
    assert_eq!(room.winner(), Role::Traitor);

    room.voting_disabled = true;
    assert_eq!(room.winner(), Role::Citizen);

    room.vitality = 0;
    assert_eq!(room.winner(), Role::Traitor);
}

#[test]
fn reset_for_lobby_keeps_opted_in_players_only() {
    let mut room = playing(4);
    room.history.push(super::room::RoundHistory {
        round: 1,
        oracle: "o".into(),
        sentence: "s".into(),
        score_delta: 3,
        commentary: "c".into(),
    });
    room.set_status(RoomStatus::GameOver);
    room.opt_in_return("p1").unwrap();
    room.opt_in_return("p2").unwrap();

    let keep = room.returned_sessions();
    let kicked = room.reset_for_lobby(&keep, 55);

    assert_eq!(kicked.len(), 2);
    assert_eq!(room.players.len(), 2);
    assert_eq!(room.status, RoomStatus::Waiting);
    assert_eq!(room.generation, 1);
    assert_eq!(room.current_round, 0);
    assert_eq!(room.vitality, 55);
    assert!(room.history.is_empty());
    assert!(room.players.iter().all(|p| p.role.is_none()));
    // p0 (old host) was kicked, so p1 takes over.
    assert_eq!(room.host_session_id, "p1");
}

#[test]
fn readiness_counts_host_implicitly() {
    let mut room = room_with_players(3);
    assert!(!room.all_ready());
    room.set_ready("p1", true).unwrap();
    room.set_ready("p2", true).unwrap();
    assert!(room.all_ready());
    room.set_ready("p2", false).unwrap();
    assert!(!room.all_ready());
}

#[test]
fn view_hides_oracle_until_a_phase_runs() {
    let mut room = playing(4);
    room.oracle = Some("What lies beneath?".into());

    let view = super::view::RoomView::from(&room);
    assert_eq!(view.oracle, None);

    room.set_phase(Some(Phase::Oracle));
    let view = super::view::RoomView::from(&room);
    assert_eq!(view.oracle.as_deref(), Some("What lies beneath?"));

    // Next round's oracle is drawn before its reveal.
    room.set_phase(None);
    room.oracle = Some("Who knocks?".into());
    assert_eq!(super::view::RoomView::from(&room).oracle, None);
}
