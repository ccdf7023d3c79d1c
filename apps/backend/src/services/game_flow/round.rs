//! Oracle reveal, slot assignment, dealing and the card deadline.

use std::collections::BTreeMap;

use tracing::{debug, info};

use super::{GameFlowService, STALE};
use crate::domain::{GameRng, Phase, Room, RoomStatus, WordSlot};
use crate::error::AppError;
use crate::lock::{Flow, LockOutcome};
use crate::services::scheduler::{FlowEvent, ScheduledEvent};
use crate::ws::protocol::ServerEvent;

/// Draw `count` distinct cards from the slot's deck.
fn deal(slot: WordSlot, count: usize, rng: &GameRng) -> Vec<String> {
    let mut deck: Vec<&str> = slot.deck().to_vec();
    rng.shuffle(&mut deck);
    deck.into_iter().take(count).map(str::to_string).collect()
}

impl GameFlowService {
    pub(super) async fn start_oracle(
        &self,
        ev: &ScheduledEvent,
    ) -> Result<LockOutcome<Room>, AppError> {
        let stamp = ev.stamp;
        let config = &self.config;
        self.txn
            .run(&ev.room_id, move |room, fx| {
                if room.status != RoomStatus::Playing || !stamp.matches(room) {
                    return Ok(Flow::Skip(STALE));
                }
                if room.current_phase.is_some() {
                    return Ok(Flow::Skip("oracle already revealed"));
                }

                room.set_phase(Some(Phase::Oracle));
                let oracle = room.oracle.clone().unwrap_or_default();
                fx.broadcast(
                    room,
                    ServerEvent::OracleRevealed {
                        round: room.current_round,
                        oracle,
                    },
                );
                if room.current_round == 1 {
                    for p in room.connected_players() {
                        let Some(role) = p.role else { continue };
                        let personality = p.is_traitor().then(|| room.personality.clone()).flatten();
                        fx.to(
                            p.session_id.clone(),
                            ServerEvent::RoleAssigned { role, personality },
                        );
                    }
                }
                fx.after(FlowEvent::StartRound, config.oracle_reveal_delay);
                Ok(Flow::Done(()))
            })
            .await
    }

    pub(super) async fn start_round(
        &self,
        ev: &ScheduledEvent,
    ) -> Result<LockOutcome<Room>, AppError> {
        let stamp = ev.stamp;
        let config = &self.config;
        let rng = &self.rng;
        self.txn
            .run(&ev.room_id, move |room, fx| {
                if !room.is_phase(Phase::Oracle) || !stamp.matches(room) {
                    return Ok(Flow::Skip(STALE));
                }

                let mut slots = WordSlot::ALL.to_vec();
                rng.shuffle(&mut slots);
                room.assign_slots(&slots);
                room.set_phase(Some(Phase::CardSelect));

                let assignment: BTreeMap<_, _> = room
                    .players
                    .iter()
                    .filter_map(|p| Some((p.session_id.clone(), p.word_slot?)))
                    .collect();
                fx.broadcast(
                    room,
                    ServerEvent::RoundStarted {
                        round: room.current_round,
                        slots: assignment,
                        timeout_ms: config.card_select_timeout.as_millis() as u64,
                    },
                );
                fx.after(FlowEvent::DeliverCards, config.card_delivery_delay);
                fx.after(FlowEvent::CardTimeout, config.card_select_timeout);
                info!(room_id = %room.id, round = room.current_round, "round started");
                Ok(Flow::Done(()))
            })
            .await
    }

    /// Deal each player a private hand from their slot's deck.
    pub(super) async fn deliver_cards(
        &self,
        ev: &ScheduledEvent,
    ) -> Result<LockOutcome<Room>, AppError> {
        let stamp = ev.stamp;
        let per_hand = self.config.cards_per_hand;
        let rng = &self.rng;
        self.txn
            .run(&ev.room_id, move |room, fx| {
                if !room.is_phase(Phase::CardSelect) || !stamp.matches(room) {
                    return Ok(Flow::Skip(STALE));
                }
                if room.players.iter().all(|p| !p.hand.is_empty()) {
                    return Ok(Flow::Skip("cards already dealt"));
                }

                let round = room.current_round;
                for p in room.players.iter_mut() {
                    let Some(slot) = p.word_slot else { continue };
                    if !p.hand.is_empty() {
                        continue;
                    }
                    p.hand = deal(slot, per_hand, rng);
                    if p.is_connected() {
                        fx.to(
                            p.session_id.clone(),
                            ServerEvent::CardsDealt {
                                round,
                                slot,
                                cards: p.hand.clone(),
                            },
                        );
                    }
                }
                Ok(Flow::Done(()))
            })
            .await
    }

    /// Card deadline: pick for everyone still missing, then judge.
    pub(super) async fn card_timeout(
        &self,
        ev: &ScheduledEvent,
    ) -> Result<LockOutcome<Room>, AppError> {
        let stamp = ev.stamp;
        let per_hand = self.config.cards_per_hand;
        let rng = &self.rng;
        self.txn
            .run(&ev.room_id, move |room, fx| {
                if !room.is_phase(Phase::CardSelect) || !stamp.matches(room) {
                    return Ok(Flow::Skip(STALE));
                }
                if room.all_selected() {
                    return Ok(Flow::Skip("all cards already in"));
                }

                let missing: Vec<String> = room
                    .connected_players()
                    .filter(|p| p.selected_card.is_none())
                    .map(|p| p.session_id.clone())
                    .collect();
                for sid in &missing {
                    let Some(player) = room.player_mut(sid) else {
                        continue;
                    };
                    let Some(slot) = player.word_slot else {
                        continue;
                    };
                    if player.hand.is_empty() {
                        player.hand = deal(slot, per_hand, rng);
                    }
                    let Some(card) = rng.pick(&player.hand).cloned() else {
                        continue;
                    };
                    room.record_selection(sid, &card)?;
                }
                debug!(room_id = %room.id, filled = missing.len(), "cards auto-filled");

                fx.broadcast(
                    room,
                    ServerEvent::CardsAutoFilled {
                        session_ids: missing,
                    },
                );
                fx.broadcast(
                    room,
                    ServerEvent::AllCardsSelected {
                        round: room.current_round,
                    },
                );
                fx.now(FlowEvent::JudgeRound);
                Ok(Flow::Done(()))
            })
            .await
    }
}
