//! Round advancement, game end and the return-to-lobby flow.

use tracing::info;

use super::{GameFlowService, STALE};
use crate::config::GameConfig;
use crate::domain::{sample_without_repeat, GameRng, Phase, Room, RoomStatus, RoomView, ORACLES};
use crate::error::AppError;
use crate::lock::{Flow, LockOutcome};
use crate::services::audit::GameRecord;
use crate::services::room_txn::Effects;
use crate::services::scheduler::{FlowEvent, ScheduledEvent};
use crate::utils::clock::now_ms;
use crate::ws::protocol::ServerEvent;

const KICK_REASON: &str = "You did not return to the room";

impl GameFlowService {
    pub(super) async fn start_next_round(
        &self,
        ev: &ScheduledEvent,
    ) -> Result<LockOutcome<Room>, AppError> {
        let stamp = ev.stamp;
        let config = &self.config;
        let rng = &self.rng;
        self.txn
            .run(&ev.room_id, move |room, fx| {
                let between_rounds =
                    matches!(room.current_phase, None | Some(Phase::TrialResult));
                if room.status != RoomStatus::Playing || !stamp.matches(room) || !between_rounds {
                    return Ok(Flow::Skip(STALE));
                }

                if room.current_round >= config.max_rounds || room.vitality <= 0 {
                    fx.now(FlowEvent::GameOver);
                    return Ok(Flow::Done(()));
                }

                room.current_round += 1;
                room.oracle = sample_without_repeat(ORACLES, &mut room.used_oracles, rng);
                room.set_phase(None);
                fx.broadcast(
                    room,
                    ServerEvent::NextRound {
                        round: room.current_round,
                    },
                );
                fx.after(FlowEvent::StartOracle, config.round_transition_delay);
                Ok(Flow::Done(()))
            })
            .await
    }

    /// PLAYING → GAME_OVER. A second game-over for the same game is a no-op.
    pub(super) async fn game_over(
        &self,
        ev: &ScheduledEvent,
    ) -> Result<LockOutcome<Room>, AppError> {
        let stamp = ev.stamp;
        let config = &self.config;
        self.txn
            .run(&ev.room_id, move |room, fx| {
                if room.status != RoomStatus::Playing || room.generation != stamp.generation {
                    return Ok(Flow::Skip(STALE));
                }

                room.set_status(RoomStatus::GameOver);
                let winner = room.winner();
                fx.broadcast(
                    room,
                    ServerEvent::GameOver {
                        winner,
                        traitor_session_id: room.traitor().map(|p| p.session_id.clone()),
                        vitality: room.vitality,
                        history: room.history.clone(),
                    },
                );
                fx.audit(GameRecord::from_room(room, now_ms()));
                fx.after(FlowEvent::Cleanup, config.cleanup_delay);
                info!(room_id = %room.id, ?winner, vitality = room.vitality, "game over");
                Ok(Flow::Done(()))
            })
            .await
    }

    /// Forced end of the return window.
    pub(super) async fn cleanup(&self, ev: &ScheduledEvent) -> Result<LockOutcome<Room>, AppError> {
        let stamp = ev.stamp;
        let config = &self.config;
        let rng = &self.rng;
        self.txn
            .run(&ev.room_id, move |room, fx| {
                if room.status != RoomStatus::GameOver || room.generation != stamp.generation {
                    return Ok(Flow::Skip(STALE));
                }
                Self::finalize(room, fx, rng, config);
                Ok(Flow::Done(()))
            })
            .await
    }

    /// Close the room when nobody opted to return; otherwise reset it into a
    /// fresh lobby holding only those who did.
    pub(super) fn finalize(room: &mut Room, fx: &mut Effects, rng: &GameRng, config: &GameConfig) {
        let keep = room.returned_sessions();

        if keep.is_empty() {
            for p in &room.players {
                fx.unbind(p.session_id.clone());
            }
            fx.broadcast(
                room,
                ServerEvent::RoomClosed {
                    room_id: room.id.clone(),
                },
            );
            fx.delete_room();
            info!(room_id = %room.id, "room closed after game");
            return;
        }

        let vitality = rng.range_inclusive(config.vitality_min, config.vitality_max);
        let kicked = room.reset_for_lobby(&keep, vitality);
        for p in kicked {
            fx.unbind(p.session_id.clone());
            if p.is_connected() {
                fx.to(
                    p.session_id,
                    ServerEvent::Kicked {
                        room_id: room.id.clone(),
                        reason: KICK_REASON.to_string(),
                    },
                );
            }
        }
        fx.mark_waiting(true);
        fx.broadcast(
            room,
            ServerEvent::RoomReset {
                room: RoomView::from(&*room),
            },
        );
        info!(room_id = %room.id, players = room.players.len(), "room reset to lobby");
    }
}
