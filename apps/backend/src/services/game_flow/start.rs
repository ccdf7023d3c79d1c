use tracing::info;

use super::{user_result, GameFlowService, STALE};
use crate::domain::{sample_without_repeat, Room, RoomStatus, RoomView, ORACLES, PERSONALITIES};
use crate::error::AppError;
use crate::errors::ErrorCode;
use crate::lock::{Flow, LockOutcome};
use crate::services::scheduler::{FlowEvent, ScheduledEvent};
use crate::ws::protocol::ServerEvent;

impl GameFlowService {
    /// START_GAME from the host: WAITING → STARTING and arm the countdown.
    pub async fn try_start(&self, session_id: &str) -> Result<(), AppError> {
        let room_id = self.room_of(session_id).await?;
        let config = &self.config;
        let outcome = self
            .txn
            .run(&room_id, move |room, fx| {
                if !room.is_host(session_id) {
                    return Err(AppError::invalid(
                        ErrorCode::NotHost,
                        "Only the host can start the game",
                    ));
                }
                if room.status != RoomStatus::Waiting {
                    return Err(AppError::invalid(
                        ErrorCode::GameInProgress,
                        "The game has already started",
                    ));
                }
                if room.players.len() != config.player_count {
                    return Err(AppError::invalid(
                        ErrorCode::NotEnoughPlayers,
                        format!("Exactly {} players are needed", config.player_count),
                    ));
                }
                if !room.all_ready() {
                    return Err(AppError::invalid(
                        ErrorCode::PlayersNotReady,
                        "Not every player is ready",
                    ));
                }

                room.set_status(RoomStatus::Starting);
                fx.mark_waiting(false);
                fx.broadcast(
                    room,
                    ServerEvent::GameCountdown {
                        room_id: room.id.clone(),
                        seconds: config.start_countdown.as_secs(),
                    },
                );
                fx.after(FlowEvent::ProcessStart, config.start_countdown);
                Ok(Flow::Done(()))
            })
            .await?;
        user_result(outcome)
    }

    /// Countdown elapsed: begin the game if the table is still complete,
    /// otherwise fall back to the lobby.
    pub(super) async fn process_start(
        &self,
        ev: &ScheduledEvent,
    ) -> Result<LockOutcome<Room>, AppError> {
        let stamp = ev.stamp;
        let config = &self.config;
        let rng = &self.rng;
        self.txn
            .run(&ev.room_id, move |room, fx| {
                if room.status != RoomStatus::Starting || room.generation != stamp.generation {
                    return Ok(Flow::Skip(STALE));
                }

                if room.connected_count() != config.player_count {
                    room.set_status(RoomStatus::Waiting);
                    fx.mark_waiting(true);
                    fx.broadcast(
                        room,
                        ServerEvent::GameStartCancelled {
                            room: RoomView::from(&*room),
                            reason: "A player left before the game started".to_string(),
                        },
                    );
                    info!(room_id = %room.id, "game start cancelled");
                    return Ok(Flow::Done(()));
                }

                rng.shuffle(&mut room.players);
                let traitor = rng.index(room.players.len()).unwrap_or(0);
                room.assign_roles(traitor);
                room.oracle = sample_without_repeat(ORACLES, &mut room.used_oracles, rng);
                room.personality = rng.pick(PERSONALITIES).map(|p| p.to_string());
                room.voting_disabled = false;
                room.history.clear();
                room.current_round = 1;
                room.set_status(RoomStatus::Playing);

                fx.broadcast(
                    room,
                    ServerEvent::LoadGameScene {
                        room: RoomView::from(&*room),
                    },
                );
                fx.after(FlowEvent::StartOracle, config.scene_load_delay);
                info!(room_id = %room.id, players = room.players.len(), "game started");
                Ok(Flow::Done(()))
            })
            .await
    }
}
