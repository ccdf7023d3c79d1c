//! Room creation, membership and lobby chatter.

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{user_result, GameFlowService};
use crate::domain::{Player, PlayerColor, Room, RoomId, RoomStatus, RoomSummary, RoomView};
use crate::error::AppError;
use crate::errors::ErrorCode;
use crate::lock::{Flow, LockOutcome};
use crate::services::nicknames::Nickname;
use crate::services::room_txn::{Effects, ROOM_GONE};
use crate::services::scheduler::RetryPolicy;
use crate::utils::clock::now_ms;
use crate::utils::join_code::{generate_room_code, normalize_room_code};
use crate::ws::protocol::ServerEvent;

const CODE_ATTEMPTS: usize = 5;
const MAX_TITLE_CHARS: usize = 30;
const MAX_CHAT_CHARS: usize = 200;

impl GameFlowService {
    // ------------------------------------------------------------------
    // Nicknames
    // ------------------------------------------------------------------

    /// Reserve a nickname for a session outside any room.
    pub async fn set_nickname(&self, session_id: &str, raw: &str) -> Result<(), AppError> {
        let nickname = Nickname::parse(raw)?;
        if self.store().session_room(session_id).await?.is_some() {
            return Err(AppError::invalid(
                ErrorCode::AlreadyInRoom,
                "Nickname cannot change while in a room",
            ));
        }

        let registry = self.txn.messenger().registry();
        let current = registry
            .nickname(session_id)
            .and_then(|n| Nickname::parse(&n).ok());

        if current.as_ref().map(|c| &c.key) != Some(&nickname.key) {
            if !self
                .nicknames
                .reserve(&nickname.key, session_id, self.config.nickname_ttl)
                .await?
            {
                return Err(AppError::invalid(
                    ErrorCode::NicknameTaken,
                    "That nickname is already taken",
                ));
            }
            if let Some(old) = current {
                self.nicknames.release(&old.key, session_id).await?;
            }
        }

        registry.set_nickname(session_id, Some(nickname.display.clone()));
        self.txn
            .messenger()
            .send(
                session_id,
                &ServerEvent::NicknameSet {
                    nickname: nickname.display,
                },
            )
            .await;
        Ok(())
    }

    /// Give up the session's nickname reservation.
    pub async fn release_nickname(&self, session_id: &str) {
        let registry = self.txn.messenger().registry();
        let Some(nickname) = registry.nickname(session_id) else {
            return;
        };
        registry.set_nickname(session_id, None);
        if let Ok(parsed) = Nickname::parse(&nickname) {
            if let Err(err) = self.nicknames.release(&parsed.key, session_id).await {
                warn!(session_id, error = %err, "failed to release nickname");
            }
        }
    }

    /// Extend the session's nickname reservation. Called on connection
    /// keep-alive.
    pub async fn refresh_nickname(&self, session_id: &str) {
        let Some(nickname) = self.txn.messenger().registry().nickname(session_id) else {
            return;
        };
        let Ok(parsed) = Nickname::parse(&nickname) else {
            return;
        };
        match self
            .nicknames
            .reserve(&parsed.key, session_id, self.config.nickname_ttl)
            .await
        {
            Ok(true) => {}
            Ok(false) => warn!(
                session_id,
                nickname = %nickname,
                "nickname reservation lost to another session"
            ),
            Err(err) => warn!(session_id, error = %err, "failed to refresh nickname"),
        }
    }

    async fn require_lobby_entry(&self, session_id: &str) -> Result<String, AppError> {
        let nickname = self
            .txn
            .messenger()
            .registry()
            .nickname(session_id)
            .ok_or_else(|| {
                AppError::invalid(ErrorCode::NicknameRequired, "Set a nickname first")
            })?;
        if self.store().session_room(session_id).await?.is_some() {
            return Err(AppError::invalid(
                ErrorCode::AlreadyInRoom,
                "You are already in a room",
            ));
        }
        Ok(nickname)
    }

    // ------------------------------------------------------------------
    // Create / join
    // ------------------------------------------------------------------

    pub async fn create_room(
        &self,
        session_id: &str,
        title: Option<String>,
    ) -> Result<(), AppError> {
        let nickname = self.require_lobby_entry(session_id).await?;

        let room_id = Uuid::new_v4().to_string();
        let code = self.reserve_code(&room_id).await?;
        let title = title
            .map(|t| t.trim().chars().take(MAX_TITLE_CHARS).collect::<String>())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| format!("{nickname}'s room"));
        let vitality = self
            .rng
            .range_inclusive(self.config.vitality_min, self.config.vitality_max);
        let host = Player::new(session_id, nickname, PlayerColor::ALL[0]);
        let room = Room::new(room_id.clone(), code, title, host, vitality, now_ms());

        let created = self
            .txn
            .locks()
            .with_lock(&room_id, || async {
                let mut fx = Effects::default();
                fx.mark_waiting(true);
                fx.bind(session_id);
                fx.to(
                    session_id,
                    ServerEvent::RoomJoined {
                        session_id: session_id.to_string(),
                        room: RoomView::from(&room),
                    },
                );
                self.txn.commit(&room, fx).await?;
                Ok(Flow::Done(()))
            })
            .await
            .and_then(LockOutcome::into_user_result);
        if let Err(err) = created {
            self.discard_unborn_room(&room, session_id).await;
            return Err(err);
        }

        info!(room_id = %room.id, code = %room.code, session_id, "room created");
        Ok(())
    }

    /// Undo whatever a failed create managed to write, code binding first.
    async fn discard_unborn_room(&self, room: &Room, session_id: &str) {
        if let Err(err) = self.store().delete_room(room).await {
            warn!(
                room_id = %room.id,
                code = %room.code,
                error = %err,
                "failed to discard new room"
            );
        }
        if let Err(err) = self.store().unbind_session(session_id).await {
            warn!(room_id = %room.id, session_id, error = %err, "failed to unbind creator");
        }
    }

    async fn reserve_code(&self, room_id: &str) -> Result<String, AppError> {
        for _ in 0..CODE_ATTEMPTS {
            let code = generate_room_code(&self.rng);
            if self.store().bind_code(&code, room_id).await? {
                return Ok(code);
            }
            debug!(code, "room code collision, retrying");
        }
        Err(AppError::internal(
            ErrorCode::StoreError,
            "Could not allocate a unique room code",
            std::io::Error::other("room code collisions exhausted attempts"),
        ))
    }

    pub async fn join_by_code(&self, session_id: &str, raw_code: &str) -> Result<(), AppError> {
        let nickname = self.require_lobby_entry(session_id).await?;
        let code = normalize_room_code(raw_code);
        let room_id = self
            .store()
            .room_id_for_code(&code)
            .await?
            .ok_or_else(|| AppError::not_found(ErrorCode::RoomNotFound, "No room with that code"))?;
        user_result(self.join_room(session_id, &nickname, &room_id).await?)
    }

    /// Join the first waiting room that accepts the session.
    pub async fn quick_join(&self, session_id: &str) -> Result<(), AppError> {
        let nickname = self.require_lobby_entry(session_id).await?;

        for room_id in self.store().waiting_rooms().await? {
            match self.join_room(session_id, &nickname, &room_id).await {
                Ok(LockOutcome::Success(_)) => return Ok(()),
                Ok(LockOutcome::Skipped(ROOM_GONE)) => {
                    self.store().remove_waiting(&room_id).await?;
                }
                Ok(_) => {}
                Err(err) if err.is_client_error() => {
                    debug!(room_id = %room_id, error = %err, "quick join candidate rejected");
                }
                Err(err) => return Err(err),
            }
        }

        Err(AppError::not_found(
            ErrorCode::NoAvailableRoom,
            "No open room available",
        ))
    }

    async fn join_room(
        &self,
        session_id: &str,
        nickname: &str,
        room_id: &RoomId,
    ) -> Result<LockOutcome<Room>, AppError> {
        let capacity = self.config.player_count;
        self.txn
            .run(room_id, move |room, fx| {
                if room.status != RoomStatus::Waiting {
                    return Err(AppError::invalid(
                        ErrorCode::GameInProgress,
                        "That game has already started",
                    ));
                }
                room.add_player(session_id, nickname, capacity)?;
                fx.bind(session_id);
                fx.to(
                    session_id,
                    ServerEvent::RoomJoined {
                        session_id: session_id.to_string(),
                        room: RoomView::from(&*room),
                    },
                );
                let others = room
                    .connected_players()
                    .filter(|p| p.session_id != session_id)
                    .map(|p| p.session_id.clone())
                    .collect();
                fx.outbox.to_many(
                    others,
                    ServerEvent::RoomUpdated {
                        room: RoomView::from(&*room),
                    },
                );
                Ok(Flow::Done(()))
            })
            .await
    }

    // ------------------------------------------------------------------
    // Leave / disconnect
    // ------------------------------------------------------------------

    /// Explicit LEAVE_ROOM. Not being in a room is a silent success.
    pub async fn leave_room(&self, session_id: &str) -> Result<(), AppError> {
        match self.depart(session_id, true).await? {
            LockOutcome::LockFailed => Err(AppError::lock_busy("room busy while leaving")),
            _ => Ok(()),
        }
    }

    /// Connection closed: leave the room (retrying on contention) and drop
    /// the nickname reservation.
    pub async fn disconnect(&self, session_id: &str) {
        let retry = RetryPolicy::from_config(&self.config);
        let mut attempt = 1u32;
        loop {
            match self.depart(session_id, false).await {
                Ok(LockOutcome::LockFailed) => {
                    debug!(session_id, attempt, "room busy during disconnect, retrying");
                    tokio::time::sleep(retry.delay(attempt)).await;
                    attempt = attempt.saturating_add(1);
                }
                Ok(_) => break,
                Err(err) => {
                    warn!(session_id, error = %err, "disconnect cleanup failed");
                    break;
                }
            }
        }
        self.release_nickname(session_id).await;
    }

    async fn depart(
        &self,
        session_id: &str,
        notify: bool,
    ) -> Result<LockOutcome<Room>, AppError> {
        let Some(room_id) = self.store().session_room(session_id).await? else {
            return Ok(LockOutcome::Skipped("not in a room"));
        };

        let config = &self.config;
        let outcome = self
            .txn
            .run(&room_id, move |room, fx| {
                fx.unbind(session_id);
                if room.player(session_id).is_none() {
                    return Ok(Flow::Done(()));
                }

                if room.status == RoomStatus::Playing {
                    room.mark_disconnected(session_id);
                } else {
                    room.remove_player(session_id);
                }
                if notify {
                    fx.to(
                        session_id,
                        ServerEvent::RoomLeft {
                            room_id: room.id.clone(),
                        },
                    );
                }

                if !room.has_connected_players() {
                    for p in &room.players {
                        fx.unbind(p.session_id.clone());
                    }
                    fx.delete_room();
                    info!(room_id = %room.id, "last player left, room deleted");
                    return Ok(Flow::Done(()));
                }

                fx.broadcast(
                    room,
                    ServerEvent::RoomUpdated {
                        room: RoomView::from(&*room),
                    },
                );
                match room.status {
                    RoomStatus::Waiting => fx.mark_waiting(true),
                    RoomStatus::Playing => Self::advance_after_departure(room, fx, config),
                    RoomStatus::GameOver => {
                        if room.all_connected_returned() {
                            Self::finalize(room, fx, &self.rng, config);
                        }
                    }
                    // processStart re-checks the head count.
                    RoomStatus::Starting => {}
                }
                Ok(Flow::Done(()))
            })
            .await?;

        if let LockOutcome::Skipped(ROOM_GONE) = outcome {
            self.store().unbind_session(session_id).await?;
        }
        Ok(outcome)
    }

    // ------------------------------------------------------------------
    // Lobby queries and chatter
    // ------------------------------------------------------------------

    /// Send the joinable-room list to the session, pruning stale entries.
    pub async fn room_list(&self, session_id: &str) -> Result<(), AppError> {
        let capacity = self.config.player_count;
        let mut rooms = Vec::new();
        for room_id in self.store().waiting_rooms().await? {
            match self.store().load_room(&room_id).await? {
                Some(room) if room.status == RoomStatus::Waiting => {
                    rooms.push(RoomSummary::new(&room, capacity));
                }
                Some(_) => {}
                None => self.store().remove_waiting(&room_id).await?,
            }
        }
        rooms.sort_by_key(|r| std::cmp::Reverse(r.player_count));

        self.txn
            .messenger()
            .send(session_id, &ServerEvent::RoomList { rooms })
            .await;
        Ok(())
    }

    pub async fn set_ready(&self, session_id: &str, ready: bool) -> Result<(), AppError> {
        let room_id = self.room_of(session_id).await?;
        let outcome = self
            .txn
            .run(&room_id, move |room, fx| {
                room.set_ready(session_id, ready)?;
                fx.broadcast(
                    room,
                    ServerEvent::RoomUpdated {
                        room: RoomView::from(&*room),
                    },
                );
                Ok(Flow::Done(()))
            })
            .await?;
        user_result(outcome)
    }

    /// Relay a chat line to the sender's room. Read-only, so no lease.
    pub async fn send_chat(&self, session_id: &str, message: &str) -> Result<(), AppError> {
        let message = message.trim();
        let len = message.chars().count();
        if len == 0 || len > MAX_CHAT_CHARS {
            return Err(AppError::invalid(
                ErrorCode::InvalidMessage,
                format!("Messages must be 1-{MAX_CHAT_CHARS} characters"),
            ));
        }

        let room_id = self.room_of(session_id).await?;
        let room = self
            .store()
            .load_room(&room_id)
            .await?
            .ok_or_else(|| AppError::not_found(ErrorCode::RoomNotFound, "Room no longer exists"))?;
        let sender = room.require_active(session_id)?;

        let event = ServerEvent::ChatMessage {
            session_id: session_id.to_string(),
            nickname: sender.nickname.clone(),
            message: message.to_string(),
            sent_at: now_ms(),
        };
        self.txn.messenger().broadcast(&room, &event).await;
        Ok(())
    }
}
