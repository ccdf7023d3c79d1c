use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::error::AppError;
use crate::services::game_flow::GameFlowService;
use crate::ws::messenger::Messenger;
use crate::ws::protocol::{ClientAction, ServerEvent};

/// Entry point for everything a connection does: attach, act, detach.
///
/// Transport-agnostic so tests can drive it without a websocket.
pub struct ActionRouter {
    flow: Arc<GameFlowService>,
    messenger: Arc<Messenger>,
}

impl ActionRouter {
    pub fn new(flow: Arc<GameFlowService>, messenger: Arc<Messenger>) -> Self {
        Self { flow, messenger }
    }

    /// Register a session on this process; frames for it arrive on the
    /// returned receiver.
    pub fn connect(&self, session_id: &str) -> mpsc::UnboundedReceiver<String> {
        self.messenger.registry().register(session_id)
    }

    /// Connection closed: run the implicit leave, then detach. The nickname
    /// lives in the registry entry, so detaching must come last.
    pub async fn disconnect(&self, session_id: &str) {
        self.flow.disconnect(session_id).await;
        self.messenger.registry().unregister(session_id);
    }

    /// The connection is still alive; keep its reservations fresh.
    pub async fn keep_alive(&self, session_id: &str) {
        self.flow.refresh_nickname(session_id).await;
    }

    pub async fn handle_text(&self, session_id: &str, text: &str) {
        match ClientAction::parse(text) {
            Ok(action) => self.handle(session_id, action).await,
            Err(err) => self.reject(session_id, "PARSE", &err).await,
        }
    }

    pub async fn handle(&self, session_id: &str, action: ClientAction) {
        let name = action.name();
        debug!(session_id, action = name, "client action");

        let result = match action {
            ClientAction::CreateRoom { title } => self.flow.create_room(session_id, title).await,
            ClientAction::JoinByCode { room_code } => {
                self.flow.join_by_code(session_id, &room_code).await
            }
            ClientAction::QuickJoin => self.flow.quick_join(session_id).await,
            ClientAction::LeaveRoom => self.flow.leave_room(session_id).await,
            ClientAction::GetRoomList => self.flow.room_list(session_id).await,
            ClientAction::SetNickname { nickname } => {
                self.flow.set_nickname(session_id, &nickname).await
            }
            ClientAction::Ready { ready } => self.flow.set_ready(session_id, ready).await,
            ClientAction::StartGame => self.flow.try_start(session_id).await,
            ClientAction::SelectCard { card } => self.flow.select_card(session_id, &card).await,
            ClientAction::ProposeVote { agree } => self.flow.propose_vote(session_id, agree).await,
            ClientAction::CastVote { target_session_id } => {
                self.flow.cast_vote(session_id, target_session_id).await
            }
            ClientAction::BackToRoom => self.flow.back_to_room(session_id).await,
            ClientAction::SendChat { message } => self.flow.send_chat(session_id, &message).await,
        };

        if let Err(err) = result {
            self.reject(session_id, name, &err).await;
        }
    }

    async fn reject(&self, session_id: &str, action: &str, err: &AppError) {
        if err.is_client_error() || matches!(err, AppError::LockBusy { .. }) {
            debug!(session_id, action, code = %err.code(), error = %err, "action rejected");
        } else {
            error!(session_id, action, error = %err, "action failed");
        }
        self.messenger
            .send(session_id, &ServerEvent::error(err))
            .await;
    }
}
