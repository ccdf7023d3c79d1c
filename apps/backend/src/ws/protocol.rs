use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{Role, RoomSummary, RoomView, RoundHistory, SessionId, WordSlot};
use crate::error::AppError;
use crate::errors::ErrorCode;

/// Raw inbound frame: `{ "action": "...", "payload": { ... } }`.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientEnvelope {
    pub action: String,
    #[serde(default)]
    pub payload: Value,
}

/// A validated client action.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientAction {
    CreateRoom { title: Option<String> },
    JoinByCode { room_code: String },
    QuickJoin,
    LeaveRoom,
    GetRoomList,
    SetNickname { nickname: String },
    Ready { ready: bool },
    StartGame,
    SelectCard { card: String },
    ProposeVote { agree: bool },
    CastVote { target_session_id: Option<SessionId> },
    BackToRoom,
    SendChat { message: String },
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct CreateRoomPayload {
    title: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JoinByCodePayload {
    room_code: String,
}

#[derive(Deserialize)]
struct NicknamePayload {
    nickname: String,
}

#[derive(Deserialize)]
struct ReadyPayload {
    ready: bool,
}

#[derive(Deserialize)]
struct CardPayload {
    card: String,
}

#[derive(Deserialize)]
struct ProposalPayload {
    agree: bool,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct CastVotePayload {
    target_session_id: Option<String>,
}

#[derive(Deserialize)]
struct ChatPayload {
    message: String,
}

/// Missing payloads are treated as `{}` so optional fields still default.
fn payload<T: DeserializeOwned>(action: &str, raw: Value) -> Result<T, AppError> {
    let raw = if raw.is_null() {
        Value::Object(Default::default())
    } else {
        raw
    };
    serde_json::from_value(raw).map_err(|err| {
        AppError::bad_request(
            ErrorCode::BadRequest,
            format!("Invalid payload for {action}: {err}"),
        )
    })
}

impl ClientAction {
    /// Parse one text frame into an action.
    pub fn parse(text: &str) -> Result<Self, AppError> {
        let envelope: ClientEnvelope = serde_json::from_str(text).map_err(|err| {
            AppError::bad_request(ErrorCode::BadRequest, format!("Malformed message: {err}"))
        })?;
        Self::from_envelope(envelope)
    }

    pub fn from_envelope(envelope: ClientEnvelope) -> Result<Self, AppError> {
        let ClientEnvelope { action, payload: raw } = envelope;
        let parsed = match action.as_str() {
            "CREATE_ROOM" => {
                let p: CreateRoomPayload = payload(&action, raw)?;
                ClientAction::CreateRoom { title: p.title }
            }
            "JOIN_BY_CODE" => {
                let p: JoinByCodePayload = payload(&action, raw)?;
                ClientAction::JoinByCode {
                    room_code: p.room_code,
                }
            }
            "QUICK_JOIN" => ClientAction::QuickJoin,
            "LEAVE_ROOM" => ClientAction::LeaveRoom,
            "GET_ROOM_LIST" => ClientAction::GetRoomList,
            "SET_NICKNAME" => {
                let p: NicknamePayload = payload(&action, raw)?;
                ClientAction::SetNickname {
                    nickname: p.nickname,
                }
            }
            "READY" => {
                let p: ReadyPayload = payload(&action, raw)?;
                ClientAction::Ready { ready: p.ready }
            }
            "START_GAME" => ClientAction::StartGame,
            "SELECT_CARD" => {
                let p: CardPayload = payload(&action, raw)?;
                ClientAction::SelectCard { card: p.card }
            }
            "PROPOSE_VOTE" => {
                let p: ProposalPayload = payload(&action, raw)?;
                ClientAction::ProposeVote { agree: p.agree }
            }
            "CAST_VOTE" => {
                let p: CastVotePayload = payload(&action, raw)?;
                ClientAction::CastVote {
                    target_session_id: p.target_session_id,
                }
            }
            "BACK_TO_ROOM" => ClientAction::BackToRoom,
            "SEND_CHAT" => {
                let p: ChatPayload = payload(&action, raw)?;
                ClientAction::SendChat { message: p.message }
            }
            other => {
                return Err(AppError::bad_request(
                    ErrorCode::UnknownAction,
                    format!("Unknown action '{other}'"),
                ))
            }
        };
        Ok(parsed)
    }

    /// Wire name, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            ClientAction::CreateRoom { .. } => "CREATE_ROOM",
            ClientAction::JoinByCode { .. } => "JOIN_BY_CODE",
            ClientAction::QuickJoin => "QUICK_JOIN",
            ClientAction::LeaveRoom => "LEAVE_ROOM",
            ClientAction::GetRoomList => "GET_ROOM_LIST",
            ClientAction::SetNickname { .. } => "SET_NICKNAME",
            ClientAction::Ready { .. } => "READY",
            ClientAction::StartGame => "START_GAME",
            ClientAction::SelectCard { .. } => "SELECT_CARD",
            ClientAction::ProposeVote { .. } => "PROPOSE_VOTE",
            ClientAction::CastVote { .. } => "CAST_VOTE",
            ClientAction::BackToRoom => "BACK_TO_ROOM",
            ClientAction::SendChat { .. } => "SEND_CHAT",
        }
    }
}

/// Outbound frame: `{ "event": "...", "payload": { ... } }`.
#[allow(clippy::large_enum_variant)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    RoomJoined {
        session_id: SessionId,
        room: RoomView,
    },
    #[serde(rename_all = "camelCase")]
    RoomUpdated { room: RoomView },
    #[serde(rename_all = "camelCase")]
    RoomLeft { room_id: String },
    #[serde(rename_all = "camelCase")]
    RoomList { rooms: Vec<RoomSummary> },
    #[serde(rename_all = "camelCase")]
    RoomClosed { room_id: String },
    #[serde(rename_all = "camelCase")]
    RoomReset { room: RoomView },
    #[serde(rename_all = "camelCase")]
    Kicked { room_id: String, reason: String },
    #[serde(rename_all = "camelCase")]
    NicknameSet { nickname: String },

    #[serde(rename_all = "camelCase")]
    GameCountdown { room_id: String, seconds: u64 },
    #[serde(rename_all = "camelCase")]
    GameStartCancelled { room: RoomView, reason: String },
    #[serde(rename_all = "camelCase")]
    LoadGameScene { room: RoomView },
    #[serde(rename_all = "camelCase")]
    OracleRevealed { round: u32, oracle: String },
    /// Sent privately; only the traitor learns the god personality.
    #[serde(rename_all = "camelCase")]
    RoleAssigned {
        role: Role,
        personality: Option<String>,
    },

    #[serde(rename_all = "camelCase")]
    RoundStarted {
        round: u32,
        slots: BTreeMap<SessionId, WordSlot>,
        timeout_ms: u64,
    },
    #[serde(rename_all = "camelCase")]
    CardsDealt {
        round: u32,
        slot: WordSlot,
        cards: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    CardSelected {
        session_id: SessionId,
        selected: usize,
        total: usize,
    },
    #[serde(rename_all = "camelCase")]
    CardsAutoFilled { session_ids: Vec<SessionId> },
    #[serde(rename_all = "camelCase")]
    AllCardsSelected { round: u32 },
    #[serde(rename_all = "camelCase")]
    JudgingStarted { round: u32, sentence: String },
    #[serde(rename_all = "camelCase")]
    RoundResult {
        round: u32,
        sentence: String,
        score: i32,
        commentary: String,
        vitality: i32,
        fallback: bool,
    },

    #[serde(rename_all = "camelCase")]
    VoteProposalStarted { round: u32, timeout_ms: u64 },
    #[serde(rename_all = "camelCase")]
    VoteProposalUpdated {
        ballots: usize,
        agree: usize,
        needed: usize,
    },
    #[serde(rename_all = "camelCase")]
    VoteProposalFailed { agree: usize, needed: usize },
    #[serde(rename_all = "camelCase")]
    VoteProposalSkipped { round: u32 },
    #[serde(rename_all = "camelCase")]
    TrialStarted {
        round: u32,
        vitality: i32,
        timeout_ms: u64,
    },
    #[serde(rename_all = "camelCase")]
    TrialVoteUpdated { ballots: usize, total: usize },
    #[serde(rename_all = "camelCase")]
    TrialResult {
        accused: Option<SessionId>,
        votes: usize,
        was_traitor: Option<bool>,
        vitality_delta: i32,
        vitality: i32,
        voting_disabled: bool,
    },
    #[serde(rename_all = "camelCase")]
    NextRound { round: u32 },

    #[serde(rename_all = "camelCase")]
    GameOver {
        winner: Role,
        traitor_session_id: Option<SessionId>,
        vitality: i32,
        history: Vec<RoundHistory>,
    },
    #[serde(rename_all = "camelCase")]
    ReturnUpdated {
        returned: Vec<SessionId>,
        total: usize,
    },
    #[serde(rename_all = "camelCase")]
    ChatMessage {
        session_id: SessionId,
        nickname: String,
        message: String,
        sent_at: i64,
    },
    #[serde(rename_all = "camelCase")]
    Error { code: String, message: String },
}

impl ServerEvent {
    pub fn error(err: &AppError) -> Self {
        ServerEvent::Error {
            code: err.code().as_str().to_string(),
            message: err.client_message(),
        }
    }

    /// Wire name, for logging and test assertions.
    pub fn name(&self) -> String {
        serde_json::to_value(self)
            .ok()
            .and_then(|v| v.get("event").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_default()
    }

    pub fn to_json(&self) -> Result<String, AppError> {
        Ok(serde_json::to_string(self)?)
    }
}
