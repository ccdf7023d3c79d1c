//! Client-facing projections of the room aggregate.
//!
//! Roles, hands and the god personality never appear here; they are sent
//! privately to the players entitled to see them.

use serde::{Deserialize, Serialize};

use super::content::WordSlot;
use super::player::{Player, PlayerColor};
use super::room::{Phase, Room, RoomStatus, RoundHistory};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub session_id: String,
    pub nickname: String,
    pub is_host: bool,
    pub color: PlayerColor,
    pub connected: bool,
    pub ready: bool,
    pub word_slot: Option<WordSlot>,
    pub has_selected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomView {
    pub id: String,
    pub code: String,
    pub title: String,
    pub host_session_id: String,
    pub status: RoomStatus,
    pub phase: Option<Phase>,
    pub round: u32,
    pub vitality: i32,
    pub voting_disabled: bool,
    pub oracle: Option<String>,
    pub players: Vec<PlayerView>,
    pub history: Vec<RoundHistory>,
}

/// Entry in the joinable-room list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub id: String,
    pub code: String,
    pub title: String,
    pub player_count: usize,
    pub capacity: usize,
}

impl PlayerView {
    fn from_player(room: &Room, p: &Player) -> Self {
        Self {
            session_id: p.session_id.clone(),
            nickname: p.nickname.clone(),
            is_host: p.is_host,
            color: p.color,
            connected: p.is_connected(),
            ready: room.status == RoomStatus::Waiting && room.is_ready(&p.session_id),
            word_slot: p.word_slot,
            has_selected: p.selected_card.is_some(),
        }
    }
}

impl From<&Room> for RoomView {
    fn from(room: &Room) -> Self {
        Self {
            id: room.id.clone(),
            code: room.code.clone(),
            title: room.title.clone(),
            host_session_id: room.host_session_id.clone(),
            status: room.status,
            phase: room.current_phase,
            round: room.current_round,
            vitality: room.vitality,
            voting_disabled: room.voting_disabled,
            // Drawn ahead of its reveal; hidden until a phase is running.
            oracle: room.current_phase.and(room.oracle.clone()),
            players: room
                .players
                .iter()
                .map(|p| PlayerView::from_player(room, p))
                .collect(),
            history: room.history.clone(),
        }
    }
}

impl RoomSummary {
    pub fn new(room: &Room, capacity: usize) -> Self {
        Self {
            id: room.id.clone(),
            code: room.code.clone(),
            title: room.title.clone(),
            player_count: room.players.len(),
            capacity,
        }
    }
}
