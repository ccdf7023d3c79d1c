//! Player state owned by the room aggregate.

use serde::{Deserialize, Serialize};

use super::content::WordSlot;

pub type SessionId = String;

/// Hidden role assigned once per game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Citizen,
    Traitor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

/// Seat color, unique within a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlayerColor {
    Red,
    Blue,
    Green,
    Yellow,
    Purple,
    Orange,
    Pink,
    Teal,
}

impl PlayerColor {
    pub const ALL: [PlayerColor; 8] = [
        PlayerColor::Red,
        PlayerColor::Blue,
        PlayerColor::Green,
        PlayerColor::Yellow,
        PlayerColor::Purple,
        PlayerColor::Orange,
        PlayerColor::Pink,
        PlayerColor::Teal,
    ];
}

/// A trial ballot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrialVote {
    Target(SessionId),
    Abstain,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub session_id: SessionId,
    pub nickname: String,
    pub is_host: bool,
    pub color: PlayerColor,
    pub role: Option<Role>,
    pub word_slot: Option<WordSlot>,
    /// Cards dealt for the current round.
    #[serde(default)]
    pub hand: Vec<String>,
    pub selected_card: Option<String>,
    pub vote_target: Option<TrialVote>,
    pub connection: ConnectionStatus,
}

impl Player {
    pub fn new(session_id: impl Into<SessionId>, nickname: impl Into<String>, color: PlayerColor) -> Self {
        Self {
            session_id: session_id.into(),
            nickname: nickname.into(),
            is_host: false,
            color,
            role: None,
            word_slot: None,
            hand: Vec::new(),
            selected_card: None,
            vote_target: None,
            connection: ConnectionStatus::Connected,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection == ConnectionStatus::Connected
    }

    pub fn is_traitor(&self) -> bool {
        self.role == Some(Role::Traitor)
    }

    /// Clear everything that only lives for one round.
    pub(crate) fn reset_round(&mut self) {
        self.word_slot = None;
        self.hand.clear();
        self.selected_card = None;
        self.vote_target = None;
    }

    /// Clear everything that only lives for one game.
    pub(crate) fn reset_game(&mut self) {
        self.reset_round();
        self.role = None;
    }
}
