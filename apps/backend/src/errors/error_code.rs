//! Error codes surfaced to clients in `ERROR` events.
//!
//! Add new codes here; never pass ad-hoc strings as error codes.
//! All codes are SCREAMING_SNAKE_CASE and map 1:1 to the strings that
//! appear on the wire.

use core::fmt;

/// Centralized error codes for the game backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Request validation
    /// Envelope could not be parsed or payload did not match the action
    BadRequest,
    /// Action name not recognized
    UnknownAction,
    /// Nickname must be set before entering a room
    NicknameRequired,
    /// Nickname failed format validation
    NicknameInvalid,
    /// Nickname already reserved by another session
    NicknameTaken,
    /// Chat message empty or too long
    InvalidMessage,

    // Room lifecycle
    /// Session already belongs to a room
    AlreadyInRoom,
    /// Session is not in a room
    NotInRoom,
    /// Room is at capacity
    RoomFull,
    /// Room is no longer accepting players
    GameInProgress,
    /// Quick join found no open room
    NoAvailableRoom,
    /// Only the host may perform this action
    NotHost,
    /// Player count does not match the configured game size
    NotEnoughPlayers,
    /// Some players have not marked themselves ready
    PlayersNotReady,

    // Gameplay
    /// Action not valid for the current phase
    PhaseMismatch,
    /// Cards have not been dealt to the player yet
    CardsNotDealt,
    /// Selected card is not in the player's hand
    CardNotInHand,
    /// Player already submitted a card this round
    AlreadySelected,
    /// Player already voted in this phase
    AlreadyVoted,
    /// Vote target is not a valid player
    InvalidTarget,

    // Resource not found
    /// Room not found
    RoomNotFound,
    /// Player not found in room
    PlayerNotFound,

    // Transient
    /// Room lock is contended; the client should retry
    TryAgain,

    // System errors
    /// Room store failure
    StoreError,
    /// Cluster bus failure
    BusError,
    /// Internal server error
    InternalError,
    /// Configuration error
    ConfigError,
    /// Stored snapshot could not be decoded
    DataCorruption,
}

impl ErrorCode {
    /// Returns the canonical SCREAMING_SNAKE_CASE string for this error code.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BadRequest => "BAD_REQUEST",
            Self::UnknownAction => "UNKNOWN_ACTION",
            Self::NicknameRequired => "NICKNAME_REQUIRED",
            Self::NicknameInvalid => "NICKNAME_INVALID",
            Self::NicknameTaken => "NICKNAME_TAKEN",
            Self::InvalidMessage => "INVALID_MESSAGE",

            Self::AlreadyInRoom => "ALREADY_IN_ROOM",
            Self::NotInRoom => "NOT_IN_ROOM",
            Self::RoomFull => "ROOM_FULL",
            Self::GameInProgress => "GAME_IN_PROGRESS",
            Self::NoAvailableRoom => "NO_AVAILABLE_ROOM",
            Self::NotHost => "NOT_HOST",
            Self::NotEnoughPlayers => "NOT_ENOUGH_PLAYERS",
            Self::PlayersNotReady => "PLAYERS_NOT_READY",

            Self::PhaseMismatch => "PHASE_MISMATCH",
            Self::CardsNotDealt => "CARDS_NOT_DEALT",
            Self::CardNotInHand => "CARD_NOT_IN_HAND",
            Self::AlreadySelected => "ALREADY_SELECTED",
            Self::AlreadyVoted => "ALREADY_VOTED",
            Self::InvalidTarget => "INVALID_TARGET",

            Self::RoomNotFound => "ROOM_NOT_FOUND",
            Self::PlayerNotFound => "PLAYER_NOT_FOUND",

            Self::TryAgain => "TRY_AGAIN",

            Self::StoreError => "STORE_ERROR",
            Self::BusError => "BUS_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
            Self::ConfigError => "CONFIG_ERROR",
            Self::DataCorruption => "DATA_CORRUPTION",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
