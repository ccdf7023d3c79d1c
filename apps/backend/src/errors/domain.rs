//! Domain-level error type used by the room aggregate.
//!
//! This error type is transport- and store-agnostic. Services return
//! `Result<T, crate::error::AppError>` and convert from `DomainError`
//! using the provided `From<DomainError> for AppError` implementation.

use std::error::Error;
use std::fmt::{Display, Formatter, Result as FmtResult};

use super::ErrorCode;

/// Rule violations raised by room/player mutators.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ValidationKind {
    RoomFull,
    AlreadyJoined,
    PhaseMismatch,
    CardsNotDealt,
    CardNotInHand,
    AlreadySelected,
    AlreadyVoted,
    InvalidTarget,
    NotHost,
    Other(String),
}

/// Domain-level not found entities
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum NotFoundKind {
    Room,
    Player,
}

/// Central domain error type
#[derive(Debug, Clone, PartialEq)]
pub enum DomainError {
    /// Input/user validation or business rule violation
    Validation(ValidationKind, String),
    /// Missing resource in domain terms
    NotFound(NotFoundKind, String),
}

impl Display for DomainError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            DomainError::Validation(kind, d) => write!(f, "validation error {kind:?}: {d}"),
            DomainError::NotFound(kind, d) => write!(f, "not found {kind:?}: {d}"),
        }
    }
}

impl Error for DomainError {}

impl DomainError {
    pub fn validation(kind: ValidationKind, detail: impl Into<String>) -> Self {
        Self::Validation(kind, detail.into())
    }

    pub fn not_found(kind: NotFoundKind, detail: impl Into<String>) -> Self {
        Self::NotFound(kind, detail.into())
    }

    /// Wire code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            DomainError::Validation(kind, _) => match kind {
                ValidationKind::RoomFull => ErrorCode::RoomFull,
                ValidationKind::AlreadyJoined => ErrorCode::AlreadyInRoom,
                ValidationKind::PhaseMismatch => ErrorCode::PhaseMismatch,
                ValidationKind::CardsNotDealt => ErrorCode::CardsNotDealt,
                ValidationKind::CardNotInHand => ErrorCode::CardNotInHand,
                ValidationKind::AlreadySelected => ErrorCode::AlreadySelected,
                ValidationKind::AlreadyVoted => ErrorCode::AlreadyVoted,
                ValidationKind::InvalidTarget => ErrorCode::InvalidTarget,
                ValidationKind::NotHost => ErrorCode::NotHost,
                ValidationKind::Other(_) => ErrorCode::BadRequest,
            },
            DomainError::NotFound(kind, _) => match kind {
                NotFoundKind::Room => ErrorCode::RoomNotFound,
                NotFoundKind::Player => ErrorCode::PlayerNotFound,
            },
        }
    }
}
