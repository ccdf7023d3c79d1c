//! Domain layer: the room aggregate and pure game helpers. No I/O.

pub mod content;
pub mod player;
pub mod rng;
pub mod room;
pub mod sampling;
pub mod view;

#[cfg(test)]
mod tests_room;

// Re-exports for ergonomics
pub use content::{WordSlot, ORACLES, PERSONALITIES};
pub use player::{ConnectionStatus, Player, PlayerColor, Role, SessionId, TrialVote};
pub use rng::GameRng;
pub use room::{Phase, PhaseData, Room, RoomId, RoomStatus, RoundHistory};
pub use sampling::sample_without_repeat;
pub use view::{PlayerView, RoomSummary, RoomView};
