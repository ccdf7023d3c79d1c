//! Application services: room flow, judgment, scheduling and the external
//! collaborators they call.

pub mod audit;
pub mod game_flow;
pub mod judge;
pub mod judgment;
pub mod nicknames;
pub mod room_txn;
pub mod scheduler;
