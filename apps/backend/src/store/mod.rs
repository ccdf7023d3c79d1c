//! Room persistence: snapshots, code lookup, the waiting-room set and
//! session→room mapping. Every key carries a TTL.

mod memory;
mod redis_store;

use async_trait::async_trait;

use crate::domain::{Room, RoomId, SessionId};
use crate::error::AppError;

pub use memory::MemoryRoomStore;
pub use redis_store::RedisRoomStore;

/// Logical keyspace shared by every backend.
pub mod keys {
    pub const WAITING_ROOMS: &str = "rooms:waiting";

    pub fn room(room_id: &str) -> String {
        format!("room:{room_id}")
    }

    pub fn room_code(code: &str) -> String {
        format!("room:code:{code}")
    }

    pub fn session_room(session_id: &str) -> String {
        format!("session:{session_id}:room")
    }

    pub fn room_lock(room_id: &str) -> String {
        format!("lock:room:{room_id}")
    }

    pub fn nickname(key: &str) -> String {
        format!("nickname:{key}")
    }
}

#[async_trait]
pub trait RoomStore: Send + Sync {
    async fn load_room(&self, room_id: &str) -> Result<Option<Room>, AppError>;

    /// Persist the whole snapshot, refreshing its TTL.
    async fn save_room(&self, room: &Room) -> Result<(), AppError>;

    /// Remove the snapshot, its code binding and its waiting-set entry.
    async fn delete_room(&self, room: &Room) -> Result<(), AppError>;

    /// Bind `code` to `room_id` unless the code is already taken.
    async fn bind_code(&self, code: &str, room_id: &str) -> Result<bool, AppError>;

    async fn room_id_for_code(&self, code: &str) -> Result<Option<RoomId>, AppError>;

    async fn add_waiting(&self, room_id: &str) -> Result<(), AppError>;

    async fn remove_waiting(&self, room_id: &str) -> Result<(), AppError>;

    async fn waiting_rooms(&self) -> Result<Vec<RoomId>, AppError>;

    async fn bind_session(&self, session_id: &str, room_id: &str) -> Result<(), AppError>;

    async fn session_room(&self, session_id: &str) -> Result<Option<RoomId>, AppError>;

    async fn unbind_session(&self, session_id: &str) -> Result<(), AppError>;
}

/// Unbind every listed session, logging rather than failing on errors.
pub async fn unbind_sessions<'a>(
    store: &dyn RoomStore,
    sessions: impl IntoIterator<Item = &'a SessionId>,
) {
    for sid in sessions {
        if let Err(err) = store.unbind_session(sid).await {
            tracing::warn!(session_id = %sid, error = %err, "failed to unbind session");
        }
    }
}
