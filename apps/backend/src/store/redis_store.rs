use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::debug;

use super::{keys, RoomStore};
use crate::domain::{Room, RoomId};
use crate::error::AppError;

/// Room snapshots as JSON strings in a shared Redis.
#[derive(Clone)]
pub struct RedisRoomStore {
    conn: ConnectionManager,
    ttl: Duration,
}

impl RedisRoomStore {
    pub fn new(conn: ConnectionManager, ttl: Duration) -> Self {
        Self { conn, ttl }
    }

    fn ttl_ms(&self) -> u64 {
        u64::try_from(self.ttl.as_millis()).unwrap_or(u64::MAX)
    }
}

#[async_trait]
impl RoomStore for RedisRoomStore {
    async fn load_room(&self, room_id: &str) -> Result<Option<Room>, AppError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(keys::room(room_id))
            .query_async(&mut conn)
            .await?;
        raw.map(|json| serde_json::from_str::<Room>(&json))
            .transpose()
            .map_err(AppError::from)
    }

    async fn save_room(&self, room: &Room) -> Result<(), AppError> {
        let json = serde_json::to_string(room)?;
        let mut conn = self.conn.clone();
        let ttl_ms = self.ttl_ms();
        redis::pipe()
            .cmd("SET")
            .arg(keys::room(&room.id))
            .arg(json)
            .arg("PX")
            .arg(ttl_ms)
            .ignore()
            .cmd("PEXPIRE")
            .arg(keys::room_code(&room.code))
            .arg(ttl_ms)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete_room(&self, room: &Room) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .cmd("DEL")
            .arg(keys::room(&room.id))
            .ignore()
            .cmd("DEL")
            .arg(keys::room_code(&room.code))
            .ignore()
            .cmd("SREM")
            .arg(keys::WAITING_ROOMS)
            .arg(&room.id)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;
        debug!(room_id = %room.id, "room keys deleted");
        Ok(())
    }

    async fn bind_code(&self, code: &str, room_id: &str) -> Result<bool, AppError> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(keys::room_code(code))
            .arg(room_id)
            .arg("NX")
            .arg("PX")
            .arg(self.ttl_ms())
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn room_id_for_code(&self, code: &str) -> Result<Option<RoomId>, AppError> {
        let mut conn = self.conn.clone();
        let id: Option<String> = redis::cmd("GET")
            .arg(keys::room_code(code))
            .query_async(&mut conn)
            .await?;
        Ok(id)
    }

    async fn add_waiting(&self, room_id: &str) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        redis::pipe()
            .cmd("SADD")
            .arg(keys::WAITING_ROOMS)
            .arg(room_id)
            .ignore()
            .cmd("PEXPIRE")
            .arg(keys::WAITING_ROOMS)
            .arg(self.ttl_ms())
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn remove_waiting(&self, room_id: &str) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        redis::cmd("SREM")
            .arg(keys::WAITING_ROOMS)
            .arg(room_id)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn waiting_rooms(&self) -> Result<Vec<RoomId>, AppError> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = redis::cmd("SMEMBERS")
            .arg(keys::WAITING_ROOMS)
            .query_async(&mut conn)
            .await?;
        Ok(ids)
    }

    async fn bind_session(&self, session_id: &str, room_id: &str) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(keys::session_room(session_id))
            .arg(room_id)
            .arg("PX")
            .arg(self.ttl_ms())
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn session_room(&self, session_id: &str) -> Result<Option<RoomId>, AppError> {
        let mut conn = self.conn.clone();
        let id: Option<String> = redis::cmd("GET")
            .arg(keys::session_room(session_id))
            .query_async(&mut conn)
            .await?;
        Ok(id)
    }

    async fn unbind_session(&self, session_id: &str) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        redis::cmd("DEL")
            .arg(keys::session_room(session_id))
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }
}
