use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::RoomStore;
use crate::domain::{Room, RoomId, SessionId};
use crate::error::AppError;

#[derive(Debug, Clone)]
struct Expiring<T> {
    value: T,
    expires_at: Instant,
}

impl<T: Clone> Expiring<T> {
    fn live(&self, now: Instant) -> Option<T> {
        (self.expires_at > now).then(|| self.value.clone())
    }
}

/// Single-process store used when no Redis is configured, and by tests.
///
/// Honors the same TTL semantics as the Redis store, measured on the tokio
/// clock so paused-time tests can expire keys.
pub struct MemoryRoomStore {
    ttl: Duration,
    rooms: DashMap<RoomId, Expiring<Room>>,
    codes: DashMap<String, Expiring<RoomId>>,
    sessions: DashMap<SessionId, Expiring<RoomId>>,
    waiting: Mutex<Vec<RoomId>>,
}

impl MemoryRoomStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            rooms: DashMap::new(),
            codes: DashMap::new(),
            sessions: DashMap::new(),
            waiting: Mutex::new(Vec::new()),
        }
    }

    fn wrap<T>(&self, value: T) -> Expiring<T> {
        Expiring {
            value,
            expires_at: Instant::now() + self.ttl,
        }
    }

    fn read<T: Clone>(map: &DashMap<String, Expiring<T>>, key: &str) -> Option<T> {
        let now = Instant::now();
        let hit = map.get(key).map(|entry| entry.live(now));
        match hit {
            Some(Some(value)) => Some(value),
            Some(None) => {
                map.remove(key);
                None
            }
            None => None,
        }
    }

    /// Number of live room snapshots.
    pub fn room_count(&self) -> usize {
        let now = Instant::now();
        self.rooms.iter().filter(|e| e.live(now).is_some()).count()
    }
}

#[async_trait]
impl RoomStore for MemoryRoomStore {
    async fn load_room(&self, room_id: &str) -> Result<Option<Room>, AppError> {
        Ok(Self::read(&self.rooms, room_id))
    }

    async fn save_room(&self, room: &Room) -> Result<(), AppError> {
        self.rooms.insert(room.id.clone(), self.wrap(room.clone()));
        if let Some(mut code) = self.codes.get_mut(&room.code) {
            code.expires_at = Instant::now() + self.ttl;
        }
        Ok(())
    }

    async fn delete_room(&self, room: &Room) -> Result<(), AppError> {
        self.rooms.remove(&room.id);
        self.codes.remove(&room.code);
        self.waiting.lock().retain(|id| id != &room.id);
        Ok(())
    }

    async fn bind_code(&self, code: &str, room_id: &str) -> Result<bool, AppError> {
        let now = Instant::now();
        let fresh = self.wrap(room_id.to_string());
        match self.codes.entry(code.to_string()) {
            Entry::Occupied(mut taken) => {
                if taken.get().live(now).is_some() {
                    return Ok(false);
                }
                taken.insert(fresh);
                Ok(true)
            }
            Entry::Vacant(slot) => {
                slot.insert(fresh);
                Ok(true)
            }
        }
    }

    async fn room_id_for_code(&self, code: &str) -> Result<Option<RoomId>, AppError> {
        Ok(Self::read(&self.codes, code))
    }

    async fn add_waiting(&self, room_id: &str) -> Result<(), AppError> {
        let mut waiting = self.waiting.lock();
        if !waiting.iter().any(|id| id == room_id) {
            waiting.push(room_id.to_string());
        }
        Ok(())
    }

    async fn remove_waiting(&self, room_id: &str) -> Result<(), AppError> {
        self.waiting.lock().retain(|id| id != room_id);
        Ok(())
    }

    async fn waiting_rooms(&self) -> Result<Vec<RoomId>, AppError> {
        Ok(self.waiting.lock().clone())
    }

    async fn bind_session(&self, session_id: &str, room_id: &str) -> Result<(), AppError> {
        self.sessions
            .insert(session_id.to_string(), self.wrap(room_id.to_string()));
        Ok(())
    }

    async fn session_room(&self, session_id: &str) -> Result<Option<RoomId>, AppError> {
        Ok(Self::read(&self.sessions, session_id))
    }

    async fn unbind_session(&self, session_id: &str) -> Result<(), AppError> {
        self.sessions.remove(session_id);
        Ok(())
    }
}
