//! Fire-and-forget record of finished games.

use std::sync::Arc;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::{Role, Room, RoundHistory, SessionId};
use crate::error::AppError;

pub const AUDIT_KEY: &str = "audit:games";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameRecord {
    pub room_id: String,
    pub generation: u32,
    pub winner: Role,
    pub traitor_session_id: Option<SessionId>,
    pub final_vitality: i32,
    pub players: Vec<String>,
    pub history: Vec<RoundHistory>,
    pub finished_at: i64,
}

impl GameRecord {
    pub fn from_room(room: &Room, finished_at: i64) -> Self {
        Self {
            room_id: room.id.clone(),
            generation: room.generation,
            winner: room.winner(),
            traitor_session_id: room.traitor().map(|p| p.session_id.clone()),
            final_vitality: room.vitality,
            players: room.players.iter().map(|p| p.nickname.clone()).collect(),
            history: room.history.clone(),
            finished_at,
        }
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: &GameRecord) -> Result<(), AppError>;
}

/// Hand the record to `sink` on a background task; failures are only logged.
pub fn spawn_record(sink: Arc<dyn AuditSink>, record: GameRecord) {
    tokio::spawn(async move {
        if let Err(err) = sink.record(&record).await {
            warn!(room_id = %record.room_id, error = %err, "audit record failed");
        }
    });
}

/// Appends JSON records to a Redis list.
pub struct RedisAuditLog {
    conn: ConnectionManager,
}

impl RedisAuditLog {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl AuditSink for RedisAuditLog {
    async fn record(&self, record: &GameRecord) -> Result<(), AppError> {
        let json = serde_json::to_string(record)?;
        let mut conn = self.conn.clone();
        redis::cmd("RPUSH")
            .arg(AUDIT_KEY)
            .arg(json)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }
}

/// Emits the record as a structured log line.
pub struct TracingAuditLog;

#[async_trait]
impl AuditSink for TracingAuditLog {
    async fn record(&self, record: &GameRecord) -> Result<(), AppError> {
        info!(
            room_id = %record.room_id,
            generation = record.generation,
            winner = ?record.winner,
            final_vitality = record.final_vitality,
            rounds = record.history.len(),
            "game finished"
        );
        Ok(())
    }
}
