use std::sync::Arc;

use tracing::{trace, warn};

use crate::domain::{Room, SessionId};
use crate::ws::broker::{BusEnvelope, ClusterBus};
use crate::ws::hub::SessionRegistry;
use crate::ws::protocol::ServerEvent;

/// Events collected inside a critical section. They are flushed while the
/// lease is still held, so members see a room's events in commit order.
#[derive(Debug, Default)]
pub struct Outbox {
    items: Vec<(Vec<SessionId>, ServerEvent)>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn to(&mut self, session_id: impl Into<SessionId>, event: ServerEvent) {
        self.items.push((vec![session_id.into()], event));
    }

    pub fn to_many(&mut self, sessions: Vec<SessionId>, event: ServerEvent) {
        if !sessions.is_empty() {
            self.items.push((sessions, event));
        }
    }

    /// Every connected member of `room`.
    pub fn room(&mut self, room: &Room, event: ServerEvent) {
        let sessions = room
            .connected_players()
            .map(|p| p.session_id.clone())
            .collect();
        self.to_many(sessions, event);
    }

    pub fn append(&mut self, other: Outbox) {
        self.items.extend(other.items);
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Routes events to sessions: directly when attached locally, otherwise via
/// the cluster bus. Delivery failures are logged, never returned.
pub struct Messenger {
    registry: Arc<SessionRegistry>,
    bus: Arc<dyn ClusterBus>,
}

impl Messenger {
    pub fn new(registry: Arc<SessionRegistry>, bus: Arc<dyn ClusterBus>) -> Self {
        Self { registry, bus }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub async fn send(&self, session_id: &str, event: &ServerEvent) {
        match event.to_json() {
            Ok(payload) => self.send_raw(session_id, payload).await,
            Err(err) => warn!(session_id, error = %err, "failed to encode event"),
        }
    }

    pub async fn broadcast(&self, room: &Room, event: &ServerEvent) {
        let Ok(payload) = event.to_json() else {
            warn!(room_id = %room.id, "failed to encode broadcast event");
            return;
        };
        for player in room.connected_players() {
            self.send_raw(&player.session_id, payload.clone()).await;
        }
    }

    pub async fn flush(&self, outbox: Outbox) {
        for (sessions, event) in outbox.items {
            let payload = match event.to_json() {
                Ok(payload) => payload,
                Err(err) => {
                    warn!(error = %err, "failed to encode event");
                    continue;
                }
            };
            for sid in sessions {
                self.send_raw(&sid, payload.clone()).await;
            }
        }
    }

    async fn send_raw(&self, session_id: &str, payload: String) {
        if self.registry.deliver(session_id, &payload) {
            trace!(session_id, "delivered locally");
            return;
        }
        let envelope = BusEnvelope {
            session_id: session_id.to_string(),
            payload,
        };
        if let Err(err) = self.bus.publish(envelope).await {
            warn!(session_id, error = %err, "failed to publish event on cluster bus");
        }
    }
}
