use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;

use crate::domain::SessionId;

struct LocalSession {
    outbound: mpsc::UnboundedSender<String>,
    nickname: Option<String>,
}

/// Connections attached to this process, keyed by session id.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, LocalSession>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a session and return the receiving end of its outbound queue.
    pub fn register(&self, session_id: &str) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.sessions.insert(
            session_id.to_string(),
            LocalSession {
                outbound: tx,
                nickname: None,
            },
        );
        debug!(session_id, "session registered");
        rx
    }

    pub fn unregister(&self, session_id: &str) {
        if self.sessions.remove(session_id).is_some() {
            debug!(session_id, "session unregistered");
        }
    }

    pub fn is_local(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    /// Queue `payload` for a local session. Returns false when the session
    /// is not attached here or its connection is gone.
    pub fn deliver(&self, session_id: &str, payload: &str) -> bool {
        match self.sessions.get(session_id) {
            Some(session) => session.outbound.send(payload.to_string()).is_ok(),
            None => false,
        }
    }

    pub fn nickname(&self, session_id: &str) -> Option<String> {
        self.sessions
            .get(session_id)
            .and_then(|s| s.nickname.clone())
    }

    pub fn set_nickname(&self, session_id: &str, nickname: Option<String>) {
        if let Some(mut session) = self.sessions.get_mut(session_id) {
            session.nickname = nickname;
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
