//! A connection driven directly through the action router.
//!
//! Tests run with paused time: while a client waits for an event the
//! runtime auto-advances to the next armed timer, so whole games play out
//! instantly.

use std::sync::Arc;
use std::time::Duration;

use backend_test_support::unique_helpers::{unique_nickname, unique_session};
use oracle_backend::ws::router::ActionRouter;
use oracle_backend::{AppState, ClientAction, ServerEvent};
use tokio::sync::mpsc;

const EVENT_WAIT: Duration = Duration::from_secs(600);

pub struct TestClient {
    pub session_id: String,
    pub nickname: String,
    router: Arc<ActionRouter>,
    rx: mpsc::UnboundedReceiver<String>,
}

impl TestClient {
    pub fn connect(state: &AppState, prefix: &str) -> Self {
        let session_id = unique_session(prefix);
        let rx = state.router.connect(&session_id);
        Self {
            session_id,
            nickname: unique_nickname(prefix),
            router: state.router.clone(),
            rx,
        }
    }

    pub async fn act(&self, action: ClientAction) {
        self.router.handle(&self.session_id, action).await;
    }

    pub async fn send_text(&self, text: &str) {
        self.router.handle_text(&self.session_id, text).await;
    }

    /// What the websocket heartbeat does for a live connection.
    pub async fn keep_alive(&self) {
        self.router.keep_alive(&self.session_id).await;
    }

    pub async fn disconnect(&self) {
        self.router.disconnect(&self.session_id).await;
    }

    /// Reserve this client's generated nickname and consume the ack.
    pub async fn register_nickname(&mut self) {
        let nickname = self.nickname.clone();
        self.act(ClientAction::SetNickname { nickname }).await;
        self.expect("NICKNAME_SET").await;
    }

    /// Wait for the next event named `name`, discarding others.
    pub async fn expect(&mut self, name: &str) -> ServerEvent {
        let deadline = tokio::time::Instant::now() + EVENT_WAIT;
        loop {
            let frame = tokio::time::timeout_at(deadline, self.rx.recv())
                .await
                .unwrap_or_else(|_| panic!("{} timed out waiting for {name}", self.session_id))
                .unwrap_or_else(|| panic!("{} outbound queue closed", self.session_id));
            let event: ServerEvent =
                serde_json::from_str(&frame).expect("server frames are valid events");
            if event.name() == name {
                return event;
            }
        }
    }

    /// Wait for an `ERROR` event and return its code.
    pub async fn expect_error(&mut self) -> String {
        match self.expect("ERROR").await {
            ServerEvent::Error { code, .. } => code,
            other => unreachable!("expected ERROR, got {other:?}"),
        }
    }

    /// Everything already queued for this client.
    pub fn drain(&mut self) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(frame) = self.rx.try_recv() {
            events.push(serde_json::from_str(&frame).expect("server frames are valid events"));
        }
        events
    }

    /// Names of everything already queued for this client.
    pub fn drain_names(&mut self) -> Vec<String> {
        self.drain().iter().map(ServerEvent::name).collect()
    }
}
