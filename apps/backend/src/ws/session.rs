use std::sync::Arc;
use std::time::{Duration, Instant};

use actix::prelude::*;
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tracing::{info, warn};
use uuid::Uuid;

use crate::state::app_state::AppState;
use crate::ws::router::ActionRouter;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(20);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(40);

pub async fn upgrade(
    req: HttpRequest,
    stream: web::Payload,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let session = WsSession::new(Uuid::new_v4().to_string(), app_state.router.clone());
    ws::start(session, &req, stream)
}

/// A serialized server event queued for this connection.
struct Outbound(String);

pub struct WsSession {
    session_id: String,
    router: Arc<ActionRouter>,
    last_heartbeat: Instant,
}

impl WsSession {
    fn new(session_id: String, router: Arc<ActionRouter>) -> Self {
        Self {
            session_id,
            router,
            last_heartbeat: Instant::now(),
        }
    }

    fn start_heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |actor, ctx| {
            if Instant::now().duration_since(actor.last_heartbeat) > CLIENT_TIMEOUT {
                warn!(session_id = %actor.session_id, "[WS SESSION] heartbeat timed out");
                ctx.close(Some(ws::CloseReason::from(ws::CloseCode::Normal)));
                ctx.stop();
                return;
            }
            ctx.ping(b"keepalive");
            let router = actor.router.clone();
            let session_id = actor.session_id.clone();
            actix::spawn(async move {
                router.keep_alive(&session_id).await;
            });
        });
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!(session_id = %self.session_id, "[WS SESSION] started");
        let outbound = self.router.connect(&self.session_id);
        ctx.add_stream(UnboundedReceiverStream::new(outbound).map(Outbound));
        self.start_heartbeat(ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        info!(session_id = %self.session_id, "[WS SESSION] stopped");
        let router = self.router.clone();
        let session_id = self.session_id.clone();
        actix::spawn(async move {
            router.disconnect(&session_id).await;
        });
    }
}

impl StreamHandler<Outbound> for WsSession {
    fn handle(&mut self, frame: Outbound, ctx: &mut Self::Context) {
        ctx.text(frame.0);
    }

    // The outbound queue closing must not stop the socket.
    fn finished(&mut self, _ctx: &mut Self::Context) {}
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(payload)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&payload);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.last_heartbeat = Instant::now();
                let router = self.router.clone();
                let session_id = self.session_id.clone();
                let text = text.to_string();
                ctx.spawn(
                    async move {
                        router.handle_text(&session_id, &text).await;
                    }
                    .into_actor(self),
                );
            }
            Ok(ws::Message::Binary(_)) => {
                self.last_heartbeat = Instant::now();
                warn!(session_id = %self.session_id, "[WS SESSION] binary frame ignored");
            }
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) | Ok(ws::Message::Nop) => {
                self.last_heartbeat = Instant::now();
            }
            Err(err) => {
                warn!(
                    session_id = %self.session_id,
                    error = %err,
                    "[WS SESSION] protocol error"
                );
                ctx.close(Some(ws::CloseReason::from(ws::CloseCode::Error)));
                ctx.stop();
            }
        }
    }
}
