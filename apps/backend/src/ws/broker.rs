//! Cross-process delivery of outbound frames.
//!
//! A frame for a session attached to another process is published on the
//! bus; every process receives it and the one holding the session delivers
//! it. Others drop it.

use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::random;
use redis::aio::{ConnectionManager, PubSub};
use redis::{AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::sleep;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

use crate::error::AppError;
use crate::errors::ErrorCode;
use crate::ws::hub::SessionRegistry;

pub const BUS_CHANNEL: &str = "party:bus";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusEnvelope {
    pub session_id: String,
    /// Serialized server event, forwarded verbatim.
    pub payload: String,
}

#[async_trait]
pub trait ClusterBus: Send + Sync {
    async fn publish(&self, envelope: BusEnvelope) -> Result<(), AppError>;
}

fn deliver_if_local(registry: &SessionRegistry, envelope: &BusEnvelope) {
    if registry.deliver(&envelope.session_id, &envelope.payload) {
        debug!(session_id = %envelope.session_id, "bus frame delivered");
    }
}

// ---------------------------------------------------------------------------
// In-process bus
// ---------------------------------------------------------------------------

/// Bus for single-process deployments; several registries may attach to one
/// instance to simulate a cluster.
pub struct InProcessBus {
    sender: broadcast::Sender<BusEnvelope>,
}

impl InProcessBus {
    pub fn new() -> Arc<Self> {
        let (sender, _) = broadcast::channel(1024);
        Arc::new(Self { sender })
    }

    /// Start delivering bus frames to sessions in `registry`.
    pub fn attach(&self, registry: Arc<SessionRegistry>) {
        let mut rx = self.sender.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(envelope) => deliver_if_local(&registry, &envelope),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "in-process bus receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }
}

#[async_trait]
impl ClusterBus for InProcessBus {
    async fn publish(&self, envelope: BusEnvelope) -> Result<(), AppError> {
        // No receivers just means no other process is listening.
        let _ = self.sender.send(envelope);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Redis bus
// ---------------------------------------------------------------------------

// Subscriber retry configuration (background task)
const INITIAL_RETRY_DELAY_SECS: u64 = 1;
const MAX_RETRY_DELAY_SECS: u64 = 60;
const RETRY_DELAY_MULTIPLIER: f64 = 2.0;
const JITTER_PERCENT: f64 = 0.2;

// Publisher retry configuration (request path)
const PUBLISHER_MAX_ATTEMPTS: u32 = 3;
const PUBLISHER_INITIAL_RETRY_DELAY_MS: u64 = 50;
const PUBLISHER_MAX_RETRY_DELAY_MS: u64 = 200;

pub struct RedisClusterBus {
    publisher: ConnectionManager,
}

impl RedisClusterBus {
    /// Connect the publisher and spawn the subscriber loop feeding `registry`.
    pub async fn connect(
        redis_url: &str,
        registry: Arc<SessionRegistry>,
    ) -> Result<Arc<Self>, AppError> {
        let client = Client::open(redis_url)
            .map_err(|err| AppError::config(format!("Invalid REDIS_URL: {err}"), err))?;

        let publisher = ConnectionManager::new(client)
            .await
            .map_err(|err| AppError::Internal {
                code: ErrorCode::BusError,
                detail: "Unable to initialize Redis connection manager".to_string(),
                source: Box::new(err),
            })?;

        spawn_subscriber(redis_url, registry);

        Ok(Arc::new(Self { publisher }))
    }
}

#[async_trait]
impl ClusterBus for RedisClusterBus {
    async fn publish(&self, envelope: BusEnvelope) -> Result<(), AppError> {
        let encoded = serde_json::to_string(&envelope)?;

        let mut attempt = 0u32;
        loop {
            attempt += 1;

            let mut publisher = self.publisher.clone();
            let publish_res = publisher
                .publish::<_, _, ()>(BUS_CHANNEL, encoded.clone())
                .await;

            match publish_res {
                Ok(()) => return Ok(()),
                Err(err) => {
                    let app_err = AppError::Internal {
                        code: ErrorCode::BusError,
                        detail: "Failed to publish bus frame to Redis".to_string(),
                        source: Box::new(err),
                    };

                    if attempt >= PUBLISHER_MAX_ATTEMPTS || !is_transient_error(&app_err) {
                        return Err(app_err);
                    }

                    let delay_ms = PUBLISHER_INITIAL_RETRY_DELAY_MS
                        .saturating_mul(2_u64.pow(attempt - 1))
                        .min(PUBLISHER_MAX_RETRY_DELAY_MS);
                    warn!(
                        error = %app_err,
                        attempt,
                        retry_delay_ms = delay_ms,
                        "Redis publish failed, retrying"
                    );
                    sleep(Duration::from_millis(delay_ms)).await;
                }
            }
        }
    }
}

fn spawn_subscriber(redis_url: &str, registry: Arc<SessionRegistry>) {
    let redis_url = redis_url.to_string();
    tokio::spawn(async move {
        run_subscription_loop_with_retry(&redis_url, registry).await;
    });
}

fn is_transient_error(err: &AppError) -> bool {
    if let AppError::Config { .. } = err {
        return false;
    }

    let error_msg = err.to_string().to_lowercase();

    if error_msg.contains("authentication failed")
        || error_msg.contains("invalid redis_url")
        || error_msg.contains("unsupported")
        || error_msg.contains("non-tcp protocol")
    {
        return false;
    }

    if let Some(source) = StdError::source(err) {
        if let Some(io_err) = source.downcast_ref::<std::io::Error>() {
            match io_err.kind() {
                std::io::ErrorKind::PermissionDenied | std::io::ErrorKind::Unsupported => {
                    return false
                }
                _ => return true,
            }
        }
    }

    true
}

fn calculate_retry_delay(attempt: u32) -> Duration {
    let base_delay =
        INITIAL_RETRY_DELAY_SECS as f64 * RETRY_DELAY_MULTIPLIER.powi(attempt as i32 - 1);
    let capped_delay = base_delay.min(MAX_RETRY_DELAY_SECS as f64);

    let jitter_range = capped_delay * JITTER_PERCENT;
    let jitter = (random::<f64>() * 2.0 - 1.0) * jitter_range;
    let final_delay = (capped_delay + jitter).max(0.1);

    Duration::from_secs_f64(final_delay)
}

async fn run_subscription_loop_with_retry(redis_url: &str, registry: Arc<SessionRegistry>) {
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        match run_subscription_loop(redis_url, registry.clone()).await {
            Ok(()) => {
                // The stream ended: the connection dropped. Start over.
                warn!("Redis bus subscription stream ended, reconnecting");
                attempt = 0;
            }
            Err(err) => {
                if !is_transient_error(&err) {
                    error!(
                        error = %err,
                        attempt,
                        "Redis bus subscription failed with permanent error, exiting"
                    );
                    break;
                }

                let delay = calculate_retry_delay(attempt);
                warn!(
                    error = %err,
                    attempt,
                    retry_delay_secs = delay.as_secs_f64(),
                    "Redis bus subscription failed, retrying"
                );
                sleep(delay).await;

                if attempt >= 20 {
                    attempt = 10;
                }
            }
        }
    }
}

async fn run_subscription_loop(
    redis_url: &str,
    registry: Arc<SessionRegistry>,
) -> Result<(), AppError> {
    let client = Client::open(redis_url)
        .map_err(|err| AppError::config(format!("Invalid REDIS_URL: {err}"), err))?;

    let conn_info = client.get_connection_info();

    let addr = match conn_info.addr().clone() {
        redis::ConnectionAddr::Tcp(host, port) => (host, port),
        _ => {
            return Err(AppError::Internal {
                code: ErrorCode::ConfigError,
                detail: "Only TCP protocol is supported for pubsub".to_string(),
                source: Box::new(std::io::Error::new(
                    std::io::ErrorKind::Unsupported,
                    "Non-TCP protocol",
                )),
            });
        }
    };

    info!(host = %addr.0, port = addr.1, "Connecting to Redis for bus subscription");

    let stream = tokio::net::TcpStream::connect(addr)
        .await
        .map_err(|err| AppError::Internal {
            code: ErrorCode::BusError,
            detail: format!("Failed to connect to Redis for subscription: {err}"),
            source: Box::new(err),
        })?;

    let mut pubsub = PubSub::new(conn_info.redis_settings(), stream)
        .await
        .map_err(|err| AppError::Internal {
            code: ErrorCode::BusError,
            detail: format!("Failed to create Redis pubsub: {err}"),
            source: Box::new(err),
        })?;

    pubsub
        .subscribe(BUS_CHANNEL)
        .await
        .map_err(|err| AppError::Internal {
            code: ErrorCode::BusError,
            detail: format!("Failed to subscribe to {BUS_CHANNEL}"),
            source: Box::new(err),
        })?;

    info!(channel = BUS_CHANNEL, "Redis bus subscription established");

    let mut messages = pubsub.into_on_message();
    while let Some(msg) = messages.next().await {
        let Ok(payload) = msg.get_payload::<String>() else {
            continue;
        };
        match serde_json::from_str::<BusEnvelope>(&payload) {
            Ok(envelope) => deliver_if_local(&registry, &envelope),
            Err(err) => warn!(error = %err, "Discarding malformed bus frame"),
        }
    }

    Ok(())
}
