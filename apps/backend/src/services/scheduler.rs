//! Timer scheduling and event dispatch for room flows.
//!
//! Timers are never cancelled. Each carries the room generation and round it
//! was scheduled for, and handlers re-check both (plus the phase) under the
//! room lease, so a timer that outlived its phase is a no-op.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::config::GameConfig;
use crate::domain::{Room, RoomId};
use crate::error::AppError;
use crate::lock::LockOutcome;
use crate::services::judge::Verdict;

/// Which game a timer belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stamp {
    pub generation: u32,
    pub round: u32,
}

impl Stamp {
    pub fn of(room: &Room) -> Self {
        Self {
            generation: room.generation,
            round: room.current_round,
        }
    }

    pub fn matches(&self, room: &Room) -> bool {
        self.generation == room.generation && self.round == room.current_round
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FlowEvent {
    ProcessStart,
    StartOracle,
    StartRound,
    DeliverCards,
    CardTimeout,
    JudgeRound,
    ApplyJudgment { sentence: String, verdict: Verdict },
    StartVoteProposal,
    ProposalTimeout,
    TrialTimeout,
    StartNextRound,
    GameOver,
    Cleanup,
}

impl FlowEvent {
    pub fn name(&self) -> &'static str {
        match self {
            FlowEvent::ProcessStart => "process_start",
            FlowEvent::StartOracle => "start_oracle",
            FlowEvent::StartRound => "start_round",
            FlowEvent::DeliverCards => "deliver_cards",
            FlowEvent::CardTimeout => "card_timeout",
            FlowEvent::JudgeRound => "judge_round",
            FlowEvent::ApplyJudgment { .. } => "apply_judgment",
            FlowEvent::StartVoteProposal => "start_vote_proposal",
            FlowEvent::ProposalTimeout => "proposal_timeout",
            FlowEvent::TrialTimeout => "trial_timeout",
            FlowEvent::StartNextRound => "start_next_round",
            FlowEvent::GameOver => "game_over",
            FlowEvent::Cleanup => "cleanup",
        }
    }

    /// Events owned by the judgment coordinator.
    pub fn is_judgment(&self) -> bool {
        matches!(self, FlowEvent::JudgeRound | FlowEvent::ApplyJudgment { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledEvent {
    pub room_id: RoomId,
    pub stamp: Stamp,
    pub event: FlowEvent,
    pub attempt: u32,
}

impl ScheduledEvent {
    pub fn new(room: &Room, event: FlowEvent) -> Self {
        Self {
            room_id: room.id.clone(),
            stamp: Stamp::of(room),
            event,
            attempt: 1,
        }
    }
}

/// Handle for arming timers. Cheap to clone.
#[derive(Clone)]
pub struct FlowScheduler {
    tx: mpsc::UnboundedSender<ScheduledEvent>,
}

impl FlowScheduler {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ScheduledEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Enqueue `event` after `delay`. A zero delay enqueues immediately.
    pub fn schedule(&self, event: ScheduledEvent, delay: Duration) {
        debug!(
            room_id = %event.room_id,
            event = event.event.name(),
            delay_ms = delay.as_millis() as u64,
            "timer armed"
        );
        if delay.is_zero() {
            self.enqueue(event);
            return;
        }
        let scheduler = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            scheduler.enqueue(event);
        });
    }

    fn enqueue(&self, event: ScheduledEvent) {
        if self.tx.send(event).is_err() {
            warn!("flow dispatcher is gone, dropping event");
        }
    }
}

/// Something that can run a flow event to completion.
#[async_trait::async_trait]
pub trait FlowHandler: Send + Sync {
    async fn handle(&self, event: &ScheduledEvent) -> Result<LockOutcome<()>, AppError>;
}

/// Doubling backoff for events that could not touch their room yet.
///
/// There is no attempt cap: an event keeps retrying until it runs or its
/// stamp goes stale, at which point the handler skips it.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &GameConfig) -> Self {
        Self {
            backoff: config.timer_retry_backoff,
            max_backoff: config.timer_retry_max_backoff,
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let doublings = attempt.saturating_sub(1).min(16);
        self.backoff
            .saturating_mul(1u32 << doublings)
            .min(self.max_backoff)
    }
}

/// Failures worth another attempt: store, bus and lease outages. Client
/// errors and configuration errors will not change on retry.
fn is_retryable(err: &AppError) -> bool {
    !err.is_client_error() && !matches!(err, AppError::Config { .. })
}

/// Consumes the scheduler queue, running each event on its own task.
pub struct FlowDispatcher {
    flow: Arc<dyn FlowHandler>,
    judgment: Arc<dyn FlowHandler>,
    scheduler: FlowScheduler,
    retry: RetryPolicy,
}

impl FlowDispatcher {
    pub fn new(
        flow: Arc<dyn FlowHandler>,
        judgment: Arc<dyn FlowHandler>,
        scheduler: FlowScheduler,
        retry: RetryPolicy,
    ) -> Arc<Self> {
        Arc::new(Self {
            flow,
            judgment,
            scheduler,
            retry,
        })
    }

    pub fn spawn(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<ScheduledEvent>) {
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let dispatcher = self.clone();
                tokio::spawn(async move {
                    dispatcher.run(event).await;
                });
            }
        });
    }

    /// Run one event, rescheduling it on lease contention or a transient
    /// backend failure.
    pub async fn run(&self, event: ScheduledEvent) {
        let handler = if event.event.is_judgment() {
            &self.judgment
        } else {
            &self.flow
        };

        match handler.handle(&event).await {
            Ok(LockOutcome::Success(())) => {}
            Ok(LockOutcome::Skipped(reason)) => {
                debug!(
                    room_id = %event.room_id,
                    event = event.event.name(),
                    reason,
                    "flow event skipped"
                );
            }
            Ok(LockOutcome::LockFailed) => {
                debug!(
                    room_id = %event.room_id,
                    event = event.event.name(),
                    attempt = event.attempt,
                    "room busy, retrying flow event"
                );
                self.retry_later(event);
            }
            Err(err) if is_retryable(&err) => {
                warn!(
                    room_id = %event.room_id,
                    event = event.event.name(),
                    attempt = event.attempt,
                    error = %err,
                    "flow event failed, retrying"
                );
                self.retry_later(event);
            }
            Err(err) => {
                error!(
                    room_id = %event.room_id,
                    event = event.event.name(),
                    error = %err,
                    "flow event failed"
                );
            }
        }
    }

    fn retry_later(&self, mut event: ScheduledEvent) {
        let delay = self.retry.delay(event.attempt);
        event.attempt = event.attempt.saturating_add(1);
        self.scheduler.schedule(event, delay);
    }
}
