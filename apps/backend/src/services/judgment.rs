//! Round judgment.
//!
//! Runs in three steps so the room lease is never held across the external
//! call:
//! 1. under lease: CARD_SELECT → JUDGING and compose the sentence;
//! 2. no lease: ask the judge (timeout and errors become a neutral verdict);
//! 3. under lease: apply the verdict unless the game moved on meanwhile.
//!
//! Step 3 is dispatched as its own event carrying the verdict, so lease
//! contention there retries without calling the judge again.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::domain::{Phase, Room, RoomStatus, RoundHistory};
use crate::error::AppError;
use crate::lock::{Flow, LockOutcome};
use crate::services::game_flow::STALE;
use crate::services::judge::{judge_with_fallback, JudgeClient, JudgeRequest, Verdict};
use crate::services::room_txn::RoomTxn;
use crate::services::scheduler::{FlowEvent, FlowHandler, FlowScheduler, ScheduledEvent};
use crate::ws::protocol::ServerEvent;

pub struct JudgmentCoordinator {
    txn: Arc<RoomTxn>,
    judge: Arc<dyn JudgeClient>,
    scheduler: FlowScheduler,
    judge_timeout: Duration,
    result_display_delay: Duration,
}

impl JudgmentCoordinator {
    pub fn new(
        txn: Arc<RoomTxn>,
        judge: Arc<dyn JudgeClient>,
        scheduler: FlowScheduler,
        judge_timeout: Duration,
        result_display_delay: Duration,
    ) -> Self {
        Self {
            txn,
            judge,
            scheduler,
            judge_timeout,
            result_display_delay,
        }
    }

    async fn judge_round(&self, ev: &ScheduledEvent) -> Result<LockOutcome<Room>, AppError> {
        let stamp = ev.stamp;
        let entered = self
            .txn
            .run(&ev.room_id, move |room, fx| {
                if !stamp.matches(room) || room.status != RoomStatus::Playing {
                    return Ok(Flow::Skip(STALE));
                }
                if room.current_phase == Some(Phase::Judging) {
                    return Ok(Flow::Skip("round already being judged"));
                }
                if room.current_phase != Some(Phase::CardSelect) {
                    return Ok(Flow::Skip(STALE));
                }
                room.enter_phase(Phase::Judging)?;
                fx.broadcast(
                    room,
                    ServerEvent::JudgingStarted {
                        round: room.current_round,
                        sentence: room.compose_sentence(),
                    },
                );
                Ok(Flow::Done(()))
            })
            .await?;

        let room = match entered {
            LockOutcome::Success(room) => room,
            other => return Ok(other),
        };

        let sentence = room.compose_sentence();
        let request = JudgeRequest {
            sentence: sentence.clone(),
            personality: room.personality.clone().unwrap_or_default(),
            prompt: room.oracle.clone().unwrap_or_default(),
        };
        let verdict = judge_with_fallback(self.judge.as_ref(), &request, self.judge_timeout).await;
        debug!(
            room_id = %room.id,
            round = room.current_round,
            score = verdict.score,
            fallback = verdict.fallback,
            "judge answered"
        );

        self.scheduler.schedule(
            ScheduledEvent::new(&room, FlowEvent::ApplyJudgment { sentence, verdict }),
            Duration::ZERO,
        );
        Ok(LockOutcome::Success(room))
    }

    async fn apply_judgment(
        &self,
        ev: &ScheduledEvent,
        sentence: &str,
        verdict: &Verdict,
    ) -> Result<LockOutcome<Room>, AppError> {
        let stamp = ev.stamp;
        let delay = self.result_display_delay;
        self.txn
            .run(&ev.room_id, move |room, fx| {
                if room.status == RoomStatus::GameOver {
                    return Ok(Flow::Skip("game already over"));
                }
                if !room.is_phase(Phase::Judging) || !stamp.matches(room) {
                    return Ok(Flow::Skip(STALE));
                }
                let round = room.current_round;
                if room.history.iter().any(|h| h.round == round) {
                    return Ok(Flow::Skip("round already judged"));
                }

                room.apply_vitality(verdict.score);
                room.history.push(RoundHistory {
                    round,
                    oracle: room.oracle.clone().unwrap_or_default(),
                    sentence: sentence.to_string(),
                    score_delta: verdict.score,
                    commentary: verdict.commentary.clone(),
                });
                fx.broadcast(
                    room,
                    ServerEvent::RoundResult {
                        round,
                        sentence: sentence.to_string(),
                        score: verdict.score,
                        commentary: verdict.commentary.clone(),
                        vitality: room.vitality,
                        fallback: verdict.fallback,
                    },
                );
                fx.after(FlowEvent::StartVoteProposal, delay);
                info!(
                    room_id = %room.id,
                    round,
                    score = verdict.score,
                    vitality = room.vitality,
                    "round judged"
                );
                Ok(Flow::Done(()))
            })
            .await
    }
}

#[async_trait]
impl FlowHandler for JudgmentCoordinator {
    async fn handle(&self, ev: &ScheduledEvent) -> Result<LockOutcome<()>, AppError> {
        let outcome = match &ev.event {
            FlowEvent::JudgeRound => self.judge_round(ev).await?,
            FlowEvent::ApplyJudgment { sentence, verdict } => {
                self.apply_judgment(ev, sentence, verdict).await?
            }
            _ => return Ok(LockOutcome::Skipped("not a judgment event")),
        };
        Ok(outcome.map(|_| ()))
    }
}
