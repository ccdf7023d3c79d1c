//! Room lifecycle and round progression.
//!
//! Every transition is a load-under-lease → mutate → persist step driven
//! either by a player action or by a [`FlowEvent`] from the scheduler.
//! Follow-up steps are never called directly; they are armed as timers (or
//! zero-delay events) so the judgment coordinator and this service only
//! talk through the dispatcher.

mod game_over;
mod lobby;
mod player_actions;
mod round;
mod start;
mod voting;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::config::GameConfig;
use crate::domain::{GameRng, Room, RoomId};
use crate::error::AppError;
use crate::errors::ErrorCode;
use crate::lock::LockOutcome;
use crate::services::nicknames::NicknameRegistry;
use crate::services::room_txn::{RoomTxn, ROOM_GONE};
use crate::services::scheduler::{FlowEvent, FlowHandler, ScheduledEvent};
use crate::store::RoomStore;

/// Skip reason for timers whose generation, round or phase moved on.
pub(crate) const STALE: &str = "stale timer";

pub struct GameFlowService {
    txn: Arc<RoomTxn>,
    nicknames: Arc<dyn NicknameRegistry>,
    rng: Arc<GameRng>,
    config: Arc<GameConfig>,
}

impl GameFlowService {
    pub fn new(
        txn: Arc<RoomTxn>,
        nicknames: Arc<dyn NicknameRegistry>,
        rng: Arc<GameRng>,
        config: Arc<GameConfig>,
    ) -> Self {
        Self {
            txn,
            nicknames,
            rng,
            config,
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    fn store(&self) -> &Arc<dyn RoomStore> {
        self.txn.store()
    }

    /// The room this session currently belongs to.
    async fn room_of(&self, session_id: &str) -> Result<RoomId, AppError> {
        self.store()
            .session_room(session_id)
            .await?
            .ok_or_else(|| AppError::invalid(ErrorCode::NotInRoom, "You are not in a room"))
    }

    /// Snapshot for read-only callers and tests.
    pub async fn load_room(&self, room_id: &str) -> Result<Option<Room>, AppError> {
        self.store().load_room(room_id).await
    }
}

/// Outcome of a player action: contention and a vanished room are errors,
/// guard skips are silent.
fn user_result(outcome: LockOutcome<Room>) -> Result<(), AppError> {
    match outcome {
        LockOutcome::Skipped(ROOM_GONE) => Err(AppError::not_found(
            ErrorCode::RoomNotFound,
            "Room no longer exists",
        )),
        other => other.into_user_result().map(|_| ()),
    }
}

#[async_trait]
impl FlowHandler for GameFlowService {
    async fn handle(&self, ev: &ScheduledEvent) -> Result<LockOutcome<()>, AppError> {
        debug!(
            room_id = %ev.room_id,
            event = ev.event.name(),
            round = ev.stamp.round,
            generation = ev.stamp.generation,
            "handling flow event"
        );
        let outcome = match &ev.event {
            FlowEvent::ProcessStart => self.process_start(ev).await?,
            FlowEvent::StartOracle => self.start_oracle(ev).await?,
            FlowEvent::StartRound => self.start_round(ev).await?,
            FlowEvent::DeliverCards => self.deliver_cards(ev).await?,
            FlowEvent::CardTimeout => self.card_timeout(ev).await?,
            FlowEvent::StartVoteProposal => self.start_vote_proposal(ev).await?,
            FlowEvent::ProposalTimeout => self.proposal_timeout(ev).await?,
            FlowEvent::TrialTimeout => self.trial_timeout(ev).await?,
            FlowEvent::StartNextRound => self.start_next_round(ev).await?,
            FlowEvent::GameOver => self.game_over(ev).await?,
            FlowEvent::Cleanup => self.cleanup(ev).await?,
            FlowEvent::JudgeRound | FlowEvent::ApplyJudgment { .. } => {
                return Ok(LockOutcome::Skipped("judgment event"))
            }
        };
        Ok(outcome.map(|_| ()))
    }
}
