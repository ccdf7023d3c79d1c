//! Vote proposal and trial resolution.

use tracing::info;

use super::{GameFlowService, STALE};
use crate::config::GameConfig;
use crate::domain::{Phase, Room};
use crate::error::AppError;
use crate::lock::{Flow, LockOutcome};
use crate::services::room_txn::Effects;
use crate::services::scheduler::{FlowEvent, ScheduledEvent};
use crate::ws::protocol::ServerEvent;

impl GameFlowService {
    /// After the round result: open a proposal, or skip it for good once the
    /// traitor has been convicted.
    pub(super) async fn start_vote_proposal(
        &self,
        ev: &ScheduledEvent,
    ) -> Result<LockOutcome<Room>, AppError> {
        let stamp = ev.stamp;
        let config = &self.config;
        self.txn
            .run(&ev.room_id, move |room, fx| {
                if !room.is_phase(Phase::Judging) || !stamp.matches(room) {
                    return Ok(Flow::Skip(STALE));
                }
                let round = room.current_round;
                if room.voting_disabled {
                    room.set_phase(None);
                    fx.broadcast(room, ServerEvent::VoteProposalSkipped { round });
                    fx.now(FlowEvent::StartNextRound);
                    return Ok(Flow::Done(()));
                }

                room.set_phase(Some(Phase::VoteProposal));
                fx.broadcast(
                    room,
                    ServerEvent::VoteProposalStarted {
                        round,
                        timeout_ms: config.vote_proposal_timeout.as_millis() as u64,
                    },
                );
                fx.after(FlowEvent::ProposalTimeout, config.vote_proposal_timeout);
                Ok(Flow::Done(()))
            })
            .await
    }

    pub(super) async fn proposal_timeout(
        &self,
        ev: &ScheduledEvent,
    ) -> Result<LockOutcome<Room>, AppError> {
        let stamp = ev.stamp;
        let config = &self.config;
        self.txn
            .run(&ev.room_id, move |room, fx| {
                if !room.is_phase(Phase::VoteProposal) || !stamp.matches(room) {
                    return Ok(Flow::Skip(STALE));
                }
                Self::resolve_proposal(room, fx, config);
                Ok(Flow::Done(()))
            })
            .await
    }

    pub(super) async fn trial_timeout(
        &self,
        ev: &ScheduledEvent,
    ) -> Result<LockOutcome<Room>, AppError> {
        let stamp = ev.stamp;
        let config = &self.config;
        self.txn
            .run(&ev.room_id, move |room, fx| {
                if !room.is_phase(Phase::TrialVote) || !stamp.matches(room) {
                    return Ok(Flow::Skip(STALE));
                }
                Self::resolve_trial(room, fx, config);
                Ok(Flow::Done(()))
            })
            .await
    }

    /// Open a trial when the quorum agreed, otherwise move on.
    pub(super) fn resolve_proposal(room: &mut Room, fx: &mut Effects, config: &GameConfig) {
        let agree = room.agree_count();
        let needed = config.proposal_quorum;

        if agree >= needed {
            room.apply_vitality(-config.trial_cost);
            room.set_phase(Some(Phase::TrialVote));
            fx.broadcast(
                room,
                ServerEvent::TrialStarted {
                    round: room.current_round,
                    vitality: room.vitality,
                    timeout_ms: config.trial_vote_timeout.as_millis() as u64,
                },
            );
            fx.after(FlowEvent::TrialTimeout, config.trial_vote_timeout);
            info!(room_id = %room.id, agree, "trial opened");
        } else {
            room.set_phase(None);
            fx.broadcast(room, ServerEvent::VoteProposalFailed { agree, needed });
            fx.after(FlowEvent::StartNextRound, config.proposal_failed_delay);
        }
    }

    /// Convict the plurality choice. Convicting the traitor rewards vitality
    /// and disables voting for the rest of the game; convicting a citizen
    /// costs vitality. An all-abstain trial changes nothing.
    pub(super) fn resolve_trial(room: &mut Room, fx: &mut Effects, config: &GameConfig) {
        let verdict = room.trial_verdict();
        let (accused, votes, was_traitor, delta) = match verdict {
            Some((accused, votes)) => {
                let traitor = room.player(&accused).is_some_and(|p| p.is_traitor());
                let delta = if traitor {
                    room.voting_disabled = true;
                    config.traitor_reward
                } else {
                    -config.wrong_accusation_penalty
                };
                (Some(accused), votes, Some(traitor), delta)
            }
            None => (None, 0, None, 0),
        };
        room.apply_vitality(delta);
        room.set_phase(Some(Phase::TrialResult));

        info!(
            room_id = %room.id,
            accused = accused.as_deref().unwrap_or("-"),
            was_traitor = was_traitor.unwrap_or(false),
            delta,
            "trial resolved"
        );
        fx.broadcast(
            room,
            ServerEvent::TrialResult {
                accused,
                votes,
                was_traitor,
                vitality_delta: delta,
                vitality: room.vitality,
                voting_disabled: room.voting_disabled,
            },
        );
        fx.after(FlowEvent::StartNextRound, config.trial_result_delay);
    }
}
