//! In-game player actions. Each validates against the current phase and
//! advances early once every connected player has acted.

use tracing::debug;

use super::{user_result, GameFlowService};
use crate::config::GameConfig;
use crate::domain::{Phase, Room, SessionId, TrialVote};
use crate::error::AppError;
use crate::lock::Flow;
use crate::services::room_txn::Effects;
use crate::services::scheduler::FlowEvent;
use crate::ws::protocol::ServerEvent;

impl GameFlowService {
    pub async fn select_card(&self, session_id: &str, card: &str) -> Result<(), AppError> {
        let room_id = self.room_of(session_id).await?;
        let outcome = self
            .txn
            .run(&room_id, move |room, fx| {
                room.record_selection(session_id, card)?;
                debug!(room_id = %room.id, session_id, "card selected");
                fx.broadcast(
                    room,
                    ServerEvent::CardSelected {
                        session_id: session_id.to_string(),
                        selected: room.selected_count(),
                        total: room.connected_count(),
                    },
                );
                Self::judge_if_complete(room, fx);
                Ok(Flow::Done(()))
            })
            .await?;
        user_result(outcome)
    }

    pub async fn propose_vote(&self, session_id: &str, agree: bool) -> Result<(), AppError> {
        let room_id = self.room_of(session_id).await?;
        let config = &self.config;
        let outcome = self
            .txn
            .run(&room_id, move |room, fx| {
                let ballots = room.record_proposal(session_id, agree)?;
                fx.broadcast(
                    room,
                    ServerEvent::VoteProposalUpdated {
                        ballots,
                        agree: room.agree_count(),
                        needed: config.proposal_quorum,
                    },
                );
                if ballots >= room.connected_count() {
                    Self::resolve_proposal(room, fx, config);
                }
                Ok(Flow::Done(()))
            })
            .await?;
        user_result(outcome)
    }

    /// Trial ballot; `None` abstains.
    pub async fn cast_vote(
        &self,
        session_id: &str,
        target: Option<SessionId>,
    ) -> Result<(), AppError> {
        let room_id = self.room_of(session_id).await?;
        let config = &self.config;
        let vote = target.map_or(TrialVote::Abstain, TrialVote::Target);
        let outcome = self
            .txn
            .run(&room_id, move |room, fx| {
                let ballots = room.record_trial_vote(session_id, vote)?;
                fx.broadcast(
                    room,
                    ServerEvent::TrialVoteUpdated {
                        ballots,
                        total: room.connected_count(),
                    },
                );
                if ballots >= room.connected_count() {
                    Self::resolve_trial(room, fx, config);
                }
                Ok(Flow::Done(()))
            })
            .await?;
        user_result(outcome)
    }

    /// BACK_TO_ROOM after the game: opt in, and reset the room once every
    /// connected player has.
    pub async fn back_to_room(&self, session_id: &str) -> Result<(), AppError> {
        let room_id = self.room_of(session_id).await?;
        let config = &self.config;
        let rng = &self.rng;
        let outcome = self
            .txn
            .run(&room_id, move |room, fx| {
                room.opt_in_return(session_id)?;
                fx.broadcast(
                    room,
                    ServerEvent::ReturnUpdated {
                        returned: room.returned_sessions().into_iter().collect(),
                        total: room.connected_count(),
                    },
                );
                if room.all_connected_returned() {
                    Self::finalize(room, fx, rng, config);
                }
                Ok(Flow::Done(()))
            })
            .await?;
        user_result(outcome)
    }

    fn judge_if_complete(room: &Room, fx: &mut Effects) {
        if room.is_phase(Phase::CardSelect) && room.all_selected() {
            fx.broadcast(
                room,
                ServerEvent::AllCardsSelected {
                    round: room.current_round,
                },
            );
            fx.now(FlowEvent::JudgeRound);
        }
    }

    /// A player dropped mid-game: the remaining connected players may now
    /// all have acted.
    pub(super) fn advance_after_departure(room: &mut Room, fx: &mut Effects, config: &GameConfig) {
        match room.current_phase {
            Some(Phase::CardSelect) => Self::judge_if_complete(room, fx),
            Some(Phase::VoteProposal) if room.proposal_ballots() >= room.connected_count() => {
                Self::resolve_proposal(room, fx, config);
            }
            Some(Phase::TrialVote) if room.trial_ballots() >= room.connected_count() => {
                Self::resolve_trial(room, fx, config);
            }
            _ => {}
        }
    }
}
