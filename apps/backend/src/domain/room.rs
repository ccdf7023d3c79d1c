//! The room aggregate.
//!
//! A room snapshot is loaded, mutated in memory and persisted as one blob
//! while the caller holds the room's lease. Mutators here enforce the
//! aggregate's invariants; they perform no I/O.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::content::WordSlot;
use super::player::{ConnectionStatus, Player, PlayerColor, Role, SessionId, TrialVote};
use crate::errors::domain::{DomainError, NotFoundKind, ValidationKind};

pub type RoomId = String;

/// Lifecycle-level state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomStatus {
    Waiting,
    Starting,
    Playing,
    GameOver,
}

/// Round-level sub-state while `Playing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Oracle,
    CardSelect,
    Judging,
    VoteProposal,
    TrialVote,
    TrialResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundHistory {
    pub round: u32,
    pub oracle: String,
    pub sentence: String,
    pub score_delta: i32,
    pub commentary: String,
}

/// Per-phase scratch values keyed by session id.
///
/// Holds lobby readiness, vote-proposal ballots and return opt-ins. Cleared
/// on every status or phase transition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhaseData(BTreeMap<SessionId, String>);

const READY: &str = "ready";
const AGREE: &str = "agree";
const DISAGREE: &str = "disagree";
const RETURN: &str = "return";

impl PhaseData {
    pub fn get(&self, session_id: &str) -> Option<&str> {
        self.0.get(session_id).map(String::as_str)
    }

    pub fn insert(&mut self, session_id: &str, value: &str) {
        self.0.insert(session_id.to_string(), value.to_string());
    }

    pub fn remove(&mut self, session_id: &str) {
        self.0.remove(session_id);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn count_value(&self, value: &str) -> usize {
        self.0.values().filter(|v| v.as_str() == value).count()
    }

    pub fn keys(&self) -> impl Iterator<Item = &SessionId> {
        self.0.keys()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: RoomId,
    pub code: String,
    pub title: String,
    pub host_session_id: SessionId,
    pub players: Vec<Player>,
    pub status: RoomStatus,
    pub current_phase: Option<Phase>,
    pub current_round: u32,
    /// Bumped on every lobby reset so timers from an earlier game are stale.
    pub generation: u32,
    pub vitality: i32,
    pub oracle: Option<String>,
    pub personality: Option<String>,
    pub voting_disabled: bool,
    pub used_oracles: BTreeSet<String>,
    pub history: Vec<RoundHistory>,
    pub phase_data: PhaseData,
    /// Unix milliseconds.
    pub created_at: i64,
}

impl Room {
    pub fn new(
        id: impl Into<RoomId>,
        code: impl Into<String>,
        title: impl Into<String>,
        mut host: Player,
        vitality: i32,
        created_at: i64,
    ) -> Self {
        host.is_host = true;
        Self {
            id: id.into(),
            code: code.into(),
            title: title.into(),
            host_session_id: host.session_id.clone(),
            players: vec![host],
            status: RoomStatus::Waiting,
            current_phase: None,
            current_round: 0,
            generation: 0,
            vitality,
            oracle: None,
            personality: None,
            voting_disabled: false,
            used_oracles: BTreeSet::new(),
            history: Vec::new(),
            phase_data: PhaseData::default(),
            created_at,
        }
    }

    // ------------------------------------------------------------------
    // Membership
    // ------------------------------------------------------------------

    pub fn player(&self, session_id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.session_id == session_id)
    }

    pub fn player_mut(&mut self, session_id: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.session_id == session_id)
    }

    /// The player must exist and be connected to act.
    pub fn require_active(&self, session_id: &str) -> Result<&Player, DomainError> {
        match self.player(session_id) {
            Some(p) if p.is_connected() => Ok(p),
            _ => Err(DomainError::not_found(
                NotFoundKind::Player,
                "You are not an active player in this room",
            )),
        }
    }

    pub fn is_host(&self, session_id: &str) -> bool {
        self.host_session_id == session_id
    }

    pub fn is_full(&self, capacity: usize) -> bool {
        self.players.len() >= capacity
    }

    pub fn next_free_color(&self) -> Option<PlayerColor> {
        PlayerColor::ALL
            .into_iter()
            .find(|c| self.players.iter().all(|p| p.color != *c))
    }

    pub fn add_player(
        &mut self,
        session_id: &str,
        nickname: &str,
        capacity: usize,
    ) -> Result<&Player, DomainError> {
        if self.player(session_id).is_some() {
            return Err(DomainError::validation(
                ValidationKind::AlreadyJoined,
                "Already in this room",
            ));
        }
        if self.is_full(capacity) {
            return Err(DomainError::validation(ValidationKind::RoomFull, "Room is full"));
        }
        let color = self.next_free_color().ok_or_else(|| {
            DomainError::validation(ValidationKind::RoomFull, "No free seat color")
        })?;
        self.players.push(Player::new(session_id, nickname, color));
        Ok(&self.players[self.players.len() - 1])
    }

    /// Remove a player outright, handing the host flag on if needed.
    pub fn remove_player(&mut self, session_id: &str) -> Option<Player> {
        let idx = self.players.iter().position(|p| p.session_id == session_id)?;
        let removed = self.players.remove(idx);
        self.phase_data.remove(session_id);
        self.ensure_host();
        Some(removed)
    }

    /// Keep a player's seat (and role) but stop counting them as active.
    pub fn mark_disconnected(&mut self, session_id: &str) -> bool {
        let Some(player) = self.player_mut(session_id) else {
            return false;
        };
        player.connection = ConnectionStatus::Disconnected;
        self.phase_data.remove(session_id);
        self.ensure_host();
        true
    }

    pub fn connected_players(&self) -> impl Iterator<Item = &Player> {
        self.players.iter().filter(|p| p.is_connected())
    }

    pub fn connected_count(&self) -> usize {
        self.connected_players().count()
    }

    pub fn has_connected_players(&self) -> bool {
        self.players.iter().any(Player::is_connected)
    }

    /// Restore the single-host invariant: the host must be a connected player
    /// whenever one exists.
    fn ensure_host(&mut self) {
        let current_ok = self
            .player(&self.host_session_id)
            .is_some_and(Player::is_connected);
        if current_ok {
            return;
        }
        let next = self
            .players
            .iter()
            .find(|p| p.is_connected())
            .or_else(|| self.players.first())
            .map(|p| p.session_id.clone());
        if let Some(next) = next {
            self.set_host(&next);
        }
    }

    fn set_host(&mut self, session_id: &str) {
        for p in &mut self.players {
            p.is_host = p.session_id == session_id;
        }
        self.host_session_id = session_id.to_string();
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    /// Move to a lifecycle status. Leaving `Playing` drops the phase.
    pub fn set_status(&mut self, status: RoomStatus) {
        self.status = status;
        if status != RoomStatus::Playing {
            self.current_phase = None;
        }
        self.clear_phase_scratch();
    }

    /// Move to a round phase (or back to the pre-round `None`).
    pub fn set_phase(&mut self, phase: Option<Phase>) {
        self.current_phase = phase;
        self.clear_phase_scratch();
    }

    /// Enter `phase`, rejecting re-entry. Used as the at-most-once guard for
    /// phases that several racing paths try to enter.
    pub fn enter_phase(&mut self, phase: Phase) -> Result<(), DomainError> {
        if self.current_phase == Some(phase) {
            return Err(DomainError::validation(
                ValidationKind::PhaseMismatch,
                format!("Already in {phase:?}"),
            ));
        }
        self.set_phase(Some(phase));
        Ok(())
    }

    pub fn is_phase(&self, phase: Phase) -> bool {
        self.status == RoomStatus::Playing && self.current_phase == Some(phase)
    }

    fn require_phase(&self, phase: Phase) -> Result<(), DomainError> {
        if self.is_phase(phase) {
            Ok(())
        } else {
            Err(DomainError::validation(
                ValidationKind::PhaseMismatch,
                format!("Action only allowed during {phase:?}"),
            ))
        }
    }

    fn clear_phase_scratch(&mut self) {
        self.phase_data.clear();
        for p in &mut self.players {
            p.vote_target = None;
        }
    }

    // ------------------------------------------------------------------
    // Lobby readiness
    // ------------------------------------------------------------------

    pub fn set_ready(&mut self, session_id: &str, ready: bool) -> Result<(), DomainError> {
        if self.status != RoomStatus::Waiting {
            return Err(DomainError::validation(
                ValidationKind::PhaseMismatch,
                "Readiness can only change in the lobby",
            ));
        }
        self.require_active(session_id)?;
        if ready {
            self.phase_data.insert(session_id, READY);
        } else {
            self.phase_data.remove(session_id);
        }
        Ok(())
    }

    /// The host starts the game and counts as ready.
    pub fn is_ready(&self, session_id: &str) -> bool {
        self.is_host(session_id) || self.phase_data.get(session_id) == Some(READY)
    }

    pub fn all_ready(&self) -> bool {
        self.connected_players().all(|p| self.is_ready(&p.session_id))
    }

    // ------------------------------------------------------------------
    // Game setup
    // ------------------------------------------------------------------

    /// Give the player at `traitor_index` the traitor role, everyone else
    /// citizen.
    pub fn assign_roles(&mut self, traitor_index: usize) {
        for (i, p) in self.players.iter_mut().enumerate() {
            p.reset_game();
            p.role = Some(if i == traitor_index {
                Role::Traitor
            } else {
                Role::Citizen
            });
        }
    }

    pub fn traitor(&self) -> Option<&Player> {
        self.players.iter().find(|p| p.is_traitor())
    }

    /// Assign word slots in player order, cycling when players outnumber slots.
    pub fn assign_slots(&mut self, shuffled_slots: &[WordSlot]) {
        for (i, p) in self.players.iter_mut().enumerate() {
            p.reset_round();
            p.word_slot = shuffled_slots.get(i % shuffled_slots.len().max(1)).copied();
        }
    }

    // ------------------------------------------------------------------
    // Card selection
    // ------------------------------------------------------------------

    pub fn record_selection(&mut self, session_id: &str, card: &str) -> Result<(), DomainError> {
        self.require_phase(Phase::CardSelect)?;
        self.require_active(session_id)?;
        let player = self.player_mut(session_id).ok_or_else(|| {
            DomainError::not_found(NotFoundKind::Player, "Player not found")
        })?;
        if player.selected_card.is_some() {
            return Err(DomainError::validation(
                ValidationKind::AlreadySelected,
                "Card already selected this round",
            ));
        }
        if player.hand.is_empty() {
            return Err(DomainError::validation(
                ValidationKind::CardsNotDealt,
                "Cards have not been dealt yet",
            ));
        }
        if !player.hand.iter().any(|c| c == card) {
            return Err(DomainError::validation(
                ValidationKind::CardNotInHand,
                "That card is not in your hand",
            ));
        }
        player.selected_card = Some(card.to_string());
        Ok(())
    }

    pub fn selected_count(&self) -> usize {
        self.connected_players()
            .filter(|p| p.selected_card.is_some())
            .count()
    }

    /// Every connected player has a card in.
    pub fn all_selected(&self) -> bool {
        self.has_connected_players()
            && self.connected_players().all(|p| p.selected_card.is_some())
    }

    /// Selected cards ordered by word slot, then seat order.
    pub fn compose_sentence(&self) -> String {
        let mut parts: Vec<(WordSlot, usize, &str)> = self
            .players
            .iter()
            .enumerate()
            .filter_map(|(seat, p)| {
                let slot = p.word_slot?;
                let card = p.selected_card.as_deref()?;
                Some((slot, seat, card))
            })
            .collect();
        parts.sort_by_key(|(slot, seat, _)| (*slot, *seat));
        parts
            .into_iter()
            .map(|(_, _, card)| card)
            .collect::<Vec<_>>()
            .join(" ")
    }

    // ------------------------------------------------------------------
    // Vote proposal
    // ------------------------------------------------------------------

    /// Record a yes/no ballot; returns how many ballots are in.
    pub fn record_proposal(&mut self, session_id: &str, agree: bool) -> Result<usize, DomainError> {
        self.require_phase(Phase::VoteProposal)?;
        self.require_active(session_id)?;
        if self.phase_data.get(session_id).is_some() {
            return Err(DomainError::validation(
                ValidationKind::AlreadyVoted,
                "Already voted on this proposal",
            ));
        }
        self.phase_data
            .insert(session_id, if agree { AGREE } else { DISAGREE });
        Ok(self.phase_data.len())
    }

    pub fn agree_count(&self) -> usize {
        self.phase_data.count_value(AGREE)
    }

    pub fn proposal_ballots(&self) -> usize {
        self.phase_data.len()
    }

    // ------------------------------------------------------------------
    // Trial
    // ------------------------------------------------------------------

    pub fn record_trial_vote(
        &mut self,
        session_id: &str,
        vote: TrialVote,
    ) -> Result<usize, DomainError> {
        self.require_phase(Phase::TrialVote)?;
        self.require_active(session_id)?;
        if let TrialVote::Target(target) = &vote {
            if target == session_id || self.player(target).is_none() {
                return Err(DomainError::validation(
                    ValidationKind::InvalidTarget,
                    "Invalid vote target",
                ));
            }
        }
        let player = self.player_mut(session_id).ok_or_else(|| {
            DomainError::not_found(NotFoundKind::Player, "Player not found")
        })?;
        if player.vote_target.is_some() {
            return Err(DomainError::validation(
                ValidationKind::AlreadyVoted,
                "Already voted in this trial",
            ));
        }
        player.vote_target = Some(vote);
        Ok(self.trial_ballots())
    }

    pub fn trial_ballots(&self) -> usize {
        self.connected_players()
            .filter(|p| p.vote_target.is_some())
            .count()
    }

    /// Votes received per accused session.
    pub fn trial_tally(&self) -> BTreeMap<SessionId, usize> {
        let mut tally = BTreeMap::new();
        for p in &self.players {
            if let Some(TrialVote::Target(target)) = &p.vote_target {
                *tally.entry(target.clone()).or_insert(0) += 1;
            }
        }
        tally
    }

    /// The accused with the most votes. Ties go to the lexically smallest
    /// session id; `None` when nobody was accused.
    pub fn trial_verdict(&self) -> Option<(SessionId, usize)> {
        let mut best: Option<(SessionId, usize)> = None;
        for (target, votes) in self.trial_tally() {
            if best.as_ref().is_none_or(|(_, top)| votes > *top) {
                best = Some((target, votes));
            }
        }
        best
    }

    // ------------------------------------------------------------------
    // Outcome
    // ------------------------------------------------------------------

    pub fn apply_vitality(&mut self, delta: i32) {
        self.vitality = self.vitality.saturating_add(delta);
    }

    /// Citizens win only if the traitor was caught and vitality survived.
    pub fn winner(&self) -> Role {
        if self.voting_disabled && self.vitality > 0 {
            Role::Citizen
        } else {
            Role::Traitor
        }
    }

    // ------------------------------------------------------------------
    // Return to lobby
    // ------------------------------------------------------------------

    pub fn opt_in_return(&mut self, session_id: &str) -> Result<usize, DomainError> {
        if self.status != RoomStatus::GameOver {
            return Err(DomainError::validation(
                ValidationKind::PhaseMismatch,
                "The game is not over",
            ));
        }
        self.require_active(session_id)?;
        self.phase_data.insert(session_id, RETURN);
        Ok(self.returned_sessions().len())
    }

    /// Connected players who opted to return.
    pub fn returned_sessions(&self) -> BTreeSet<SessionId> {
        self.connected_players()
            .filter(|p| self.phase_data.get(&p.session_id) == Some(RETURN))
            .map(|p| p.session_id.clone())
            .collect()
    }

    pub fn all_connected_returned(&self) -> bool {
        self.has_connected_players() && self.returned_sessions().len() == self.connected_count()
    }

    /// Turn a finished game back into a fresh lobby containing only `keep`.
    ///
    /// Returns the players who were dropped.
    pub fn reset_for_lobby(&mut self, keep: &BTreeSet<SessionId>, vitality: i32) -> Vec<Player> {
        let (kept, kicked): (Vec<Player>, Vec<Player>) = std::mem::take(&mut self.players)
            .into_iter()
            .partition(|p| keep.contains(&p.session_id));
        self.players = kept;
        for p in &mut self.players {
            p.reset_game();
        }
        self.generation = self.generation.wrapping_add(1);
        self.current_round = 0;
        self.vitality = vitality;
        self.oracle = None;
        self.personality = None;
        self.voting_disabled = false;
        self.used_oracles.clear();
        self.history.clear();
        self.set_status(RoomStatus::Waiting);
        self.ensure_host();
        kicked
    }
}
