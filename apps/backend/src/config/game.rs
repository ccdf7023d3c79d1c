use std::time::Duration;

use super::parse_var;
use crate::error::AppError;

/// Game rules and timer tuning.
///
/// Every field can be overridden through the environment variable named in
/// its doc comment; delays are given in milliseconds.
#[derive(Debug, Clone)]
pub struct GameConfig {
    /// `PLAYER_COUNT`: room capacity and the exact number needed to start.
    pub player_count: usize,
    /// `MAX_ROUNDS`
    pub max_rounds: u32,
    /// `VITALITY_MIN` / `VITALITY_MAX`: inclusive range for the starting vitality.
    pub vitality_min: i32,
    pub vitality_max: i32,
    /// `PROPOSAL_QUORUM`: agree votes needed to open a trial.
    pub proposal_quorum: usize,
    /// `TRIAL_COST`: vitality paid when a trial opens.
    pub trial_cost: i32,
    /// `TRAITOR_REWARD`: vitality gained when the traitor is convicted.
    pub traitor_reward: i32,
    /// `WRONG_ACCUSATION_PENALTY`: vitality lost when a citizen is convicted.
    pub wrong_accusation_penalty: i32,
    /// `CARDS_PER_HAND`
    pub cards_per_hand: usize,

    /// `START_COUNTDOWN_MS`: START_GAME → processStart.
    pub start_countdown: Duration,
    /// `SCENE_LOAD_MS`: processStart → oracle phase.
    pub scene_load_delay: Duration,
    /// `ORACLE_REVEAL_MS`: oracle phase → card selection.
    pub oracle_reveal_delay: Duration,
    /// `CARD_DELIVERY_MS`: round start → cards dealt.
    pub card_delivery_delay: Duration,
    /// `CARD_SELECT_TIMEOUT_MS`: round start → card deadline.
    pub card_select_timeout: Duration,
    /// `RESULT_DISPLAY_MS`: judged result → vote proposal.
    pub result_display_delay: Duration,
    /// `VOTE_PROPOSAL_TIMEOUT_MS`
    pub vote_proposal_timeout: Duration,
    /// `PROPOSAL_FAILED_MS`: failed proposal → next round.
    pub proposal_failed_delay: Duration,
    /// `TRIAL_VOTE_TIMEOUT_MS`
    pub trial_vote_timeout: Duration,
    /// `TRIAL_RESULT_MS`: trial result → next round.
    pub trial_result_delay: Duration,
    /// `ROUND_TRANSITION_MS`: next round → oracle phase.
    pub round_transition_delay: Duration,
    /// `CLEANUP_MS`: game over → forced return/cleanup.
    pub cleanup_delay: Duration,

    /// `LOCK_WAIT_MS`: how long to poll for a room lease before giving up.
    pub lock_wait: Duration,
    /// `LOCK_LEASE_MS`: lease expiry; must exceed the longest critical section.
    pub lock_lease: Duration,
    /// `LOCK_POLL_MS`
    pub lock_poll_interval: Duration,
    /// `TIMER_RETRY_MS`: first backoff before a timer retries after lock
    /// contention or a backend failure; doubles per attempt.
    pub timer_retry_backoff: Duration,
    /// `TIMER_RETRY_MAX_MS`: ceiling for the doubling backoff.
    pub timer_retry_max_backoff: Duration,
    /// `JUDGE_TIMEOUT_MS`
    pub judge_timeout: Duration,
    /// `ROOM_TTL_SECS`: expiry for every persisted room key.
    pub room_ttl: Duration,
    /// `NICKNAME_TTL_SECS`: how long a nickname stays reserved without a
    /// keep-alive from its session.
    pub nickname_ttl: Duration,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            player_count: 4,
            max_rounds: 5,
            vitality_min: 50,
            vitality_max: 70,
            proposal_quorum: 2,
            trial_cost: 5,
            traitor_reward: 20,
            wrong_accusation_penalty: 10,
            cards_per_hand: 5,

            start_countdown: Duration::from_secs(3),
            scene_load_delay: Duration::from_secs(3),
            oracle_reveal_delay: Duration::from_secs(5),
            card_delivery_delay: Duration::from_secs(1),
            card_select_timeout: Duration::from_secs(45),
            result_display_delay: Duration::from_secs(6),
            vote_proposal_timeout: Duration::from_secs(15),
            proposal_failed_delay: Duration::from_secs(3),
            trial_vote_timeout: Duration::from_secs(20),
            trial_result_delay: Duration::from_secs(6),
            round_transition_delay: Duration::from_secs(2),
            cleanup_delay: Duration::from_secs(120),

            lock_wait: Duration::from_secs(3),
            lock_lease: Duration::from_secs(10),
            lock_poll_interval: Duration::from_millis(50),
            timer_retry_backoff: Duration::from_millis(200),
            timer_retry_max_backoff: Duration::from_secs(5),
            judge_timeout: Duration::from_secs(15),
            room_ttl: Duration::from_secs(3 * 60 * 60),
            nickname_ttl: Duration::from_secs(120),
        }
    }
}

fn ms(name: &str, default: Duration) -> Result<Duration, AppError> {
    let millis = parse_var(name, default.as_millis() as u64)?;
    Ok(Duration::from_millis(millis))
}

impl GameConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let d = Self::default();
        let config = Self {
            player_count: parse_var("PLAYER_COUNT", d.player_count)?,
            max_rounds: parse_var("MAX_ROUNDS", d.max_rounds)?,
            vitality_min: parse_var("VITALITY_MIN", d.vitality_min)?,
            vitality_max: parse_var("VITALITY_MAX", d.vitality_max)?,
            proposal_quorum: parse_var("PROPOSAL_QUORUM", d.proposal_quorum)?,
            trial_cost: parse_var("TRIAL_COST", d.trial_cost)?,
            traitor_reward: parse_var("TRAITOR_REWARD", d.traitor_reward)?,
            wrong_accusation_penalty: parse_var(
                "WRONG_ACCUSATION_PENALTY",
                d.wrong_accusation_penalty,
            )?,
            cards_per_hand: parse_var("CARDS_PER_HAND", d.cards_per_hand)?,

            start_countdown: ms("START_COUNTDOWN_MS", d.start_countdown)?,
            scene_load_delay: ms("SCENE_LOAD_MS", d.scene_load_delay)?,
            oracle_reveal_delay: ms("ORACLE_REVEAL_MS", d.oracle_reveal_delay)?,
            card_delivery_delay: ms("CARD_DELIVERY_MS", d.card_delivery_delay)?,
            card_select_timeout: ms("CARD_SELECT_TIMEOUT_MS", d.card_select_timeout)?,
            result_display_delay: ms("RESULT_DISPLAY_MS", d.result_display_delay)?,
            vote_proposal_timeout: ms("VOTE_PROPOSAL_TIMEOUT_MS", d.vote_proposal_timeout)?,
            proposal_failed_delay: ms("PROPOSAL_FAILED_MS", d.proposal_failed_delay)?,
            trial_vote_timeout: ms("TRIAL_VOTE_TIMEOUT_MS", d.trial_vote_timeout)?,
            trial_result_delay: ms("TRIAL_RESULT_MS", d.trial_result_delay)?,
            round_transition_delay: ms("ROUND_TRANSITION_MS", d.round_transition_delay)?,
            cleanup_delay: ms("CLEANUP_MS", d.cleanup_delay)?,

            lock_wait: ms("LOCK_WAIT_MS", d.lock_wait)?,
            lock_lease: ms("LOCK_LEASE_MS", d.lock_lease)?,
            lock_poll_interval: ms("LOCK_POLL_MS", d.lock_poll_interval)?,
            timer_retry_backoff: ms("TIMER_RETRY_MS", d.timer_retry_backoff)?,
            timer_retry_max_backoff: ms("TIMER_RETRY_MAX_MS", d.timer_retry_max_backoff)?,
            judge_timeout: ms("JUDGE_TIMEOUT_MS", d.judge_timeout)?,
            room_ttl: Duration::from_secs(parse_var(
                "ROOM_TTL_SECS",
                d.room_ttl.as_secs(),
            )?),
            nickname_ttl: Duration::from_secs(parse_var(
                "NICKNAME_TTL_SECS",
                d.nickname_ttl.as_secs(),
            )?),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject combinations the state machine cannot run with.
    pub fn validate(&self) -> Result<(), AppError> {
        let fail = |detail: String| {
            AppError::config(
                detail.clone(),
                std::io::Error::new(std::io::ErrorKind::InvalidInput, detail),
            )
        };
        if self.player_count < 2 || self.player_count > crate::domain::PlayerColor::ALL.len() {
            return Err(fail(format!(
                "PLAYER_COUNT must be between 2 and {}",
                crate::domain::PlayerColor::ALL.len()
            )));
        }
        if self.vitality_min > self.vitality_max {
            return Err(fail("VITALITY_MIN must not exceed VITALITY_MAX".to_string()));
        }
        if self.max_rounds == 0 {
            return Err(fail("MAX_ROUNDS must be positive".to_string()));
        }
        if self.timer_retry_backoff.is_zero()
            || self.timer_retry_max_backoff < self.timer_retry_backoff
        {
            return Err(fail(
                "TIMER_RETRY_MS must be positive and not exceed TIMER_RETRY_MAX_MS".to_string(),
            ));
        }
        if self.nickname_ttl.is_zero() {
            return Err(fail("NICKNAME_TTL_SECS must be positive".to_string()));
        }
        if self.lock_lease <= self.lock_poll_interval {
            return Err(fail("LOCK_LEASE_MS must exceed LOCK_POLL_MS".to_string()));
        }
        Ok(())
    }
}
