//! Coordinator configuration
//!
//! A [`Config`] value is built once (usually deserialized from the host
//! application's own configuration file) and handed to
//! [`crate::manager::SessionManager::new`]. Every session receives a copy, so
//! there is no process-wide mutable state.

use std::time::Duration;

use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::{
    constants::{game::*, manager::*, round::*},
    error::Result,
};

/// Validates that a duration falls within specified bounds in seconds (inclusive)
///
/// # Errors
///
/// Returns a `garde::Error` if the duration is outside the specified bounds.
pub fn validate_duration<const MIN_SECONDS: u64, const MAX_SECONDS: u64>(
    val: &Duration,
    _ctx: &(),
) -> garde::Result {
    if (MIN_SECONDS..=MAX_SECONDS).contains(&val.as_secs()) {
        Ok(())
    } else {
        Err(garde::Error::new(format!(
            "outside of bounds [{MIN_SECONDS},{MAX_SECONDS}]",
        )))
    }
}

/// Validates that a duration is not zero
///
/// # Errors
///
/// Returns a `garde::Error` for a zero duration.
pub fn validate_non_zero(val: &Duration, _ctx: &()) -> garde::Result {
    if val.is_zero() {
        Err(garde::Error::new("must not be zero"))
    } else {
        Ok(())
    }
}

/// Settings shared by the manager and every session it spawns
#[serde_with::serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Config {
    /// Number of distinct players required to start a game
    #[garde(range(min = MIN_QUORUM, max = MAX_QUORUM))]
    pub quorum: usize,
    /// Number of rounds played per game
    #[garde(range(min = 1, max = MAX_ROUNDS_PER_GAME))]
    pub rounds_per_game: usize,
    /// Time allowed to reach the quorum, restarted by every new player
    #[garde(custom(validate_duration::<MIN_QUORUM_WAIT, MAX_QUORUM_WAIT>))]
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub quorum_wait: Duration,
    /// Minimum spacing between two "players still needed" notices
    #[garde(skip)]
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub join_notify_interval: Duration,
    /// Duration of a single round
    #[garde(custom(validate_duration::<MIN_DURATION, MAX_DURATION>))]
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub round_duration: Duration,
    /// How long before the end of a round the time-left warning fires
    #[garde(skip)]
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub time_left_warning: Duration,
    /// Interval between reveals of freshly claimed answers
    #[garde(custom(validate_non_zero))]
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub reveal_interval: Duration,
    /// Send a time-left nudge after every wrong answer
    #[garde(skip)]
    pub nudge_after_wrong_answer: bool,
    /// Size of the global concurrency token pool
    #[garde(range(min = 1, max = MAX_ACTIVE_GAMES))]
    pub max_active_games: usize,
    /// Capacity of each session's join queue
    #[garde(range(min = 1, max = MAX_BUFFER))]
    pub join_buffer: usize,
    /// Capacity of each session's message queue
    #[garde(range(min = 1, max = MAX_BUFFER))]
    pub message_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            quorum: DEFAULT_QUORUM,
            rounds_per_game: DEFAULT_ROUNDS_PER_GAME,
            quorum_wait: Duration::from_secs(DEFAULT_QUORUM_WAIT),
            join_notify_interval: Duration::from_secs(DEFAULT_JOIN_NOTIFY_INTERVAL),
            round_duration: Duration::from_secs(DEFAULT_DURATION),
            time_left_warning: Duration::from_secs(DEFAULT_TIME_LEFT_WARNING),
            reveal_interval: Duration::from_secs(DEFAULT_REVEAL_INTERVAL),
            nudge_after_wrong_answer: false,
            max_active_games: DEFAULT_MAX_ACTIVE_GAMES,
            join_buffer: DEFAULT_JOIN_BUFFER,
            message_buffer: DEFAULT_MESSAGE_BUFFER,
        }
    }
}

impl Config {
    /// Checks the configuration bounds and returns it unchanged if valid
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidConfig`] describing every violated bound.
    pub fn validated(self) -> Result<Self> {
        self.validate()?;
        Ok(self)
    }

    /// Offset from the round start at which the time-left warning fires
    ///
    /// `None` when the warning window is not shorter than the round itself.
    pub fn time_left_offset(&self) -> Option<Duration> {
        self.round_duration
            .checked_sub(self.time_left_warning)
            .filter(|offset| !offset.is_zero())
    }
}
