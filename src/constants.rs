//! Configuration constants for the trivia coordinator
//!
//! This module contains the default values and validation bounds used by
//! [`crate::config::Config`] and by the question and round types, so that
//! limits stay consistent across the crate.

/// Session (game) level constants
pub mod game {
    /// Default number of distinct players needed before a game starts
    pub const DEFAULT_QUORUM: usize = 3;
    /// Smallest quorum that can be configured
    pub const MIN_QUORUM: usize = 1;
    /// Largest quorum that can be configured
    pub const MAX_QUORUM: usize = 50;
    /// Default number of rounds played in one game
    pub const DEFAULT_ROUNDS_PER_GAME: usize = 3;
    /// Maximum number of rounds in one game
    pub const MAX_ROUNDS_PER_GAME: usize = 20;
    /// Default time in seconds a channel has to gather the quorum
    pub const DEFAULT_QUORUM_WAIT: u64 = 120;
    /// Minimum quorum wait in seconds
    pub const MIN_QUORUM_WAIT: u64 = 5;
    /// Maximum quorum wait in seconds
    pub const MAX_QUORUM_WAIT: u64 = 3600;
    /// Default minimum spacing in seconds between "players still needed" notices
    pub const DEFAULT_JOIN_NOTIFY_INTERVAL: u64 = 5;
    /// Maximum number of player names listed in a game snapshot
    pub const MAX_LISTED_PLAYERS: usize = 50;
}

/// Round level constants
pub mod round {
    /// Default round duration in seconds
    pub const DEFAULT_DURATION: u64 = 90;
    /// Minimum round duration in seconds
    pub const MIN_DURATION: u64 = 5;
    /// Maximum round duration in seconds
    pub const MAX_DURATION: u64 = 600;
    /// Default warning window in seconds before the round ends
    pub const DEFAULT_TIME_LEFT_WARNING: u64 = 30;
    /// Default interval in seconds between reveals of newly claimed answers
    pub const DEFAULT_REVEAL_INTERVAL: u64 = 5;
}

/// Manager level constants
pub mod manager {
    /// Default number of games that may hold a concurrency token at once
    pub const DEFAULT_MAX_ACTIVE_GAMES: usize = 400;
    /// Upper bound for the concurrency token pool
    pub const MAX_ACTIVE_GAMES: usize = 100_000;
    /// Default capacity of each session's join queue
    pub const DEFAULT_JOIN_BUFFER: usize = 64;
    /// Default capacity of each session's message queue
    pub const DEFAULT_MESSAGE_BUFFER: usize = 1024;
    /// Upper bound for per-session queue capacities
    pub const MAX_BUFFER: usize = 100_000;
}

/// Question constants
pub mod question {
    /// Maximum length of a question text in characters
    pub const MAX_TEXT_LENGTH: usize = 500;
    /// Maximum number of answer slots in a question
    pub const MAX_ANSWER_COUNT: usize = 16;
    /// Maximum number of accepted variants per answer slot
    pub const MAX_VARIANT_COUNT: usize = 8;
}

/// Answer text constants
pub mod answer_text {
    /// Maximum length of answer text in characters
    pub const MAX_LENGTH: usize = 200;
}

/// Store configuration keys and defaults
pub mod store {
    /// Channel configuration key limiting how many questions are drawn from
    pub const QUESTION_LIMIT_KEY: &str = "questionLimit";
    /// Default question limit, zero meaning "the whole bank"
    pub const DEFAULT_QUESTION_LIMIT: usize = 0;
    /// Number of top channel players included in final standings
    pub const CHANNEL_TOP_N: usize = 3;
}
