//! Error types shared by the coordinator and its collaborators

use thiserror::Error;

use crate::player::{ChannelId, PlayerId};

/// Errors surfaced by the coordinator, the store contract and configuration
#[derive(Debug, Error)]
pub enum Error {
    /// The question bank has nothing left to offer for this seed/offset
    #[error("no question available (seed {seed}, rounds played {rounds_played})")]
    QuestionNotFound {
        /// Seed of the channel's question order
        seed: u64,
        /// Number of rounds the channel had already played
        rounds_played: usize,
    },
    /// The player has never scored in the channel
    #[error("player {player} has no score in channel {channel}")]
    PlayerNotFound {
        /// Channel that was queried
        channel: ChannelId,
        /// Player that was looked up
        player: PlayerId,
    },
    /// The question bank produced a question that cannot be played
    #[error("invalid question {id}: {report}")]
    InvalidQuestion {
        /// Question bank identifier
        id: u64,
        /// Violated bounds
        report: garde::Report,
    },
    /// Configuration failed validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] garde::Report),
    /// The backing store failed
    #[error("storage failure: {0}")]
    Storage(String),
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;
