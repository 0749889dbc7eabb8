//! Presentation and content seam
//!
//! The coordinator never renders text, talks to the chat transport or picks
//! questions itself. At each lifecycle point it calls into a [`Handler`],
//! passing plain snapshots rather than live references to the session.

use std::{sync::Arc, time::Duration};

use serde::Serialize;
use tracing::{error, info};

use crate::{
    TruncatedVec,
    error::Result,
    game::SessionState,
    game_id::GameId,
    player::{Channel, Player},
    question::Question,
    rank::Rank,
    round::RoundReveal,
    store::{self, Store},
};

/// Read-only view of a session at the moment of a notification
#[serde_with::serde_as]
#[derive(Debug, Clone, Serialize)]
pub struct GameSnapshot {
    /// Game identifier
    pub id: GameId,
    /// Channel hosting the game
    pub channel: Channel,
    /// Lifecycle state
    pub state: SessionState,
    /// Names of the joined players, in join order
    pub players: TruncatedVec<String>,
    /// Players needed to start
    pub quorum: usize,
    /// Current round (1-indexed, 0 before the first round)
    pub round: usize,
    /// Rounds in a full game
    pub rounds_per_game: usize,
    /// Running total over the finished rounds
    pub rank: Rank,
    /// Average time games spent queued for a slot, across the manager
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub waiting_avg: Duration,
}

impl GameSnapshot {
    /// Number of players still missing for the quorum
    pub fn players_needed(&self) -> usize {
        self.quorum.saturating_sub(self.players.exact_count())
    }

    /// Whether the current round is the last one of the game
    pub fn is_final_round(&self) -> bool {
        self.round >= self.rounds_per_game
    }
}

/// Outcome of a finished round
#[derive(Debug, Clone, Serialize)]
pub struct RoundSummary {
    /// Question and slots, unclaimed answers shown on timeout
    pub reveal: RoundReveal,
    /// Scores earned in this round only
    pub ranking: Rank,
    /// The round ended on its deadline rather than by being completed
    pub timeout: bool,
}

/// Side effects of the coordinator, implemented once per deployment target
///
/// Calls are made from the session task, so implementations should hand
/// slow work (network sends, retries) off to their own queues.
pub trait Handler: Send + Sync {
    /// Supplies the question for the next round
    ///
    /// # Errors
    ///
    /// Any error aborts the game; the session finishes and the process goes on.
    fn new_round(&self, game: &GameSnapshot) -> Result<Question>;

    /// The game is waiting for a free slot in the global pool
    fn game_queued(&self, game: &GameSnapshot);

    /// A queued game obtained its slot and is now gathering players
    fn ready_after_queue(&self, game: &GameSnapshot);

    /// A new player joined and the quorum is not met yet
    ///
    /// Debounced by the session; `time_left` is the remaining quorum wait.
    fn user_joined(&self, game: &GameSnapshot, time_left: Duration);

    /// Quorum reached, rounds are about to begin
    fn game_started(&self, game: &GameSnapshot);

    /// A round began with the given (unclaimed) question
    fn round_started(&self, game: &GameSnapshot, round: &RoundReveal);

    /// The round enters its final warning window
    fn round_time_left(&self, game: &GameSnapshot, time_left: Duration);

    /// A player guessed wrong and nudges are enabled
    fn wrong_answer(&self, game: &GameSnapshot, player: &Player, time_left: Duration);

    /// Answers were claimed since the previous reveal
    fn answers_revealed(&self, game: &GameSnapshot, round: &RoundReveal);

    /// A round ended, by completion or timeout
    fn round_finished(&self, game: &GameSnapshot, summary: &RoundSummary);

    /// The game ended; `timeout` is set when the quorum was never reached
    fn game_finished(&self, game: &GameSnapshot, timeout: bool);
}

/// Handler that only logs, drawing questions from a [`Store`]
///
/// Useful for headless runs and as a base for transports that only need a
/// few of the notifications.
pub struct LogHandler {
    store: Arc<dyn Store>,
}

impl LogHandler {
    /// Creates a handler serving questions from `store`
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

impl Handler for LogHandler {
    fn new_round(&self, game: &GameSnapshot) -> Result<Question> {
        store::next_round_question(self.store.as_ref(), &game.channel.id)
    }

    fn game_queued(&self, game: &GameSnapshot) {
        info!(
            channel = %game.channel.id,
            game = %game.id,
            waiting_avg = game.waiting_avg.as_secs(),
            "game queued"
        );
    }

    fn ready_after_queue(&self, game: &GameSnapshot) {
        info!(channel = %game.channel.id, game = %game.id, "game left the queue");
    }

    fn user_joined(&self, game: &GameSnapshot, time_left: Duration) {
        info!(
            channel = %game.channel.id,
            game = %game.id,
            needed = game.players_needed(),
            time_left = time_left.as_secs(),
            "waiting for players"
        );
    }

    fn game_started(&self, game: &GameSnapshot) {
        info!(channel = %game.channel.id, game = %game.id, players = game.players.exact_count(), "game started");
    }

    fn round_started(&self, game: &GameSnapshot, round: &RoundReveal) {
        info!(
            channel = %game.channel.id,
            game = %game.id,
            round = %round.round_id,
            question = round.question_id,
            "round {} of {} started",
            game.round,
            game.rounds_per_game
        );
    }

    fn round_time_left(&self, game: &GameSnapshot, time_left: Duration) {
        info!(channel = %game.channel.id, game = %game.id, time_left = time_left.as_secs(), "round time left");
    }

    fn wrong_answer(&self, game: &GameSnapshot, player: &Player, time_left: Duration) {
        info!(channel = %game.channel.id, player = %player.id, time_left = time_left.as_secs(), "wrong answer");
    }

    fn answers_revealed(&self, game: &GameSnapshot, round: &RoundReveal) {
        info!(channel = %game.channel.id, game = %game.id, round = %round.round_id, "answers revealed");
    }

    fn round_finished(&self, game: &GameSnapshot, summary: &RoundSummary) {
        info!(
            channel = %game.channel.id,
            game = %game.id,
            round = %summary.reveal.round_id,
            timeout = summary.timeout,
            scorers = summary.ranking.len(),
            "round finished"
        );
        if !game.is_final_round() {
            return;
        }
        match store::channel_standings(self.store.as_ref(), &game.channel.id, &game.rank) {
            Ok(standings) => {
                for entry in standings.iter() {
                    info!(channel = %game.channel.id, position = entry.position, player = %entry.player_id, score = entry.score, "standing");
                }
            }
            Err(e) => error!(channel = %game.channel.id, error = %e, "reading channel standings failed"),
        }
    }

    fn game_finished(&self, game: &GameSnapshot, timeout: bool) {
        info!(channel = %game.channel.id, game = %game.id, timeout, "game finished");
    }
}
