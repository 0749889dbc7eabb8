//! Question bank and score storage contract
//!
//! The coordinator never owns a storage format. It talks to a [`Store`] for
//! question selection and score persistence; [`MemoryStore`] is an in-process
//! implementation used by tests and by hosts that keep no history.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::{
    constants::store::{CHANNEL_TOP_N, DEFAULT_QUESTION_LIMIT, QUESTION_LIMIT_KEY},
    error::{Error, Result},
    player::{Channel, ChannelId, PlayerId},
    question::Question,
    rank::{PlayerScore, Rank},
};

/// Storage and question bank collaborator
///
/// Implementations must be cheap to call from a session task; anything slow
/// should be buffered on the implementation side.
pub trait Store: Send + Sync {
    /// Seed of the channel's question order and the number of rounds it played
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the channel record cannot be read.
    fn next_game(&self, channel: &ChannelId) -> Result<(u64, usize)>;

    /// Picks the question for the given position in a channel's question order
    ///
    /// A `limit` of zero draws from the whole bank.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QuestionNotFound`] when no question can be served.
    fn next_question(&self, seed: u64, rounds_played: usize, limit: usize) -> Result<Question>;

    /// Counts one more round played in the channel
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the counter cannot be updated.
    fn record_round_played(&self, channel: &ChannelId) -> Result<()>;

    /// Adds a round's scores to the channel totals
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the scores cannot be written.
    fn save_rank(&self, channel: &Channel, rank: &Rank) -> Result<()>;

    /// Best players of the channel, `top_n == 0` meaning everyone
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the ranking cannot be read.
    fn channel_ranking(&self, channel: &ChannelId, top_n: usize) -> Result<Rank>;

    /// A player's channel total and position
    ///
    /// # Errors
    ///
    /// Returns [`Error::PlayerNotFound`] if the player never scored there.
    fn player_channel_score(&self, channel: &ChannelId, player: &PlayerId) -> Result<PlayerScore>;

    /// Per-channel setting, falling back to `default`
    fn channel_config(&self, channel: &ChannelId, key: &str, default: &str) -> String;
}

/// Reads the channel's question limit setting
///
/// Unparseable values are logged and replaced by the default.
pub fn question_limit(store: &dyn Store, channel: &ChannelId) -> usize {
    let raw = store.channel_config(channel, QUESTION_LIMIT_KEY, "");
    if raw.is_empty() {
        return DEFAULT_QUESTION_LIMIT;
    }
    raw.parse().unwrap_or_else(|_| {
        warn!(%channel, value = %raw, "invalid question limit, using default");
        DEFAULT_QUESTION_LIMIT
    })
}

/// Selects the next question for a channel and counts the round as played
///
/// # Errors
///
/// Propagates [`Error::QuestionNotFound`] and storage failures.
pub fn next_round_question(store: &dyn Store, channel: &ChannelId) -> Result<Question> {
    let (seed, rounds_played) = store.next_game(channel)?;
    let limit = question_limit(store, channel);
    let question = store.next_question(seed, rounds_played, limit)?;
    store.record_round_played(channel)?;
    debug!(%channel, question = question.id, rounds_played, limit, "question selected");
    Ok(question)
}

/// Final standings shown at the end of a game
///
/// The channel's top players, plus the channel totals of everyone who scored
/// in the game, ranked together.
///
/// # Errors
///
/// Returns storage failures from reading the channel ranking.
pub fn channel_standings(store: &dyn Store, channel: &ChannelId, game: &Rank) -> Result<Rank> {
    let top = store.channel_ranking(channel, CHANNEL_TOP_N)?;
    let mut scores = top.iter().cloned().collect::<Vec<_>>();
    for entry in game.iter() {
        if top.get(&entry.player_id).is_some() {
            continue;
        }
        match store.player_channel_score(channel, &entry.player_id) {
            Ok(score) => scores.push(score),
            Err(Error::PlayerNotFound { .. }) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(Rank::from_scores(scores))
}

#[derive(Debug, Default)]
struct ChannelRecord {
    seed: u64,
    rounds_played: usize,
    name: String,
    rank: Rank,
    config: HashMap<String, String>,
}

/// In-memory [`Store`] with a fixed question bank
#[derive(Debug, Default)]
pub struct MemoryStore {
    questions: Vec<Question>,
    channels: Mutex<HashMap<ChannelId, ChannelRecord>>,
}

impl MemoryStore {
    /// Creates a store serving the given questions
    pub fn new(questions: Vec<Question>) -> Self {
        Self {
            questions,
            channels: Mutex::default(),
        }
    }

    /// Sets a per-channel configuration value
    pub fn set_channel_config(&self, channel: &ChannelId, key: &str, value: &str) {
        self.channels
            .lock()
            .entry(channel.clone())
            .or_insert_with(new_record)
            .config
            .insert(key.to_owned(), value.to_owned());
    }

    /// Rounds played so far in a channel
    pub fn rounds_played(&self, channel: &ChannelId) -> usize {
        self.channels
            .lock()
            .get(channel)
            .map_or(0, |record| record.rounds_played)
    }

    /// Display name last stored for a channel
    pub fn channel_name(&self, channel: &ChannelId) -> Option<String> {
        self.channels
            .lock()
            .get(channel)
            .map(|record| record.name.clone())
    }
}

fn new_record() -> ChannelRecord {
    ChannelRecord {
        seed: fastrand::u64(..),
        ..ChannelRecord::default()
    }
}

impl Store for MemoryStore {
    fn next_game(&self, channel: &ChannelId) -> Result<(u64, usize)> {
        let mut channels = self.channels.lock();
        let record = channels.entry(channel.clone()).or_insert_with(new_record);
        Ok((record.seed, record.rounds_played))
    }

    fn next_question(&self, seed: u64, rounds_played: usize, limit: usize) -> Result<Question> {
        let available = match limit {
            0 => self.questions.len(),
            limit => limit.min(self.questions.len()),
        };
        if available == 0 {
            return Err(Error::QuestionNotFound {
                seed,
                rounds_played,
            });
        }
        let mut order: Vec<usize> = (0..available).collect();
        fastrand::Rng::with_seed(seed).shuffle(&mut order);
        Ok(self.questions[order[rounds_played % available]].clone())
    }

    fn record_round_played(&self, channel: &ChannelId) -> Result<()> {
        self.channels
            .lock()
            .entry(channel.clone())
            .or_insert_with(new_record)
            .rounds_played += 1;
        Ok(())
    }

    fn save_rank(&self, channel: &Channel, rank: &Rank) -> Result<()> {
        let mut channels = self.channels.lock();
        let record = channels.entry(channel.id.clone()).or_insert_with(new_record);
        record.name.clone_from(&channel.name);
        record.rank.merge(rank);
        Ok(())
    }

    fn channel_ranking(&self, channel: &ChannelId, top_n: usize) -> Result<Rank> {
        let channels = self.channels.lock();
        let Some(record) = channels.get(channel) else {
            return Ok(Rank::default());
        };
        let take = if top_n == 0 { usize::MAX } else { top_n };
        Ok(Rank::from_scores(record.rank.iter().take(take).cloned()))
    }

    fn player_channel_score(&self, channel: &ChannelId, player: &PlayerId) -> Result<PlayerScore> {
        self.channels
            .lock()
            .get(channel)
            .and_then(|record| record.rank.get(player).cloned())
            .ok_or_else(|| Error::PlayerNotFound {
                channel: channel.clone(),
                player: player.clone(),
            })
    }

    fn channel_config(&self, channel: &ChannelId, key: &str, default: &str) -> String {
        self.channels
            .lock()
            .get(channel)
            .and_then(|record| record.config.get(key).cloned())
            .unwrap_or_else(|| default.to_owned())
    }
}
