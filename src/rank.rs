//! Rankings and scoring aggregation
//!
//! A [`Rank`] is the ordered list of player scores for a round, a game or a
//! whole channel. Scores are sorted descending; equal scores keep the order
//! in which the players first scored, so the same claims always produce the
//! same ranking.

use std::{cmp::Reverse, collections::HashMap};

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use super::{
    TruncatedVec,
    player::{Player, PlayerId},
};

/// Score and standing of one player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerScore {
    /// Player identity
    pub player_id: PlayerId,
    /// Display name at the time of scoring
    pub name: String,
    /// Total points
    pub score: u64,
    /// Position in the ranking (1-indexed, no gaps)
    pub position: usize,
}

impl PlayerScore {
    /// Creates an unranked score entry for a player
    pub fn new(player: &Player, score: u64) -> Self {
        Self {
            player_id: player.id.clone(),
            name: player.name.clone(),
            score,
            position: 0,
        }
    }
}

/// Serialization helper for Rank struct
#[derive(Deserialize)]
struct RankSerde {
    scores: Vec<PlayerScore>,
}

/// Ordered aggregate of player scores with assigned positions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RankSerde")]
pub struct Rank {
    /// Scores sorted descending, positions assigned
    scores: Vec<PlayerScore>,

    /// Order in which each player first scored, used to break ties
    #[serde(skip)]
    first_seen: HashMap<PlayerId, usize>,
}

impl From<RankSerde> for Rank {
    /// Rebuilds the tie-break order from the serialized ranking order
    fn from(serde: RankSerde) -> Self {
        Self::from_scores(serde.scores)
    }
}

impl Rank {
    /// Builds a ranking from scores listed in tie-break order
    ///
    /// Earlier entries win ties. Repeated players are summed into their first
    /// entry. Incoming positions are ignored and recomputed.
    pub fn from_scores<I: IntoIterator<Item = PlayerScore>>(scores: I) -> Self {
        let mut rank = Self::default();
        for score in scores {
            rank.add(score);
        }
        rank.sort();
        rank
    }

    /// Adds every score of `other` to this ranking
    ///
    /// Players new to this ranking are ordered after the existing ones for
    /// tie-breaking, in the order they appear in `other`.
    pub fn merge(&mut self, other: &Rank) {
        for score in &other.scores {
            self.add(score.clone());
        }
        self.sort();
    }

    /// Looks up the entry of a player
    pub fn get(&self, player_id: &PlayerId) -> Option<&PlayerScore> {
        self.scores.iter().find(|s| &s.player_id == player_id)
    }

    /// Entries from first to last position
    pub fn iter(&self) -> impl Iterator<Item = &PlayerScore> {
        self.scores.iter()
    }

    /// Number of ranked players
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// Whether nobody scored
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// The leading entries, with the total number of ranked players
    pub fn top(&self, limit: usize) -> TruncatedVec<PlayerScore> {
        TruncatedVec::new(self.scores.iter().cloned(), limit, self.scores.len())
    }

    /// Adds a score without re-sorting
    fn add(&mut self, score: PlayerScore) {
        if let Some(existing) = self
            .scores
            .iter_mut()
            .find(|s| s.player_id == score.player_id)
        {
            existing.score += score.score;
            return;
        }
        let ordinal = self.first_seen.len();
        self.first_seen.insert(score.player_id.clone(), ordinal);
        self.scores.push(score);
    }

    /// Sorts by score descending, then by first-seen order, and assigns positions
    fn sort(&mut self) {
        let first_seen = &self.first_seen;
        self.scores = std::mem::take(&mut self.scores)
            .into_iter()
            .sorted_by_key(|s| {
                (
                    Reverse(s.score),
                    first_seen.get(&s.player_id).copied().unwrap_or(usize::MAX),
                )
            })
            .enumerate()
            .map(|(i, s)| PlayerScore {
                position: i + 1,
                ..s
            })
            .collect_vec();
    }
}
