//! A single question cycle within a game
//!
//! The round tracks which answer slots have been claimed and by whom. It is
//! owned by the session task and only ever mutated from there, so it carries
//! no locking of its own.

use std::{
    collections::{BTreeSet, HashMap},
    time::Duration,
};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use tokio::time::Instant;

use crate::{
    game_id::{GameId, RoundId},
    player::{Player, PlayerId},
    question::Question,
    rank::{PlayerScore, Rank},
};

/// Lifecycle of a round
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundState {
    /// Built but not yet accepting answers
    #[default]
    Created,
    /// Accepting answers until completion or timeout
    Started,
    /// Scored; further answers are rejected
    Finished,
}

/// Result of submitting a text answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AnswerOutcome {
    /// The text matched an answer slot
    pub correct: bool,
    /// The matched slot had already been claimed by someone
    pub already_claimed: bool,
    /// Index of the matched slot
    pub slot: Option<usize>,
}

impl AnswerOutcome {
    const WRONG: Self = Self {
        correct: false,
        already_claimed: false,
        slot: None,
    };
}

/// How a single slot is shown when the round state is revealed
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RevealedAnswer {
    /// Claimed by a player
    Claimed {
        /// Display text of the answer
        text: String,
        /// Points of the slot
        score: u64,
        /// Name of the claiming player
        player_name: Option<String>,
        /// Claimed since the previous reveal
        highlighted: bool,
    },
    /// Unclaimed, shown with its answer (end of a timed-out round)
    Unclaimed {
        /// Display text of the answer
        text: String,
        /// Points of the slot
        score: u64,
    },
    /// Unclaimed placeholder
    Hidden,
}

/// Snapshot of a round suitable for presentation
#[serde_with::serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoundReveal {
    /// Round the snapshot belongs to
    pub round_id: RoundId,
    /// Question bank identifier
    pub question_id: u64,
    /// The prompt
    pub question: String,
    /// One entry per slot, in display order
    pub answers: Vec<RevealedAnswer>,
    /// Whether unclaimed answers are shown
    pub show_unanswered: bool,
    /// Time left in the round, rounded to seconds
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub time_left: Duration,
}

/// One question cycle: slot claims, highlights and timing
#[derive(Debug, Clone)]
pub struct Round {
    id: RoundId,
    game_id: GameId,
    question: Question,
    state: RoundState,
    duration: Duration,
    end_at: Option<Instant>,
    /// Claimant of each slot
    correct: Vec<Option<PlayerId>>,
    /// Slots in the order they were claimed
    claim_order: Vec<usize>,
    /// Slots claimed since the last reveal
    highlighted: BTreeSet<usize>,
    /// Every player who claimed a slot
    players: HashMap<PlayerId, Player>,
}

impl Round {
    /// Creates a round for a question, not yet started
    pub fn new(game_id: GameId, question: Question, duration: Duration) -> Self {
        let slots = question.len();
        Self {
            id: RoundId::new(),
            game_id,
            question,
            state: RoundState::Created,
            duration,
            end_at: None,
            correct: vec![None; slots],
            claim_order: Vec::with_capacity(slots),
            highlighted: BTreeSet::new(),
            players: HashMap::new(),
        }
    }

    /// Round identifier
    pub fn id(&self) -> RoundId {
        self.id
    }

    /// Owning game
    pub fn game_id(&self) -> GameId {
        self.game_id
    }

    /// The question being played
    pub fn question(&self) -> &Question {
        &self.question
    }

    /// Current lifecycle state
    pub fn state(&self) -> RoundState {
        self.state
    }

    /// Starts accepting answers and arms the deadline
    ///
    /// # Returns
    ///
    /// `false` if the round had already been started or finished
    pub fn start(&mut self) -> bool {
        if self.state != RoundState::Created {
            return false;
        }
        self.state = RoundState::Started;
        self.end_at = Some(Instant::now() + self.duration);
        true
    }

    /// Stops accepting answers
    ///
    /// # Returns
    ///
    /// `true` only for the call that actually finished the round, so callers
    /// racing a timeout against completion score the round once.
    pub fn finish(&mut self) -> bool {
        if self.state == RoundState::Finished {
            return false;
        }
        self.state = RoundState::Finished;
        true
    }

    /// Deadline of the round, once started
    pub fn end_at(&self) -> Option<Instant> {
        self.end_at
    }

    /// Time left before the deadline, rounded to whole seconds
    pub fn time_left(&self) -> Duration {
        let Some(end_at) = self.end_at else {
            return self.duration;
        };
        let left = end_at.saturating_duration_since(Instant::now());
        Duration::from_secs((left.as_millis() as u64 + 500) / 1000)
    }

    /// Submits a free text answer from a player
    ///
    /// A match on an unclaimed slot claims it for the player and highlights
    /// it. A match on a claimed slot changes nothing and is reported with
    /// `already_claimed`. Anything submitted outside the started state is
    /// treated as wrong.
    pub fn submit_answer(&mut self, player: &Player, text: &str) -> AnswerOutcome {
        if self.state != RoundState::Started {
            return AnswerOutcome::WRONG;
        }
        let Some(slot) = self.question.check_answer(text) else {
            return AnswerOutcome::WRONG;
        };

        if self.correct[slot].is_some() {
            return AnswerOutcome {
                correct: true,
                already_claimed: true,
                slot: Some(slot),
            };
        }

        self.players
            .entry(player.id.clone())
            .or_insert_with(|| player.clone());
        self.correct[slot] = Some(player.id.clone());
        self.claim_order.push(slot);
        self.highlighted.insert(slot);

        AnswerOutcome {
            correct: true,
            already_claimed: false,
            slot: Some(slot),
        }
    }

    /// Claimant of a slot
    pub fn claimant(&self, slot: usize) -> Option<&Player> {
        self.correct
            .get(slot)?
            .as_ref()
            .and_then(|id| self.players.get(id))
    }

    /// Number of claimed slots
    pub fn claimed_count(&self) -> usize {
        self.claim_order.len()
    }

    /// Whether every slot has a claimant
    pub fn is_complete(&self) -> bool {
        self.correct.iter().all(Option::is_some)
    }

    /// Whether any slot was claimed since the last reveal
    pub fn has_highlights(&self) -> bool {
        !self.highlighted.is_empty()
    }

    /// Forgets the highlights, typically right after a reveal was sent
    pub fn clear_highlights(&mut self) {
        self.highlighted.clear();
    }

    /// Per-player totals for this round
    ///
    /// Equal totals are ordered by who claimed their first slot earlier.
    pub fn ranking(&self) -> Rank {
        Rank::from_scores(self.claim_order.iter().filter_map(|&slot| {
            let player = self.claimant(slot)?;
            Some(PlayerScore::new(player, self.question.answers[slot].score))
        }))
    }

    /// Presentation snapshot of the question and its slots
    ///
    /// # Arguments
    ///
    /// * `show_unanswered` - reveal the text and value of unclaimed slots
    pub fn reveal(&self, show_unanswered: bool) -> RoundReveal {
        let answers = self
            .question
            .answers
            .iter()
            .enumerate()
            .map(|(i, slot)| match &self.correct[i] {
                Some(id) => RevealedAnswer::Claimed {
                    text: slot.text().to_owned(),
                    score: slot.score,
                    player_name: self.players.get(id).map(|p| p.name.clone()),
                    highlighted: self.highlighted.contains(&i),
                },
                None if show_unanswered => RevealedAnswer::Unclaimed {
                    text: slot.text().to_owned(),
                    score: slot.score,
                },
                None => RevealedAnswer::Hidden,
            })
            .collect_vec();

        RoundReveal {
            round_id: self.id,
            question_id: self.question.id,
            question: self.question.text.clone(),
            answers,
            show_unanswered,
            time_left: self.time_left(),
        }
    }
}
