//! Survey-style questions with several scoring answer slots
//!
//! A question asks for the most popular responses to a prompt. Each response
//! is an answer slot with a point value and one or more accepted spellings.
//! Players type free text; the text is normalised and compared against every
//! variant of every slot.

use garde::Validate;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::constants::{answer_text, question::*};

/// One scoring answer of a question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct AnswerSlot {
    /// Accepted spellings; the first one is used for display
    #[garde(length(min = 1, max = MAX_VARIANT_COUNT),
        inner(length(chars, min = 1, max = answer_text::MAX_LENGTH))
    )]
    pub variants: Vec<String>,
    /// Points awarded to the player claiming this slot
    #[garde(skip)]
    pub score: u64,
}

impl AnswerSlot {
    /// Creates a slot from its accepted spellings and point value
    pub fn new<I, S>(variants: I, score: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            variants: variants.into_iter().map(Into::into).collect_vec(),
            score,
        }
    }

    /// Display text of the slot
    pub fn text(&self) -> &str {
        self.variants.first().map_or("", String::as_str)
    }

    /// Whether the (already normalised) answer matches one of the variants
    fn matches(&self, cleaned: &str) -> bool {
        self.variants
            .iter()
            .any(|variant| clean_answer(variant) == cleaned)
    }
}

/// A question with its answer slots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Question {
    /// Identifier within the question bank
    #[garde(skip)]
    pub id: u64,
    /// The prompt shown to players
    #[garde(length(chars, min = 1, max = MAX_TEXT_LENGTH))]
    pub text: String,
    /// Answer slots, in display order
    #[garde(length(min = 1, max = MAX_ANSWER_COUNT), dive)]
    pub answers: Vec<AnswerSlot>,
}

impl Question {
    /// Creates a question from its parts
    pub fn new(id: u64, text: impl Into<String>, answers: Vec<AnswerSlot>) -> Self {
        Self {
            id,
            text: text.into(),
            answers,
        }
    }

    /// Number of answer slots
    pub fn len(&self) -> usize {
        self.answers.len()
    }

    /// Whether the question has no slots at all
    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    /// Finds the slot matched by a free text answer
    ///
    /// # Returns
    ///
    /// The index of the first slot with a matching variant, or `None`
    pub fn check_answer(&self, text: &str) -> Option<usize> {
        let cleaned = clean_answer(text);
        if cleaned.is_empty() {
            return None;
        }
        self.answers.iter().position(|slot| slot.matches(&cleaned))
    }

    /// Sum of all slot values
    pub fn total_score(&self) -> u64 {
        self.answers.iter().map(|slot| slot.score).sum()
    }
}

/// Normalizes an answer string for comparison
///
/// Lowercases, drops punctuation and collapses runs of whitespace, so that
/// `"  New   York!"` and `"new york"` compare equal.
pub fn clean_answer(answer: &str) -> String {
    answer
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .join(" ")
}
