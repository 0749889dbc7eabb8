//! # Chat Trivia
//!
//! Coordinator for survey-style trivia games played in chat channels.
//!
//! Each channel hosts at most one game. A game gathers a quorum of players,
//! then plays a fixed number of timed rounds in which players race to type
//! the popular answers to a question. The crate owns the session lifecycle,
//! scoring and the global limit on concurrently running games; the chat
//! transport, question bank and message rendering plug in through the
//! [`Handler`] and [`Store`] traits.
//!
//! Events enter through [`SessionManager::handle_event`] (or the
//! [`SessionManager::run`] loop) and each game runs on its own task.

#![cfg_attr(all(coverage_nightly, test), feature(coverage_attribute))]
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::similar_names)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::struct_field_names)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::wildcard_imports)]
#![allow(clippy::module_name_repetitions)]
use derive_where::derive_where;
use itertools::Itertools;
use serde::Serialize;

pub mod config;
pub mod constants;
pub mod error;
pub mod game;
pub mod game_id;
pub mod handler;
pub mod manager;
pub mod player;
pub mod question;
pub mod rank;
pub mod round;
pub mod store;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use error::{Error, Result};
pub use game::{AnswerMessage, SessionHandle, SessionState};
pub use game_id::GameId;
pub use handler::{GameSnapshot, Handler, LogHandler, RoundSummary};
pub use manager::{Delivery, InboundEvent, SessionManager};
pub use player::{Channel, ChannelId, Player, PlayerId};
pub use question::{AnswerSlot, Question};
pub use rank::{PlayerScore, Rank};
pub use store::{MemoryStore, Store};

/// A truncated vector that maintains the exact count while limiting displayed items
///
/// This structure is useful for displaying a limited number of items while
/// still showing the total count. For example, showing "12 players" but only
/// listing the first few names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[derive_where(Default)]
pub struct TruncatedVec<T> {
    /// The exact total count of items
    exact_count: usize,
    /// The truncated list of items (up to the limit)
    items: Vec<T>,
}

impl<T: Clone> TruncatedVec<T> {
    /// Creates a new truncated vector from an iterator
    ///
    /// # Arguments
    ///
    /// * `list` - An iterator over items to include
    /// * `limit` - Maximum number of items to include in the truncated vector
    /// * `exact_count` - The exact total count of items (may be larger than limit)
    ///
    /// # Returns
    ///
    /// A new `TruncatedVec` containing up to `limit` items from the iterator
    pub fn new<I: Iterator<Item = T>>(list: I, limit: usize, exact_count: usize) -> Self {
        let items = list.take(limit).collect_vec();
        Self { exact_count, items }
    }

    /// Maps a function over the kept items
    pub fn map<F, U>(self, f: F) -> TruncatedVec<U>
    where
        F: Fn(T) -> U,
    {
        TruncatedVec {
            exact_count: self.exact_count,
            items: self.items.into_iter().map(f).collect_vec(),
        }
    }

    /// Returns the exact count of items
    pub fn exact_count(&self) -> usize {
        self.exact_count
    }

    /// Returns the truncated items
    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Whether some items were left out
    pub fn is_truncated(&self) -> bool {
        self.items.len() < self.exact_count
    }
}
