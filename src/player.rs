//! Players, channels and the per-game player roster
//!
//! Identities are opaque strings handed over by the chat transport. They are
//! never generated here, only compared and hashed.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Identifier of a chat user, as assigned by the transport
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[serde(transparent)]
pub struct PlayerId(String);

impl From<String> for PlayerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for PlayerId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl PlayerId {
    /// Borrows the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Identifier of a chat channel (group, room), as assigned by the transport
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[serde(transparent)]
pub struct ChannelId(String);

impl From<String> for ChannelId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for ChannelId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl ChannelId {
    /// Borrows the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the transport handed over an empty identifier
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A participant, immutable once constructed
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Player {
    /// Transport identity
    pub id: PlayerId,
    /// Display name
    pub name: String,
    /// Handle, empty when the user has none
    pub username: String,
}

impl Player {
    /// Creates a player from its identity, display name and handle
    pub fn new(id: impl Into<PlayerId>, name: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            username: username.into(),
        }
    }
}

/// A chat channel hosting at most one game at a time
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Channel {
    /// Transport identity
    pub id: ChannelId,
    /// Display name (group title)
    pub name: String,
}

impl Channel {
    /// Creates a channel from its identity and display name
    pub fn new(id: impl Into<ChannelId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Unique set of players, remembering join order for display
#[derive(Debug, Clone, Default, Serialize)]
pub struct Roster {
    /// Primary mapping from player ID to player
    mapping: HashMap<PlayerId, Player>,
    /// Player IDs in join order
    #[serde(skip)]
    order: Vec<PlayerId>,
}

impl Roster {
    /// Adds a player if not already present
    ///
    /// # Returns
    ///
    /// `true` if the player was new to the roster
    pub fn add(&mut self, player: Player) -> bool {
        if self.mapping.contains_key(&player.id) {
            return false;
        }
        self.order.push(player.id.clone());
        self.mapping.insert(player.id.clone(), player);
        true
    }

    /// Looks up a player by ID
    pub fn get(&self, id: &PlayerId) -> Option<&Player> {
        self.mapping.get(id)
    }

    /// Whether the player is part of the roster
    pub fn contains(&self, id: &PlayerId) -> bool {
        self.mapping.contains_key(id)
    }

    /// Number of distinct players
    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    /// Whether nobody joined yet
    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }

    /// Players in join order
    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.order.iter().filter_map(|id| self.mapping.get(id))
    }
}
