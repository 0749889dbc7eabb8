//! Game and round ID generation
//!
//! Game IDs are random 63-bit numbers displayed in base 36, which keeps them
//! short enough to quote in chat. They are not guaranteed to be unique; the
//! coordinator keys sessions by channel and only uses the ID to tell a
//! session apart from its successor in the same channel.

use std::{fmt::Display, num::ParseIntError, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize};

/// Radix used when displaying game IDs
const RADIX: u32 = 36;

/// A random identifier for one game (session)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GameId(u64);

impl GameId {
    /// Creates a new random game ID
    pub fn new() -> Self {
        Self(fastrand::u64(..=i64::MAX as u64))
    }

    /// Raw numeric value of the ID
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for GameId {
    /// Creates a new random game ID (same as `new()`)
    fn default() -> Self {
        Self::new()
    }
}

impl Display for GameId {
    /// Formats the game ID as a lowercase base 36 number
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut value = self.0;
        let mut digits = Vec::new();
        loop {
            let digit = (value % u64::from(RADIX)) as u32;
            digits.push(char::from_digit(digit, RADIX).unwrap_or('0'));
            value /= u64::from(RADIX);
            if value == 0 {
                break;
            }
        }
        let text: String = digits.into_iter().rev().collect();
        f.write_str(&text)
    }
}

impl FromStr for GameId {
    type Err = ParseIntError;

    /// Parses a game ID from its base 36 representation
    ///
    /// # Errors
    ///
    /// Returns a `ParseIntError` if the string is not a valid base 36 number.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(u64::from_str_radix(s, RADIX)?))
    }
}

impl Serialize for GameId {
    /// Serializes the game ID as its base 36 string
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for GameId {
    fn deserialize<D>(deserializer: D) -> Result<GameId, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        GameId::from_str(&s).map_err(|e| serde::de::Error::custom(e.to_string()))
    }
}

/// A random identifier for one round, only used for log correlation
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
pub struct RoundId(u32);

impl RoundId {
    /// Creates a new random round ID
    pub fn new() -> Self {
        Self(fastrand::u32(..=i32::MAX as u32))
    }
}

impl Default for RoundId {
    fn default() -> Self {
        Self::new()
    }
}
