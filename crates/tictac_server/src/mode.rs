//! Game modes and their turn clocks.

use serde::{Deserialize, Serialize};

/// Seconds per turn in standard mode.
pub const TURN_SECONDS_STANDARD: i64 = 30;

/// Seconds per turn in blitz mode.
pub const TURN_SECONDS_BLITZ: i64 = 15;

/// Game mode chosen at match creation.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum GameMode {
    /// 30 seconds per turn.
    #[default]
    Standard,
    /// 15 seconds per turn.
    Blitz,
}

impl GameMode {
    /// Per-turn time limit in seconds.
    pub fn turn_time_limit(self) -> i64 {
        match self {
            GameMode::Standard => TURN_SECONDS_STANDARD,
            GameMode::Blitz => TURN_SECONDS_BLITZ,
        }
    }
}
