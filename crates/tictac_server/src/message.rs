//! Wire messages exchanged between a match and its presences.
//!
//! Every payload is JSON. The opcode travels beside the payload, never inside
//! it.

use crate::state::Player;
use serde::{Deserialize, Serialize};

/// Match data opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(into = "i64", try_from = "i64")]
pub enum OpCode {
    /// Client places a mark: [`PlayerMove`].
    PlayerMove = 1,
    /// Full [`crate::MatchState`] snapshot.
    GameState = 2,
    /// Terminal result: [`GameOver`].
    GameOver = 3,
    /// Reserved; turn changes ride on `GameState`.
    TurnUpdate = 4,
    /// Reserved; joins ride on `GameState`.
    PlayerJoined = 5,
    /// Reserved; leaves ride on `GameOver`.
    PlayerLeft = 6,
}

impl OpCode {
    /// Numeric wire value.
    pub fn code(self) -> i64 {
        self as i64
    }
}

impl From<OpCode> for i64 {
    fn from(op: OpCode) -> Self {
        op.code()
    }
}

impl TryFrom<i64> for OpCode {
    type Error = String;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(OpCode::PlayerMove),
            2 => Ok(OpCode::GameState),
            3 => Ok(OpCode::GameOver),
            4 => Ok(OpCode::TurnUpdate),
            5 => Ok(OpCode::PlayerJoined),
            6 => Ok(OpCode::PlayerLeft),
            other => Err(format!("unknown opcode {other}")),
        }
    }
}

/// Body of [`OpCode::PlayerMove`].
///
/// Coordinates are signed so that hostile values decode and get rejected by
/// range checks instead of failing as a parse error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerMove {
    /// Row, 0-2.
    pub row: i64,
    /// Column, 0-2.
    pub col: i64,
}

/// Why a match ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EndReason {
    /// A player completed a line.
    Victory,
    /// Board filled without a line.
    Draw,
    /// The player on turn ran out of time.
    Timeout,
    /// A player left an active match.
    PlayerLeft,
}

/// Body of [`OpCode::GameOver`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameOver {
    /// Winning player, `null` on a draw.
    pub winner: Option<Player>,
    /// Losing player, omitted on a draw.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loser: Option<Player>,
    /// Why the match ended.
    pub reason: EndReason,
}
