//! Authoritative match record.

use crate::host::Presence;
use crate::mode::GameMode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tictac_rules::{Board, BoardError, Evaluation, Mark, Position, evaluate};
use tracing::instrument;

/// Unique identifier for a player (opaque, globally unique).
pub type UserId = String;

/// Maximum players per match.
pub const MAX_PLAYERS: usize = 2;

/// A player seated in a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, derive_new::new)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    /// Player's unique ID.
    pub user_id: UserId,
    /// Display name.
    pub username: String,
    /// Mark assigned by join order.
    pub symbol: Mark,
}

/// Lifecycle status of a match.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MatchStatus {
    /// Fewer than two players, no moves made.
    Waiting,
    /// Two players, board not terminal.
    Active,
    /// Terminal. Board and winner are frozen.
    Finished,
}

/// Public summary used by matchmaking queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, derive_new::new)]
pub struct MatchLabel {
    /// Match status.
    pub status: MatchStatus,
    /// Number of seated players.
    pub players: usize,
    /// Game mode.
    pub game_mode: GameMode,
}

/// Why a move was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum MoveRejection {
    /// The match is not active.
    #[display("Match is not active")]
    NotActive,
    /// The sender is not the player on turn.
    #[display("Not this player's turn")]
    NotYourTurn,
    /// The sender is not seated in the match.
    #[display("Unknown player")]
    UnknownPlayer,
    /// The board refused the placement.
    #[display("{}", _0)]
    Board(BoardError),
}

impl std::error::Error for MoveRejection {}

/// Authoritative state of one match.
///
/// Serialized in full as the `GameState` broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchState {
    board: Board,
    players: BTreeMap<UserId, Player>,
    player_order: Vec<UserId>,
    current_turn: Option<UserId>,
    winner: Option<UserId>,
    game_status: MatchStatus,
    move_count: u32,
    game_mode: GameMode,
    turn_time_limit: i64,
    turn_start_time: i64,
    linger_until: Option<u64>,
}

impl MatchState {
    /// Creates an empty waiting match.
    pub fn new(game_mode: GameMode, now: i64) -> Self {
        Self {
            board: Board::new(),
            players: BTreeMap::new(),
            player_order: Vec::new(),
            current_turn: None,
            winner: None,
            game_status: MatchStatus::Waiting,
            move_count: 0,
            game_mode,
            turn_time_limit: game_mode.turn_time_limit(),
            turn_start_time: now,
            linger_until: None,
        }
    }

    /// Returns the board.
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Returns seated players keyed by identity.
    pub fn players(&self) -> &BTreeMap<UserId, Player> {
        &self.players
    }

    /// Returns identities in join order.
    pub fn player_order(&self) -> &[UserId] {
        &self.player_order
    }

    /// Returns the player with the given identity.
    pub fn player(&self, user_id: &str) -> Option<&Player> {
        self.players.get(user_id)
    }

    /// Returns the identity on turn.
    pub fn current_turn(&self) -> Option<&UserId> {
        self.current_turn.as_ref()
    }

    /// Returns the winner's identity.
    pub fn winner(&self) -> Option<&UserId> {
        self.winner.as_ref()
    }

    /// Returns the match status.
    pub fn status(&self) -> MatchStatus {
        self.game_status
    }

    /// Returns the number of accepted moves.
    pub fn move_count(&self) -> u32 {
        self.move_count
    }

    /// Returns the game mode.
    pub fn game_mode(&self) -> GameMode {
        self.game_mode
    }

    /// Returns the per-turn limit in seconds.
    pub fn turn_time_limit(&self) -> i64 {
        self.turn_time_limit
    }

    /// Returns when the current turn started (unix seconds).
    pub fn turn_start_time(&self) -> i64 {
        self.turn_start_time
    }

    /// Returns the tick at which a finished match is disposed.
    pub fn linger_until(&self) -> Option<u64> {
        self.linger_until
    }

    /// Returns true once two players are seated.
    pub fn is_full(&self) -> bool {
        self.players.len() >= MAX_PLAYERS
    }

    /// Public label for this state.
    pub fn label(&self) -> MatchLabel {
        MatchLabel::new(self.game_status, self.players.len(), self.game_mode)
    }

    /// The other seated player, chosen by join order.
    pub fn opponent_of(&self, user_id: &str) -> Option<&UserId> {
        self.player_order
            .iter()
            .find(|id| id.as_str() != user_id && self.players.contains_key(id.as_str()))
    }

    /// Returns true if the player on turn has used up their time.
    pub fn turn_expired(&self, now: i64) -> bool {
        now.saturating_sub(self.turn_start_time) >= self.turn_time_limit
    }

    /// Seats a presence, assigning the next free mark.
    ///
    /// Returns `None` if the match is full or the identity is already seated.
    #[instrument(skip(self), fields(user_id = %presence.user_id))]
    pub(crate) fn add_player(&mut self, presence: &Presence) -> Option<&Player> {
        if self.is_full() || self.players.contains_key(&presence.user_id) {
            return None;
        }
        let symbol = match self.seated_in_order().next() {
            Some(first) => first.symbol.opponent(),
            None => Mark::X,
        };
        let player = Player::new(presence.user_id.clone(), presence.username.clone(), symbol);
        self.player_order.push(presence.user_id.clone());
        self.players.insert(presence.user_id.clone(), player);
        self.players.get(&presence.user_id)
    }

    /// Removes a player.
    ///
    /// While waiting the identity also leaves the join order, so a
    /// replacement joiner takes the vacated place.
    #[instrument(skip(self))]
    pub(crate) fn remove_player(&mut self, user_id: &str) -> Option<Player> {
        let removed = self.players.remove(user_id)?;
        if self.game_status == MatchStatus::Waiting {
            self.player_order.retain(|id| id != user_id);
        }
        Some(removed)
    }

    /// Waiting -> Active. The first joiner moves first.
    pub(crate) fn activate(&mut self, now: i64) {
        let first = self.seated_in_order().next().map(|p| p.user_id.clone());
        self.game_status = MatchStatus::Active;
        self.current_turn = first;
        self.turn_start_time = now;
    }

    /// Places the mover's mark and evaluates the board.
    pub(crate) fn apply_move(
        &mut self,
        user_id: &str,
        pos: Position,
    ) -> Result<Evaluation, MoveRejection> {
        if self.game_status != MatchStatus::Active {
            return Err(MoveRejection::NotActive);
        }
        if self.current_turn.as_deref() != Some(user_id) {
            return Err(MoveRejection::NotYourTurn);
        }
        let mark = self
            .players
            .get(user_id)
            .map(|p| p.symbol)
            .ok_or(MoveRejection::UnknownPlayer)?;
        self.board.place(pos, mark).map_err(MoveRejection::Board)?;
        self.move_count += 1;
        Ok(evaluate(&self.board))
    }

    /// Hands the turn to the other player and restarts the turn clock.
    pub(crate) fn advance_turn(&mut self, now: i64) {
        let next = self
            .current_turn
            .as_deref()
            .and_then(|current| self.opponent_of(current))
            .cloned();
        if let Some(next) = next {
            self.current_turn = Some(next);
            self.turn_start_time = now;
        }
    }

    /// Any status -> Finished.
    pub(crate) fn finish(&mut self, winner: Option<UserId>) {
        self.game_status = MatchStatus::Finished;
        self.winner = winner;
    }

    pub(crate) fn set_linger_until(&mut self, tick: u64) {
        self.linger_until = Some(tick);
    }

    fn seated_in_order(&self) -> impl Iterator<Item = &Player> {
        self.player_order.iter().filter_map(|id| self.players.get(id))
    }
}
