//! Match session: the per-match state machine.
//!
//! `Waiting -> Active -> Finished -> (disposed)`. All transitions run through
//! the [`MatchHandler`] entry points; the session holds no locks and never
//! aborts on bad input.

use crate::host::{
    Clock, DispatchError, Dispatcher, JoinRejection, Lifecycle, MatchData, MatchHandler, Presence,
};
use crate::message::{EndReason, GameOver, OpCode, PlayerMove};
use crate::mode::GameMode;
use crate::state::{MatchLabel, MatchState, MatchStatus, UserId};
use serde::Serialize;
use std::sync::Arc;
use tictac_rules::{Evaluation, Position};
use tracing::{debug, error, info, instrument, warn};

/// Tunables shared by every session a host creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// Ticks per second.
    pub tick_rate: u32,
    /// Ticks a finished match stays alive before disposal.
    pub linger_ticks: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            tick_rate: 1,
            linger_ticks: 5,
        }
    }
}

enum Outcome {
    Win { winner: UserId, reason: EndReason },
    Draw,
}

/// One authoritative match.
#[derive(Debug)]
pub struct MatchSession {
    state: MatchState,
    settings: SessionSettings,
    clock: Arc<dyn Clock>,
}

impl MatchSession {
    /// Init transition: an empty waiting match.
    #[instrument(skip(clock))]
    pub fn new(game_mode: GameMode, settings: SessionSettings, clock: Arc<dyn Clock>) -> Self {
        let state = MatchState::new(game_mode, clock.now());
        info!(%game_mode, turn_limit = state.turn_time_limit(), "Match initialized");
        Self {
            state,
            settings,
            clock,
        }
    }

    /// Read-only view of the authoritative state.
    pub fn state(&self) -> &MatchState {
        &self.state
    }

    fn publish_label(&self, dispatcher: &dyn Dispatcher) {
        if let Err(e) = dispatcher.update_label(&self.state.label()) {
            warn!(error = %e, "Failed to update match label");
        }
    }

    fn send<T: Serialize>(
        &self,
        dispatcher: &dyn Dispatcher,
        op_code: OpCode,
        body: &T,
        recipients: Option<&[Presence]>,
    ) {
        let payload = match serde_json::to_vec(body) {
            Ok(payload) => payload,
            Err(e) => {
                error!(%op_code, error = %e, "Failed to encode payload, skipping broadcast");
                return;
            }
        };
        match dispatcher.broadcast(op_code, &payload, recipients) {
            Ok(()) => {}
            Err(DispatchError::NoRecipients) => {
                debug!(%op_code, "No recipients for broadcast");
            }
            Err(e) => warn!(%op_code, error = %e, "Broadcast failed"),
        }
    }

    fn broadcast_state(&self, dispatcher: &dyn Dispatcher) {
        self.send(dispatcher, OpCode::GameState, &self.state, None);
    }

    #[instrument(skip(self, dispatcher, outcome))]
    fn end(&mut self, dispatcher: &dyn Dispatcher, outcome: Outcome) {
        let game_over = match outcome {
            Outcome::Win { winner, reason } => {
                let loser = self.state.opponent_of(&winner).cloned();
                let game_over = GameOver {
                    winner: self.state.player(&winner).cloned(),
                    loser: loser.as_deref().and_then(|id| self.state.player(id)).cloned(),
                    reason,
                };
                info!(winner = %winner, %reason, "Match finished");
                self.state.finish(Some(winner));
                game_over
            }
            Outcome::Draw => {
                info!("Match finished in a draw");
                self.state.finish(None);
                GameOver {
                    winner: None,
                    loser: None,
                    reason: EndReason::Draw,
                }
            }
        };
        self.send(dispatcher, OpCode::GameOver, &game_over, None);
        self.broadcast_state(dispatcher);
        self.publish_label(dispatcher);
    }

    /// Returns true if the turn clock ran out and the match ended.
    fn check_timeout(&mut self, dispatcher: &dyn Dispatcher) -> bool {
        if self.state.status() != MatchStatus::Active {
            return false;
        }
        let now = self.clock.now();
        if !self.state.turn_expired(now) {
            return false;
        }
        let Some(on_turn) = self.state.current_turn().cloned() else {
            return false;
        };
        let Some(winner) = self.state.opponent_of(&on_turn).cloned() else {
            warn!(user_id = %on_turn, "Turn expired with no opponent seated");
            return false;
        };
        info!(user_id = %on_turn, elapsed = now - self.state.turn_start_time(), "Turn timed out");
        self.end(
            dispatcher,
            Outcome::Win {
                winner,
                reason: EndReason::Timeout,
            },
        );
        true
    }

    fn process_move(&mut self, dispatcher: &dyn Dispatcher, message: &MatchData) {
        if self.state.status() != MatchStatus::Active {
            debug!(sender = %message.sender.user_id, "Match not active, dropping message");
            return;
        }
        if message.op_code != OpCode::PlayerMove.code() {
            debug!(op_code = message.op_code, "Ignoring non-move opcode");
            return;
        }
        let mv: PlayerMove = match serde_json::from_slice(&message.data) {
            Ok(mv) => mv,
            Err(e) => {
                debug!(sender = %message.sender.user_id, error = %e, "Undecodable move");
                return;
            }
        };
        let Some(pos) = Position::from_row_col(mv.row, mv.col) else {
            debug!(row = mv.row, col = mv.col, "Move out of range");
            return;
        };

        let mover = message.sender.user_id.as_str();
        match self.state.apply_move(mover, pos) {
            Ok(Evaluation::Won { mark, .. }) => {
                debug!(user_id = %mover, %mark, "Winning move");
                self.end(
                    dispatcher,
                    Outcome::Win {
                        winner: mover.to_string(),
                        reason: EndReason::Victory,
                    },
                );
            }
            Ok(Evaluation::Draw) => self.end(dispatcher, Outcome::Draw),
            Ok(Evaluation::Ongoing) => {
                debug!(user_id = %mover, position = %pos, "Move applied");
                self.state.advance_turn(self.clock.now());
                self.broadcast_state(dispatcher);
            }
            Err(e) => debug!(user_id = %mover, error = %e, "Move rejected"),
        }
    }
}

impl MatchHandler for MatchSession {
    fn tick_rate(&self) -> u32 {
        self.settings.tick_rate
    }

    fn label(&self) -> MatchLabel {
        self.state.label()
    }

    #[instrument(skip(self), fields(user_id = %presence.user_id))]
    fn join_attempt(&self, presence: &Presence) -> Result<(), JoinRejection> {
        if self.state.player(&presence.user_id).is_some() {
            return Err(JoinRejection::AlreadyJoined);
        }
        if self.state.is_full() {
            return Err(JoinRejection::MatchFull);
        }
        if self.state.status() != MatchStatus::Waiting {
            return Err(JoinRejection::InProgress);
        }
        Ok(())
    }

    #[instrument(skip_all, fields(count = presences.len()))]
    fn join(&mut self, dispatcher: &dyn Dispatcher, presences: &[Presence]) -> Lifecycle {
        for presence in presences {
            let Some(player) = self.state.add_player(presence) else {
                warn!(user_id = %presence.user_id, "Presence not seated");
                continue;
            };
            info!(user_id = %player.user_id, symbol = %player.symbol, "Player joined");
            self.send(
                dispatcher,
                OpCode::GameState,
                &self.state,
                Some(std::slice::from_ref(presence)),
            );
        }

        if self.state.status() == MatchStatus::Waiting && self.state.is_full() {
            self.state.activate(self.clock.now());
            info!(first = ?self.state.current_turn(), "Match active");
            self.broadcast_state(dispatcher);
        }
        self.publish_label(dispatcher);
        Lifecycle::Continue
    }

    #[instrument(skip_all, fields(count = presences.len()))]
    fn leave(&mut self, dispatcher: &dyn Dispatcher, presences: &[Presence]) -> Lifecycle {
        let was_active = self.state.status() == MatchStatus::Active;
        let mut leaver = None;
        for presence in presences {
            if let Some(player) = self.state.remove_player(&presence.user_id) {
                info!(user_id = %player.user_id, "Player left");
                leaver.get_or_insert(player);
            }
        }

        let Some(leaver) = leaver.filter(|_| was_active) else {
            self.publish_label(dispatcher);
            return Lifecycle::Continue;
        };

        let remaining = self
            .state
            .player_order()
            .iter()
            .find_map(|id| self.state.player(id))
            .cloned();
        self.state
            .finish(remaining.as_ref().map(|p| p.user_id.clone()));
        info!(winner = ?remaining.as_ref().map(|p| &p.user_id), "Match finished by departure");
        let game_over = GameOver {
            winner: remaining,
            loser: Some(leaver),
            reason: EndReason::PlayerLeft,
        };
        self.send(dispatcher, OpCode::GameOver, &game_over, None);
        self.publish_label(dispatcher);
        Lifecycle::Dispose
    }

    #[instrument(skip(self, dispatcher, messages), fields(messages = messages.len()))]
    fn tick(&mut self, dispatcher: &dyn Dispatcher, tick: u64, messages: &[MatchData]) -> Lifecycle {
        if !self.check_timeout(dispatcher) {
            for message in messages {
                self.process_move(dispatcher, message);
            }
        }

        if self.state.status() != MatchStatus::Finished {
            return Lifecycle::Continue;
        }
        let deadline = match self.state.linger_until() {
            Some(deadline) => deadline,
            None => {
                let deadline = tick + self.settings.linger_ticks;
                debug!(deadline, "Lingering before disposal");
                self.state.set_linger_until(deadline);
                deadline
            }
        };
        if tick >= deadline {
            info!(tick, "Linger window elapsed, disposing match");
            Lifecycle::Dispose
        } else {
            Lifecycle::Continue
        }
    }

    #[instrument(skip(self, _dispatcher))]
    fn terminate(&mut self, _dispatcher: &dyn Dispatcher, tick: u64, grace_seconds: u32) -> Lifecycle {
        info!(status = %self.state.status(), "Host terminating match");
        Lifecycle::Continue
    }

    #[instrument(skip(self, _dispatcher))]
    fn signal(&mut self, _dispatcher: &dyn Dispatcher, tick: u64, data: &str) -> (Lifecycle, String) {
        debug!("Signal received");
        (Lifecycle::Continue, String::new())
    }
}
