//! Capabilities a hosting platform lends to a match.
//!
//! A match never touches sockets or the system clock directly. It reads time
//! through [`Clock`], emits payloads through [`Dispatcher`], and is driven
//! through the [`MatchHandler`] entry points. The host guarantees that the
//! entry points of one match are never called concurrently.

use crate::message::OpCode;
use crate::state::{MatchLabel, UserId};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};

/// A client attached to a match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, derive_new::new)]
pub struct Presence {
    /// Opaque identity.
    pub user_id: UserId,
    /// Display name.
    pub username: String,
}

/// One inbound message queued for the next tick.
#[derive(Debug, Clone, PartialEq, Eq, derive_new::new)]
pub struct MatchData {
    /// Who sent it.
    pub sender: Presence,
    /// Raw opcode; unknown values are ignored by the match.
    pub op_code: i64,
    /// Raw JSON payload.
    pub data: Vec<u8>,
}

/// Failure to hand a payload to the host.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum DispatchError {
    /// Nobody is listening.
    #[display("No recipients attached")]
    NoRecipients,
    /// The match is no longer registered with the host.
    #[display("Match is closed")]
    Closed,
    /// The host refused the payload.
    #[display("Dispatch rejected: {}", _0)]
    Rejected(String),
}

impl std::error::Error for DispatchError {}

/// Outbound side of a match.
///
/// Failures are reported but never undo the state change that caused them.
pub trait Dispatcher {
    /// Sends `payload` to `recipients`, or to every presence when `None`.
    fn broadcast(
        &self,
        op_code: OpCode,
        payload: &[u8],
        recipients: Option<&[Presence]>,
    ) -> Result<(), DispatchError>;

    /// Replaces the match's public label.
    fn update_label(&self, label: &MatchLabel) -> Result<(), DispatchError>;
}

/// Wall-clock source in unix seconds.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current time in unix seconds.
    fn now(&self) -> i64;
}

/// [`Clock`] backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// [`Clock`] that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Creates a clock reading `start`.
    pub fn new(start: i64) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    /// Sets the current time.
    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// Moves the clock forward by `seconds`.
    pub fn advance(&self, seconds: i64) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// What the host should do after an entry point returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Keep the match alive.
    Continue,
    /// The match has no further state; dispose of it.
    Dispose,
}

/// Advisory rejection of a join attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, derive_more::Display)]
pub enum JoinRejection {
    /// Two players are already seated.
    #[display("Match is full")]
    MatchFull,
    /// The match has left the waiting state.
    #[display("Game already in progress")]
    InProgress,
    /// The identity is already seated.
    #[display("Already joined")]
    AlreadyJoined,
}

impl std::error::Error for JoinRejection {}

/// Named transition entry points of a match.
///
/// Construction is the init transition. Every other transition is one of
/// these methods, called serially by the host.
pub trait MatchHandler: Send {
    /// Ticks per second the host should drive [`MatchHandler::tick`] at.
    fn tick_rate(&self) -> u32;

    /// Current public label.
    fn label(&self) -> MatchLabel;

    /// Admission guard. Must not mutate state.
    fn join_attempt(&self, presence: &Presence) -> Result<(), JoinRejection>;

    /// Seats admitted presences.
    fn join(&mut self, dispatcher: &dyn Dispatcher, presences: &[Presence]) -> Lifecycle;

    /// Removes departing presences.
    fn leave(&mut self, dispatcher: &dyn Dispatcher, presences: &[Presence]) -> Lifecycle;

    /// Periodic step with the messages received since the previous tick.
    fn tick(&mut self, dispatcher: &dyn Dispatcher, tick: u64, messages: &[MatchData]) -> Lifecycle;

    /// Host is shutting the match down.
    fn terminate(&mut self, dispatcher: &dyn Dispatcher, tick: u64, grace_seconds: u32) -> Lifecycle;

    /// Out-of-band control message. Returns a reply for the caller.
    fn signal(&mut self, dispatcher: &dyn Dispatcher, tick: u64, data: &str) -> (Lifecycle, String);
}
