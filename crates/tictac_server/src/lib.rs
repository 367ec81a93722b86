//! Tictac server library - authoritative tic-tac-toe match engine.
//!
//! The engine owns the state of every match, validates moves, enforces turn
//! order and per-turn time limits, and tells its host what to broadcast.
//!
//! # Architecture
//!
//! - **Session**: the per-match state machine ([`MatchSession`]), driven by a
//!   host through the [`MatchHandler`] entry points
//! - **Host**: capability traits the engine calls out through ([`Dispatcher`],
//!   [`Clock`]) plus an in-process implementation ([`LocalRegistry`])
//! - **Directory**: matchmaking over a [`SessionRegistry`]
//! - **Identity**: device fingerprint tokens ([`IdentityIssuer`],
//!   [`IdentityVerifier`])
//! - **Leaderboard**: global leaderboard provisioning ([`LeaderboardRegistry`])
//! - **RPC / HTTP**: the request/response surface for clients
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tictac_server::{GameMode, LocalRegistry, SessionDirectory, SessionSettings, SystemClock};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let registry = LocalRegistry::new(SessionSettings::default(), Arc::new(SystemClock));
//! let directory = SessionDirectory::new(registry, 10);
//! let assignment = directory.find_or_create(GameMode::Blitz).await?;
//! println!("joined {}", assignment.match_id);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod directory;
mod host;
mod http;
mod identity;
mod leaderboard;
mod message;
mod mode;
mod rpc;
mod runtime;
mod session;
mod state;

// Crate-level exports - Configuration
pub use config::{ConfigError, MAX_TOKEN_TTL_DAYS, ServerConfig, SigningSecret};

// Crate-level exports - Matchmaking
pub use directory::{
    Assignment, LabelQuery, MatchId, MatchListing, RegistryError, SessionDirectory,
    SessionRegistry,
};

// Crate-level exports - Host capabilities
pub use host::{
    Clock, DispatchError, Dispatcher, JoinRejection, Lifecycle, ManualClock, MatchData,
    MatchHandler, Presence, SystemClock,
};

// Crate-level exports - HTTP surface
pub use http::{AppState, router};

// Crate-level exports - Device identity
pub use identity::{
    AuthenticatedDevice, DeviceClaims, DeviceFingerprint, IdentityError, IdentityIssuer,
    IdentityVerifier, MIN_DEVICE_ID_LEN,
};

// Crate-level exports - Leaderboards
pub use leaderboard::{
    GLOBAL_LEADERBOARD_ID, LeaderboardConfig, LeaderboardError, LeaderboardRegistry,
    LocalLeaderboards, ScoreOperator, SortOrder, find_or_create_leaderboard,
};

// Crate-level exports - Wire messages
pub use message::{EndReason, GameOver, OpCode, PlayerMove};

// Crate-level exports - Game modes
pub use mode::GameMode;

// Crate-level exports - RPC handlers
pub use rpc::{
    AuthenticateRequest, AuthenticateResponse, DeviceAuthRequest, DeviceAuthResponse,
    LeaderboardResponse, MatchAction, RpcError, authenticate_device, generate_device_auth,
    leaderboard_action, match_action,
};

// Crate-level exports - In-process host
pub use runtime::{
    EVENT_BUFFER, Envelope, LocalRegistry, MAX_MESSAGES_PER_SENDER_PER_TICK, PresenceHandle,
};

// Crate-level exports - Match session
pub use session::{MatchSession, SessionSettings};

// Crate-level exports - Match state
pub use state::{MatchLabel, MatchState, MatchStatus, MoveRejection, Player, UserId};

// Crate-level exports - Board types
pub use tictac_rules::{Board, Evaluation, Mark, Position, Square};
