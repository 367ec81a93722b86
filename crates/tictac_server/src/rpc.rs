//! Request/response handlers for clients.
//!
//! Each handler takes the raw JSON payload and returns the raw JSON reply, so
//! the same functions back any transport.

use crate::directory::{RegistryError, SessionDirectory, SessionRegistry};
use crate::identity::{
    AuthenticatedDevice, DeviceFingerprint, IdentityError, IdentityIssuer, IdentityVerifier,
    default_username,
};
use crate::leaderboard::{LeaderboardError, LeaderboardRegistry, find_or_create_leaderboard};
use crate::mode::GameMode;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{error, info, instrument, warn};

/// Matchmaking action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MatchAction {
    /// Join a random waiting match, creating one if none is open.
    #[default]
    JoinRandom,
    /// Always create a new match.
    CreateNew,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MatchActionRequest {
    action: MatchAction,
    game_mode: GameMode,
}

/// Body of `generate_device_auth`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceAuthRequest {
    /// Device details.
    pub fingerprint: DeviceFingerprint,
    /// Chosen display name.
    pub username: Option<String>,
}

/// Reply of `generate_device_auth`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceAuthResponse {
    /// Signed device token.
    pub token: String,
    /// Resolved display name.
    pub username: String,
}

/// Body of `authenticate_device`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticateRequest {
    /// Device token.
    pub token: String,
    /// Chosen display name.
    #[serde(default)]
    pub username: Option<String>,
}

/// Reply of `authenticate_device`.
pub type AuthenticateResponse = AuthenticatedDevice;

/// Reply of `leaderboard_action`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardResponse {
    /// Id of the global leaderboard.
    pub leaderboard_id: String,
}

/// RPC failures with their numeric status codes.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum RpcError {
    /// The request was malformed. Code 3.
    #[display("{}", _0)]
    InvalidArgument(String),
    /// Authentication failed. Code 16.
    #[display("{}", _0)]
    Unauthenticated(String),
    /// The server failed. Code 13.
    #[display("{}", _0)]
    Internal(String),
}

impl std::error::Error for RpcError {}

impl RpcError {
    /// Numeric status code.
    pub fn code(&self) -> u32 {
        match self {
            RpcError::InvalidArgument(_) => 3,
            RpcError::Internal(_) => 13,
            RpcError::Unauthenticated(_) => 16,
        }
    }
}

impl From<RegistryError> for RpcError {
    fn from(e: RegistryError) -> Self {
        error!(error = %e, "Registry failure");
        RpcError::Internal(e.to_string())
    }
}

impl From<LeaderboardError> for RpcError {
    fn from(e: LeaderboardError) -> Self {
        error!(error = %e, "Leaderboard failure");
        RpcError::Internal("Failed to create leaderboard".to_string())
    }
}

impl From<IdentityError> for RpcError {
    fn from(e: IdentityError) -> Self {
        match e {
            IdentityError::MissingDeviceId | IdentityError::InvalidDeviceId => {
                RpcError::InvalidArgument(e.to_string())
            }
            IdentityError::InvalidToken(_) => RpcError::Unauthenticated(e.to_string()),
            IdentityError::Signing(_) => RpcError::Internal(e.to_string()),
        }
    }
}

fn parse<T: DeserializeOwned + Default>(payload: &str) -> Result<T, RpcError> {
    if payload.trim().is_empty() {
        return Ok(T::default());
    }
    serde_json::from_str(payload).map_err(|e| {
        warn!(error = %e, "Rejecting malformed payload");
        RpcError::InvalidArgument(format!("Invalid request payload: {}", e))
    })
}

fn reply<T: Serialize>(body: &T) -> Result<String, RpcError> {
    serde_json::to_string(body).map_err(|e| RpcError::Internal(format!("Failed to encode response: {}", e)))
}

/// Joins or creates a match. Replies `{match_id, game_mode, is_new}`.
#[instrument(skip(directory, payload))]
pub async fn match_action<R: SessionRegistry>(
    directory: &SessionDirectory<R>,
    payload: &str,
) -> Result<String, RpcError> {
    let request: MatchActionRequest = parse(payload)?;
    info!(action = %request.action, game_mode = %request.game_mode, "Matchmaking request");
    let assignment = match request.action {
        MatchAction::JoinRandom => directory.find_or_create(request.game_mode).await?,
        MatchAction::CreateNew => directory.create_new(request.game_mode).await?,
    };
    reply(&assignment)
}

/// Issues a device token. Replies `{token, username}`.
#[instrument(skip_all)]
pub fn generate_device_auth(issuer: &IdentityIssuer, payload: &str) -> Result<String, RpcError> {
    let request: DeviceAuthRequest = parse(payload)?;
    let token = issuer.issue(&request.fingerprint)?;
    let username = match request.username.filter(|name| !name.trim().is_empty()) {
        Some(name) => name,
        None => default_username(&request.fingerprint.device_id),
    };
    reply(&DeviceAuthResponse { token, username })
}

/// Verifies a device token. Replies `{account_id, username}`.
#[instrument(skip_all)]
pub fn authenticate_device(verifier: &IdentityVerifier, payload: &str) -> Result<String, RpcError> {
    let request: AuthenticateRequest = serde_json::from_str(payload).map_err(|e| {
        warn!(error = %e, "Rejecting malformed payload");
        RpcError::InvalidArgument(format!("Invalid request payload: {}", e))
    })?;
    let device = verifier.authenticate(&request.token, request.username.as_deref())?;
    reply(&device)
}

/// Ensures the global leaderboard exists. Replies `{leaderboard_id}`.
///
/// The payload is ignored.
#[instrument(skip_all)]
pub async fn leaderboard_action<L: LeaderboardRegistry + ?Sized>(
    leaderboards: &L,
    _payload: &str,
) -> Result<String, RpcError> {
    let leaderboard_id = find_or_create_leaderboard(leaderboards).await?;
    reply(&LeaderboardResponse { leaderboard_id })
}
