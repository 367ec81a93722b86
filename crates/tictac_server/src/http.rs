//! HTTP surface for the RPC handlers.

use crate::directory::{MatchListing, SessionDirectory};
use crate::identity::{IdentityIssuer, IdentityVerifier};
use crate::leaderboard::LocalLeaderboards;
use crate::mode::GameMode;
use crate::rpc::{self, RpcError};
use crate::runtime::LocalRegistry;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    directory: Arc<SessionDirectory<LocalRegistry>>,
    issuer: Arc<IdentityIssuer>,
    verifier: Arc<IdentityVerifier>,
    leaderboards: LocalLeaderboards,
}

impl AppState {
    /// Bundles the services behind the routes.
    pub fn new(
        directory: SessionDirectory<LocalRegistry>,
        issuer: IdentityIssuer,
        verifier: IdentityVerifier,
        leaderboards: LocalLeaderboards,
    ) -> Self {
        Self {
            directory: Arc::new(directory),
            issuer: Arc::new(issuer),
            verifier: Arc::new(verifier),
            leaderboards,
        }
    }

    /// The matchmaking directory.
    pub fn directory(&self) -> &SessionDirectory<LocalRegistry> {
        &self.directory
    }
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        let status = match &self {
            RpcError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            RpcError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            RpcError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = serde_json::json!({
            "code": self.code(),
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

fn json_reply(body: String) -> Response {
    ([(header::CONTENT_TYPE, "application/json")], body).into_response()
}

/// Builds the router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v2/rpc/match_action", post(match_action))
        .route("/v2/rpc/leaderboard_action", post(leaderboard_action))
        .route("/v2/rpc/generate_device_auth", post(generate_device_auth))
        .route("/v2/account/authenticate/device", post(authenticate_device))
        .route("/v2/matches", get(list_matches))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

#[instrument(skip_all)]
async fn match_action(State(state): State<AppState>, body: String) -> Result<Response, RpcError> {
    let reply = rpc::match_action(&state.directory, &body).await?;
    Ok(json_reply(reply))
}

#[instrument(skip_all)]
async fn leaderboard_action(State(state): State<AppState>, body: String) -> Result<Response, RpcError> {
    let reply = rpc::leaderboard_action(&state.leaderboards, &body).await?;
    Ok(json_reply(reply))
}

#[instrument(skip_all)]
async fn generate_device_auth(State(state): State<AppState>, body: String) -> Result<Response, RpcError> {
    let reply = rpc::generate_device_auth(&state.issuer, &body)?;
    Ok(json_reply(reply))
}

#[instrument(skip_all)]
async fn authenticate_device(State(state): State<AppState>, body: String) -> Result<Response, RpcError> {
    let reply = rpc::authenticate_device(&state.verifier, &body)?;
    Ok(json_reply(reply))
}

#[derive(Debug, Deserialize)]
struct ListParams {
    game_mode: Option<String>,
}

#[instrument(skip_all)]
async fn list_matches(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<MatchListing>>, RpcError> {
    let game_mode = match params.game_mode.as_deref() {
        Some(raw) => GameMode::from_str(raw).map_err(|_| {
            warn!(game_mode = raw, "Unknown game mode");
            RpcError::InvalidArgument(format!("Unknown game mode: {}", raw))
        })?,
        None => GameMode::default(),
    };
    let listings = state.directory.joinable(game_mode).await?;
    debug!(count = listings.len(), "Listed joinable matches");
    Ok(Json(listings))
}
