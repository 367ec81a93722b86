//! Matchmaking over an external session registry.

use crate::host::JoinRejection;
use crate::mode::GameMode;
use crate::state::{MAX_PLAYERS, MatchLabel, MatchStatus};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

/// Opaque match identifier issued by the registry.
pub type MatchId = String;

/// Structured label filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelQuery {
    /// Required status.
    pub status: MatchStatus,
    /// Exclusive upper bound on seated players.
    pub max_players: usize,
    /// Required mode.
    pub game_mode: GameMode,
}

impl LabelQuery {
    /// Matches that still have a free seat in `game_mode`.
    pub fn joinable(game_mode: GameMode) -> Self {
        Self {
            status: MatchStatus::Waiting,
            max_players: MAX_PLAYERS,
            game_mode,
        }
    }

    /// Evaluates the filter against a label.
    pub fn matches(&self, label: &MatchLabel) -> bool {
        label.status == self.status
            && label.players < self.max_players
            && label.game_mode == self.game_mode
    }
}

impl std::fmt::Display for LabelQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "+label.status:{} +label.players:<{} +label.game_mode:{}",
            self.status, self.max_players, self.game_mode
        )
    }
}

/// One entry returned by [`SessionRegistry::list`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, derive_new::new)]
pub struct MatchListing {
    /// Match identifier.
    pub match_id: MatchId,
    /// Label at the time of listing.
    pub label: MatchLabel,
}

/// Registry failures.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum RegistryError {
    /// The registry could not serve the request.
    #[display("Registry unavailable: {}", _0)]
    Unavailable(String),
    /// No match with this id is registered.
    #[display("Match not found: {}", _0)]
    NotFound(MatchId),
    /// The match refused the presence.
    #[display("Join rejected: {}", _0)]
    JoinRejected(JoinRejection),
    /// The match stopped while the request was in flight.
    #[display("Match closed: {}", _0)]
    Closed(MatchId),
}

impl std::error::Error for RegistryError {}

/// Host-side registry of running matches.
#[async_trait]
pub trait SessionRegistry: Send + Sync {
    /// Lists up to `limit` matches whose label satisfies `query`.
    async fn list(&self, query: &LabelQuery, limit: usize) -> Result<Vec<MatchListing>, RegistryError>;

    /// Creates a new match seeded with `game_mode`.
    async fn create(&self, game_mode: GameMode) -> Result<MatchId, RegistryError>;
}

fn pick_random(candidates: &[MatchListing]) -> Option<MatchListing> {
    candidates.choose(&mut rand::thread_rng()).cloned()
}

/// Result of a matchmaking request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    /// Match the client should join.
    pub match_id: MatchId,
    /// Mode of that match.
    pub game_mode: GameMode,
    /// True when the match was created for this request.
    pub is_new: bool,
}

/// Finds or creates matches for clients.
///
/// Lookups and creations are not exclusive. Two concurrent misses may each
/// create a match; the two-seat admission guard bounds the damage.
#[derive(Debug)]
pub struct SessionDirectory<R> {
    registry: R,
    list_limit: usize,
}

impl<R: SessionRegistry> SessionDirectory<R> {
    /// Wraps a registry.
    pub fn new(registry: R, list_limit: usize) -> Self {
        Self {
            registry,
            list_limit,
        }
    }

    /// The wrapped registry.
    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Lists joinable matches in `game_mode`.
    pub async fn joinable(&self, game_mode: GameMode) -> Result<Vec<MatchListing>, RegistryError> {
        self.registry
            .list(&LabelQuery::joinable(game_mode), self.list_limit)
            .await
    }

    /// Joins a random waiting match in `game_mode`, or creates one.
    #[instrument(skip(self))]
    pub async fn find_or_create(&self, game_mode: GameMode) -> Result<Assignment, RegistryError> {
        let candidates = self.joinable(game_mode).await?;
        debug!(candidates = candidates.len(), query = %LabelQuery::joinable(game_mode), "Listed matches");

        if let Some(listing) = pick_random(&candidates) {
            info!(match_id = %listing.match_id, "Assigned existing match");
            return Ok(Assignment {
                match_id: listing.match_id,
                game_mode,
                is_new: false,
            });
        }
        self.create_new(game_mode).await
    }

    /// Always creates a fresh match.
    #[instrument(skip(self))]
    pub async fn create_new(&self, game_mode: GameMode) -> Result<Assignment, RegistryError> {
        let match_id = self.registry.create(game_mode).await?;
        info!(match_id = %match_id, "Created match");
        Ok(Assignment {
            match_id,
            game_mode,
            is_new: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_string() {
        let query = LabelQuery::joinable(GameMode::Blitz);
        assert_eq!(
            query.to_string(),
            "+label.status:waiting +label.players:<2 +label.game_mode:blitz"
        );
    }

    #[test]
    fn test_query_matches() {
        let query = LabelQuery::joinable(GameMode::Standard);
        assert!(query.matches(&MatchLabel::new(MatchStatus::Waiting, 1, GameMode::Standard)));
        assert!(!query.matches(&MatchLabel::new(MatchStatus::Waiting, 2, GameMode::Standard)));
        assert!(!query.matches(&MatchLabel::new(MatchStatus::Active, 1, GameMode::Standard)));
        assert!(!query.matches(&MatchLabel::new(MatchStatus::Waiting, 0, GameMode::Blitz)));
    }
}
