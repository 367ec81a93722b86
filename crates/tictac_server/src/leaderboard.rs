//! Global leaderboard provisioning.
//!
//! Clients ask for the leaderboard id before submitting scores. The first
//! request creates the board through the host's [`LeaderboardRegistry`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{error, info, instrument, warn};

/// Id of the shared leaderboard.
pub const GLOBAL_LEADERBOARD_ID: &str = "global_leaderboard";

/// Weekly reset, Monday 00:00.
const WEEKLY_RESET: &str = "0 0 * * 1";

/// Ranking direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SortOrder {
    /// Highest score ranks first.
    Desc,
    /// Lowest score ranks first.
    Asc,
}

/// How a new submission combines with a stored score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ScoreOperator {
    /// Keep the better of the two.
    Best,
    /// Overwrite.
    Set,
    /// Add to the stored score.
    Increment,
}

/// Leaderboard definition handed to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardConfig {
    /// Leaderboard id.
    pub id: String,
    /// Whether only the server may submit scores.
    pub authoritative: bool,
    /// Ranking direction.
    pub sort_order: SortOrder,
    /// Submission operator.
    pub operator: ScoreOperator,
    /// Cron expression for resets.
    pub reset_schedule: String,
    /// Free-form metadata.
    pub metadata: BTreeMap<String, String>,
}

impl LeaderboardConfig {
    /// The shared tic-tac-toe board: client-submitted, best score, weekly reset.
    pub fn global() -> Self {
        let metadata = BTreeMap::from([
            (
                "description".to_string(),
                "Global Tic Tac Toe Leaderboard".to_string(),
            ),
            ("game".to_string(), "TicTacToe".to_string()),
        ]);
        Self {
            id: GLOBAL_LEADERBOARD_ID.to_string(),
            authoritative: false,
            sort_order: SortOrder::Desc,
            operator: ScoreOperator::Best,
            reset_schedule: WEEKLY_RESET.to_string(),
            metadata,
        }
    }
}

/// Leaderboard backend failures.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum LeaderboardError {
    /// The backend could not serve the request.
    #[display("Leaderboard backend unavailable: {}", _0)]
    Unavailable(String),
    /// Creating the leaderboard failed.
    #[display("Failed to create leaderboard {}: {}", id, reason)]
    CreateFailed {
        /// Leaderboard id.
        id: String,
        /// Backend message.
        reason: String,
    },
}

impl std::error::Error for LeaderboardError {}

/// Host-side leaderboard storage.
#[async_trait]
pub trait LeaderboardRegistry: Send + Sync {
    /// Returns true if a leaderboard with `id` exists.
    async fn exists(&self, id: &str) -> Result<bool, LeaderboardError>;

    /// Creates a leaderboard. Creating an existing id is not an error.
    async fn create(&self, config: &LeaderboardConfig) -> Result<(), LeaderboardError>;
}

/// Returns the global leaderboard id, creating the board on first use.
///
/// A failed lookup is treated as a missing board.
#[instrument(skip(registry))]
pub async fn find_or_create_leaderboard<L: LeaderboardRegistry + ?Sized>(
    registry: &L,
) -> Result<String, LeaderboardError> {
    let config = LeaderboardConfig::global();
    match registry.exists(&config.id).await {
        Ok(true) => {
            info!(leaderboard_id = %config.id, "Leaderboard already exists");
            return Ok(config.id);
        }
        Ok(false) => info!(leaderboard_id = %config.id, "Leaderboard not found, creating"),
        Err(e) => warn!(error = %e, leaderboard_id = %config.id, "Lookup failed, creating"),
    }
    registry.create(&config).await.map_err(|e| {
        error!(error = %e, leaderboard_id = %config.id, "Failed to create leaderboard");
        e
    })?;
    info!(leaderboard_id = %config.id, "Leaderboard created");
    Ok(config.id)
}

/// In-process leaderboard store.
#[derive(Debug, Clone, Default)]
pub struct LocalLeaderboards {
    boards: Arc<Mutex<BTreeMap<String, LeaderboardConfig>>>,
}

impl LocalLeaderboards {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, LeaderboardConfig>> {
        self.boards.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Definition of the leaderboard `id`.
    pub fn get(&self, id: &str) -> Option<LeaderboardConfig> {
        self.lock().get(id).cloned()
    }

    /// Number of leaderboards.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true when no leaderboard exists.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[async_trait]
impl LeaderboardRegistry for LocalLeaderboards {
    async fn exists(&self, id: &str) -> Result<bool, LeaderboardError> {
        Ok(self.lock().contains_key(id))
    }

    async fn create(&self, config: &LeaderboardConfig) -> Result<(), LeaderboardError> {
        self.lock()
            .entry(config.id.clone())
            .or_insert_with(|| config.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FlakyLookup {
        creates: AtomicUsize,
    }

    #[async_trait]
    impl LeaderboardRegistry for FlakyLookup {
        async fn exists(&self, _id: &str) -> Result<bool, LeaderboardError> {
            Err(LeaderboardError::Unavailable("timeout".to_string()))
        }

        async fn create(&self, _config: &LeaderboardConfig) -> Result<(), LeaderboardError> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_creates_once_then_reuses() {
        let store = LocalLeaderboards::new();
        assert_eq!(find_or_create_leaderboard(&store).await.unwrap(), GLOBAL_LEADERBOARD_ID);
        assert_eq!(find_or_create_leaderboard(&store).await.unwrap(), GLOBAL_LEADERBOARD_ID);
        assert_eq!(store.len(), 1);

        let board = store.get(GLOBAL_LEADERBOARD_ID).unwrap();
        assert!(!board.authoritative);
        assert_eq!(board.sort_order, SortOrder::Desc);
        assert_eq!(board.operator, ScoreOperator::Best);
        assert_eq!(board.reset_schedule, "0 0 * * 1");
        assert_eq!(board.metadata["game"], "TicTacToe");
    }

    #[tokio::test]
    async fn test_failed_lookup_falls_back_to_create() {
        let registry = FlakyLookup::default();
        let id = find_or_create_leaderboard(&registry).await.unwrap();
        assert_eq!(id, GLOBAL_LEADERBOARD_ID);
        assert_eq!(registry.creates.load(Ordering::SeqCst), 1);
    }
}
