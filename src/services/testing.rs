//! Shared fixtures for service tests.

use std::sync::Arc;

use crate::{
    config::AppConfig,
    dao::{
        directory::{GameStatusStore, memory::MemoryDirectory},
        live_store::{LiveStore, memory::MemoryLiveStore},
        models::{GameEventType, GameStatus},
    },
    services::{badges::testing::RecordingBadgeAwarder, ledger::EventDraft, live_session},
    state::{AppState, SharedState, StorageBackend},
};

/// Application state wired to in-memory storage with one registered game.
///
/// `owner` owns the game and `p1` holds a confirmed place; anyone else is a stranger.
pub struct Harness {
    pub state: SharedState,
    pub store: MemoryLiveStore,
    pub directory: MemoryDirectory,
    pub badges: RecordingBadgeAwarder,
}

impl Harness {
    pub async fn new(game_id: &str, status: GameStatus) -> Self {
        Self::build(game_id, status, RecordingBadgeAwarder::default(), AppConfig::default()).await
    }

    /// Game in `LIVE` status with its live score opened for teams `A` and `B`.
    pub async fn live(game_id: &str) -> Self {
        Self::started(game_id, RecordingBadgeAwarder::default(), AppConfig::default()).await
    }

    pub async fn live_with_config(game_id: &str, config: AppConfig) -> Self {
        Self::started(game_id, RecordingBadgeAwarder::default(), config).await
    }

    pub async fn with_failing_badges(game_id: &str) -> Self {
        Self::started(game_id, RecordingBadgeAwarder::failing(), AppConfig::default()).await
    }

    pub async fn with_badges(
        game_id: &str,
        badges: RecordingBadgeAwarder,
        config: AppConfig,
    ) -> Self {
        Self::started(game_id, badges, config).await
    }

    async fn started(game_id: &str, badges: RecordingBadgeAwarder, config: AppConfig) -> Self {
        let harness = Self::build(game_id, GameStatus::Live, badges, config).await;
        live_session::start_live_game(&harness.state, "owner", game_id, "A", "B")
            .await
            .expect("live score opens");
        harness
    }

    async fn build(
        game_id: &str,
        status: GameStatus,
        badges: RecordingBadgeAwarder,
        config: AppConfig,
    ) -> Self {
        let store = MemoryLiveStore::new();
        let directory = MemoryDirectory::new();
        directory.register_game(game_id, "owner", status).await;
        directory.confirm(game_id, "p1").await;

        let state = AppState::new(config, Arc::new(badges.clone()));
        state
            .install_storage(StorageBackend {
                live: Arc::new(store.clone()),
                confirmations: Arc::new(directory.clone()),
                games: Arc::new(directory.clone()),
            })
            .await;

        Self {
            state,
            store,
            directory,
            badges,
        }
    }

    pub async fn directory_status(&self, game_id: &str) -> Option<GameStatus> {
        GameStatusStore::game_status(&self.directory, game_id.to_owned())
            .await
            .expect("in-memory directory never fails")
    }

    /// Overwrite the stored score counters without touching the ledger.
    pub async fn corrupt_score(&self, game_id: &str, team1: i64, team2: i64) {
        let mut score = LiveStore::find_live_score(&self.store, game_id.to_owned())
            .await
            .unwrap()
            .expect("live score exists");
        score.team1_score = team1;
        score.team2_score = team2;
        let stats = LiveStore::list_player_stats(&self.store, game_id.to_owned())
            .await
            .unwrap();
        LiveStore::replace_aggregates(&self.store, score, stats)
            .await
            .unwrap();
    }
}

/// Goal by `player` ("Alice") for `team` without an assist.
pub fn goal_draft(game_id: &str, player: &str, team: &str, minute: i32) -> EventDraft {
    EventDraft {
        game_id: game_id.into(),
        event_type: GameEventType::Goal,
        player_id: player.into(),
        player_name: "Alice".into(),
        team_id: team.into(),
        assisted_by_id: None,
        assisted_by_name: None,
        minute,
    }
}
