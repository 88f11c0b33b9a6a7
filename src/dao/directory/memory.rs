use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use futures::future::BoxFuture;
use tokio::sync::RwLock;

use super::{ConfirmationProvider, GameStatusStore};
use crate::dao::{models::GameStatus, storage::StorageResult};

#[derive(Default)]
struct DirectoryState {
    statuses: HashMap<String, GameStatus>,
    owners: HashMap<String, String>,
    confirmed: HashSet<(String, String)>,
}

/// In-process game directory, used when no database is configured and in tests.
#[derive(Clone, Default)]
pub struct MemoryDirectory {
    state: Arc<RwLock<DirectoryState>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a game with its owner and status.
    pub async fn register_game(&self, game_id: &str, owner_id: &str, status: GameStatus) {
        let mut state = self.state.write().await;
        state.statuses.insert(game_id.to_owned(), status);
        state.owners.insert(game_id.to_owned(), owner_id.to_owned());
    }

    pub async fn set_status(&self, game_id: &str, status: GameStatus) {
        self.state
            .write()
            .await
            .statuses
            .insert(game_id.to_owned(), status);
    }

    /// Record a confirmed place for `actor_id`.
    pub async fn confirm(&self, game_id: &str, actor_id: &str) {
        self.state
            .write()
            .await
            .confirmed
            .insert((game_id.to_owned(), actor_id.to_owned()));
    }

    async fn is_confirmed_or_owner(&self, game_id: &str, actor_id: &str) -> bool {
        let state = self.state.read().await;
        state.owners.get(game_id).map(String::as_str) == Some(actor_id)
            || state
                .confirmed
                .contains(&(game_id.to_owned(), actor_id.to_owned()))
    }

    async fn game_status(&self, game_id: &str) -> Option<GameStatus> {
        self.state.read().await.statuses.get(game_id).copied()
    }

    async fn mark_finished(&self, game_id: &str) {
        if let Some(status) = self.state.write().await.statuses.get_mut(game_id) {
            *status = GameStatus::Finished;
        }
    }
}

impl ConfirmationProvider for MemoryDirectory {
    fn is_confirmed_or_owner(
        &self,
        game_id: String,
        actor_id: String,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let directory = self.clone();
        Box::pin(async move { Ok(directory.is_confirmed_or_owner(&game_id, &actor_id).await) })
    }
}

impl GameStatusStore for MemoryDirectory {
    fn game_status(
        &self,
        game_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<GameStatus>>> {
        let directory = self.clone();
        Box::pin(async move { Ok(directory.game_status(&game_id).await) })
    }

    fn mark_finished(&self, game_id: String) -> BoxFuture<'static, StorageResult<()>> {
        let directory = self.clone();
        Box::pin(async move {
            directory.mark_finished(&game_id).await;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn owner_and_confirmed_players_are_allowed() {
        let directory = MemoryDirectory::new();
        directory
            .register_game("g1", "owner", GameStatus::Live)
            .await;
        directory.confirm("g1", "player").await;

        assert!(directory.is_confirmed_or_owner("g1", "owner").await);
        assert!(directory.is_confirmed_or_owner("g1", "player").await);
        assert!(!directory.is_confirmed_or_owner("g1", "stranger").await);
        assert!(!directory.is_confirmed_or_owner("g2", "player").await);
    }

    #[tokio::test]
    async fn mark_finished_ignores_unknown_games() {
        let directory = MemoryDirectory::new();
        directory
            .register_game("g1", "owner", GameStatus::Live)
            .await;

        directory.mark_finished("g1").await;
        directory.mark_finished("missing").await;

        assert_eq!(directory.game_status("g1").await, Some(GameStatus::Finished));
        assert_eq!(directory.game_status("missing").await, None);
    }
}
