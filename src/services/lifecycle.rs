use tracing::{debug, warn};

use crate::{
    dao::models::{GameStatus, LiveScoreEntity},
    error::ServiceError,
    state::{
        StorageBackend,
        lifecycle::{LifecycleIntent, MatchLifecycle, Plan},
    },
};

/// Permission-checked plan for one intent, with the score it was planned against.
#[derive(Debug, Clone)]
pub struct Gate {
    pub plan: Plan,
    pub lifecycle: MatchLifecycle,
    pub score: Option<LiveScoreEntity>,
}

/// Load both status sources of a game.
pub async fn load(
    backend: &StorageBackend,
    game_id: &str,
) -> Result<(MatchLifecycle, Option<LiveScoreEntity>), ServiceError> {
    let status = backend
        .games
        .game_status(game_id.to_owned())
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("game {game_id}")))?;
    let score = backend.live.find_live_score(game_id.to_owned()).await?;

    Ok((MatchLifecycle::new(status, score.as_ref()), score))
}

/// Fail with `PermissionDenied` unless `actor_id` owns or is confirmed in the game.
pub async fn authorize(
    backend: &StorageBackend,
    game_id: &str,
    actor_id: &str,
) -> Result<(), ServiceError> {
    let allowed = backend
        .confirmations
        .is_confirmed_or_owner(game_id.to_owned(), actor_id.to_owned())
        .await?;

    if !allowed {
        warn!(game_id, actor = actor_id, "actor is neither owner nor confirmed");
        return Err(ServiceError::PermissionDenied(format!(
            "{actor_id} cannot update game {game_id}"
        )));
    }
    Ok(())
}

/// Check the lifecycle, then the actor, for `intent` on `game_id`.
pub async fn gate(
    backend: &StorageBackend,
    game_id: &str,
    actor_id: &str,
    intent: LifecycleIntent,
) -> Result<Gate, ServiceError> {
    let (lifecycle, score) = load(backend, game_id).await?;
    let plan = lifecycle.plan(intent)?;
    authorize(backend, game_id, actor_id).await?;

    debug!(game_id, ?intent, effect = ?plan.effect, "lifecycle transition planned");
    Ok(Gate {
        plan,
        lifecycle,
        score,
    })
}

/// Move the game-level status to `FINISHED` unless it already is.
pub async fn ensure_finished_status(
    backend: &StorageBackend,
    game_id: &str,
    current: GameStatus,
) -> Result<(), ServiceError> {
    if current == GameStatus::Finished {
        return Ok(());
    }
    backend.games.mark_finished(game_id.to_owned()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dao::{
            directory::memory::MemoryDirectory,
            live_store::{LiveStore, memory::MemoryLiveStore},
        },
        state::lifecycle::{Effect, LivePhase},
    };
    use std::{sync::Arc, time::SystemTime};

    async fn backend(status: GameStatus) -> (StorageBackend, MemoryLiveStore) {
        let store = MemoryLiveStore::new();
        let directory = MemoryDirectory::new();
        directory.register_game("g1", "owner", status).await;
        directory.confirm("g1", "p1").await;
        let backend = StorageBackend {
            live: Arc::new(store.clone()),
            confirmations: Arc::new(directory.clone()),
            games: Arc::new(directory),
        };
        (backend, store)
    }

    #[tokio::test]
    async fn unknown_game_is_not_found() {
        let (backend, _) = backend(GameStatus::Live).await;
        let err = gate(&backend, "missing", "owner", LifecycleIntent::StartLive)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn lifecycle_is_checked_before_permission() {
        let (backend, _) = backend(GameStatus::Scheduled).await;
        let err = gate(&backend, "g1", "stranger", LifecycleIntent::RecordEvent)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    #[tokio::test]
    async fn stranger_is_denied_and_confirmed_player_allowed() {
        let (backend, store) = backend(GameStatus::Live).await;
        LiveStore::create_live_score(
            &store,
            LiveScoreEntity::new("g1", "A", "B", SystemTime::UNIX_EPOCH),
        )
        .await
        .unwrap();

        let err = gate(&backend, "g1", "stranger", LifecycleIntent::RecordEvent)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::PermissionDenied(_)));

        let allowed = gate(&backend, "g1", "p1", LifecycleIntent::RecordEvent)
            .await
            .unwrap();
        assert_eq!(allowed.plan.effect, Effect::MutateLedger);
        assert_eq!(allowed.lifecycle.phase, LivePhase::Live);
        assert!(allowed.score.is_some());
    }
}
