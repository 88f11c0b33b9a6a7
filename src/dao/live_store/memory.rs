//! Process-local [`LiveStore`] used for development runs and tests.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
    time::SystemTime,
};

use futures::future::BoxFuture;
use indexmap::IndexMap;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use crate::dao::{
    live_store::LiveStore,
    models::{
        AggregateDelta, EventTombstoneEntity, FinishStamp, GameEventEntity, LivePlayerStatsEntity,
        LiveScoreEntity, StoredEvent, stats_key,
    },
    storage::{StorageError, StorageResult},
};

/// Failure raised on purpose by [`MemoryLiveStore::fail_next`] or while marked unavailable.
#[derive(Debug, Error)]
#[error("in-memory store failure injected")]
pub struct InjectedFailure;

#[derive(Default)]
struct MemoryState {
    events: HashMap<Uuid, GameEventEntity>,
    tombstones: HashMap<Uuid, EventTombstoneEntity>,
    scores: HashMap<String, LiveScoreEntity>,
    stats: IndexMap<String, LivePlayerStatsEntity>,
}

#[derive(Default)]
struct MemoryInner {
    state: Mutex<MemoryState>,
    pending_skips: AtomicU32,
    pending_failures: AtomicU32,
    pending_stall_skips: AtomicU32,
    pending_stalls: AtomicU32,
    unavailable: AtomicBool,
}

/// Single-process store where every operation runs under one lock.
#[derive(Clone, Default)]
pub struct MemoryLiveStore {
    inner: Arc<MemoryInner>,
}

impl MemoryLiveStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` operations fail with an unavailable error.
    pub fn fail_next(&self, count: u32) {
        self.fail_after(0, count);
    }

    /// Let `skip` operations succeed, then fail the following `count` ones.
    pub fn fail_after(&self, skip: u32, count: u32) {
        self.inner.pending_skips.store(skip, Ordering::SeqCst);
        self.inner.pending_failures.store(count, Ordering::SeqCst);
    }

    /// Let `skip` operations through, then hang the following `count` ones forever.
    pub fn stall_after(&self, skip: u32, count: u32) {
        self.inner.pending_stall_skips.store(skip, Ordering::SeqCst);
        self.inner.pending_stalls.store(count, Ordering::SeqCst);
    }

    /// Toggle a persistent outage.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of event documents ever written, removed or not.
    pub async fn event_document_count(&self) -> usize {
        self.inner.state.lock().await.events.len()
    }

    /// Admission of one operation: injected stalls first, then failures.
    async fn admit(&self) -> StorageResult<()> {
        if take_one(&self.inner.pending_stall_skips).is_none()
            && take_one(&self.inner.pending_stalls).is_some()
        {
            std::future::pending::<()>().await;
        }
        self.check_available()
    }

    fn check_available(&self) -> StorageResult<()> {
        if self.inner.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::unavailable(
                "in-memory store marked unavailable".into(),
                InjectedFailure,
            ));
        }

        if take_one(&self.inner.pending_skips).is_some() {
            return Ok(());
        }

        if take_one(&self.inner.pending_failures).is_some() {
            return Err(StorageError::unavailable(
                "in-memory store failure injected".into(),
                InjectedFailure,
            ));
        }

        Ok(())
    }

    async fn insert_event(&self, event: GameEventEntity) -> StorageResult<()> {
        self.admit().await?;
        let mut state = self.inner.state.lock().await;
        state.events.entry(event.id).or_insert(event);
        Ok(())
    }

    async fn find_event(&self, event_id: Uuid) -> StorageResult<Option<StoredEvent>> {
        self.admit().await?;
        let state = self.inner.state.lock().await;
        Ok(state.events.get(&event_id).map(|event| StoredEvent {
            event: event.clone(),
            tombstone: state.tombstones.get(&event_id).cloned(),
        }))
    }

    async fn insert_tombstone(&self, tombstone: EventTombstoneEntity) -> StorageResult<bool> {
        self.admit().await?;
        let mut state = self.inner.state.lock().await;
        if state.tombstones.contains_key(&tombstone.event_id) {
            return Ok(false);
        }
        state.tombstones.insert(tombstone.event_id, tombstone);
        Ok(true)
    }

    async fn set_reversed(&self, event_id: Uuid, reversed: bool) -> StorageResult<bool> {
        self.admit().await?;
        let mut state = self.inner.state.lock().await;
        match state.tombstones.get_mut(&event_id) {
            Some(tombstone) if tombstone.reversed != reversed => {
                tombstone.reversed = reversed;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_events(&self, game_id: String) -> StorageResult<Vec<GameEventEntity>> {
        self.admit().await?;
        let state = self.inner.state.lock().await;
        Ok(state
            .events
            .values()
            .filter(|event| event.game_id == game_id && !state.tombstones.contains_key(&event.id))
            .cloned()
            .collect())
    }

    async fn create_live_score(&self, score: LiveScoreEntity) -> StorageResult<LiveScoreEntity> {
        self.admit().await?;
        let mut state = self.inner.state.lock().await;
        let stored = state
            .scores
            .entry(score.game_id.clone())
            .or_insert(score);
        Ok(stored.clone())
    }

    async fn find_live_score(&self, game_id: String) -> StorageResult<Option<LiveScoreEntity>> {
        self.admit().await?;
        let state = self.inner.state.lock().await;
        Ok(state.scores.get(&game_id).cloned())
    }

    async fn apply_delta(&self, delta: AggregateDelta) -> StorageResult<Option<LiveScoreEntity>> {
        self.admit().await?;
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;

        let Some(score) = state.scores.get_mut(&delta.game_id) else {
            return Ok(None);
        };

        if let Some(goal) = &delta.goal {
            if !score.apply_goal(&goal.team_id, goal.amount) {
                warn!(
                    game_id = %delta.game_id,
                    team_id = %goal.team_id,
                    "goal delta for a team outside the live score; score untouched"
                );
            }
        }
        let updated = score.clone();

        for player in delta.players.iter().filter(|player| !player.is_zero()) {
            state
                .stats
                .entry(stats_key(&delta.game_id, &player.player_id))
                .or_insert_with(|| {
                    LivePlayerStatsEntity::new(
                        delta.game_id.clone(),
                        player.player_id.clone(),
                        player.team_id.clone(),
                    )
                })
                .apply_delta(player);
        }

        Ok(Some(updated))
    }

    async fn list_player_stats(
        &self,
        game_id: String,
    ) -> StorageResult<Vec<LivePlayerStatsEntity>> {
        self.admit().await?;
        let state = self.inner.state.lock().await;
        Ok(state
            .stats
            .values()
            .filter(|line| line.game_id == game_id)
            .cloned()
            .collect())
    }

    async fn replace_aggregates(
        &self,
        score: LiveScoreEntity,
        stats: Vec<LivePlayerStatsEntity>,
    ) -> StorageResult<()> {
        self.admit().await?;
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;

        if let Some(stored) = state.scores.get_mut(&score.game_id) {
            stored.team1_score = score.team1_score;
            stored.team2_score = score.team2_score;
        }

        for line in state
            .stats
            .values_mut()
            .filter(|line| line.game_id == score.game_id)
        {
            *line = line.zeroed();
        }

        for line in stats {
            let key = stats_key(&line.game_id, &line.player_id);
            match state.stats.get_mut(&key) {
                Some(existing) => *existing = existing.with_counters_of(&line),
                None => {
                    state.stats.insert(key, line);
                }
            }
        }

        Ok(())
    }

    async fn stamp_finished(&self, game_id: String, at: SystemTime) -> StorageResult<FinishStamp> {
        self.admit().await?;
        let mut state = self.inner.state.lock().await;
        let Some(score) = state.scores.get_mut(&game_id) else {
            return Ok(FinishStamp::Missing);
        };

        if score.finished_at.is_some() {
            return Ok(FinishStamp::AlreadyFinished(score.clone()));
        }

        score.finished_at = Some(at);
        Ok(FinishStamp::Stamped(score.clone()))
    }
}

/// Decrement `counter` unless it is already zero; `Some` when a unit was taken.
fn take_one(counter: &AtomicU32) -> Option<u32> {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
            remaining.checked_sub(1)
        })
        .ok()
}

impl LiveStore for MemoryLiveStore {
    fn insert_event(&self, event: GameEventEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_event(event).await })
    }

    fn find_event(&self, event_id: Uuid) -> BoxFuture<'static, StorageResult<Option<StoredEvent>>> {
        let store = self.clone();
        Box::pin(async move { store.find_event(event_id).await })
    }

    fn insert_tombstone(
        &self,
        tombstone: EventTombstoneEntity,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.insert_tombstone(tombstone).await })
    }

    fn set_reversed(
        &self,
        event_id: Uuid,
        reversed: bool,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.set_reversed(event_id, reversed).await })
    }

    fn list_events(
        &self,
        game_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<GameEventEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_events(game_id).await })
    }

    fn create_live_score(
        &self,
        score: LiveScoreEntity,
    ) -> BoxFuture<'static, StorageResult<LiveScoreEntity>> {
        let store = self.clone();
        Box::pin(async move { store.create_live_score(score).await })
    }

    fn find_live_score(
        &self,
        game_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<LiveScoreEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_live_score(game_id).await })
    }

    fn apply_delta(
        &self,
        delta: AggregateDelta,
    ) -> BoxFuture<'static, StorageResult<Option<LiveScoreEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.apply_delta(delta).await })
    }

    fn list_player_stats(
        &self,
        game_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<LivePlayerStatsEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_player_stats(game_id).await })
    }

    fn replace_aggregates(
        &self,
        score: LiveScoreEntity,
        stats: Vec<LivePlayerStatsEntity>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.replace_aggregates(score, stats).await })
    }

    fn stamp_finished(
        &self,
        game_id: String,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<FinishStamp>> {
        let store = self.clone();
        Box::pin(async move { store.stamp_finished(game_id, at).await })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.check_available() })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.check_available() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::{GoalDelta, PlayerStatDelta};

    fn score() -> LiveScoreEntity {
        LiveScoreEntity::new("g1", "A", "B", SystemTime::UNIX_EPOCH)
    }

    #[tokio::test]
    async fn create_live_score_keeps_first_writer() {
        let store = MemoryLiveStore::new();
        let first = store.create_live_score(score()).await.unwrap();
        let second = store
            .create_live_score(LiveScoreEntity::new("g1", "X", "Y", SystemTime::now()))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(second.team1_id, "A");
    }

    #[tokio::test]
    async fn tombstone_is_created_once() {
        let store = MemoryLiveStore::new();
        let tombstone = EventTombstoneEntity {
            event_id: Uuid::new_v4(),
            game_id: "g1".into(),
            removed_at: SystemTime::now(),
            reversed: true,
        };

        assert!(store.insert_tombstone(tombstone.clone()).await.unwrap());
        assert!(!store.insert_tombstone(tombstone).await.unwrap());
    }

    #[tokio::test]
    async fn reversal_flag_is_claimed_once() {
        let store = MemoryLiveStore::new();
        let event_id = Uuid::new_v4();
        assert!(!store.set_reversed(event_id, true).await.unwrap());

        store
            .insert_tombstone(EventTombstoneEntity {
                event_id,
                game_id: "g1".into(),
                removed_at: SystemTime::now(),
                reversed: false,
            })
            .await
            .unwrap();

        assert!(store.set_reversed(event_id, true).await.unwrap());
        assert!(!store.set_reversed(event_id, true).await.unwrap());
        assert!(store.set_reversed(event_id, false).await.unwrap());
    }

    #[tokio::test]
    async fn opposite_deltas_cancel_in_either_order() {
        let store = MemoryLiveStore::new();
        store.create_live_score(score()).await.unwrap();
        let goal = AggregateDelta {
            game_id: "g1".into(),
            goal: Some(GoalDelta {
                team_id: "A".into(),
                amount: 1,
            }),
            players: vec![PlayerStatDelta {
                goals: 1,
                ..PlayerStatDelta::zero("p1", "A")
            }],
        };

        let dipped = store.apply_delta(goal.inverted()).await.unwrap().unwrap();
        assert_eq!(dipped.team1_score, -1);
        let settled = store.apply_delta(goal).await.unwrap().unwrap();
        assert_eq!(settled.team1_score, 0);

        let lines = store.list_player_stats("g1".into()).await.unwrap();
        assert_eq!(lines[0].goals, 0);
    }

    #[tokio::test]
    async fn apply_delta_without_score_writes_nothing() {
        let store = MemoryLiveStore::new();
        let delta = AggregateDelta {
            game_id: "g1".into(),
            goal: Some(GoalDelta {
                team_id: "A".into(),
                amount: 1,
            }),
            players: vec![PlayerStatDelta {
                goals: 1,
                ..PlayerStatDelta::zero("p1", "A")
            }],
        };

        assert_eq!(store.apply_delta(delta).await.unwrap(), None);
        assert!(store.list_player_stats("g1".into()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stamp_finished_only_once() {
        let store = MemoryLiveStore::new();
        store.create_live_score(score()).await.unwrap();

        let first = store
            .stamp_finished("g1".into(), SystemTime::now())
            .await
            .unwrap();
        let second = store
            .stamp_finished("g1".into(), SystemTime::now())
            .await
            .unwrap();

        let FinishStamp::Stamped(stamped) = first else {
            panic!("expected first call to stamp, got {first:?}");
        };
        assert_eq!(second, FinishStamp::AlreadyFinished(stamped));
        assert_eq!(
            store.stamp_finished("other".into(), SystemTime::now()).await.unwrap(),
            FinishStamp::Missing
        );
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let store = MemoryLiveStore::new();
        store.fail_next(1);

        assert!(store.find_live_score("g1".into()).await.is_err());
        assert!(store.find_live_score("g1".into()).await.is_ok());
    }

    #[tokio::test]
    async fn stalled_operation_never_completes() {
        let store = MemoryLiveStore::new();
        store.stall_after(1, 1);

        assert!(store.find_live_score("g1".into()).await.is_ok());
        let stalled = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            store.find_live_score("g1".into()),
        )
        .await;
        assert!(stalled.is_err());
        assert!(store.find_live_score("g1".into()).await.is_ok());
    }
}
