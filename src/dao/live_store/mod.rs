pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use crate::dao::models::{
    AggregateDelta, EventTombstoneEntity, FinishStamp, GameEventEntity, LivePlayerStatsEntity,
    LiveScoreEntity, StoredEvent,
};
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;
use std::time::SystemTime;
use uuid::Uuid;

/// Abstraction over the persistence layer for the event ledger and the live aggregates.
///
/// Every mutation is either additive, idempotent or a commutative increment, so concurrent
/// callers never need a lock around a sequence of calls.
pub trait LiveStore: Send + Sync {
    /// Insert a new event document.
    fn insert_event(&self, event: GameEventEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Fetch an event together with its removal stamp.
    fn find_event(&self, event_id: Uuid) -> BoxFuture<'static, StorageResult<Option<StoredEvent>>>;
    /// Insert a tombstone unless one exists; `true` when this call created it.
    fn insert_tombstone(
        &self,
        tombstone: EventTombstoneEntity,
    ) -> BoxFuture<'static, StorageResult<bool>>;
    /// Set the reversal flag of an event's tombstone to `reversed` unless it already is.
    ///
    /// `true` when this call changed the flag; acts as a compare-and-set claim.
    fn set_reversed(
        &self,
        event_id: Uuid,
        reversed: bool,
    ) -> BoxFuture<'static, StorageResult<bool>>;
    /// Every event of a game that has no tombstone, in no particular order.
    fn list_events(
        &self,
        game_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<GameEventEntity>>>;
    /// Create the live score unless one exists; always returns the stored document.
    fn create_live_score(
        &self,
        score: LiveScoreEntity,
    ) -> BoxFuture<'static, StorageResult<LiveScoreEntity>>;
    fn find_live_score(
        &self,
        game_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<LiveScoreEntity>>>;
    /// Apply a commutative increment to the score and player stat lines.
    ///
    /// Either the whole delta lands or none of it does. Returns the score after the
    /// write, or `None` when the game has no live score.
    fn apply_delta(
        &self,
        delta: AggregateDelta,
    ) -> BoxFuture<'static, StorageResult<Option<LiveScoreEntity>>>;
    fn list_player_stats(
        &self,
        game_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<LivePlayerStatsEntity>>>;
    /// Overwrite the aggregate counters with a full recomputation.
    ///
    /// Stat lines of the game missing from `stats` are reset to zero.
    fn replace_aggregates(
        &self,
        score: LiveScoreEntity,
        stats: Vec<LivePlayerStatsEntity>,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Write `finished_at` unless it is already set.
    fn stamp_finished(
        &self,
        game_id: String,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<FinishStamp>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
