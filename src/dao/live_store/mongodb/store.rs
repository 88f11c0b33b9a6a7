use std::{collections::HashSet, sync::Arc, time::SystemTime};

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::{DateTime, Document, doc},
    options::{IndexOptions, ReturnDocument},
};
use tokio::sync::RwLock;
use tracing::{error, warn};
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult, is_duplicate_key},
    models::{
        MongoEventDocument, MongoScoreDocument, MongoStatsDocument, MongoTombstoneDocument, by_id,
        stats_id, stats_insert_fields,
    },
};
use crate::dao::{
    live_store::LiveStore,
    models::{
        AggregateDelta, EventTombstoneEntity, FinishStamp, GameEventEntity, LivePlayerStatsEntity,
        LiveScoreEntity, StoredEvent,
    },
    storage::StorageResult,
};

const EVENT_COLLECTION_NAME: &str = "game_events";
const REMOVAL_COLLECTION_NAME: &str = "game_event_removals";
const SCORE_COLLECTION_NAME: &str = "live_scores";
const STATS_COLLECTION_NAME: &str = "live_player_stats";
pub(super) const GAME_COLLECTION_NAME: &str = "games";
pub(super) const CONFIRMATION_COLLECTION_NAME: &str = "confirmations";

/// MongoDB-backed ledger and aggregate store.
#[derive(Clone)]
pub struct MongoLiveStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    // Held so the connection pool lives as long as the database handle.
    #[allow(dead_code)]
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoLiveStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let database = self.database().await;
        let indexes: [(&'static str, &'static str, Document); 3] = [
            (
                EVENT_COLLECTION_NAME,
                "game_events_game_created_idx",
                doc! {"game_id": 1, "created_at": -1},
            ),
            (
                REMOVAL_COLLECTION_NAME,
                "game_event_removals_game_idx",
                doc! {"game_id": 1},
            ),
            (
                STATS_COLLECTION_NAME,
                "live_player_stats_game_idx",
                doc! {"game_id": 1},
            ),
        ];

        for (collection, name, keys) in indexes {
            let index = IndexModel::builder()
                .keys(keys)
                .options(IndexOptions::builder().name(Some(name.to_owned())).build())
                .build();

            database
                .collection::<Document>(collection)
                .create_index(index)
                .await
                .map_err(|source| MongoDaoError::EnsureIndex {
                    collection,
                    index: name,
                    source,
                })?;
        }

        Ok(())
    }

    pub(super) async fn database(&self) -> Database {
        let guard = self.inner.state.read().await;
        guard.database.clone()
    }

    async fn events(&self) -> Collection<MongoEventDocument> {
        self.database().await.collection(EVENT_COLLECTION_NAME)
    }

    async fn removals(&self) -> Collection<MongoTombstoneDocument> {
        self.database().await.collection(REMOVAL_COLLECTION_NAME)
    }

    async fn scores(&self) -> Collection<MongoScoreDocument> {
        self.database().await.collection(SCORE_COLLECTION_NAME)
    }

    async fn stats(&self) -> Collection<MongoStatsDocument> {
        self.database().await.collection(STATS_COLLECTION_NAME)
    }

    async fn insert_event(&self, event: GameEventEntity) -> MongoResult<()> {
        let id = event.id.to_string();
        let document: MongoEventDocument = event.into();

        match self.events().await.insert_one(&document).await {
            Ok(_) => Ok(()),
            // A retried append of the same event id already landed.
            Err(err) if is_duplicate_key(&err) => Ok(()),
            Err(source) => Err(MongoDaoError::SaveEvent { id, source }),
        }
    }

    async fn find_event(&self, event_id: Uuid) -> MongoResult<Option<StoredEvent>> {
        let id = event_id.to_string();
        let Some(document) = self
            .events()
            .await
            .find_one(by_id(&id))
            .await
            .map_err(|source| MongoDaoError::LoadEvent {
                id: id.clone(),
                source,
            })?
        else {
            return Ok(None);
        };

        let tombstone = self
            .removals()
            .await
            .find_one(by_id(&id))
            .await
            .map_err(|source| MongoDaoError::LoadEvent {
                id: id.clone(),
                source,
            })?;

        Ok(Some(StoredEvent {
            event: document.try_into()?,
            tombstone: tombstone.map(EventTombstoneEntity::try_from).transpose()?,
        }))
    }

    async fn insert_tombstone(&self, tombstone: EventTombstoneEntity) -> MongoResult<bool> {
        let document: MongoTombstoneDocument = tombstone.into();

        match self.removals().await.insert_one(&document).await {
            Ok(_) => Ok(true),
            Err(err) if is_duplicate_key(&err) => Ok(false),
            Err(source) => Err(MongoDaoError::SaveEvent {
                id: document.event_id,
                source,
            }),
        }
    }

    async fn list_events(&self, game_id: String) -> MongoResult<Vec<GameEventEntity>> {
        let load_error = |source| MongoDaoError::LoadEvents {
            game_id: game_id.clone(),
            source,
        };

        let removed: HashSet<String> = self
            .removals()
            .await
            .find(doc! {"game_id": game_id.as_str()})
            .await
            .map_err(load_error)?
            .map_ok(|tombstone| tombstone.event_id)
            .try_collect()
            .await
            .map_err(load_error)?;

        let documents: Vec<MongoEventDocument> = self
            .events()
            .await
            .find(doc! {"game_id": game_id.as_str()})
            .await
            .map_err(load_error)?
            .try_collect()
            .await
            .map_err(load_error)?;

        documents
            .into_iter()
            .map(GameEventEntity::try_from)
            .filter(|event| match event {
                Ok(event) => !removed.contains(&event.id.to_string()),
                Err(_) => true,
            })
            .collect()
    }

    async fn create_live_score(&self, score: LiveScoreEntity) -> MongoResult<LiveScoreEntity> {
        let game_id = score.game_id.clone();
        let document: MongoScoreDocument = score.clone().into();

        match self.scores().await.insert_one(&document).await {
            Ok(_) => Ok(score),
            Err(err) if is_duplicate_key(&err) => self
                .find_live_score(game_id.clone())
                .await?
                .ok_or_else(|| MongoDaoError::Decode {
                    id: game_id,
                    reason: "live score reported as duplicate but cannot be read".into(),
                }),
            Err(source) => Err(MongoDaoError::SaveScore { game_id, source }),
        }
    }

    async fn find_live_score(&self, game_id: String) -> MongoResult<Option<LiveScoreEntity>> {
        let document = self
            .scores()
            .await
            .find_one(by_id(&game_id))
            .await
            .map_err(|source| MongoDaoError::LoadScore {
                game_id: game_id.clone(),
                source,
            })?;

        Ok(document.map(Into::into))
    }

    async fn apply_delta(&self, delta: AggregateDelta) -> MongoResult<Option<LiveScoreEntity>> {
        let Some(mut score) = self.find_live_score(delta.game_id.clone()).await? else {
            return Ok(None);
        };

        let mut landed = AggregateDelta::empty(&delta.game_id);
        if let Err(err) = self.write_delta(&delta, &mut score, &mut landed).await {
            self.roll_back(landed).await;
            return Err(err);
        }
        Ok(Some(score))
    }

    /// Write the parts of `delta` one by one, recording each part that landed.
    async fn write_delta(
        &self,
        delta: &AggregateDelta,
        score: &mut LiveScoreEntity,
        landed: &mut AggregateDelta,
    ) -> MongoResult<()> {
        let game_id = delta.game_id.as_str();

        if let Some(goal) = &delta.goal {
            let field = if score.team1_id == goal.team_id {
                Some("team1_score")
            } else if score.team2_id == goal.team_id {
                Some("team2_score")
            } else {
                None
            };

            match field {
                Some(field) => {
                    let updated = self
                        .scores()
                        .await
                        .find_one_and_update(
                            by_id(game_id),
                            doc! {"$inc": {field: i64::from(goal.amount)}},
                        )
                        .return_document(ReturnDocument::After)
                        .await
                        .map_err(|source| MongoDaoError::SaveScore {
                            game_id: game_id.to_owned(),
                            source,
                        })?;
                    landed.goal = Some(goal.clone());
                    if let Some(updated) = updated {
                        *score = updated.into();
                    }
                }
                None => warn!(
                    game_id,
                    team_id = %goal.team_id,
                    "goal delta for a team outside the live score; score untouched"
                ),
            }
        }

        let stats = self.stats().await;
        for player in delta.players.iter().filter(|player| !player.is_zero()) {
            stats
                .update_one(
                    by_id(&stats_id(game_id, &player.player_id)),
                    doc! {
                        "$inc": {
                            "goals": i64::from(player.goals),
                            "assists": i64::from(player.assists),
                            "saves": i64::from(player.saves),
                            "yellow_cards": i64::from(player.yellow_cards),
                            "red_cards": i64::from(player.red_cards),
                        },
                        "$setOnInsert": stats_insert_fields(
                            game_id,
                            &player.player_id,
                            &player.team_id,
                        ),
                    },
                )
                .upsert(true)
                .await
                .map_err(|source| MongoDaoError::SaveStats {
                    game_id: game_id.to_owned(),
                    source,
                })?;
            landed.players.push(player.clone());
        }

        Ok(())
    }

    /// Undo the parts of a failed delta that already landed.
    async fn roll_back(&self, landed: AggregateDelta) {
        if landed.is_empty() {
            return;
        }

        let inverse = landed.inverted();
        let Ok(Some(mut score)) = self.find_live_score(inverse.game_id.clone()).await else {
            error!(
                game_id = %inverse.game_id,
                "partial aggregate write left in place; repair required"
            );
            return;
        };

        let mut undone = AggregateDelta::empty(&inverse.game_id);
        match self.write_delta(&inverse, &mut score, &mut undone).await {
            Ok(()) => warn!(game_id = %inverse.game_id, "partial aggregate write rolled back"),
            Err(err) => error!(
                game_id = %inverse.game_id,
                error = %err,
                "partial aggregate write could not be rolled back; repair required"
            ),
        }
    }

    async fn list_player_stats(&self, game_id: String) -> MongoResult<Vec<LivePlayerStatsEntity>> {
        let load_error = |source| MongoDaoError::LoadStats {
            game_id: game_id.clone(),
            source,
        };

        let documents: Vec<MongoStatsDocument> = self
            .stats()
            .await
            .find(doc! {"game_id": game_id.as_str()})
            .await
            .map_err(load_error)?
            .try_collect()
            .await
            .map_err(load_error)?;

        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn replace_aggregates(
        &self,
        score: LiveScoreEntity,
        lines: Vec<LivePlayerStatsEntity>,
    ) -> MongoResult<()> {
        let game_id = score.game_id.clone();
        let save_error = |source| MongoDaoError::SaveStats {
            game_id: game_id.clone(),
            source,
        };

        self.scores()
            .await
            .update_one(
                by_id(&game_id),
                doc! {"$set": {
                    "team1_score": score.team1_score,
                    "team2_score": score.team2_score,
                }},
            )
            .await
            .map_err(|source| MongoDaoError::SaveScore {
                game_id: game_id.clone(),
                source,
            })?;

        let stats = self.stats().await;
        stats
            .update_many(
                doc! {"game_id": game_id.as_str()},
                doc! {"$set": {
                    "goals": 0_i64,
                    "assists": 0_i64,
                    "saves": 0_i64,
                    "yellow_cards": 0_i64,
                    "red_cards": 0_i64,
                }},
            )
            .await
            .map_err(save_error)?;

        for line in lines {
            stats
                .update_one(
                    by_id(&stats_id(&line.game_id, &line.player_id)),
                    doc! {
                        "$set": {
                            "goals": line.goals,
                            "assists": line.assists,
                            "saves": line.saves,
                            "yellow_cards": line.yellow_cards,
                            "red_cards": line.red_cards,
                        },
                        "$setOnInsert": stats_insert_fields(
                            &line.game_id,
                            &line.player_id,
                            &line.team_id,
                        ),
                    },
                )
                .upsert(true)
                .await
                .map_err(save_error)?;
        }

        Ok(())
    }

    async fn set_reversed(&self, event_id: Uuid, reversed: bool) -> MongoResult<bool> {
        let id = event_id.to_string();
        let result = self
            .removals()
            .await
            .update_one(
                doc! {"_id": id.as_str(), "reversed": !reversed},
                doc! {"$set": {"reversed": reversed}},
            )
            .await
            .map_err(|source| MongoDaoError::SaveEvent {
                id: id.clone(),
                source,
            })?;

        Ok(result.modified_count == 1)
    }

    async fn stamp_finished(&self, game_id: String, at: SystemTime) -> MongoResult<FinishStamp> {
        let stamped = self
            .scores()
            .await
            .find_one_and_update(
                doc! {"_id": game_id.as_str(), "finished_at": null},
                doc! {"$set": {"finished_at": DateTime::from_system_time(at)}},
            )
            .return_document(ReturnDocument::After)
            .await
            .map_err(|source| MongoDaoError::SaveScore {
                game_id: game_id.clone(),
                source,
            })?;

        if let Some(score) = stamped {
            return Ok(FinishStamp::Stamped(score.into()));
        }

        Ok(match self.find_live_score(game_id).await? {
            Some(score) => FinishStamp::AlreadyFinished(score),
            None => FinishStamp::Missing,
        })
    }
}

impl LiveStore for MongoLiveStore {
    fn insert_event(&self, event: GameEventEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_event(event).await.map_err(Into::into) })
    }

    fn find_event(&self, event_id: Uuid) -> BoxFuture<'static, StorageResult<Option<StoredEvent>>> {
        let store = self.clone();
        Box::pin(async move { store.find_event(event_id).await.map_err(Into::into) })
    }

    fn insert_tombstone(
        &self,
        tombstone: EventTombstoneEntity,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.insert_tombstone(tombstone).await.map_err(Into::into) })
    }

    fn set_reversed(
        &self,
        event_id: Uuid,
        reversed: bool,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.set_reversed(event_id, reversed).await.map_err(Into::into) })
    }

    fn list_events(
        &self,
        game_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<GameEventEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_events(game_id).await.map_err(Into::into) })
    }

    fn create_live_score(
        &self,
        score: LiveScoreEntity,
    ) -> BoxFuture<'static, StorageResult<LiveScoreEntity>> {
        let store = self.clone();
        Box::pin(async move { store.create_live_score(score).await.map_err(Into::into) })
    }

    fn find_live_score(
        &self,
        game_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<LiveScoreEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_live_score(game_id).await.map_err(Into::into) })
    }

    fn apply_delta(
        &self,
        delta: AggregateDelta,
    ) -> BoxFuture<'static, StorageResult<Option<LiveScoreEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.apply_delta(delta).await.map_err(Into::into) })
    }

    fn list_player_stats(
        &self,
        game_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<LivePlayerStatsEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_player_stats(game_id).await.map_err(Into::into) })
    }

    fn replace_aggregates(
        &self,
        score: LiveScoreEntity,
        stats: Vec<LivePlayerStatsEntity>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .replace_aggregates(score, stats)
                .await
                .map_err(Into::into)
        })
    }

    fn stamp_finished(
        &self,
        game_id: String,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<FinishStamp>> {
        let store = self.clone();
        Box::pin(async move { store.stamp_finished(game_id, at).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
