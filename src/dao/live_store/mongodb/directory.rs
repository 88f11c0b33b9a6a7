use futures::future::BoxFuture;
use mongodb::bson::doc;

use super::{
    error::{MongoDaoError, MongoResult},
    models::{MongoConfirmationDocument, MongoGameDocument, by_id},
    store::{CONFIRMATION_COLLECTION_NAME, GAME_COLLECTION_NAME, MongoLiveStore},
};
use crate::dao::{
    directory::{ConfirmationProvider, GameStatusStore},
    models::{GameStatus, stats_key},
    storage::StorageResult,
};

const CONFIRMED: &str = "CONFIRMED";

impl MongoLiveStore {
    async fn load_game(&self, game_id: &str) -> MongoResult<Option<MongoGameDocument>> {
        self.database()
            .await
            .collection::<MongoGameDocument>(GAME_COLLECTION_NAME)
            .find_one(by_id(game_id))
            .await
            .map_err(|source| MongoDaoError::LoadGame {
                game_id: game_id.to_owned(),
                source,
            })
    }

    async fn confirmed_or_owner(&self, game_id: &str, actor_id: &str) -> MongoResult<bool> {
        let owned = self
            .load_game(game_id)
            .await?
            .and_then(|game| game.owner_id)
            .is_some_and(|owner| owner == actor_id);
        if owned {
            return Ok(true);
        }

        // Confirmations share the `{game}_{user}` key layout of stat lines.
        let id = stats_key(game_id, actor_id);
        let confirmation = self
            .database()
            .await
            .collection::<MongoConfirmationDocument>(CONFIRMATION_COLLECTION_NAME)
            .find_one(by_id(&id))
            .await
            .map_err(|source| MongoDaoError::LoadConfirmation {
                id: id.clone(),
                source,
            })?;

        Ok(confirmation
            .and_then(|confirmation| confirmation.status)
            .is_some_and(|status| status == CONFIRMED))
    }

    async fn mark_game_finished(&self, game_id: &str) -> MongoResult<()> {
        self.database()
            .await
            .collection::<MongoGameDocument>(GAME_COLLECTION_NAME)
            .update_one(by_id(game_id), doc! {"$set": {"status": "FINISHED"}})
            .await
            .map_err(|source| MongoDaoError::SaveGame {
                game_id: game_id.to_owned(),
                source,
            })?;
        Ok(())
    }
}

impl ConfirmationProvider for MongoLiveStore {
    fn is_confirmed_or_owner(
        &self,
        game_id: String,
        actor_id: String,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .confirmed_or_owner(&game_id, &actor_id)
                .await
                .map_err(Into::into)
        })
    }
}

impl GameStatusStore for MongoLiveStore {
    fn game_status(
        &self,
        game_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<GameStatus>>> {
        let store = self.clone();
        Box::pin(async move {
            let game = store.load_game(&game_id).await?;
            Ok(game.map(|game| game.status))
        })
    }

    fn mark_finished(&self, game_id: String) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.mark_game_finished(&game_id).await.map_err(Into::into) })
    }
}
