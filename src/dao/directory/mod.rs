pub mod memory;

use crate::dao::{models::GameStatus, storage::StorageResult};
use futures::future::BoxFuture;

/// Answers whether an actor may record events for a game.
///
/// Owned by the game organisation side; the live subsystem only reads it.
pub trait ConfirmationProvider: Send + Sync {
    /// `true` when `actor_id` owns the game or holds a confirmed place in it.
    fn is_confirmed_or_owner(
        &self,
        game_id: String,
        actor_id: String,
    ) -> BoxFuture<'static, StorageResult<bool>>;
}

/// Read and finish access to the game-level status.
pub trait GameStatusStore: Send + Sync {
    /// Current status, or `None` for an unknown game.
    fn game_status(&self, game_id: String) -> BoxFuture<'static, StorageResult<Option<GameStatus>>>;
    /// Move the game to `FINISHED`. Repeating the call is harmless.
    fn mark_finished(&self, game_id: String) -> BoxFuture<'static, StorageResult<()>>;
}
