use std::{sync::Arc, time::SystemTime};

use tracing::debug;
use uuid::Uuid;

use crate::{
    dao::{
        live_store::LiveStore,
        models::{EventTombstoneEntity, GameEventEntity, GameEventType},
    },
    error::ServiceError,
    state::live::{EventKind, GameEvent, PlayerRef},
};

/// Raw description of an event before it enters the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDraft {
    pub game_id: String,
    pub event_type: GameEventType,
    pub player_id: String,
    pub player_name: String,
    pub team_id: String,
    pub assisted_by_id: Option<String>,
    pub assisted_by_name: Option<String>,
    pub minute: i32,
}

impl EventDraft {
    /// Validate the draft and turn it into a ledger event.
    pub fn into_event(self, id: Uuid, created_at: SystemTime) -> Result<GameEvent, ServiceError> {
        require_present("game_id", &self.game_id)?;
        require_present("player_id", &self.player_id)?;
        require_present("team_id", &self.team_id)?;
        let minute = u32::try_from(self.minute).map_err(|_| {
            ServiceError::Validation(format!("minute must not be negative (got {})", self.minute))
        })?;

        let assist = self
            .assisted_by_id
            .filter(|id| !id.trim().is_empty())
            .map(|id| PlayerRef {
                id,
                name: self.assisted_by_name.unwrap_or_default(),
            });

        let kind = match self.event_type {
            GameEventType::Goal => EventKind::Goal { assist },
            other if assist.is_some() => {
                return Err(ServiceError::Validation(format!(
                    "only goals can carry an assist (got {other:?})"
                )));
            }
            GameEventType::Assist => EventKind::Assist,
            GameEventType::Save => EventKind::Save,
            GameEventType::YellowCard => EventKind::YellowCard,
            GameEventType::RedCard => EventKind::RedCard,
            GameEventType::Unknown => EventKind::Unknown,
        };

        Ok(GameEvent {
            id,
            game_id: self.game_id,
            kind,
            player: PlayerRef {
                id: self.player_id,
                name: self.player_name,
            },
            team_id: self.team_id,
            minute,
            created_at,
        })
    }
}

/// Outcome of a removal request for an existing event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Removal {
    /// This call created the tombstone and holds the reversal of the event's delta.
    Removed(GameEvent),
    /// A tombstone already existed and its reversal is applied or held elsewhere.
    AlreadyRemoved(GameEvent),
    /// A tombstone exists but nobody holds its reversal; see [`EventLedger::claim_reversal`].
    ReversalPending(GameEvent),
}

/// Append and soft-delete access to the events of every game.
///
/// The ledger does not know about lifecycles or permissions; callers gate it.
#[derive(Clone)]
pub struct EventLedger {
    store: Arc<dyn LiveStore>,
}

impl EventLedger {
    pub fn new(store: Arc<dyn LiveStore>) -> Self {
        Self { store }
    }

    /// Store a new event and return its id.
    pub async fn append(&self, event: GameEvent) -> Result<Uuid, ServiceError> {
        require_present("game_id", &event.game_id)?;
        require_present("player_id", &event.player.id)?;
        require_present("team_id", &event.team_id)?;

        let id = event.id;
        self.store
            .insert_event(GameEventEntity::from(event))
            .await?;
        debug!(event_id = %id, "event appended to ledger");
        Ok(id)
    }

    /// Mark an event as removed.
    ///
    /// Fails with `NotFound` when the event never existed in `game_id`. A repeated
    /// removal reports [`Removal::AlreadyRemoved`], or [`Removal::ReversalPending`] when
    /// the earlier removal released its reversal without applying it.
    pub async fn remove(
        &self,
        game_id: &str,
        event_id: Uuid,
        removed_at: SystemTime,
    ) -> Result<Removal, ServiceError> {
        let stored = self
            .store
            .find_event(event_id)
            .await?
            .filter(|stored| stored.event.game_id == game_id)
            .ok_or_else(|| not_found(game_id, event_id))?;

        let event = GameEvent::from(stored.event);
        match stored.tombstone {
            Some(tombstone) if tombstone.reversed => return Ok(Removal::AlreadyRemoved(event)),
            Some(_) => return Ok(Removal::ReversalPending(event)),
            None => {}
        }

        let created = self
            .store
            .insert_tombstone(EventTombstoneEntity {
                event_id,
                game_id: game_id.to_owned(),
                removed_at,
                reversed: false,
            })
            .await?;

        // The creator claims the reversal in a second step so a tombstone whose
        // creator vanished stays claimable by a retry.
        if created && self.claim_reversal(event_id).await? {
            debug!(event_id = %event_id, "event removed from ledger");
            Ok(Removal::Removed(event))
        } else {
            Ok(Removal::AlreadyRemoved(event))
        }
    }

    /// Hide an event whose delta never reached the aggregates.
    ///
    /// Works whether or not the event document landed; nothing is left to reverse.
    pub async fn withdraw(
        &self,
        game_id: &str,
        event_id: Uuid,
        removed_at: SystemTime,
    ) -> Result<(), ServiceError> {
        self.store
            .insert_tombstone(EventTombstoneEntity {
                event_id,
                game_id: game_id.to_owned(),
                removed_at,
                reversed: true,
            })
            .await?;
        debug!(event_id = %event_id, "event withdrawn from ledger");
        Ok(())
    }

    /// Take over the pending reversal of a removed event; `true` for exactly one caller.
    pub async fn claim_reversal(&self, event_id: Uuid) -> Result<bool, ServiceError> {
        Ok(self.store.set_reversed(event_id, true).await?)
    }

    /// Give back a reversal that could not be applied so a retry can claim it.
    pub async fn release_reversal(&self, event_id: Uuid) -> Result<(), ServiceError> {
        self.store.set_reversed(event_id, false).await?;
        Ok(())
    }

    /// Non-removed events of `game_id`, newest first.
    pub async fn list(&self, game_id: &str) -> Result<Vec<GameEvent>, ServiceError> {
        let mut events: Vec<GameEvent> = self
            .store
            .list_events(game_id.to_owned())
            .await?
            .into_iter()
            .map(GameEvent::from)
            .collect();

        events.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(events)
    }
}

fn require_present(field: &str, value: &str) -> Result<(), ServiceError> {
    if value.trim().is_empty() {
        return Err(ServiceError::Validation(format!("{field} must not be blank")));
    }
    Ok(())
}

fn not_found(game_id: &str, event_id: Uuid) -> ServiceError {
    ServiceError::NotFound(format!("event {event_id} in game {game_id}"))
}
