use std::time::SystemTime;

use uuid::Uuid;

use crate::dao::models::{GameEventEntity, GameEventType};

/// Player named by an event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlayerRef {
    pub id: String,
    pub name: String,
}

impl PlayerRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// What happened, with the payload only the matching kind carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Goal {
        /// Player credited with the assist, if any.
        assist: Option<PlayerRef>,
    },
    /// Standalone assist entry. Kept in the ledger, never counted.
    Assist,
    Save,
    YellowCard,
    RedCard,
    /// Kind written by a newer client.
    Unknown,
}

impl EventKind {
    pub fn event_type(&self) -> GameEventType {
        match self {
            EventKind::Goal { .. } => GameEventType::Goal,
            EventKind::Assist => GameEventType::Assist,
            EventKind::Save => GameEventType::Save,
            EventKind::YellowCard => GameEventType::YellowCard,
            EventKind::RedCard => GameEventType::RedCard,
            EventKind::Unknown => GameEventType::Unknown,
        }
    }

    /// Human readable label used in confirmation messages.
    pub fn label(&self) -> &'static str {
        match self {
            EventKind::Goal { .. } => "Goal",
            EventKind::Assist => "Assist",
            EventKind::Save => "Save",
            EventKind::YellowCard => "Yellow card",
            EventKind::RedCard => "Red card",
            EventKind::Unknown => "Event",
        }
    }
}

/// Match event as seen by the scoring logic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameEvent {
    pub id: Uuid,
    pub game_id: String,
    pub kind: EventKind,
    pub player: PlayerRef,
    pub team_id: String,
    pub minute: u32,
    pub created_at: SystemTime,
}

impl GameEvent {
    /// Assisting player of a goal.
    pub fn assist(&self) -> Option<&PlayerRef> {
        match &self.kind {
            EventKind::Goal { assist } => assist.as_ref(),
            _ => None,
        }
    }
}

impl From<GameEventEntity> for GameEvent {
    fn from(value: GameEventEntity) -> Self {
        let kind = match value.event_type {
            GameEventType::Goal => EventKind::Goal {
                assist: value
                    .assisted_by_id
                    .filter(|id| !id.trim().is_empty())
                    .map(|id| PlayerRef {
                        id,
                        name: value.assisted_by_name.unwrap_or_default(),
                    }),
            },
            GameEventType::Assist => EventKind::Assist,
            GameEventType::Save => EventKind::Save,
            GameEventType::YellowCard => EventKind::YellowCard,
            GameEventType::RedCard => EventKind::RedCard,
            GameEventType::Unknown => EventKind::Unknown,
        };

        Self {
            id: value.id,
            game_id: value.game_id,
            kind,
            player: PlayerRef {
                id: value.player_id,
                name: value.player_name,
            },
            team_id: value.team_id,
            minute: u32::try_from(value.minute).unwrap_or_default(),
            created_at: value.created_at,
        }
    }
}

impl From<GameEvent> for GameEventEntity {
    fn from(value: GameEvent) -> Self {
        let event_type = value.kind.event_type();
        let (assisted_by_id, assisted_by_name) = match value.kind {
            EventKind::Goal {
                assist: Some(assist),
            } => (Some(assist.id), Some(assist.name)),
            _ => (None, None),
        };

        Self {
            id: value.id,
            game_id: value.game_id,
            event_type,
            player_id: value.player.id,
            player_name: value.player.name,
            team_id: value.team_id,
            assisted_by_id,
            assisted_by_name,
            minute: i32::try_from(value.minute).unwrap_or(i32::MAX),
            created_at: value.created_at,
        }
    }
}
