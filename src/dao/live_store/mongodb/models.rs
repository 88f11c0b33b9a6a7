use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::MongoDaoError;
use crate::dao::models::{
    EventTombstoneEntity, GameEventEntity, GameEventType, GameStatus, LivePlayerStatsEntity,
    LiveScoreEntity, stats_key,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoEventDocument {
    #[serde(rename = "_id")]
    id: String,
    game_id: String,
    event_type: GameEventType,
    player_id: String,
    player_name: String,
    team_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    assisted_by_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    assisted_by_name: Option<String>,
    minute: i32,
    created_at: DateTime,
}

impl From<GameEventEntity> for MongoEventDocument {
    fn from(value: GameEventEntity) -> Self {
        Self {
            id: value.id.to_string(),
            game_id: value.game_id,
            event_type: value.event_type,
            player_id: value.player_id,
            player_name: value.player_name,
            team_id: value.team_id,
            assisted_by_id: value.assisted_by_id,
            assisted_by_name: value.assisted_by_name,
            minute: value.minute,
            created_at: DateTime::from_system_time(value.created_at),
        }
    }
}

impl TryFrom<MongoEventDocument> for GameEventEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoEventDocument) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&value.id).map_err(|err| MongoDaoError::Decode {
            id: value.id.clone(),
            reason: format!("event id is not a UUID: {err}"),
        })?;

        Ok(Self {
            id,
            game_id: value.game_id,
            event_type: value.event_type,
            player_id: value.player_id,
            player_name: value.player_name,
            team_id: value.team_id,
            assisted_by_id: value.assisted_by_id,
            assisted_by_name: value.assisted_by_name,
            minute: value.minute,
            created_at: value.created_at.to_system_time(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoTombstoneDocument {
    /// Event id, so a second removal collides on the primary key.
    #[serde(rename = "_id")]
    pub event_id: String,
    pub game_id: String,
    pub removed_at: DateTime,
    /// Tombstones written before the flag existed were reversed in the same request.
    #[serde(default = "legacy_reversed")]
    pub reversed: bool,
}

impl From<EventTombstoneEntity> for MongoTombstoneDocument {
    fn from(value: EventTombstoneEntity) -> Self {
        Self {
            event_id: value.event_id.to_string(),
            game_id: value.game_id,
            removed_at: DateTime::from_system_time(value.removed_at),
            reversed: value.reversed,
        }
    }
}

impl TryFrom<MongoTombstoneDocument> for EventTombstoneEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoTombstoneDocument) -> Result<Self, Self::Error> {
        let event_id = Uuid::parse_str(&value.event_id).map_err(|err| MongoDaoError::Decode {
            id: value.event_id.clone(),
            reason: format!("tombstone id is not a UUID: {err}"),
        })?;

        Ok(Self {
            event_id,
            game_id: value.game_id,
            removed_at: value.removed_at.to_system_time(),
            reversed: value.reversed,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoScoreDocument {
    #[serde(rename = "_id")]
    game_id: String,
    team1_id: String,
    team2_id: String,
    team1_score: i64,
    team2_score: i64,
    started_at: DateTime,
    #[serde(default)]
    finished_at: Option<DateTime>,
}

impl From<LiveScoreEntity> for MongoScoreDocument {
    fn from(value: LiveScoreEntity) -> Self {
        Self {
            game_id: value.game_id,
            team1_id: value.team1_id,
            team2_id: value.team2_id,
            team1_score: value.team1_score,
            team2_score: value.team2_score,
            started_at: DateTime::from_system_time(value.started_at),
            finished_at: value.finished_at.map(DateTime::from_system_time),
        }
    }
}

impl From<MongoScoreDocument> for LiveScoreEntity {
    fn from(value: MongoScoreDocument) -> Self {
        Self {
            game_id: value.game_id,
            team1_id: value.team1_id,
            team2_id: value.team2_id,
            team1_score: value.team1_score,
            team2_score: value.team2_score,
            started_at: value.started_at.to_system_time(),
            finished_at: value.finished_at.map(|at| at.to_system_time()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoStatsDocument {
    #[serde(rename = "_id")]
    id: String,
    game_id: String,
    player_id: String,
    team_id: String,
    #[serde(default)]
    goals: i64,
    #[serde(default)]
    assists: i64,
    #[serde(default)]
    saves: i64,
    #[serde(default)]
    yellow_cards: i64,
    #[serde(default)]
    red_cards: i64,
    #[serde(default = "default_playing")]
    is_playing: bool,
}

impl From<MongoStatsDocument> for LivePlayerStatsEntity {
    fn from(value: MongoStatsDocument) -> Self {
        Self {
            game_id: value.game_id,
            player_id: value.player_id,
            team_id: value.team_id,
            goals: value.goals,
            assists: value.assists,
            saves: value.saves,
            yellow_cards: value.yellow_cards,
            red_cards: value.red_cards,
            is_playing: value.is_playing,
        }
    }
}

/// Projection of the organizer's game document; only the fields read here.
#[derive(Debug, Clone, Deserialize)]
pub struct MongoGameDocument {
    #[serde(default)]
    pub owner_id: Option<String>,
    pub status: GameStatus,
}

/// Projection of a confirmation document keyed `{game_id}_{user_id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct MongoConfirmationDocument {
    #[serde(default)]
    pub status: Option<String>,
}

pub fn by_id(id: &str) -> Document {
    doc! {"_id": id}
}

/// Fields written only when an upsert creates a stat line.
pub fn stats_insert_fields(game_id: &str, player_id: &str, team_id: &str) -> Document {
    doc! {
        "game_id": game_id,
        "player_id": player_id,
        "team_id": team_id,
        "is_playing": true,
    }
}

pub fn stats_id(game_id: &str, player_id: &str) -> String {
    stats_key(game_id, player_id)
}

fn default_playing() -> bool {
    true
}

fn legacy_reversed() -> bool {
    true
}
