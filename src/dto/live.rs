use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{GameEventType, LivePlayerStatsEntity, LiveScoreEntity, displayed},
    dto::{
        format_system_time,
        validation::{validate_not_blank, validate_optional_id},
    },
    services::{
        aggregator::Aggregates,
        ledger::EventDraft,
        live_session::{FinishOutcome, LiveSnapshot},
    },
    state::live::GameEvent,
};

/// Payload used to open the live score of a game.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct StartLiveGameRequest {
    #[validate(length(max = 128), custom(function = "validate_not_blank"))]
    pub team1_id: String,
    #[validate(length(max = 128), custom(function = "validate_not_blank"))]
    pub team2_id: String,
}

/// Payload describing an event reported during a live game.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct AddEventRequest {
    pub event_type: GameEventType,
    #[validate(length(max = 128), custom(function = "validate_not_blank"))]
    pub player_id: String,
    #[validate(length(max = 80))]
    pub player_name: String,
    #[validate(length(max = 128), custom(function = "validate_not_blank"))]
    pub team_id: String,
    /// Only accepted on goals. A blank id counts as no assist.
    #[serde(default)]
    #[validate(custom(function = "validate_optional_id"))]
    pub assisted_by_id: Option<String>,
    #[serde(default)]
    #[validate(length(max = 80))]
    pub assisted_by_name: Option<String>,
    #[validate(range(min = 0, max = 300))]
    pub minute: i32,
}

impl AddEventRequest {
    pub fn into_draft(self, game_id: &str) -> EventDraft {
        EventDraft {
            game_id: game_id.to_owned(),
            event_type: self.event_type,
            player_id: self.player_id,
            player_name: self.player_name,
            team_id: self.team_id,
            assisted_by_id: self.assisted_by_id,
            assisted_by_name: self.assisted_by_name,
            minute: self.minute,
        }
    }
}

/// Ledger entry as exposed to clients.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
pub struct GameEventDto {
    pub id: Uuid,
    pub game_id: String,
    pub event_type: GameEventType,
    pub player_id: String,
    pub player_name: String,
    pub team_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assisted_by_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assisted_by_name: Option<String>,
    pub minute: u32,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
}

impl From<&GameEvent> for GameEventDto {
    fn from(event: &GameEvent) -> Self {
        let assist = event.assist();
        Self {
            id: event.id,
            game_id: event.game_id.clone(),
            event_type: event.kind.event_type(),
            player_id: event.player.id.clone(),
            player_name: event.player.name.clone(),
            team_id: event.team_id.clone(),
            assisted_by_id: assist.map(|player| player.id.clone()),
            assisted_by_name: assist.map(|player| player.name.clone()),
            minute: event.minute,
            created_at: format_system_time(event.created_at),
        }
    }
}

/// Running score of a live game.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
pub struct LiveScoreDto {
    pub game_id: String,
    pub team1_id: String,
    pub team2_id: String,
    pub team1_score: u32,
    pub team2_score: u32,
    pub started_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
}

impl From<&LiveScoreEntity> for LiveScoreDto {
    fn from(score: &LiveScoreEntity) -> Self {
        Self {
            game_id: score.game_id.clone(),
            team1_id: score.team1_id.clone(),
            team2_id: score.team2_id.clone(),
            team1_score: displayed(score.team1_score),
            team2_score: displayed(score.team2_score),
            started_at: format_system_time(score.started_at),
            finished_at: score.finished_at.map(format_system_time),
        }
    }
}

/// Counters of a single player in a live game.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
pub struct PlayerStatsDto {
    pub player_id: String,
    pub team_id: String,
    pub goals: u32,
    pub assists: u32,
    pub saves: u32,
    pub yellow_cards: u32,
    pub red_cards: u32,
    pub is_playing: bool,
}

impl From<&LivePlayerStatsEntity> for PlayerStatsDto {
    fn from(stats: &LivePlayerStatsEntity) -> Self {
        Self {
            player_id: stats.player_id.clone(),
            team_id: stats.team_id.clone(),
            goals: displayed(stats.goals),
            assists: displayed(stats.assists),
            saves: displayed(stats.saves),
            yellow_cards: displayed(stats.yellow_cards),
            red_cards: displayed(stats.red_cards),
            is_playing: stats.is_playing,
        }
    }
}

/// Everything a viewer needs to render a live game at once.
#[derive(Debug, Serialize, ToSchema)]
pub struct LiveSnapshotDto {
    pub score: Option<LiveScoreDto>,
    /// Non-removed events, newest first.
    pub events: Vec<GameEventDto>,
    pub stats: Vec<PlayerStatsDto>,
}

impl From<&LiveSnapshot> for LiveSnapshotDto {
    fn from(snapshot: &LiveSnapshot) -> Self {
        Self {
            score: snapshot.score.as_ref().map(LiveScoreDto::from),
            events: snapshot.events.iter().map(GameEventDto::from).collect(),
            stats: snapshot.stats.iter().map(PlayerStatsDto::from).collect(),
        }
    }
}

/// Response returned after an event was recorded.
#[derive(Debug, Serialize, ToSchema)]
pub struct EventRecordedResponse {
    pub event: GameEventDto,
    /// One-line confirmation such as "Goal recorded for Alice".
    pub message: String,
}

/// Response returned by the finish endpoint.
#[derive(Debug, Serialize, ToSchema)]
pub struct FinishResponse {
    pub finished_at: String,
    /// Whether this call handed the final stats to badge evaluation.
    pub badges_triggered: bool,
    pub message: String,
}

impl From<&FinishOutcome> for FinishResponse {
    fn from(outcome: &FinishOutcome) -> Self {
        let message = if outcome.badges_triggered {
            "Game finished; badge evaluation triggered"
        } else {
            "Game already finished"
        };
        Self {
            finished_at: outcome
                .score
                .finished_at
                .map(format_system_time)
                .unwrap_or_default(),
            badges_triggered: outcome.badges_triggered,
            message: message.into(),
        }
    }
}

/// Aggregates rewritten by a repair.
#[derive(Debug, Serialize, ToSchema)]
pub struct RepairResponse {
    pub score: LiveScoreDto,
    pub stats: Vec<PlayerStatsDto>,
}

impl From<&Aggregates> for RepairResponse {
    fn from(aggregates: &Aggregates) -> Self {
        Self {
            score: LiveScoreDto::from(&aggregates.score),
            stats: aggregates.players.values().map(PlayerStatsDto::from).collect(),
        }
    }
}

/// Generic acknowledgement for actions without a payload.
#[derive(Debug, Serialize, ToSchema)]
pub struct ActionResponse {
    pub message: String,
}

impl ActionResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(minute: i32, player_id: &str) -> AddEventRequest {
        AddEventRequest {
            event_type: GameEventType::Goal,
            player_id: player_id.into(),
            player_name: "Alice".into(),
            team_id: "A".into(),
            assisted_by_id: None,
            assisted_by_name: None,
            minute,
        }
    }

    #[test]
    fn valid_request_passes() {
        assert!(request(10, "p1").validate().is_ok());
    }

    #[test]
    fn negative_minute_is_rejected() {
        let errors = request(-1, "p1").validate().unwrap_err();
        assert!(errors.field_errors().contains_key("minute"));
    }

    #[test]
    fn blank_player_is_rejected() {
        let errors = request(3, "   ").validate().unwrap_err();
        assert!(errors.field_errors().contains_key("player_id"));
    }

    #[test]
    fn transient_negative_counters_read_as_zero() {
        let mut score = LiveScoreEntity::new("g1", "A", "B", std::time::SystemTime::UNIX_EPOCH);
        score.team1_score = -1;
        score.team2_score = 2;
        let dto = LiveScoreDto::from(&score);
        assert_eq!((dto.team1_score, dto.team2_score), (0, 2));

        let mut line = LivePlayerStatsEntity::new("g1", "p1", "A");
        line.goals = -1;
        assert_eq!(PlayerStatsDto::from(&line).goals, 0);
    }

    #[test]
    fn event_type_is_read_in_upper_case() {
        let parsed: AddEventRequest = serde_json::from_str(
            r#"{
                "event_type": "YELLOW_CARD",
                "player_id": "p4",
                "player_name": "Dan",
                "team_id": "A",
                "minute": 5
            }"#,
        )
        .unwrap();
        assert_eq!(parsed.event_type, GameEventType::YellowCard);
        assert_eq!(parsed.assisted_by_id, None);
    }
}
