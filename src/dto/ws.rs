use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    dto::live::{GameEventDto, LiveScoreDto, PlayerStatsDto},
    services::subscriptions::{FeedUpdate, FeedValue},
};

#[derive(Debug, Deserialize, Serialize, ToSchema)]
/// Messages accepted from live viewer WebSocket clients.
#[serde(tag = "type")]
pub enum ViewerInboundMessage {
    /// Point the connection's viewing context at a game, replacing any previous target.
    #[serde(rename = "watch")]
    Watch { game_id: String },
    /// Release the viewing context.
    #[serde(rename = "unwatch")]
    Unwatch,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Serialize, ToSchema)]
/// Feed updates pushed to live viewer WebSocket clients.
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViewerOutboundMessage {
    /// Current score, or `null` while the game has not started.
    Score {
        game_id: String,
        score: Option<LiveScoreDto>,
    },
    /// Non-removed events, newest first.
    Events {
        game_id: String,
        events: Vec<GameEventDto>,
    },
    /// Stat lines of every player seen so far.
    Stats {
        game_id: String,
        stats: Vec<PlayerStatsDto>,
    },
    /// Rejected inbound message.
    Error { message: String },
}

impl ViewerInboundMessage {
    pub fn from_json_str(payload: &str) -> serde_json::Result<Self> {
        serde_json::from_str(payload)
    }
}

impl From<FeedUpdate> for ViewerOutboundMessage {
    fn from(update: FeedUpdate) -> Self {
        let game_id = update.game_id;
        match update.value {
            FeedValue::Score(score) => ViewerOutboundMessage::Score {
                game_id,
                score: score.as_ref().map(LiveScoreDto::from),
            },
            FeedValue::Events(events) => ViewerOutboundMessage::Events {
                game_id,
                events: events.iter().map(GameEventDto::from).collect(),
            },
            FeedValue::Stats(stats) => ViewerOutboundMessage::Stats {
                game_id,
                stats: stats.iter().map(PlayerStatsDto::from).collect(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_watch_and_tolerates_unknown_types() {
        let watch =
            ViewerInboundMessage::from_json_str(r#"{"type":"watch","game_id":"g1"}"#).unwrap();
        assert!(matches!(watch, ViewerInboundMessage::Watch { game_id } if game_id == "g1"));

        let other = ViewerInboundMessage::from_json_str(r#"{"type":"dance"}"#).unwrap();
        assert!(matches!(other, ViewerInboundMessage::Unknown));

        assert!(ViewerInboundMessage::from_json_str("not json").is_err());
    }

    #[test]
    fn empty_score_feed_serializes_as_null() {
        let message = ViewerOutboundMessage::from(FeedUpdate {
            game_id: "g1".into(),
            value: FeedValue::Score(None),
        });
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], "score");
        assert_eq!(json["game_id"], "g1");
        assert!(json["score"].is_null());
    }
}
