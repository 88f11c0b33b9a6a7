use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use utoipa::ToSchema;
use uuid::Uuid;

/// Kind of occurrence recorded in the event ledger, stored as its upper-case name.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameEventType {
    Goal,
    Assist,
    Save,
    YellowCard,
    RedCard,
    /// Type written by a newer client; kept in the ledger but ignored by aggregates.
    #[serde(other)]
    Unknown,
}

/// Flat ledger document for a single match event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameEventEntity {
    /// Stable identifier of the event.
    pub id: Uuid,
    /// Game the event belongs to.
    pub game_id: String,
    pub event_type: GameEventType,
    /// Player credited with the event.
    pub player_id: String,
    pub player_name: String,
    /// Team of the credited player.
    pub team_id: String,
    /// Assisting player, only meaningful for goals.
    pub assisted_by_id: Option<String>,
    pub assisted_by_name: Option<String>,
    /// Match minute reported by the client.
    pub minute: i32,
    /// Ledger ordering key.
    pub created_at: SystemTime,
}

/// Event document paired with its tombstone, if one exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEvent {
    pub event: GameEventEntity,
    pub tombstone: Option<EventTombstoneEntity>,
}

impl StoredEvent {
    pub fn is_removed(&self) -> bool {
        self.tombstone.is_some()
    }
}

/// Tombstone marking an event as logically removed from the ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventTombstoneEntity {
    pub event_id: Uuid,
    pub game_id: String,
    pub removed_at: SystemTime,
    /// Set while a caller holds or has applied the reversal of the event's delta.
    pub reversed: bool,
}

/// Running score of a live game. One document per game.
///
/// Counters are signed: deltas of a concurrent add and delete may land in either order,
/// so a counter can dip below zero until its matching increment arrives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LiveScoreEntity {
    pub game_id: String,
    pub team1_id: String,
    pub team2_id: String,
    pub team1_score: i64,
    pub team2_score: i64,
    /// Written once when the document is created.
    pub started_at: SystemTime,
    /// Written once by the finish stamp.
    pub finished_at: Option<SystemTime>,
}

impl LiveScoreEntity {
    /// Fresh 0-0 score for a game entering the live phase.
    pub fn new(
        game_id: impl Into<String>,
        team1_id: impl Into<String>,
        team2_id: impl Into<String>,
        started_at: SystemTime,
    ) -> Self {
        Self {
            game_id: game_id.into(),
            team1_id: team1_id.into(),
            team2_id: team2_id.into(),
            team1_score: 0,
            team2_score: 0,
            started_at,
            finished_at: None,
        }
    }

    /// Whether `team_id` is one of the two teams of this score.
    pub fn plays(&self, team_id: &str) -> bool {
        self.team1_id == team_id || self.team2_id == team_id
    }

    /// Shift the score of `team_id` by `amount`, returning `false` for a foreign team.
    pub fn apply_goal(&mut self, team_id: &str, amount: i32) -> bool {
        if self.team1_id == team_id {
            self.team1_score = offset(self.team1_score, amount);
            true
        } else if self.team2_id == team_id {
            self.team2_score = offset(self.team2_score, amount);
            true
        } else {
            false
        }
    }

    /// Same score with both counters reset, used as the seed of a ledger rebuild.
    pub fn zeroed(&self) -> Self {
        Self {
            team1_score: 0,
            team2_score: 0,
            ..self.clone()
        }
    }
}

/// Per-player counters for a live game, keyed by `(game_id, player_id)`.
///
/// Signed for the same reason as [`LiveScoreEntity`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LivePlayerStatsEntity {
    pub game_id: String,
    pub player_id: String,
    pub team_id: String,
    pub goals: i64,
    pub assists: i64,
    pub saves: i64,
    pub yellow_cards: i64,
    pub red_cards: i64,
    /// Substitution flag owned by the roster, never changed by scoring.
    pub is_playing: bool,
}

impl LivePlayerStatsEntity {
    /// Empty stat line for a player seen for the first time.
    pub fn new(
        game_id: impl Into<String>,
        player_id: impl Into<String>,
        team_id: impl Into<String>,
    ) -> Self {
        Self {
            game_id: game_id.into(),
            player_id: player_id.into(),
            team_id: team_id.into(),
            goals: 0,
            assists: 0,
            saves: 0,
            yellow_cards: 0,
            red_cards: 0,
            is_playing: true,
        }
    }

    /// Add the signed counters of `delta` to this stat line.
    pub fn apply_delta(&mut self, delta: &PlayerStatDelta) {
        self.goals = offset(self.goals, delta.goals);
        self.assists = offset(self.assists, delta.assists);
        self.saves = offset(self.saves, delta.saves);
        self.yellow_cards = offset(self.yellow_cards, delta.yellow_cards);
        self.red_cards = offset(self.red_cards, delta.red_cards);
    }

    /// Copy the counters of `other`, keeping identity and the substitution flag.
    pub fn with_counters_of(&self, other: &LivePlayerStatsEntity) -> Self {
        Self {
            goals: other.goals,
            assists: other.assists,
            saves: other.saves,
            yellow_cards: other.yellow_cards,
            red_cards: other.red_cards,
            ..self.clone()
        }
    }

    /// Same stat line with every counter reset.
    pub fn zeroed(&self) -> Self {
        Self {
            goals: 0,
            assists: 0,
            saves: 0,
            yellow_cards: 0,
            red_cards: 0,
            ..self.clone()
        }
    }
}

/// Document key of a player stat line.
pub fn stats_key(game_id: &str, player_id: &str) -> String {
    format!("{game_id}_{player_id}")
}

/// Signed change to the score of one team.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoalDelta {
    pub team_id: String,
    pub amount: i32,
}

/// Signed change to the counters of one player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerStatDelta {
    pub player_id: String,
    /// Team used when the stat line has to be created.
    pub team_id: String,
    pub goals: i32,
    pub assists: i32,
    pub saves: i32,
    pub yellow_cards: i32,
    pub red_cards: i32,
}

impl PlayerStatDelta {
    /// Delta that leaves every counter untouched.
    pub fn zero(player_id: impl Into<String>, team_id: impl Into<String>) -> Self {
        Self {
            player_id: player_id.into(),
            team_id: team_id.into(),
            goals: 0,
            assists: 0,
            saves: 0,
            yellow_cards: 0,
            red_cards: 0,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.goals == 0
            && self.assists == 0
            && self.saves == 0
            && self.yellow_cards == 0
            && self.red_cards == 0
    }
}

/// Commutative increment applied to the live aggregates of a game in one write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateDelta {
    pub game_id: String,
    pub goal: Option<GoalDelta>,
    pub players: Vec<PlayerStatDelta>,
}

impl AggregateDelta {
    /// Delta that changes nothing in `game_id`.
    pub fn empty(game_id: &str) -> Self {
        Self {
            game_id: game_id.to_owned(),
            goal: None,
            players: Vec::new(),
        }
    }

    /// Delta that undoes this one.
    pub fn inverted(&self) -> Self {
        Self {
            game_id: self.game_id.clone(),
            goal: self.goal.as_ref().map(|goal| GoalDelta {
                team_id: goal.team_id.clone(),
                amount: -goal.amount,
            }),
            players: self
                .players
                .iter()
                .map(|player| PlayerStatDelta {
                    goals: -player.goals,
                    assists: -player.assists,
                    saves: -player.saves,
                    yellow_cards: -player.yellow_cards,
                    red_cards: -player.red_cards,
                    ..player.clone()
                })
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.goal.is_none() && self.players.iter().all(PlayerStatDelta::is_zero)
    }
}

/// Outcome of the conditional `finished_at` stamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishStamp {
    /// This call wrote `finished_at`.
    Stamped(LiveScoreEntity),
    /// `finished_at` was already present; nothing was written.
    AlreadyFinished(LiveScoreEntity),
    /// No live score exists for the game.
    Missing,
}

/// Game-level status held by the organizer's game documents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameStatus {
    /// Confirmation list is open.
    Scheduled,
    /// Confirmation list is closed, kickoff pending.
    Confirmed,
    /// Ball is rolling.
    Live,
    Finished,
    Cancelled,
}

fn offset(value: i64, delta: i32) -> i64 {
    value + i64::from(delta)
}

/// Counter as shown to readers; a transient negative value reads as zero.
pub fn displayed(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}
