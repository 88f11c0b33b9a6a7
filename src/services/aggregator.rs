//! Pure derivation of live scores and player stat lines from ledger events.
//!
//! Every event kind maps to a fixed signed [`AggregateDelta`]; applying and reversing
//! use the same branch logic with opposite signs, so totals do not depend on the order
//! in which concurrent writes land.

use indexmap::IndexMap;

use crate::{
    dao::models::{
        AggregateDelta, GoalDelta, LivePlayerStatsEntity, LiveScoreEntity, PlayerStatDelta,
    },
    state::live::{EventKind, GameEvent},
};

/// Whether an event is being added to or taken out of the aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Apply,
    Reverse,
}

impl Direction {
    fn sign(self) -> i32 {
        match self {
            Direction::Apply => 1,
            Direction::Reverse => -1,
        }
    }
}

/// Score and stat lines of one game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregates {
    pub score: LiveScoreEntity,
    /// Stat lines keyed by player id, in first-seen order.
    pub players: IndexMap<String, LivePlayerStatsEntity>,
}

impl Aggregates {
    pub fn new(score: LiveScoreEntity) -> Self {
        Self {
            score,
            players: IndexMap::new(),
        }
    }

    pub fn from_parts(score: LiveScoreEntity, lines: Vec<LivePlayerStatsEntity>) -> Self {
        Self {
            score,
            players: lines
                .into_iter()
                .map(|line| (line.player_id.clone(), line))
                .collect(),
        }
    }

    pub fn player(&self, player_id: &str) -> Option<&LivePlayerStatsEntity> {
        self.players.get(player_id)
    }

    pub fn into_parts(self) -> (LiveScoreEntity, Vec<LivePlayerStatsEntity>) {
        (self.score, self.players.into_values().collect())
    }
}

/// Signed change `event` causes in the aggregates of its game.
pub fn delta_for(event: &GameEvent, direction: Direction) -> AggregateDelta {
    let sign = direction.sign();
    let mut scorer = PlayerStatDelta::zero(event.player.id.clone(), event.team_id.clone());
    let mut goal = None;
    let mut players = Vec::with_capacity(2);

    match &event.kind {
        EventKind::Goal { assist } => {
            goal = Some(GoalDelta {
                team_id: event.team_id.clone(),
                amount: sign,
            });
            scorer.goals = sign;
            players.push(scorer);
            if let Some(assist) = assist {
                let mut assister = PlayerStatDelta::zero(assist.id.clone(), event.team_id.clone());
                assister.assists = sign;
                players.push(assister);
            }
        }
        EventKind::Save => {
            scorer.saves = sign;
            players.push(scorer);
        }
        EventKind::YellowCard => {
            scorer.yellow_cards = sign;
            players.push(scorer);
        }
        EventKind::RedCard => {
            scorer.red_cards = sign;
            players.push(scorer);
        }
        // Assists only count through a goal; unknown kinds are carried but inert.
        EventKind::Assist | EventKind::Unknown => {}
    }

    AggregateDelta {
        game_id: event.game_id.clone(),
        goal,
        players,
    }
}

/// Add `delta` to `current`, creating stat lines on first touch.
pub fn apply_delta(mut current: Aggregates, delta: &AggregateDelta) -> Aggregates {
    if let Some(goal) = &delta.goal {
        current.score.apply_goal(&goal.team_id, goal.amount);
    }

    for player in delta.players.iter().filter(|player| !player.is_zero()) {
        current
            .players
            .entry(player.player_id.clone())
            .or_insert_with(|| {
                LivePlayerStatsEntity::new(
                    delta.game_id.clone(),
                    player.player_id.clone(),
                    player.team_id.clone(),
                )
            })
            .apply_delta(player);
    }

    current
}

pub fn apply_event(current: Aggregates, event: &GameEvent) -> Aggregates {
    apply_delta(current, &delta_for(event, Direction::Apply))
}

/// Exact inverse of [`apply_event`] for the same event payload.
pub fn reverse_event(current: Aggregates, event: &GameEvent) -> Aggregates {
    apply_delta(current, &delta_for(event, Direction::Reverse))
}

/// Recompute the aggregates of `seed`'s game from scratch.
///
/// Counters of `seed` are ignored; events are folded oldest first.
pub fn rebuild_from_ledger(
    seed: &LiveScoreEntity,
    events: impl IntoIterator<Item = GameEvent>,
) -> Aggregates {
    let mut events: Vec<GameEvent> = events
        .into_iter()
        .filter(|event| event.game_id == seed.game_id)
        .collect();
    events.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

    events
        .iter()
        .fold(Aggregates::new(seed.zeroed()), apply_event)
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use uuid::Uuid;

    use super::*;
    use crate::state::live::PlayerRef;

    fn score() -> LiveScoreEntity {
        LiveScoreEntity::new("g1", "A", "B", SystemTime::UNIX_EPOCH)
    }

    fn event(kind: EventKind, player: &str, team: &str, secs: u64) -> GameEvent {
        GameEvent {
            id: Uuid::new_v4(),
            game_id: "g1".into(),
            kind,
            player: PlayerRef::new(player, player.to_uppercase()),
            team_id: team.into(),
            minute: 1,
            created_at: SystemTime::UNIX_EPOCH + Duration::from_secs(secs),
        }
    }

    fn goal(player: &str, team: &str, assist: Option<&str>, secs: u64) -> GameEvent {
        event(
            EventKind::Goal {
                assist: assist.map(|id| PlayerRef::new(id, id)),
            },
            player,
            team,
            secs,
        )
    }

    fn counter(
        aggregates: &Aggregates,
        player: &str,
        pick: fn(&LivePlayerStatsEntity) -> i64,
    ) -> i64 {
        aggregates.player(player).map(pick).unwrap_or_default()
    }

    #[test]
    fn goal_scenario_with_assist_and_reversal() {
        let first = goal("p1", "A", None, 10);
        let second = goal("p2", "B", Some("p3"), 20);

        let aggregates = apply_event(Aggregates::new(score()), &first);
        assert_eq!(aggregates.score.team1_score, 1);
        assert_eq!(counter(&aggregates, "p1", |line| line.goals), 1);

        let aggregates = apply_event(aggregates, &second);
        assert_eq!(aggregates.score.team2_score, 1);
        assert_eq!(counter(&aggregates, "p2", |line| line.goals), 1);
        assert_eq!(counter(&aggregates, "p3", |line| line.assists), 1);
        assert_eq!(aggregates.player("p3").unwrap().team_id, "B");

        let aggregates = reverse_event(aggregates, &first);
        assert_eq!(aggregates.score.team1_score, 0);
        assert_eq!(aggregates.score.team2_score, 1);
        assert_eq!(counter(&aggregates, "p1", |line| line.goals), 0);
        assert_eq!(counter(&aggregates, "p2", |line| line.goals), 1);
        assert_eq!(counter(&aggregates, "p3", |line| line.assists), 1);
    }

    #[test]
    fn yellow_cards_accumulate_without_escalation() {
        let aggregates = [5, 33]
            .into_iter()
            .map(|minute| event(EventKind::YellowCard, "p4", "A", minute))
            .fold(Aggregates::new(score()), |acc, card| apply_event(acc, &card));

        let line = aggregates.player("p4").unwrap();
        assert_eq!(line.yellow_cards, 2);
        assert_eq!(line.red_cards, 0);
    }

    #[test]
    fn apply_then_reverse_restores_every_field() {
        let base = apply_event(Aggregates::new(score()), &goal("p1", "A", None, 1));
        for added in [
            goal("p2", "B", Some("p3"), 2),
            event(EventKind::Save, "p5", "B", 3),
            event(EventKind::RedCard, "p1", "A", 4),
        ] {
            let round_trip = reverse_event(apply_event(base.clone(), &added), &added);
            assert_eq!(round_trip.score, base.score);
            for (player, line) in &round_trip.players {
                let before = base
                    .player(player)
                    .cloned()
                    .unwrap_or_else(|| line.zeroed());
                assert_eq!(line, &before);
            }
        }
    }

    #[test]
    fn standalone_assist_and_unknown_kinds_are_inert() {
        let base = Aggregates::new(score());
        let after = apply_event(base.clone(), &event(EventKind::Assist, "p3", "A", 1));
        let after = apply_event(after, &event(EventKind::Unknown, "p3", "A", 2));
        assert_eq!(after, base);
    }

    #[test]
    fn reversal_landing_before_its_apply_nets_to_zero() {
        let scored = goal("p1", "A", Some("p6"), 1);
        let early = reverse_event(Aggregates::new(score()), &scored);
        assert_eq!(early.score.team1_score, -1);
        assert_eq!(counter(&early, "p1", |line| line.goals), -1);

        let settled = apply_event(early, &scored);
        assert_eq!(settled.score, score());
        assert_eq!(counter(&settled, "p1", |line| line.goals), 0);
        assert_eq!(counter(&settled, "p6", |line| line.assists), 0);
    }

    #[test]
    fn fold_order_does_not_change_totals() {
        let events = vec![
            goal("p1", "A", Some("p6"), 1),
            goal("p2", "B", None, 2),
            event(EventKind::Save, "p5", "B", 3),
            goal("p1", "A", None, 4),
            event(EventKind::YellowCard, "p2", "B", 5),
        ];

        let forward = events
            .iter()
            .fold(Aggregates::new(score()), apply_event);
        let backward = events
            .iter()
            .rev()
            .fold(Aggregates::new(score()), apply_event);

        assert_eq!(forward.score, backward.score);
        for (player, line) in &forward.players {
            assert_eq!(backward.player(player), Some(line));
        }
        assert_eq!(forward.score.team1_score, 2);
        assert_eq!(forward.score.team2_score, 1);
    }

    #[test]
    fn rebuild_matches_incremental_and_ignores_seed_counters() {
        let events = vec![
            goal("p2", "B", Some("p3"), 20),
            goal("p1", "A", None, 10),
            event(EventKind::Save, "p5", "B", 30),
        ];
        let incremental = events
            .iter()
            .fold(Aggregates::new(score()), apply_event);

        let mut drifted = score();
        drifted.team1_score = 7;
        let rebuilt = rebuild_from_ledger(&drifted, events);

        assert_eq!(rebuilt.score, incremental.score);
        assert_eq!(rebuilt.players.len(), incremental.players.len());
        // First-seen order follows creation time, not list order.
        assert_eq!(rebuilt.players.keys().next().map(String::as_str), Some("p1"));
    }

    #[test]
    fn delta_of_a_goal_touches_score_scorer_and_assister() {
        let delta = delta_for(&goal("p2", "B", Some("p3"), 1), Direction::Reverse);
        assert_eq!(
            delta.goal,
            Some(GoalDelta {
                team_id: "B".into(),
                amount: -1
            })
        );
        assert_eq!(delta.players.len(), 2);
        assert_eq!(delta.players[0].goals, -1);
        assert_eq!(delta.players[1].assists, -1);
        assert!(delta_for(&event(EventKind::Assist, "p3", "A", 1), Direction::Apply).is_empty());
    }
}
