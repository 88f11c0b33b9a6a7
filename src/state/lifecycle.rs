use thiserror::Error;

use crate::dao::models::{GameStatus, LiveScoreEntity};

/// Phase of a game as far as the live subsystem can tell from its own documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivePhase {
    /// No live score document exists yet.
    NoScore,
    /// Score document exists and `finished_at` is unset.
    Live,
    /// `finished_at` is set. Terminal.
    Finished,
}

impl LivePhase {
    /// Derive the phase from the stored score document.
    pub fn of(score: Option<&LiveScoreEntity>) -> Self {
        match score {
            None => LivePhase::NoScore,
            Some(score) if score.finished_at.is_some() => LivePhase::Finished,
            Some(_) => LivePhase::Live,
        }
    }
}

/// Intents the controller arbitrates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleIntent {
    /// First write of the live score.
    StartLive,
    /// Append an event to the ledger.
    RecordEvent,
    /// Remove an event from the ledger.
    RemoveEvent,
    /// Stamp the end of the game.
    Finish,
}

/// Work the caller must perform for a planned transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Create the live score document.
    CreateScore,
    /// Hand back the score that already exists.
    ReturnExisting,
    /// Mutate the ledger and the aggregates.
    MutateLedger,
    /// Stamp `finished_at` and notify the badge awarder.
    StampFinished,
    /// Nothing to write; the game is already over.
    AlreadyFinished,
}

/// Snapshot of both status sources for one game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchLifecycle {
    /// Game-level status from the external game store.
    pub status: GameStatus,
    pub phase: LivePhase,
}

/// Result of planning an intent against a [`MatchLifecycle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plan {
    pub from: LivePhase,
    pub to: LivePhase,
    pub intent: LifecycleIntent,
    pub effect: Effect,
}

/// Error returned when an intent is not allowed in the current lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{intent:?} is not allowed while the game is {status:?} in phase {phase:?}")]
pub struct InvalidTransition {
    pub status: GameStatus,
    pub phase: LivePhase,
    pub intent: LifecycleIntent,
}

impl MatchLifecycle {
    pub fn new(status: GameStatus, score: Option<&LiveScoreEntity>) -> Self {
        Self {
            status,
            phase: LivePhase::of(score),
        }
    }

    /// Decide whether `intent` may run and what it has to do.
    pub fn plan(&self, intent: LifecycleIntent) -> Result<Plan, InvalidTransition> {
        use Effect::*;
        use LifecycleIntent::*;
        use LivePhase::*;

        let (to, effect) = match (intent, self.phase, self.status) {
            (StartLive, NoScore, GameStatus::Live) => (Live, CreateScore),
            (StartLive, Live | Finished, _) => (self.phase, ReturnExisting),

            (RecordEvent | RemoveEvent, Live, GameStatus::Live) => (Live, MutateLedger),

            (Finish, Live, GameStatus::Live | GameStatus::Finished) => (Finished, StampFinished),
            (Finish, Finished, _) => (Finished, AlreadyFinished),

            _ => return Err(self.invalid(intent)),
        };

        Ok(Plan {
            from: self.phase,
            to,
            intent,
            effect,
        })
    }

    fn invalid(&self, intent: LifecycleIntent) -> InvalidTransition {
        InvalidTransition {
            status: self.status,
            phase: self.phase,
            intent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    fn score(finished: bool) -> LiveScoreEntity {
        let mut score = LiveScoreEntity::new("g1", "A", "B", SystemTime::UNIX_EPOCH);
        if finished {
            score.finished_at = Some(SystemTime::UNIX_EPOCH);
        }
        score
    }

    fn plan(
        status: GameStatus,
        score: Option<&LiveScoreEntity>,
        intent: LifecycleIntent,
    ) -> Result<Plan, InvalidTransition> {
        MatchLifecycle::new(status, score).plan(intent)
    }

    #[test]
    fn full_happy_path_through_match() {
        let started = plan(GameStatus::Live, None, LifecycleIntent::StartLive).unwrap();
        assert_eq!(started.from, LivePhase::NoScore);
        assert_eq!(started.to, LivePhase::Live);
        assert_eq!(started.effect, Effect::CreateScore);

        let live = score(false);
        for intent in [LifecycleIntent::RecordEvent, LifecycleIntent::RemoveEvent] {
            let planned = plan(GameStatus::Live, Some(&live), intent).unwrap();
            assert_eq!(planned.effect, Effect::MutateLedger);
            assert_eq!(planned.to, LivePhase::Live);
        }

        let finished = plan(GameStatus::Live, Some(&live), LifecycleIntent::Finish).unwrap();
        assert_eq!(finished.to, LivePhase::Finished);
        assert_eq!(finished.effect, Effect::StampFinished);
    }

    #[test]
    fn start_live_requires_live_status() {
        for status in [
            GameStatus::Scheduled,
            GameStatus::Confirmed,
            GameStatus::Finished,
            GameStatus::Cancelled,
        ] {
            let err = plan(status, None, LifecycleIntent::StartLive).unwrap_err();
            assert_eq!(err.phase, LivePhase::NoScore);
            assert_eq!(err.status, status);
        }
    }

    #[test]
    fn start_live_is_idempotent_once_a_score_exists() {
        let live = score(false);
        let planned = plan(GameStatus::Live, Some(&live), LifecycleIntent::StartLive).unwrap();
        assert_eq!(planned.effect, Effect::ReturnExisting);

        let finished = score(true);
        let planned =
            plan(GameStatus::Finished, Some(&finished), LifecycleIntent::StartLive).unwrap();
        assert_eq!(planned.effect, Effect::ReturnExisting);
        assert_eq!(planned.to, LivePhase::Finished);
    }

    #[test]
    fn events_are_rejected_outside_live() {
        let live = score(false);
        let finished = score(true);
        let cases = [
            (GameStatus::Live, None),
            (GameStatus::Scheduled, Some(&live)),
            (GameStatus::Finished, Some(&live)),
            (GameStatus::Live, Some(&finished)),
            (GameStatus::Finished, Some(&finished)),
        ];

        for (status, score) in cases {
            for intent in [LifecycleIntent::RecordEvent, LifecycleIntent::RemoveEvent] {
                let err = plan(status, score, intent).unwrap_err();
                assert_eq!(err.intent, intent);
            }
        }
    }

    #[test]
    fn finishing_twice_is_idempotent() {
        let finished = score(true);
        let planned = plan(GameStatus::Finished, Some(&finished), LifecycleIntent::Finish).unwrap();
        assert_eq!(planned.from, LivePhase::Finished);
        assert_eq!(planned.effect, Effect::AlreadyFinished);
    }

    #[test]
    fn finish_after_status_already_moved_still_stamps() {
        let live = score(false);
        let planned = plan(GameStatus::Finished, Some(&live), LifecycleIntent::Finish).unwrap();
        assert_eq!(planned.effect, Effect::StampFinished);
    }

    #[test]
    fn finish_without_score_is_invalid() {
        let err = plan(GameStatus::Live, None, LifecycleIntent::Finish).unwrap_err();
        assert_eq!(
            err,
            InvalidTransition {
                status: GameStatus::Live,
                phase: LivePhase::NoScore,
                intent: LifecycleIntent::Finish,
            }
        );
    }
}
