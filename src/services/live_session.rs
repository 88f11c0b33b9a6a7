use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    dao::models::{FinishStamp, LivePlayerStatsEntity, LiveScoreEntity},
    error::ServiceError,
    services::{
        aggregator::{self, Aggregates, Direction},
        badges::{BadgeError, FinishedGame},
        ledger::{EventDraft, EventLedger, Removal},
        lifecycle::{self, Gate},
    },
    state::{
        LiveChange, SharedState, StorageBackend,
        lifecycle::{Effect, LifecycleIntent},
        live::GameEvent,
    },
};

/// Result of a finish request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishOutcome {
    pub score: LiveScoreEntity,
    /// `true` only for the call that handed the final stats to the badge awarder.
    pub badges_triggered: bool,
}

/// Everything known about a game's live state at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveSnapshot {
    pub score: Option<LiveScoreEntity>,
    pub events: Vec<GameEvent>,
    pub stats: Vec<LivePlayerStatsEntity>,
}

/// Open the live score of a game, or return the one that already exists.
pub async fn start_live_game(
    state: &SharedState,
    actor_id: &str,
    game_id: &str,
    team1_id: &str,
    team2_id: &str,
) -> Result<LiveScoreEntity, ServiceError> {
    if team1_id.trim().is_empty() || team2_id.trim().is_empty() {
        return Err(ServiceError::Validation("team ids must not be blank".into()));
    }
    if team1_id == team2_id {
        return Err(ServiceError::Validation(
            "a game needs two different teams".into(),
        ));
    }

    let backend = state.require_storage().await?;
    let Gate { plan, score, .. } =
        lifecycle::gate(&backend, game_id, actor_id, LifecycleIntent::StartLive).await?;

    if let (Effect::ReturnExisting, Some(existing)) = (plan.effect, score) {
        return Ok(existing);
    }

    let candidate = LiveScoreEntity::new(game_id, team1_id, team2_id, state.now());
    let stored = state
        .bounded(async {
            Ok(backend
                .live
                .create_live_score(candidate.clone())
                .await?)
        })
        .await?;

    if stored == candidate {
        info!(game_id, actor = actor_id, "live score opened");
        state.hub().publish(game_id, LiveChange::score_only());
    }
    Ok(stored)
}

/// Record an event and add its delta to the live aggregates.
pub async fn add_event(
    state: &SharedState,
    actor_id: &str,
    draft: EventDraft,
) -> Result<GameEvent, ServiceError> {
    let event = draft.into_event(Uuid::new_v4(), state.now())?;
    let backend = state.require_storage().await?;
    let Gate { score, .. } =
        lifecycle::gate(&backend, &event.game_id, actor_id, LifecycleIntent::RecordEvent).await?;

    if let Some(score) = &score {
        if !score.plays(&event.team_id) {
            return Err(ServiceError::Validation(format!(
                "team {} does not play in game {}",
                event.team_id, event.game_id
            )));
        }
    }

    let delta = aggregator::delta_for(&event, Direction::Apply);
    let ledger = EventLedger::new(backend.live.clone());
    if let Err(err) = state.bounded(ledger.append(event.clone())).await {
        // A timed-out insert may still land.
        if matches!(err, ServiceError::Timeout) {
            withdraw_append(state, &ledger, &event, &err).await;
        }
        return Err(err);
    }

    if !delta.is_empty() {
        let written = state
            .bounded(async { Ok(backend.live.apply_delta(delta.clone()).await?) })
            .await;
        if let Err(err) = written {
            withdraw_append(state, &ledger, &event, &err).await;
            return Err(err);
        }
    }

    info!(
        game_id = %event.game_id,
        event_id = %event.id,
        actor = actor_id,
        kind = ?event.kind.event_type(),
        "event recorded"
    );
    state.hub().publish(
        &event.game_id,
        LiveChange {
            score: delta.goal.is_some(),
            events: true,
            stats: !delta.players.is_empty(),
        },
    );
    Ok(event)
}

/// Remove an event and subtract the delta it contributed.
///
/// Removing an event that is already gone succeeds without touching the aggregates.
pub async fn delete_event(
    state: &SharedState,
    actor_id: &str,
    game_id: &str,
    event_id: Uuid,
) -> Result<Removal, ServiceError> {
    let backend = state.require_storage().await?;
    lifecycle::gate(&backend, game_id, actor_id, LifecycleIntent::RemoveEvent).await?;

    let ledger = EventLedger::new(backend.live.clone());
    let removed_at = state.now();
    let removal = state
        .bounded(ledger.remove(game_id, event_id, removed_at))
        .await
        .inspect_err(|err| {
            if matches!(err, ServiceError::Timeout) {
                warn!(
                    game_id,
                    event_id = %event_id,
                    "event removal timed out; a retried delete resumes it"
                );
            }
        })?;

    let removal = match removal {
        Removal::Removed(event) => {
            reverse_or_publish(state, &backend, &ledger, &event).await?;
            Removal::Removed(event)
        }
        Removal::ReversalPending(event) => {
            if state.bounded(ledger.claim_reversal(event_id)).await? {
                info!(
                    game_id,
                    event_id = %event_id,
                    "applying reversal left by an earlier removal"
                );
                reverse_or_publish(state, &backend, &ledger, &event).await?;
                Removal::Removed(event)
            } else {
                Removal::AlreadyRemoved(event)
            }
        }
        already @ Removal::AlreadyRemoved(_) => already,
    };

    match &removal {
        Removal::Removed(event) => {
            info!(game_id, event_id = %event_id, actor = actor_id, "event removed");
            let delta = aggregator::delta_for(event, Direction::Reverse);
            state.hub().publish(
                game_id,
                LiveChange {
                    score: delta.goal.is_some(),
                    events: true,
                    stats: !delta.players.is_empty(),
                },
            );
        }
        Removal::AlreadyRemoved(_) | Removal::ReversalPending(_) => {
            info!(game_id, event_id = %event_id, "event already removed; nothing to do");
        }
    }
    Ok(removal)
}

/// Stamp the end of a game and hand the final stats to badge evaluation once.
pub async fn finish_game(
    state: &SharedState,
    actor_id: &str,
    game_id: &str,
) -> Result<FinishOutcome, ServiceError> {
    let backend = state.require_storage().await?;
    let Gate {
        plan,
        lifecycle: current,
        score,
    } = lifecycle::gate(&backend, game_id, actor_id, LifecycleIntent::Finish).await?;

    if let (Effect::AlreadyFinished, Some(score)) = (plan.effect, score) {
        lifecycle::ensure_finished_status(&backend, game_id, current.status).await?;
        return Ok(FinishOutcome {
            score,
            badges_triggered: false,
        });
    }

    let finished_at = state.now();
    let stamp = state
        .bounded(async {
            Ok(backend
                .live
                .stamp_finished(game_id.to_owned(), finished_at)
                .await?)
        })
        .await?;

    let (score, stamped) = match stamp {
        FinishStamp::Stamped(score) => (score, true),
        FinishStamp::AlreadyFinished(score) => (score, false),
        FinishStamp::Missing => {
            return Err(ServiceError::NotFound(format!("live score of game {game_id}")));
        }
    };

    let badges_triggered = stamped && award_badges(state, &backend, &score).await;
    lifecycle::ensure_finished_status(&backend, game_id, current.status).await?;

    if stamped {
        info!(game_id, actor = actor_id, "game finished");
        state.hub().publish(game_id, LiveChange::score_only());
    }
    Ok(FinishOutcome {
        score,
        badges_triggered,
    })
}

/// Recompute the aggregates from the ledger and overwrite the stored counters.
pub async fn repair(
    state: &SharedState,
    actor_id: &str,
    game_id: &str,
) -> Result<Aggregates, ServiceError> {
    let backend = state.require_storage().await?;
    let (_, score) = lifecycle::load(&backend, game_id).await?;
    let score =
        score.ok_or_else(|| ServiceError::NotFound(format!("live score of game {game_id}")))?;
    lifecycle::authorize(&backend, game_id, actor_id).await?;

    let ledger = EventLedger::new(backend.live.clone());
    let rebuilt = state
        .bounded(async {
            let events = ledger.list(game_id).await?;
            let rebuilt = aggregator::rebuild_from_ledger(&score, events);
            let (score, lines) = rebuilt.clone().into_parts();
            backend.live.replace_aggregates(score, lines).await?;
            Ok(rebuilt)
        })
        .await?;

    info!(
        game_id,
        actor = actor_id,
        team1_score = rebuilt.score.team1_score,
        team2_score = rebuilt.score.team2_score,
        "aggregates rebuilt from ledger"
    );
    state.hub().publish(game_id, LiveChange::ALL);
    Ok(rebuilt)
}

/// Current score, events and stats of a game. No permission needed.
pub async fn snapshot(state: &SharedState, game_id: &str) -> Result<LiveSnapshot, ServiceError> {
    let backend = state.require_storage().await?;
    let score = backend.live.find_live_score(game_id.to_owned()).await?;
    let events = EventLedger::new(backend.live.clone()).list(game_id).await?;
    let stats = backend.live.list_player_stats(game_id.to_owned()).await?;

    Ok(LiveSnapshot {
        score,
        events,
        stats,
    })
}

/// One-line confirmation shown to the person who recorded `event`.
pub fn confirmation_message(event: &GameEvent) -> String {
    let player = if event.player.name.trim().is_empty() {
        event.player.id.as_str()
    } else {
        event.player.name.as_str()
    };

    match event.assist() {
        Some(assist) if !assist.name.trim().is_empty() => format!(
            "{} recorded for {player} (assist: {})",
            event.kind.label(),
            assist.name
        ),
        _ => format!("{} recorded for {player}", event.kind.label()),
    }
}

/// Reverse a removed event; on failure still tell viewers the event is gone.
async fn reverse_or_publish(
    state: &SharedState,
    backend: &StorageBackend,
    ledger: &EventLedger,
    event: &GameEvent,
) -> Result<(), ServiceError> {
    let reversed = reverse_removed(state, backend, ledger, event).await;
    if reversed.is_err() {
        state
            .hub()
            .publish(&event.game_id, LiveChange::events_only());
    }
    reversed
}

/// Subtract the delta of a removed event whose reversal this call holds.
///
/// A failed write gives the reversal back so a retried delete applies it.
async fn reverse_removed(
    state: &SharedState,
    backend: &StorageBackend,
    ledger: &EventLedger,
    event: &GameEvent,
) -> Result<(), ServiceError> {
    let delta = aggregator::delta_for(event, Direction::Reverse);
    if delta.is_empty() {
        return Ok(());
    }

    let Err(err) = state
        .bounded(async { Ok(backend.live.apply_delta(delta).await?) })
        .await
    else {
        return Ok(());
    };

    // A timed-out write may have landed; handing it back could reverse twice.
    if matches!(err, ServiceError::Timeout) {
        error!(
            game_id = %event.game_id,
            event_id = %event.id,
            "reversal timed out; repair required"
        );
        return Err(err);
    }

    match state.bounded(ledger.release_reversal(event.id)).await {
        Ok(()) => warn!(
            game_id = %event.game_id,
            event_id = %event.id,
            error = %err,
            "reversal failed; left pending for a retried delete"
        ),
        Err(release_err) => error!(
            game_id = %event.game_id,
            event_id = %event.id,
            error = %err,
            release_error = %release_err,
            "event removed but aggregates not reversed; repair required"
        ),
    }
    Err(err)
}

/// Hide an appended event whose delta did not reach the aggregates.
async fn withdraw_append(
    state: &SharedState,
    ledger: &EventLedger,
    event: &GameEvent,
    cause: &ServiceError,
) {
    let withdrawn = state
        .bounded(ledger.withdraw(&event.game_id, event.id, state.now()))
        .await;

    match withdrawn {
        // The dropped write may have landed in part.
        Ok(()) if matches!(cause, ServiceError::Timeout) => error!(
            game_id = %event.game_id,
            event_id = %event.id,
            "event write timed out; event withdrawn, repair required"
        ),
        Ok(()) => warn!(
            game_id = %event.game_id,
            event_id = %event.id,
            error = %cause,
            "aggregate write failed; appended event withdrawn"
        ),
        Err(err) => error!(
            game_id = %event.game_id,
            event_id = %event.id,
            error = %cause,
            withdraw_error = %err,
            "aggregate write failed and event could not be withdrawn; repair required"
        ),
    }
}

/// Call the badge awarder unless this process already did for the game.
///
/// The hand-off is bounded by the configured badge timeout.
async fn award_badges(
    state: &SharedState,
    backend: &StorageBackend,
    score: &LiveScoreEntity,
) -> bool {
    if !state.finish_attempts().insert(score.game_id.clone()) {
        return false;
    }

    let final_stats = match backend.live.list_player_stats(score.game_id.clone()).await {
        Ok(stats) => stats,
        Err(err) => {
            warn!(
                game_id = %score.game_id,
                error = %err,
                "final stats unavailable; awarding on empty stats"
            );
            Vec::new()
        }
    };

    let limit = state.config().badge_timeout;
    let evaluation = state.badges().on_game_finished(
        FinishedGame {
            score: score.clone(),
        },
        final_stats,
    );
    let outcome = tokio::time::timeout(limit, evaluation)
        .await
        .unwrap_or(Err(BadgeError::TimedOut(limit)));

    if let Err(err) = outcome {
        error!(game_id = %score.game_id, error = %err, "badge evaluation failed");
    }
    true
}
