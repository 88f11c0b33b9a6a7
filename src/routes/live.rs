use axum::{
    Json, Router,
    extract::{FromRequestParts, Path, State},
    http::request::Parts,
    routing::{delete, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::live::{
        ActionResponse, AddEventRequest, EventRecordedResponse, FinishResponse, GameEventDto,
        LiveScoreDto, LiveSnapshotDto, RepairResponse, StartLiveGameRequest,
    },
    error::AppError,
    services::{ledger::Removal, live_session},
    state::SharedState,
};

const ACTOR_HEADER: &str = "x-actor-id";

/// Caller identity taken from the `X-Actor-Id` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor(pub String);

impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(ACTOR_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| Actor(value.to_owned()))
            .ok_or_else(|| AppError::Unauthorized("missing X-Actor-Id header".into()))
    }
}

/// Live scoring endpoints of a game.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route(
            "/games/{game_id}/live",
            post(start_live_game).get(live_snapshot),
        )
        .route("/games/{game_id}/events", post(add_event))
        .route("/games/{game_id}/events/{event_id}", delete(delete_event))
        .route("/games/{game_id}/finish", post(finish_game))
        .route("/games/{game_id}/repair", post(repair_game))
}

/// Open the live score of a game, or return the existing one.
#[utoipa::path(
    post,
    path = "/games/{game_id}/live",
    tag = "live",
    params(
        ("X-Actor-Id" = String, Header, description = "Identity of the caller"),
        ("game_id" = String, Path, description = "Identifier of the game")
    ),
    request_body = StartLiveGameRequest,
    responses(
        (status = 200, description = "Live score", body = LiveScoreDto),
        (status = 403, description = "Caller is neither owner nor confirmed"),
        (status = 409, description = "Game status does not allow going live")
    )
)]
pub async fn start_live_game(
    State(state): State<SharedState>,
    Actor(actor): Actor,
    Path(game_id): Path<String>,
    Valid(Json(payload)): Valid<Json<StartLiveGameRequest>>,
) -> Result<Json<LiveScoreDto>, AppError> {
    let score = live_session::start_live_game(
        &state,
        &actor,
        &game_id,
        &payload.team1_id,
        &payload.team2_id,
    )
    .await?;
    Ok(Json(LiveScoreDto::from(&score)))
}

/// Current score, events and stats of a game.
#[utoipa::path(
    get,
    path = "/games/{game_id}/live",
    tag = "live",
    params(("game_id" = String, Path, description = "Identifier of the game")),
    responses((status = 200, description = "Live snapshot", body = LiveSnapshotDto))
)]
pub async fn live_snapshot(
    State(state): State<SharedState>,
    Path(game_id): Path<String>,
) -> Result<Json<LiveSnapshotDto>, AppError> {
    let snapshot = live_session::snapshot(&state, &game_id).await?;
    Ok(Json(LiveSnapshotDto::from(&snapshot)))
}

/// Record an event and update the score and stat lines it affects.
#[utoipa::path(
    post,
    path = "/games/{game_id}/events",
    tag = "live",
    params(
        ("X-Actor-Id" = String, Header, description = "Identity of the caller"),
        ("game_id" = String, Path, description = "Identifier of the game")
    ),
    request_body = AddEventRequest,
    responses(
        (status = 200, description = "Event recorded", body = EventRecordedResponse),
        (status = 400, description = "Invalid event"),
        (status = 409, description = "Game is not live")
    )
)]
pub async fn add_event(
    State(state): State<SharedState>,
    Actor(actor): Actor,
    Path(game_id): Path<String>,
    Valid(Json(payload)): Valid<Json<AddEventRequest>>,
) -> Result<Json<EventRecordedResponse>, AppError> {
    let event = live_session::add_event(&state, &actor, payload.into_draft(&game_id)).await?;
    Ok(Json(EventRecordedResponse {
        message: live_session::confirmation_message(&event),
        event: GameEventDto::from(&event),
    }))
}

/// Remove an event and subtract what it contributed.
#[utoipa::path(
    delete,
    path = "/games/{game_id}/events/{event_id}",
    tag = "live",
    params(
        ("X-Actor-Id" = String, Header, description = "Identity of the caller"),
        ("game_id" = String, Path, description = "Identifier of the game"),
        ("event_id" = Uuid, Path, description = "Identifier of the event")
    ),
    responses(
        (status = 200, description = "Event removed", body = ActionResponse),
        (status = 404, description = "Unknown event")
    )
)]
pub async fn delete_event(
    State(state): State<SharedState>,
    Actor(actor): Actor,
    Path((game_id, event_id)): Path<(String, Uuid)>,
) -> Result<Json<ActionResponse>, AppError> {
    let message = match live_session::delete_event(&state, &actor, &game_id, event_id).await? {
        Removal::Removed(event) => format!("{} removed", event.kind.label()),
        Removal::AlreadyRemoved(_) | Removal::ReversalPending(_) => {
            "Event already removed".to_owned()
        }
    };
    Ok(Json(ActionResponse::new(message)))
}

/// Stamp the game as finished and trigger badge evaluation once.
#[utoipa::path(
    post,
    path = "/games/{game_id}/finish",
    tag = "live",
    params(
        ("X-Actor-Id" = String, Header, description = "Identity of the caller"),
        ("game_id" = String, Path, description = "Identifier of the game")
    ),
    responses(
        (status = 200, description = "Game finished", body = FinishResponse),
        (status = 409, description = "Game has no live score")
    )
)]
pub async fn finish_game(
    State(state): State<SharedState>,
    Actor(actor): Actor,
    Path(game_id): Path<String>,
) -> Result<Json<FinishResponse>, AppError> {
    let outcome = live_session::finish_game(&state, &actor, &game_id).await?;
    Ok(Json(FinishResponse::from(&outcome)))
}

/// Rebuild the score and stat lines from the ledger.
#[utoipa::path(
    post,
    path = "/games/{game_id}/repair",
    tag = "live",
    params(
        ("X-Actor-Id" = String, Header, description = "Identity of the caller"),
        ("game_id" = String, Path, description = "Identifier of the game")
    ),
    responses(
        (status = 200, description = "Aggregates rebuilt", body = RepairResponse),
        (status = 404, description = "Game has no live score")
    )
)]
pub async fn repair_game(
    State(state): State<SharedState>,
    Actor(actor): Actor,
    Path(game_id): Path<String>,
) -> Result<Json<RepairResponse>, AppError> {
    let aggregates = live_session::repair(&state, &actor, &game_id).await?;
    Ok(Json(RepairResponse::from(&aggregates)))
}
