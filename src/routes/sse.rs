use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, State},
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;
use tracing::info;

use crate::{services::sse_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/sse/games/{game_id}",
    tag = "sse",
    params(("game_id" = String, Path, description = "Identifier of the game to follow")),
    responses((
        status = 200,
        description = "Score, events and stats of the game as `score`, `events` and `stats` events",
        content_type = "text/event-stream",
        body = String
    ))
)]
/// Stream the live feeds of one game to a viewer.
pub async fn game_stream(
    State(state): State<SharedState>,
    Path(game_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(game_id = %game_id, "new game SSE connection");
    sse_service::game_stream(&state, &game_id)
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sse/games/{game_id}", get(game_stream))
}
