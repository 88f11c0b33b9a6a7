use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Live Match Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::live::start_live_game,
        crate::routes::live::live_snapshot,
        crate::routes::live::add_event,
        crate::routes::live::delete_event,
        crate::routes::live::finish_game,
        crate::routes::live::repair_game,
        crate::routes::sse::game_stream,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::live::StartLiveGameRequest,
            crate::dto::live::AddEventRequest,
            crate::dto::live::GameEventDto,
            crate::dto::live::LiveScoreDto,
            crate::dto::live::PlayerStatsDto,
            crate::dto::live::LiveSnapshotDto,
            crate::dto::live::EventRecordedResponse,
            crate::dto::live::FinishResponse,
            crate::dto::live::RepairResponse,
            crate::dto::live::ActionResponse,
            crate::dto::ws::ViewerInboundMessage,
            crate::dto::ws::ViewerOutboundMessage,
            crate::dao::models::GameEventType,
            crate::dao::models::GameStatus,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "live", description = "Live scoring of a game"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "viewers", description = "WebSocket feeds for live viewers"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_live_routes() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/games/{game_id}/events"));
        assert!(doc.paths.paths.contains_key("/sse/games/{game_id}"));
    }
}
