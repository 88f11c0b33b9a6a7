use serde::Serialize;
use utoipa::ToSchema;

/// Payload of the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema, PartialEq, Eq)]
pub struct HealthResponse {
    /// `ok`, or `degraded` while no storage backend is installed.
    pub status: String,
    /// Games with at least one open viewer feed.
    pub watched_games: usize,
}

impl HealthResponse {
    pub fn new(degraded: bool, watched_games: usize) -> Self {
        Self {
            status: if degraded { "degraded" } else { "ok" }.to_owned(),
            watched_games,
        }
    }
}
