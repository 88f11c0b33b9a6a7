use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report whether storage is installed, pinging it to surface connectivity issues in the logs.
///
/// The ping result only feeds the logs; the storage supervisor owns the degraded flag.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.storage().await {
        Some(backend) => {
            if let Err(err) = backend.live.health_check().await {
                warn!(error = %err, "storage health check failed");
            }
        }
        None => warn!("storage unavailable (degraded mode)"),
    }

    HealthResponse::new(state.is_degraded().await, state.active_feeds().len())
}
