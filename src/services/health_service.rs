use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report the degraded flag and counters, pinging storage along the way.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.store() {
        Some(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "storage health check failed");
            }
        }
        None => warn!("storage unavailable (degraded mode)"),
    }

    HealthResponse::new(
        state.is_degraded(),
        state.directory().candidate_count(),
        state.sessions().len(),
    )
}
