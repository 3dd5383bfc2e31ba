use serde::Serialize;
use utoipa::ToSchema;

/// Body of the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// "ok" or "degraded".
    pub status: String,
    /// Guessable profiles currently loaded.
    pub candidates: usize,
    /// Sessions currently open.
    pub sessions: usize,
}

impl HealthResponse {
    /// Build the response from the degraded flag and current counters.
    pub fn new(degraded: bool, candidates: usize, sessions: usize) -> Self {
        Self {
            status: if degraded { "degraded" } else { "ok" }.to_owned(),
            candidates,
            sessions,
        }
    }
}
