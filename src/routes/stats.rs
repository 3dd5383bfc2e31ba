use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};

use crate::{
    dto::stats::{CommunityStatsResponse, ViewerStatsResponse},
    error::AppError,
    services::aggregate_service,
    state::SharedState,
};

/// Routes exposing viewer and community statistics.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/viewers/{id}/stats", get(viewer_stats))
        .route("/candidates/{id}/community", get(community_stats))
}

/// Games played and total score of a viewer.
#[utoipa::path(
    get,
    path = "/viewers/{id}/stats",
    tag = "stats",
    params(("id" = String, Path, description = "Viewer identifier")),
    responses((status = 200, description = "Viewer totals", body = ViewerStatsResponse))
)]
pub async fn viewer_stats(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Json<ViewerStatsResponse> {
    Json(aggregate_service::viewer_stats(&state, id).await)
}

/// Average age the community guessed for a candidate.
#[utoipa::path(
    get,
    path = "/candidates/{id}/community",
    tag = "stats",
    params(("id" = String, Path, description = "Candidate identifier")),
    responses(
        (status = 200, description = "Community guesses", body = CommunityStatsResponse),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn community_stats(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<CommunityStatsResponse>, AppError> {
    Ok(Json(aggregate_service::community_stats(&state, id).await?))
}
