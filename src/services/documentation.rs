use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the guess session service.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::session::create_session,
        crate::routes::session::get_session,
        crate::routes::session::change_viewer,
        crate::routes::session::refresh_session,
        crate::routes::session::submit_guess,
        crate::routes::session::close_session,
        crate::routes::session::session_events,
        crate::routes::stats::viewer_stats,
        crate::routes::stats::community_stats,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::session::CreateSessionRequest,
            crate::dto::session::UpdateViewerRequest,
            crate::dto::session::SubmitGuessRequest,
            crate::dto::session::SessionView,
            crate::dto::session::SubmitGuessResponse,
            crate::dto::stats::ViewerStatsResponse,
            crate::dto::stats::CommunityStatsResponse,
            crate::dto::sse::PhaseChangedEvent,
            crate::dto::sse::CandidateChangedEvent,
            crate::dto::sse::NoCandidatesEvent,
            crate::dto::sse::SessionClosedEvent,
            crate::dto::sse::Handshake,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sessions", description = "Guess sessions"),
        (name = "stats", description = "Viewer and community statistics"),
    )
)]
pub struct ApiDoc;
