use std::convert::Infallible;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, Sse},
    routing::{get, post, put},
};
use axum_valid::Valid;
use futures::Stream;
use uuid::Uuid;

use crate::{
    dto::session::{
        CreateSessionRequest, SessionView, SubmitGuessRequest, SubmitGuessResponse,
        UpdateViewerRequest,
    },
    error::AppError,
    services::{session_service, sse_service},
    state::SharedState,
};

/// Routes driving guess sessions.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/sessions", post(create_session))
        .route("/sessions/{id}", get(get_session).delete(close_session))
        .route("/sessions/{id}/viewer", put(change_viewer))
        .route("/sessions/{id}/refresh", post(refresh_session))
        .route("/sessions/{id}/guesses", post(submit_guess))
        .route("/sessions/{id}/events", get(session_events))
}

/// Open a session for a viewer and build its candidate queue.
#[utoipa::path(
    post,
    path = "/sessions",
    tag = "sessions",
    request_body = CreateSessionRequest,
    responses(
        (status = 201, description = "Session opened, or the open session of that viewer", body = SessionView),
        (status = 400, description = "Invalid viewer identifier")
    )
)]
pub async fn create_session(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<CreateSessionRequest>>,
) -> Result<(StatusCode, Json<SessionView>), AppError> {
    let view = session_service::open_session(&state, payload.viewer_id).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// Current phase, candidate and feedback of a session.
#[utoipa::path(
    get,
    path = "/sessions/{id}",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Session view", body = SessionView),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn get_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    Ok(Json(session_service::get_session(&state, id).await?))
}

/// The signed-in viewer changed; the queue is rebuilt once no guess is in flight.
#[utoipa::path(
    put,
    path = "/sessions/{id}/viewer",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = UpdateViewerRequest,
    responses(
        (status = 200, description = "Viewer attached", body = SessionView),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn change_viewer(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<UpdateViewerRequest>>,
) -> Result<Json<SessionView>, AppError> {
    Ok(Json(
        session_service::change_viewer(&state, id, payload.viewer_id).await?,
    ))
}

/// Rebuild the queue from a fresh candidate snapshot.
#[utoipa::path(
    post,
    path = "/sessions/{id}/refresh",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Queue rebuilt or rebuild deferred", body = SessionView),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn refresh_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    Ok(Json(session_service::refresh_session(&state, id).await?))
}

/// Release the age slider. A guess made while another one is in flight is ignored.
#[utoipa::path(
    post,
    path = "/sessions/{id}/guesses",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = SubmitGuessRequest,
    responses(
        (status = 200, description = "Guess accepted or ignored", body = SubmitGuessResponse),
        (status = 400, description = "Guess outside 1-100"),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn submit_guess(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<SubmitGuessRequest>>,
) -> Result<Json<SubmitGuessResponse>, AppError> {
    Ok(Json(
        session_service::submit_guess(&state, id, payload.guess).await?,
    ))
}

/// Tear the session down, dropping pending timers and the guess in flight.
#[utoipa::path(
    delete,
    path = "/sessions/{id}",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 204, description = "Session closed"),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn close_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    session_service::close_session(&state, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Stream phase and candidate changes of a session.
#[utoipa::path(
    get,
    path = "/sessions/{id}/events",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Session SSE stream", content_type = "text/event-stream", body = String),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn session_events(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let subscription = sse_service::subscribe_session(&state, id).await?;
    Ok(sse_service::to_sse_stream(subscription))
}
