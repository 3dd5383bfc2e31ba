use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;
use validator::ValidationErrors;

use crate::dao::storage::StorageError;

/// Failures of session, statistics and profile operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The aggregate store rejected or dropped the request.
    #[error("aggregate store unavailable")]
    Unavailable(#[source] StorageError),
    /// No aggregate store is connected.
    #[error("aggregate store not connected (degraded mode)")]
    Degraded,
    /// No open session has this identifier.
    #[error("session `{0}` not found")]
    SessionNotFound(Uuid),
    /// The session task stopped before answering.
    #[error("session `{0}` is closed")]
    SessionClosed(Uuid),
    /// Request data the engine cannot use.
    #[error("rejected input: {0}")]
    InvalidInput(String),
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}

/// Errors returned by HTTP handlers.
#[derive(Debug, Error)]
pub enum AppError {
    /// 400, the payload failed validation.
    #[error("invalid request: {0}")]
    BadRequest(String),
    /// 404, no such session.
    #[error("{0}")]
    NotFound(String),
    /// 410, the session task already stopped.
    #[error("{0}")]
    Gone(String),
    /// 503, community data cannot be reached.
    #[error("unavailable: {0}")]
    ServiceUnavailable(String),
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {err}"))
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Degraded => AppError::ServiceUnavailable("degraded mode".into()),
            err @ ServiceError::SessionNotFound(_) => AppError::NotFound(err.to_string()),
            err @ ServiceError::SessionClosed(_) => AppError::Gone(err.to_string()),
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Gone(_) => StatusCode::GONE,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_errors_map_to_http_statuses() {
        let id = Uuid::new_v4();
        let cases = [
            (ServiceError::SessionNotFound(id), StatusCode::NOT_FOUND),
            (ServiceError::SessionClosed(id), StatusCode::GONE),
            (ServiceError::Degraded, StatusCode::SERVICE_UNAVAILABLE),
            (
                ServiceError::InvalidInput("viewer".into()),
                StatusCode::BAD_REQUEST,
            ),
        ];

        for (error, expected) in cases {
            let response = AppError::from(error).into_response();
            assert_eq!(response.status(), expected);
        }
    }
}
