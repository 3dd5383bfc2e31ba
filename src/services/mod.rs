/// Community aggregate reporting and statistics.
pub mod aggregate_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Profile directory loading and viewer stats persistence.
pub mod profile_service;
/// Per-session tasks and their handles.
pub mod session_service;
/// Server-Sent Events streams of sessions.
pub mod sse_service;
/// Storage connection supervisor with degraded mode.
pub mod storage_supervisor;
