use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dto::session::{CandidateView, GuessFeedback, RevealStepView, SessionPhase};

#[derive(Clone, Debug)]
/// Payload carried across SSE channels.
pub struct ServerEvent {
    /// SSE `event:` name.
    pub event: Option<String>,
    /// Serialized data field.
    pub data: String,
}

impl ServerEvent {
    /// Serialise `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
/// Broadcast whenever the pipeline or reveal phase changes.
pub struct PhaseChangedEvent {
    /// Session the event belongs to.
    pub session_id: Uuid,
    /// New pipeline phase.
    pub phase: SessionPhase,
    /// Current reveal step.
    pub reveal: RevealStepView,
    /// Feedback displayed in this phase.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<GuessFeedback>,
}

#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
/// Broadcast when a new candidate is put on screen.
pub struct CandidateChangedEvent {
    /// Session the event belongs to.
    pub session_id: Uuid,
    /// Candidate now displayed.
    pub candidate: CandidateView,
    /// Zero-based position in the queue.
    pub position: usize,
    /// Number of candidates in the queue.
    pub queue_length: usize,
}

#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
/// Broadcast when the queue came back empty.
pub struct NoCandidatesEvent {
    /// Session the event belongs to.
    pub session_id: Uuid,
    /// Viewer who has nobody left to guess.
    pub viewer_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
/// Broadcast once when the session is torn down.
pub struct SessionClosedEvent {
    /// Session that was closed.
    pub session_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
/// Sent to an SSE client right after it subscribes.
pub struct Handshake {
    /// Session the stream follows.
    pub session_id: Uuid,
    /// Whether remote storage is currently unavailable.
    pub degraded: bool,
}
