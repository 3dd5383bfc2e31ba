use std::{convert::Infallible, time::Duration};

use async_stream::stream;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dto::{
        session::SessionView,
        sse::{CandidateChangedEvent, Handshake, NoCandidatesEvent, PhaseChangedEvent, ServerEvent},
    },
    error::ServiceError,
    services::session_service::{
        self, EVENT_CANDIDATE, EVENT_CLOSED, EVENT_NO_CANDIDATES, EVENT_PHASE,
    },
    state::SharedState,
};

const EVENT_HANDSHAKE: &str = "handshake";

/// Receiver of a session's events plus the events replaying its current state.
pub struct SessionSubscription {
    session_id: Uuid,
    initial: Vec<ServerEvent>,
    receiver: broadcast::Receiver<ServerEvent>,
}

/// Subscribe to a session's events, starting with a handshake and its current view.
pub async fn subscribe_session(
    state: &SharedState,
    id: Uuid,
) -> Result<SessionSubscription, ServiceError> {
    let handle = session_service::find_session(state, id)?;
    // Subscribe first so nothing emitted after the snapshot is missed.
    let receiver = handle.events().subscribe();
    let view = handle.snapshot().await?;

    let mut initial = Vec::with_capacity(3);
    push_event(
        &mut initial,
        EVENT_HANDSHAKE,
        &Handshake {
            session_id: id,
            degraded: state.is_degraded(),
        },
    );
    initial.extend(current_view_events(&view));

    info!(session_id = %id, "session SSE stream connected");
    Ok(SessionSubscription {
        session_id: id,
        initial,
        receiver,
    })
}

/// Replay `view` as the events a subscriber would have seen.
fn current_view_events(view: &SessionView) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    push_event(
        &mut events,
        EVENT_PHASE,
        &PhaseChangedEvent {
            session_id: view.id,
            phase: view.phase,
            reveal: view.reveal,
            feedback: view.feedback.clone(),
        },
    );
    if let Some(candidate) = &view.candidate {
        push_event(
            &mut events,
            EVENT_CANDIDATE,
            &CandidateChangedEvent {
                session_id: view.id,
                candidate: candidate.clone(),
                position: view.position,
                queue_length: view.queue_length,
            },
        );
    }
    if view.no_candidates {
        push_event(
            &mut events,
            EVENT_NO_CANDIDATES,
            &NoCandidatesEvent {
                session_id: view.id,
                viewer_id: view.viewer_id.clone(),
            },
        );
    }
    events
}

fn push_event<T: Serialize>(events: &mut Vec<ServerEvent>, name: &str, payload: &T) {
    match ServerEvent::json(Some(name.to_owned()), payload) {
        Ok(event) => events.push(event),
        Err(err) => warn!(event = name, error = %err, "failed to serialise replayed event"),
    }
}

fn to_event(payload: ServerEvent) -> Event {
    let event = Event::default().data(payload.data);
    match payload.event {
        Some(name) => event.event(name),
        None => event,
    }
}

/// Turn a subscription into an SSE response that ends once the session is closed.
pub fn to_sse_stream(
    subscription: SessionSubscription,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let SessionSubscription {
        session_id,
        initial,
        mut receiver,
    } = subscription;
    let events = stream! {
        for payload in initial {
            yield Ok(to_event(payload));
        }
        loop {
            match receiver.recv().await {
                Ok(payload) => {
                    let closed = payload.event.as_deref() == Some(EVENT_CLOSED);
                    yield Ok(to_event(payload));
                    if closed {
                        break;
                    }
                }
                Err(RecvError::Closed) => break,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(%session_id, skipped, "session SSE subscriber lagged");
                }
            }
        }
        info!(%session_id, "session SSE stream disconnected");
    };

    Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
