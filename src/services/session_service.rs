//! One tokio task per guess session.
//!
//! The task owns the [`GuessSession`] and its [`TransitionScheduler`]; HTTP handlers
//! talk to it through [`SessionHandle`], and timer expiry is just another branch of
//! the task's `select!`, so every state change of a session happens on one task.
//!
//! A viewer is bound to at most one open session, which keeps a single guess in
//! flight per viewer across the whole service.

use std::{ops::ControlFlow, sync::Arc, time::Duration};

use dashmap::mapref::entry::Entry;
use serde::Serialize;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::{Instant, sleep_until},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::{
        session::{
            CandidateView, GuessFeedback, GuessResult, RevealStepView, SessionPhase, SessionView,
            SubmitGuessResponse,
        },
        sse::{
            CandidateChangedEvent, NoCandidatesEvent, PhaseChangedEvent, ServerEvent,
            SessionClosedEvent,
        },
    },
    error::ServiceError,
    services::aggregate_service::GuessReporter,
    state::{
        SharedState, SseHub,
        directory::{CandidateProvider, ViewerStatsSink},
        game::{CandidateId, ViewerId},
        scheduler::TransitionScheduler,
        session::{GuessReport, GuessSession, GuessTimings, RebuildOutcome, SubmitOutcome, TimerOutcome},
    },
};

const COMMAND_BUFFER: usize = 32;
const EVENT_BUFFER: usize = 64;

/// SSE event sent when the pipeline or reveal phase changes.
pub const EVENT_PHASE: &str = "session.phase";
/// SSE event sent when a new candidate is on screen.
pub const EVENT_CANDIDATE: &str = "session.candidate";
/// SSE event sent when nobody is left to guess.
pub const EVENT_NO_CANDIDATES: &str = "session.no_candidates";
/// SSE event sent when the session is torn down.
pub const EVENT_CLOSED: &str = "session.closed";

/// Collaborators a session talks to.
#[derive(Clone)]
pub struct SessionPorts {
    /// Source of guessable candidates.
    pub provider: Arc<dyn CandidateProvider>,
    /// Local viewer totals.
    pub sink: Arc<dyn ViewerStatsSink>,
    /// Remote community aggregate.
    pub reporter: Arc<dyn GuessReporter>,
}

impl SessionPorts {
    /// Ports backed by the application state.
    pub fn from_state(state: &SharedState) -> Self {
        Self {
            provider: state.clone(),
            sink: state.clone(),
            reporter: state.clone(),
        }
    }
}

enum SessionCommand {
    SetViewer {
        viewer_id: ViewerId,
        reply: oneshot::Sender<SessionView>,
    },
    Refresh {
        reply: oneshot::Sender<SessionView>,
    },
    Submit {
        guess: i64,
        reply: oneshot::Sender<SubmitGuessResponse>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionView>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable handle to a running session task.
#[derive(Clone)]
pub struct SessionHandle {
    id: Uuid,
    commands: mpsc::Sender<SessionCommand>,
    events: Arc<SseHub>,
}

impl SessionHandle {
    /// Start a session task with no viewer attached.
    pub fn spawn(timings: GuessTimings, ports: SessionPorts) -> Self {
        Self::launch(timings, ports).0
    }

    /// Start a session task; the join handle yields the viewer attached when it stopped.
    fn launch(timings: GuessTimings, ports: SessionPorts) -> (Self, JoinHandle<Option<ViewerId>>) {
        let idle_timeout = timings.session_idle;
        let session = GuessSession::new(timings);
        let id = session.id();
        let (commands, receiver) = mpsc::channel(COMMAND_BUFFER);
        let events = Arc::new(SseHub::new(EVENT_BUFFER));

        let actor = SessionActor {
            session,
            scheduler: TransitionScheduler::new(),
            ports,
            events: events.clone(),
            commands: receiver,
            idle_timeout,
            round: 0,
        };
        let task = tokio::spawn(actor.run());

        let handle = Self {
            id,
            commands,
            events,
        };
        (handle, task)
    }

    /// Session identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Hub carrying the session's SSE events.
    pub fn events(&self) -> &SseHub {
        &self.events
    }

    /// Attach a viewer, rebuilding the queue unless a guess is in flight.
    pub async fn set_viewer(&self, viewer_id: ViewerId) -> Result<SessionView, ServiceError> {
        self.request(|reply| SessionCommand::SetViewer { viewer_id, reply })
            .await
    }

    /// Rebuild the queue for the current viewer.
    pub async fn refresh(&self) -> Result<SessionView, ServiceError> {
        self.request(|reply| SessionCommand::Refresh { reply }).await
    }

    /// Release the slider at `guess`.
    pub async fn submit(&self, guess: i64) -> Result<SubmitGuessResponse, ServiceError> {
        self.request(|reply| SessionCommand::Submit { guess, reply })
            .await
    }

    /// Current view of the session.
    pub async fn snapshot(&self) -> Result<SessionView, ServiceError> {
        self.request(|reply| SessionCommand::Snapshot { reply }).await
    }

    /// Cancel pending timers, drop the guess in flight and stop the task.
    pub async fn close(&self) -> Result<(), ServiceError> {
        self.request(|reply| SessionCommand::Close { reply }).await
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, ServiceError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| ServiceError::SessionClosed(self.id))?;
        response
            .await
            .map_err(|_| ServiceError::SessionClosed(self.id))
    }
}

/// What subscribers have been told so far.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Observed {
    phase: SessionPhase,
    reveal: RevealStepView,
    candidate: Option<CandidateId>,
    no_candidates: bool,
    round: u64,
}

struct SessionActor {
    session: GuessSession,
    scheduler: TransitionScheduler,
    ports: SessionPorts,
    events: Arc<SseHub>,
    commands: mpsc::Receiver<SessionCommand>,
    idle_timeout: Duration,
    /// Bumped whenever a new candidate round starts, even if the same profile returns.
    round: u64,
}

impl SessionActor {
    async fn run(mut self) -> Option<ViewerId> {
        let session_id = self.session.id();
        info!(%session_id, "session started");
        let mut idle_deadline = Instant::now() + self.idle_timeout;

        loop {
            tokio::select! {
                biased;
                ticket = self.scheduler.fired() => self.on_timer(ticket),
                command = self.commands.recv() => {
                    idle_deadline = Instant::now() + self.idle_timeout;
                    let Some(command) = command else {
                        self.close();
                        break;
                    };
                    if self.handle(command).is_break() {
                        break;
                    }
                }
                _ = sleep_until(idle_deadline) => {
                    if self.is_watched() {
                        idle_deadline = Instant::now() + self.idle_timeout;
                    } else {
                        info!(%session_id, "closing idle session");
                        self.close();
                        break;
                    }
                }
            }
        }

        info!(%session_id, "session stopped");
        self.session.viewer_id().map(str::to_owned)
    }

    /// Someone streams the session's events or a guess still has to settle.
    fn is_watched(&self) -> bool {
        self.events.subscriber_count() > 0 || self.session.phase().is_in_flight()
    }

    fn handle(&mut self, command: SessionCommand) -> ControlFlow<()> {
        let before = self.observe();
        match command {
            SessionCommand::SetViewer { viewer_id, reply } => {
                let outcome = self
                    .session
                    .set_viewer(viewer_id, self.ports.provider.as_ref());
                self.on_rebuild(outcome);
                self.publish_changes(&before);
                let _ = reply.send(self.view());
            }
            SessionCommand::Refresh { reply } => {
                let outcome = self.session.refresh(self.ports.provider.as_ref());
                self.on_rebuild(outcome);
                self.publish_changes(&before);
                let _ = reply.send(self.view());
            }
            SessionCommand::Submit { guess, reply } => {
                let response = self.submit(guess);
                self.publish_changes(&before);
                let _ = reply.send(response);
            }
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(self.view());
            }
            SessionCommand::Close { reply } => {
                self.close();
                let _ = reply.send(());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn submit(&mut self, guess: i64) -> SubmitGuessResponse {
        match self.session.submit(guess, self.ports.sink.as_ref()) {
            SubmitOutcome::Accepted(accepted) => {
                self.scheduler.arm(accepted.timer);
                info!(
                    session_id = %self.session.id(),
                    candidate_id = %accepted.report.candidate_id,
                    guess = accepted.guess.guess,
                    difference = accepted.difference,
                    points = accepted.points,
                    "guess accepted"
                );
                self.dispatch_report(accepted.report.clone());
                SubmitGuessResponse::Accepted {
                    result: GuessResult::from(accepted.as_ref()),
                    session: self.view(),
                }
            }
            SubmitOutcome::Ignored(reason) => SubmitGuessResponse::Ignored {
                reason: reason.into(),
                session: self.view(),
            },
        }
    }

    /// Fire-and-forget: the session never waits on the remote aggregate.
    fn dispatch_report(&self, report: GuessReport) {
        let session_id = self.session.id();
        let candidate_id = report.candidate_id.clone();
        let pending = self.ports.reporter.report_guess(report);
        tokio::spawn(async move {
            if let Err(err) = pending.await {
                warn!(
                    %session_id,
                    %candidate_id,
                    error = %err,
                    "failed to record guess in the community aggregate"
                );
            }
        });
    }

    fn on_timer(&mut self, ticket: u64) {
        let before = self.observe();
        match self.session.on_timer(ticket, self.ports.provider.as_ref()) {
            TimerOutcome::Stale => {
                debug!(session_id = %self.session.id(), ticket, "stale timer ignored")
            }
            TimerOutcome::Rearm(request) => self.scheduler.arm(request),
            TimerOutcome::Settled(advance) => {
                self.round += 1;
                debug!(session_id = %self.session.id(), ?advance, "guess settled");
            }
        }
        self.publish_changes(&before);
    }

    fn on_rebuild(&mut self, outcome: RebuildOutcome) {
        match outcome {
            RebuildOutcome::Rebuilt(candidates) => {
                self.round += 1;
                debug!(session_id = %self.session.id(), candidates, "queue rebuilt");
            }
            RebuildOutcome::Deferred => {
                debug!(session_id = %self.session.id(), "rebuild deferred until the guess settles")
            }
            RebuildOutcome::Unchanged | RebuildOutcome::NoViewer => {}
        }
    }

    fn close(&mut self) {
        self.scheduler.cancel();
        self.session.cancel();
        self.emit(
            EVENT_CLOSED,
            &SessionClosedEvent {
                session_id: self.session.id(),
            },
        );
    }

    fn view(&self) -> SessionView {
        SessionView::from(&self.session)
    }

    fn observe(&self) -> Observed {
        Observed {
            phase: self.session.phase().into(),
            reveal: self.session.reveal_phase().into(),
            candidate: self
                .session
                .displayed_candidate()
                .map(|candidate| candidate.id.clone()),
            no_candidates: self.session.has_no_candidates(),
            round: self.round,
        }
    }

    fn publish_changes(&self, before: &Observed) {
        let after = self.observe();
        let session_id = self.session.id();

        if after.phase != before.phase || after.reveal != before.reveal {
            self.emit(
                EVENT_PHASE,
                &PhaseChangedEvent {
                    session_id,
                    phase: after.phase,
                    reveal: after.reveal,
                    feedback: GuessFeedback::for_phase(self.session.phase()),
                },
            );
        }

        if let Some(candidate) = self.session.displayed_candidate() {
            if after.candidate != before.candidate || after.round != before.round {
                self.emit(
                    EVENT_CANDIDATE,
                    &CandidateChangedEvent {
                        session_id,
                        candidate: CandidateView::from(candidate.as_ref()),
                        position: self.session.queue().position(),
                        queue_length: self.session.queue().len(),
                    },
                );
            }
        }

        if after.no_candidates && (!before.no_candidates || after.round != before.round) {
            self.emit(
                EVENT_NO_CANDIDATES,
                &NoCandidatesEvent {
                    session_id,
                    viewer_id: self.session.viewer_id().map(str::to_owned),
                },
            );
        }
    }

    fn emit<T: Serialize>(&self, name: &str, payload: &T) {
        match ServerEvent::json(Some(name.to_owned()), payload) {
            Ok(event) => self.events.broadcast(event),
            Err(err) => warn!(event = name, error = %err, "failed to serialise session event"),
        }
    }
}

/// Handle of an open session.
pub fn find_session(state: &SharedState, id: Uuid) -> Result<SessionHandle, ServiceError> {
    state
        .sessions()
        .get(&id)
        .map(|entry| entry.value().clone())
        .ok_or(ServiceError::SessionNotFound(id))
}

/// Open session bound to `viewer_id`, if any.
fn viewer_session(state: &SharedState, viewer_id: &str) -> Option<SessionHandle> {
    let id = *state.viewer_sessions().get(viewer_id)?;
    find_session(state, id).ok()
}

/// Start a session task and register it; the registration is dropped once the task stops.
fn spawn_session(state: &SharedState) -> SessionHandle {
    let (handle, task) = SessionHandle::launch(state.timings(), SessionPorts::from_state(state));
    let id = handle.id();
    state.sessions().insert(id, handle.clone());

    let state = state.clone();
    tokio::spawn(async move {
        let viewer_id = task.await.ok().flatten();
        forget_session(&state, id, viewer_id.as_deref());
    });
    handle
}

fn forget_session(state: &SharedState, id: Uuid, viewer_id: Option<&str>) {
    state.sessions().remove(&id);
    if let Some(viewer_id) = viewer_id {
        state
            .viewer_sessions()
            .remove_if(viewer_id, |_, bound| *bound == id);
    }
}

/// Open a session for `viewer_id` and build its queue.
///
/// A viewer who already has an open session gets that session back.
pub async fn open_session(
    state: &SharedState,
    viewer_id: ViewerId,
) -> Result<SessionView, ServiceError> {
    if let Some(existing) = viewer_session(state, &viewer_id) {
        if let Ok(view) = existing.snapshot().await {
            debug!(session_id = %existing.id(), %viewer_id, "viewer already has a session");
            return Ok(view);
        }
    }

    let handle = spawn_session(state);
    let bound_elsewhere = match state.viewer_sessions().entry(viewer_id.clone()) {
        Entry::Occupied(entry) if state.sessions().contains_key(entry.get()) => {
            Some(*entry.get())
        }
        Entry::Occupied(mut entry) => {
            entry.insert(handle.id());
            None
        }
        Entry::Vacant(entry) => {
            entry.insert(handle.id());
            None
        }
    };

    if let Some(other) = bound_elsewhere {
        // A concurrent request bound the viewer first.
        state.sessions().remove(&handle.id());
        let _ = handle.close().await;
        return get_session(state, other).await;
    }
    handle.set_viewer(viewer_id).await
}

/// Current view of a session.
pub async fn get_session(state: &SharedState, id: Uuid) -> Result<SessionView, ServiceError> {
    find_session(state, id)?.snapshot().await
}

/// Attach another viewer to a session, closing any other session of that viewer.
pub async fn change_viewer(
    state: &SharedState,
    id: Uuid,
    viewer_id: ViewerId,
) -> Result<SessionView, ServiceError> {
    let handle = find_session(state, id)?;
    let previous_viewer = handle.snapshot().await?.viewer_id;

    let replaced = state.viewer_sessions().insert(viewer_id.clone(), id);
    if let Some(other) = replaced.filter(|other| *other != id) {
        if let Some((_, other_handle)) = state.sessions().remove(&other) {
            info!(session_id = %other, %viewer_id, "viewer moved to another session; closing");
            let _ = other_handle.close().await;
        }
    }

    let view = handle.set_viewer(viewer_id.clone()).await?;
    if let Some(previous) = previous_viewer.filter(|previous| *previous != viewer_id) {
        state
            .viewer_sessions()
            .remove_if(&previous, |_, bound| *bound == id);
    }
    Ok(view)
}

/// Rebuild a session's queue from a fresh candidate snapshot.
pub async fn refresh_session(state: &SharedState, id: Uuid) -> Result<SessionView, ServiceError> {
    find_session(state, id)?.refresh().await
}

/// Submit a guess to a session.
pub async fn submit_guess(
    state: &SharedState,
    id: Uuid,
    guess: i64,
) -> Result<SubmitGuessResponse, ServiceError> {
    find_session(state, id)?.submit(guess).await
}

/// Tear a session down. Its viewer binding is released once the task has stopped.
pub async fn close_session(state: &SharedState, id: Uuid) -> Result<(), ServiceError> {
    let (_, handle) = state
        .sessions()
        .remove(&id)
        .ok_or(ServiceError::SessionNotFound(id))?;
    handle.close().await
}

/// Ask every open session to rebuild, e.g. after new profiles were loaded.
pub async fn refresh_all(state: &SharedState) {
    let handles: Vec<SessionHandle> = state
        .sessions()
        .iter()
        .map(|entry| entry.value().clone())
        .collect();

    for handle in handles {
        if let Err(err) = handle.refresh().await {
            debug!(session_id = %handle.id(), error = %err, "session refresh skipped");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Mutex, time::Duration};

    use futures::future::{self, BoxFuture};
    use tokio::{sync::broadcast, time::sleep};

    use super::*;
    use crate::{
        dao::{models::ProfileEntity, storage::StorageError},
        dto::session::IgnoredReason,
        services::profile_service,
        state::{AppState, game::Candidate},
    };

    #[derive(Default)]
    struct FixedProvider {
        candidates: Mutex<Vec<Arc<Candidate>>>,
    }

    impl FixedProvider {
        fn with_ages(ages: &[u8]) -> Arc<Self> {
            let provider = Arc::new(Self::default());
            *provider.candidates.lock().unwrap() = ages
                .iter()
                .enumerate()
                .map(|(index, age)| {
                    Arc::new(Candidate {
                        id: format!("c{index}"),
                        photo: format!("https://img/{index}.jpg"),
                        actual_age: *age,
                        display_name: Some(format!("Candidate {index}")),
                    })
                })
                .collect();
            provider
        }
    }

    impl CandidateProvider for FixedProvider {
        fn available_candidates(&self, _viewer_id: &str) -> Vec<Arc<Candidate>> {
            self.candidates.lock().unwrap().clone()
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        outcomes: Mutex<Vec<(String, u8)>>,
    }

    impl ViewerStatsSink for RecordingSink {
        fn apply_guess_outcome(&self, viewer_id: &str, points: u8, _: &Candidate, _: u8) {
            self.outcomes
                .lock()
                .unwrap()
                .push((viewer_id.to_owned(), points));
        }
    }

    #[derive(Default)]
    struct RecordingReporter {
        reports: Mutex<Vec<GuessReport>>,
        fail: bool,
    }

    impl GuessReporter for RecordingReporter {
        fn report_guess(
            &self,
            report: GuessReport,
        ) -> BoxFuture<'static, Result<(), ServiceError>> {
            self.reports.lock().unwrap().push(report);
            let result = if self.fail {
                Err(ServiceError::Unavailable(StorageError::unavailable(
                    "store offline".into(),
                    std::io::Error::other("connection refused"),
                )))
            } else {
                Ok(())
            };
            Box::pin(future::ready(result))
        }
    }

    struct Harness {
        handle: SessionHandle,
        sink: Arc<RecordingSink>,
        reporter: Arc<RecordingReporter>,
    }

    async fn start(ages: &[u8], failing_store: bool) -> Harness {
        let sink = Arc::new(RecordingSink::default());
        let reporter = Arc::new(RecordingReporter {
            fail: failing_store,
            ..Default::default()
        });
        let handle = SessionHandle::spawn(
            GuessTimings::default(),
            SessionPorts {
                provider: FixedProvider::with_ages(ages),
                sink: sink.clone(),
                reporter: reporter.clone(),
            },
        );
        handle.set_viewer("viewer".into()).await.unwrap();
        Harness {
            handle,
            sink,
            reporter,
        }
    }

    fn accepted(response: SubmitGuessResponse) -> (GuessResult, SessionView) {
        match response {
            SubmitGuessResponse::Accepted { result, session } => (result, session),
            other => panic!("expected an accepted guess, got {other:?}"),
        }
    }

    fn drain(receiver: &mut broadcast::Receiver<ServerEvent>) -> Vec<String> {
        let mut names = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            names.extend(event.event);
        }
        names
    }

    #[tokio::test(start_paused = true)]
    async fn exact_guess_plays_the_reveal_then_advances() {
        let harness = start(&[34, 34], false).await;

        let (result, view) = accepted(harness.handle.submit(34).await.unwrap());
        assert_eq!(result.points, 10);
        assert_eq!(result.difference, 0);
        assert_eq!(view.phase, SessionPhase::ExactMatchReveal);
        assert_eq!(view.reveal, RevealStepView::FadingOutProfile);
        assert_eq!(view.position, 0);

        sleep(Duration::from_millis(299)).await;
        let view = harness.handle.snapshot().await.unwrap();
        assert_eq!(view.reveal, RevealStepView::FadingOutProfile);

        sleep(Duration::from_millis(2)).await;
        let view = harness.handle.snapshot().await.unwrap();
        assert_eq!(view.reveal, RevealStepView::ShowingBrand);

        sleep(Duration::from_millis(700)).await;
        let view = harness.handle.snapshot().await.unwrap();
        assert_eq!(view.reveal, RevealStepView::ShowingBrandWithSuffix);
        assert_eq!(view.phase, SessionPhase::ExactMatchReveal);

        sleep(Duration::from_millis(1500)).await;
        let view = harness.handle.snapshot().await.unwrap();
        assert_eq!(view.phase, SessionPhase::Idle);
        assert_eq!(view.reveal, RevealStepView::Idle);
        assert_eq!(view.position, 1);

        assert_eq!(harness.sink.outcomes.lock().unwrap().len(), 1);
        assert_eq!(harness.reporter.reports.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn close_miss_shows_the_difference_for_a_while() {
        let harness = start(&[34, 34], false).await;

        let (result, view) = accepted(harness.handle.submit(32).await.unwrap());
        assert_eq!(result.difference, 2);
        assert_eq!(result.points, 7);
        assert_eq!(view.phase, SessionPhase::CloseMissFeedback);
        assert_eq!(view.feedback, Some(GuessFeedback::CloseMiss { difference: 2 }));

        sleep(Duration::from_millis(1499)).await;
        let view = harness.handle.snapshot().await.unwrap();
        assert_eq!(view.phase, SessionPhase::CloseMissFeedback);

        sleep(Duration::from_millis(2)).await;
        let view = harness.handle.snapshot().await.unwrap();
        assert_eq!(view.phase, SessionPhase::Idle);
        assert_eq!(view.feedback, None);
        assert_eq!(view.position, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn wide_miss_moves_on_silently() {
        let harness = start(&[34, 34], false).await;

        let (result, view) = accepted(harness.handle.submit(50).await.unwrap());
        assert_eq!(result.points, 0);
        assert_eq!(view.phase, SessionPhase::WideMissSilent);
        assert_eq!(view.feedback, None);

        sleep(Duration::from_millis(499)).await;
        assert_eq!(
            harness.handle.snapshot().await.unwrap().phase,
            SessionPhase::WideMissSilent
        );

        sleep(Duration::from_millis(2)).await;
        let view = harness.handle.snapshot().await.unwrap();
        assert_eq!(view.phase, SessionPhase::Idle);
        assert_eq!(view.position, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn second_guess_while_in_flight_is_ignored() {
        let harness = start(&[34, 34], false).await;

        accepted(harness.handle.submit(34).await.unwrap());
        match harness.handle.submit(40).await.unwrap() {
            SubmitGuessResponse::Ignored { reason, session } => {
                assert_eq!(reason, IgnoredReason::GuessInFlight);
                assert_eq!(session.phase, SessionPhase::ExactMatchReveal);
            }
            other => panic!("expected the second guess to be ignored, got {other:?}"),
        }

        assert_eq!(harness.sink.outcomes.lock().unwrap().len(), 1);
        assert_eq!(harness.reporter.reports.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_queue_is_a_terminal_view() {
        let harness = start(&[], false).await;

        let view = harness.handle.snapshot().await.unwrap();
        assert!(view.no_candidates);
        assert_eq!(view.candidate, None);

        match harness.handle.submit(30).await.unwrap() {
            SubmitGuessResponse::Ignored { reason, .. } => {
                assert_eq!(reason, IgnoredReason::NoCandidate)
            }
            other => panic!("expected an ignored guess, got {other:?}"),
        }
        assert!(harness.sink.outcomes.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failing_store_does_not_block_the_session() {
        let harness = start(&[34, 34], true).await;

        accepted(harness.handle.submit(31).await.unwrap());
        sleep(Duration::from_millis(1501)).await;

        let view = harness.handle.snapshot().await.unwrap();
        assert_eq!(view.phase, SessionPhase::Idle);
        assert_eq!(
            harness.sink.outcomes.lock().unwrap().as_slice(),
            &[("viewer".to_owned(), 5)]
        );
        assert_eq!(harness.reporter.reports.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn viewer_change_waits_for_the_guess_to_settle() {
        let harness = start(&[34, 34], false).await;

        accepted(harness.handle.submit(50).await.unwrap());
        let view = harness.handle.set_viewer("other".into()).await.unwrap();
        assert_eq!(view.phase, SessionPhase::WideMissSilent);
        assert_eq!(view.viewer_id.as_deref(), Some("other"));

        sleep(Duration::from_millis(501)).await;
        let view = harness.handle.snapshot().await.unwrap();
        assert_eq!(view.phase, SessionPhase::Idle);
        assert_eq!(view.position, 0);
        assert_eq!(view.queue_length, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn events_follow_the_pipeline() {
        let harness = start(&[34, 34], false).await;
        let mut events = harness.handle.events().subscribe();

        accepted(harness.handle.submit(33).await.unwrap());
        assert_eq!(drain(&mut events), vec![EVENT_PHASE]);

        sleep(Duration::from_millis(1501)).await;
        assert_eq!(drain(&mut events), vec![EVENT_PHASE, EVENT_CANDIDATE]);

        harness.handle.close().await.unwrap();
        assert_eq!(drain(&mut events), vec![EVENT_CLOSED]);
    }

    #[tokio::test(start_paused = true)]
    async fn closing_cancels_the_pending_timer() {
        let harness = start(&[34, 34], false).await;

        accepted(harness.handle.submit(34).await.unwrap());
        harness.handle.close().await.unwrap();

        assert!(matches!(
            harness.handle.snapshot().await,
            Err(ServiceError::SessionClosed(_))
        ));
        sleep(Duration::from_secs(5)).await;
        assert_eq!(harness.reporter.reports.lock().unwrap().len(), 1);
    }

    fn state_with_bob() -> SharedState {
        let state = AppState::new(GuessTimings::default());
        profile_service::seed_profiles(
            &state,
            vec![ProfileEntity {
                id: "bob".into(),
                display_name: None,
                photo: "https://img/bob.jpg".into(),
                age: Some(41),
            }],
        );
        state
    }

    async fn settle() {
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn idle_session_is_closed_and_forgotten() {
        let state = state_with_bob();
        let view = open_session(&state, "alice".into()).await.unwrap();

        let idle = GuessTimings::default().session_idle;
        sleep(idle - Duration::from_secs(1)).await;
        assert!(state.sessions().contains_key(&view.id));

        sleep(Duration::from_secs(2)).await;
        settle().await;
        assert!(state.sessions().is_empty());
        assert!(state.viewer_sessions().is_empty());
        assert!(matches!(
            get_session(&state, view.id).await,
            Err(ServiceError::SessionNotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn watched_session_stays_open_until_the_stream_goes_away() {
        let state = state_with_bob();
        let view = open_session(&state, "alice".into()).await.unwrap();
        let events = find_session(&state, view.id).unwrap().events().subscribe();

        let idle = GuessTimings::default().session_idle;
        sleep(idle + Duration::from_secs(1)).await;
        assert!(get_session(&state, view.id).await.is_ok());

        drop(events);
        sleep(idle + Duration::from_secs(1)).await;
        settle().await;
        assert!(state.sessions().is_empty());
        assert!(state.viewer_sessions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn same_viewer_reuses_its_session() {
        let state = state_with_bob();
        let first = open_session(&state, "alice".into()).await.unwrap();
        let second = open_session(&state, "alice".into()).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(state.sessions().len(), 1);

        accepted(submit_guess(&state, first.id, 41).await.unwrap());
        match submit_guess(&state, second.id, 41).await.unwrap() {
            SubmitGuessResponse::Ignored { reason, .. } => {
                assert_eq!(reason, IgnoredReason::GuessInFlight)
            }
            other => panic!("expected the second guess to be ignored, got {other:?}"),
        }
        assert_eq!(state.directory().viewer_stats("alice").games_played, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn moving_a_viewer_closes_their_other_session() {
        let state = state_with_bob();
        let first = open_session(&state, "alice".into()).await.unwrap();
        let second = open_session(&state, "carol".into()).await.unwrap();
        assert_ne!(first.id, second.id);

        accepted(submit_guess(&state, first.id, 41).await.unwrap());
        let view = change_viewer(&state, second.id, "alice".into()).await.unwrap();
        assert_eq!(view.viewer_id.as_deref(), Some("alice"));
        assert!(view.no_candidates);

        assert!(matches!(
            submit_guess(&state, first.id, 41).await,
            Err(ServiceError::SessionNotFound(_))
        ));
        match submit_guess(&state, second.id, 41).await.unwrap() {
            SubmitGuessResponse::Ignored { reason, .. } => {
                assert_eq!(reason, IgnoredReason::NoCandidate)
            }
            other => panic!("expected the guess to be ignored, got {other:?}"),
        }
        assert_eq!(state.directory().viewer_stats("alice").games_played, 1);

        settle().await;
        assert_eq!(
            state.viewer_sessions().get("alice").map(|bound| *bound),
            Some(second.id)
        );
        assert!(state.viewer_sessions().get("carol").is_none());
    }
}
