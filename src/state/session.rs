//! Guess session core: the queue, the submission pipeline and the reveal machine of
//! one viewer session, driven synchronously.
//!
//! The core never sleeps and never performs I/O. It asks its owner to arm timers
//! ([`TimerRequest`]) and to report accepted guesses to remote storage
//! ([`AcceptedGuess::report`]); the owner hands fired timers back through
//! [`GuessSession::on_timer`].

use std::{sync::Arc, time::Duration};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dao::models::GuessLogEntity,
    state::{
        directory::{CandidateProvider, ViewerStatsSink},
        game::{Candidate, CandidateId, GuessSnapshot, ViewerId},
        queue::{Advance, SessionQueue},
        reveal::{RevealMachine, RevealPhase, RevealStep, RevealTimings},
        scheduler::TimerRequest,
        state_machine::{GuessEvent, GuessPhase, GuessStateMachine},
    },
};

/// Delays used by the submission pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuessTimings {
    /// How long the difference stays on screen after a close miss.
    pub close_miss_feedback: Duration,
    /// Pause before moving on after a wide miss.
    pub wide_miss_delay: Duration,
    /// Reveal animation phases after an exact match.
    pub reveal: RevealTimings,
    /// A session nobody sent a command to or watched for this long is closed.
    pub session_idle: Duration,
}

impl Default for GuessTimings {
    fn default() -> Self {
        Self {
            close_miss_feedback: Duration::from_millis(1500),
            wide_miss_delay: Duration::from_millis(500),
            reveal: RevealTimings::default(),
            session_idle: Duration::from_secs(10 * 60),
        }
    }
}

/// Remote aggregate update requested for an accepted guess.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuessReport {
    /// Candidate whose aggregate must be incremented.
    pub candidate_id: CandidateId,
    /// Entry appended to the candidate's guess log.
    pub entry: GuessLogEntity,
}

/// Everything the owner must do after a guess was accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedGuess {
    /// Latched guess.
    pub guess: GuessSnapshot,
    /// Distance to the true age.
    pub difference: u8,
    /// Points credited to the viewer.
    pub points: u8,
    /// Fire-and-forget remote update.
    pub report: GuessReport,
    /// Timer that ends the feedback or drives the first reveal step.
    pub timer: TimerRequest,
}

/// Why a submission was dropped. Never an error for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Another guess is still in flight.
    InFlight,
    /// There is no candidate on screen.
    NoCandidate,
}

/// Result of [`GuessSession::submit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The guess was latched, scored and applied locally.
    Accepted(Box<AcceptedGuess>),
    /// The guess was dropped.
    Ignored(IgnoreReason),
}

/// Result of a rebuild request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildOutcome {
    /// The queue was rebuilt with this many candidates.
    Rebuilt(usize),
    /// A guess is in flight; the rebuild runs once it settles.
    Deferred,
    /// Same viewer as before; nothing to do.
    Unchanged,
    /// No viewer is attached to the session yet.
    NoViewer,
}

/// Result of [`GuessSession::on_timer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerOutcome {
    /// The ticket belongs to an earlier phase; nothing changed.
    Stale,
    /// The reveal moved on; arm this timer next.
    Rearm(TimerRequest),
    /// The guess settled: the queue moved and the lock is released.
    Settled(Advance),
}

/// Synchronous core of one viewer session.
#[derive(Debug)]
pub struct GuessSession {
    id: Uuid,
    viewer_id: Option<ViewerId>,
    queue: SessionQueue,
    machine: GuessStateMachine,
    reveal: RevealMachine,
    timings: GuessTimings,
    deferred_rebuild: bool,
}

impl GuessSession {
    /// New session with no viewer attached.
    pub fn new(timings: GuessTimings) -> Self {
        Self {
            id: Uuid::new_v4(),
            viewer_id: None,
            queue: SessionQueue::new(),
            machine: GuessStateMachine::new(),
            reveal: RevealMachine::new(timings.reveal),
            timings,
            deferred_rebuild: false,
        }
    }

    /// Session identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Viewer currently attached.
    pub fn viewer_id(&self) -> Option<&str> {
        self.viewer_id.as_deref()
    }

    /// Pipeline phase.
    pub fn phase(&self) -> &GuessPhase {
        self.machine.phase()
    }

    /// Reveal animation phase.
    pub fn reveal_phase(&self) -> RevealPhase {
        self.reveal.phase()
    }

    /// Queue backing the session.
    pub fn queue(&self) -> &SessionQueue {
        &self.queue
    }

    /// True when a rebuild waits for the in-flight guess.
    pub fn has_deferred_rebuild(&self) -> bool {
        self.deferred_rebuild
    }

    /// Candidate on screen: the latched one while a guess is in flight, otherwise
    /// the queue's current candidate.
    pub fn displayed_candidate(&self) -> Option<&Arc<Candidate>> {
        match self.machine.phase().guess() {
            Some(guess) => Some(&guess.candidate),
            None => self.queue.current(),
        }
    }

    /// True when the queue was built and came back empty.
    pub fn has_no_candidates(&self) -> bool {
        self.queue.viewer_id().is_some() && self.queue.is_empty()
    }

    /// Attach `viewer_id`, rebuilding when it differs from the current viewer.
    pub fn set_viewer(
        &mut self,
        viewer_id: ViewerId,
        provider: &dyn CandidateProvider,
    ) -> RebuildOutcome {
        if self.viewer_id.as_deref() == Some(viewer_id.as_str())
            && self.queue.viewer_id() == Some(viewer_id.as_str())
        {
            return RebuildOutcome::Unchanged;
        }

        self.viewer_id = Some(viewer_id);
        self.request_rebuild(provider)
    }

    /// Rebuild for the current viewer, e.g. because new candidates appeared.
    pub fn refresh(&mut self, provider: &dyn CandidateProvider) -> RebuildOutcome {
        if self.viewer_id.is_none() {
            return RebuildOutcome::NoViewer;
        }
        self.request_rebuild(provider)
    }

    /// Release of the slider at `guess`.
    ///
    /// On acceptance the viewer's stats are updated through `sink` before this
    /// returns; the remote report is left to the caller.
    pub fn submit(&mut self, guess: i64, sink: &dyn ViewerStatsSink) -> SubmitOutcome {
        if self.machine.phase().is_in_flight() {
            debug!(session_id = %self.id, "guess ignored: another guess is in flight");
            return SubmitOutcome::Ignored(IgnoreReason::InFlight);
        }
        let (Some(viewer_id), Some(candidate)) = (self.viewer_id.clone(), self.queue.current())
        else {
            debug!(session_id = %self.id, "guess ignored: no candidate on screen");
            return SubmitOutcome::Ignored(IgnoreReason::NoCandidate);
        };
        if self.queue.viewer_id() != Some(viewer_id.as_str()) {
            debug!(session_id = %self.id, "guess ignored: queue was built for another viewer");
            return SubmitOutcome::Ignored(IgnoreReason::NoCandidate);
        }

        let snapshot = GuessSnapshot::latch(candidate.clone(), guess);
        let difference = snapshot.difference();
        let points = snapshot.points();

        if let Err(err) = self.machine.apply(GuessEvent::Release(snapshot.clone())) {
            warn!(session_id = %self.id, error = %err, "failed to latch guess");
            return SubmitOutcome::Ignored(IgnoreReason::InFlight);
        }

        sink.apply_guess_outcome(&viewer_id, points, &snapshot.candidate, snapshot.guess);
        let report = GuessReport {
            candidate_id: snapshot.candidate.id.clone(),
            entry: snapshot.log_entry(&viewer_id),
        };

        let scored = self.apply(GuessEvent::Scored).cloned();
        let after = match scored {
            Some(GuessPhase::ExactMatchReveal { .. }) => self.start_reveal(),
            Some(GuessPhase::CloseMissFeedback { .. }) => self.timings.close_miss_feedback,
            _ => self.timings.wide_miss_delay,
        };

        SubmitOutcome::Accepted(Box::new(AcceptedGuess {
            guess: snapshot,
            difference,
            points,
            report,
            timer: self.timer(after),
        }))
    }

    /// A timer armed from an earlier [`TimerRequest`] fired.
    pub fn on_timer(&mut self, ticket: u64, provider: &dyn CandidateProvider) -> TimerOutcome {
        if ticket != self.machine.version() {
            return TimerOutcome::Stale;
        }

        match self.machine.phase() {
            GuessPhase::ExactMatchReveal { .. } => match self.reveal.on_timer() {
                Ok(RevealStep::Hold(after)) => {
                    self.apply(GuessEvent::RevealProgress(self.reveal.phase()));
                    TimerOutcome::Rearm(self.timer(after))
                }
                Ok(RevealStep::Complete) => {
                    if let Err(err) = self.reveal.acknowledge() {
                        warn!(session_id = %self.id, error = %err, "reveal completion out of order");
                    }
                    TimerOutcome::Settled(self.settle(provider))
                }
                Err(err) => {
                    warn!(session_id = %self.id, error = %err, "reveal timer out of order");
                    self.reveal.cancel();
                    TimerOutcome::Settled(self.settle(provider))
                }
            },
            GuessPhase::CloseMissFeedback { .. } | GuessPhase::WideMissSilent { .. } => {
                TimerOutcome::Settled(self.settle(provider))
            }
            GuessPhase::Idle | GuessPhase::Submitting(_) => TimerOutcome::Stale,
        }
    }

    /// Drop the in-flight guess and any pending rebuild.
    pub fn cancel(&mut self) {
        self.reveal.cancel();
        self.deferred_rebuild = false;
        self.apply(GuessEvent::Cancel);
    }

    fn request_rebuild(&mut self, provider: &dyn CandidateProvider) -> RebuildOutcome {
        if self.machine.phase().is_in_flight() {
            self.deferred_rebuild = true;
            return RebuildOutcome::Deferred;
        }
        RebuildOutcome::Rebuilt(self.rebuild_now(provider))
    }

    fn rebuild_now(&mut self, provider: &dyn CandidateProvider) -> usize {
        self.deferred_rebuild = false;
        let Some(viewer_id) = self.viewer_id.clone() else {
            self.queue.clear();
            return 0;
        };

        let candidates = provider.available_candidates(&viewer_id);
        self.queue.rebuild(viewer_id, candidates);
        debug!(session_id = %self.id, candidates = self.queue.len(), "session queue rebuilt");
        self.queue.len()
    }

    fn start_reveal(&mut self) -> Duration {
        match self.reveal.start() {
            Ok(RevealStep::Hold(after)) => {
                self.apply(GuessEvent::RevealProgress(self.reveal.phase()));
                after
            }
            Ok(RevealStep::Complete) => Duration::ZERO,
            Err(err) => {
                warn!(session_id = %self.id, error = %err, "reveal already running; restarting");
                self.reveal.cancel();
                self.start_reveal()
            }
        }
    }

    /// Advance the queue, release the lock, then run any deferred rebuild. A wrap
    /// reshuffles from a fresh provider snapshot.
    fn settle(&mut self, provider: &dyn CandidateProvider) -> Advance {
        let advance = self.queue.advance();
        self.apply(GuessEvent::Settled);

        if self.deferred_rebuild || advance == Advance::Wrapped {
            self.rebuild_now(provider);
        }
        advance
    }

    fn apply(&mut self, event: GuessEvent) -> Option<&GuessPhase> {
        match self.machine.apply(event) {
            Ok(phase) => Some(phase),
            Err(err) => {
                warn!(session_id = %self.id, error = %err, "guess pipeline transition rejected");
                None
            }
        }
    }

    fn timer(&self, after: Duration) -> TimerRequest {
        TimerRequest {
            ticket: self.machine.version(),
            after,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct FixedProvider {
        candidates: Mutex<Vec<Arc<Candidate>>>,
    }

    impl FixedProvider {
        fn with_ages(ages: &[u8]) -> Self {
            let provider = Self::default();
            provider.set_ages(ages);
            provider
        }

        fn set_ages(&self, ages: &[u8]) {
            *self.candidates.lock().unwrap() = ages
                .iter()
                .enumerate()
                .map(|(index, age)| {
                    Arc::new(Candidate {
                        id: format!("c{index}"),
                        photo: format!("https://img/{index}.jpg"),
                        actual_age: *age,
                        display_name: None,
                    })
                })
                .collect();
        }
    }

    impl CandidateProvider for FixedProvider {
        fn available_candidates(&self, _viewer_id: &str) -> Vec<Arc<Candidate>> {
            self.candidates.lock().unwrap().clone()
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        calls: Mutex<Vec<(String, u8, String, u8)>>,
    }

    impl ViewerStatsSink for RecordingSink {
        fn apply_guess_outcome(&self, viewer_id: &str, points: u8, candidate: &Candidate, guess: u8) {
            self.calls
                .lock()
                .unwrap()
                .push((viewer_id.into(), points, candidate.id.clone(), guess));
        }
    }

    fn session_with(ages: &[u8]) -> (GuessSession, FixedProvider, RecordingSink) {
        let provider = FixedProvider::with_ages(ages);
        let mut session = GuessSession::new(GuessTimings::default());
        assert_eq!(
            session.set_viewer("viewer".into(), &provider),
            RebuildOutcome::Rebuilt(ages.len())
        );
        (session, provider, RecordingSink::default())
    }

    fn accepted(outcome: SubmitOutcome) -> AcceptedGuess {
        match outcome {
            SubmitOutcome::Accepted(accepted) => *accepted,
            other => panic!("expected accepted guess, got {other:?}"),
        }
    }

    #[test]
    fn exact_match_runs_the_full_reveal_before_advancing() {
        let (mut session, provider, sink) = session_with(&[34, 34]);
        let first = session.displayed_candidate().unwrap().id.clone();

        let guess = accepted(session.submit(34, &sink));
        assert_eq!(guess.points, 10);
        assert_eq!(guess.timer.after, Duration::from_millis(300));
        assert_eq!(session.reveal_phase(), RevealPhase::FadingOutProfile);

        let TimerOutcome::Rearm(second) = session.on_timer(guess.timer.ticket, &provider) else {
            panic!("expected rearm");
        };
        assert_eq!(second.after, Duration::from_millis(700));
        assert_eq!(session.reveal_phase(), RevealPhase::ShowingBrand);

        let TimerOutcome::Rearm(third) = session.on_timer(second.ticket, &provider) else {
            panic!("expected rearm");
        };
        assert_eq!(third.after, Duration::from_millis(1500));
        assert_eq!(session.reveal_phase(), RevealPhase::ShowingBrandWithSuffix);
        assert_eq!(session.displayed_candidate().unwrap().id, first);

        assert_eq!(
            session.on_timer(third.ticket, &provider),
            TimerOutcome::Settled(Advance::Next)
        );
        assert_eq!(session.phase(), &GuessPhase::Idle);
        assert_eq!(session.reveal_phase(), RevealPhase::Idle);
        assert_ne!(session.displayed_candidate().unwrap().id, first);
    }

    #[test]
    fn close_miss_shows_the_difference() {
        let (mut session, provider, sink) = session_with(&[34, 34]);
        let guess = accepted(session.submit(31, &sink));

        assert_eq!(guess.difference, 3);
        assert_eq!(guess.points, 5);
        assert_eq!(guess.timer.after, Duration::from_millis(1500));
        assert!(matches!(
            session.phase(),
            GuessPhase::CloseMissFeedback { difference: 3, .. }
        ));

        assert_eq!(
            session.on_timer(guess.timer.ticket, &provider),
            TimerOutcome::Settled(Advance::Next)
        );
        assert_eq!(session.queue().position(), 1);
    }

    #[test]
    fn wide_miss_moves_on_quietly() {
        let (mut session, provider, sink) = session_with(&[34]);
        let guess = accepted(session.submit(20, &sink));

        assert_eq!(guess.difference, 14);
        assert_eq!(guess.points, 0);
        assert_eq!(guess.timer.after, Duration::from_millis(500));
        assert!(matches!(session.phase(), GuessPhase::WideMissSilent { .. }));
        assert_eq!(
            session.on_timer(guess.timer.ticket, &provider),
            TimerOutcome::Settled(Advance::Wrapped)
        );
    }

    #[test]
    fn second_release_before_settling_is_ignored() {
        let (mut session, _provider, sink) = session_with(&[34, 34]);
        let guess = accepted(session.submit(31, &sink));
        assert_eq!(
            session.submit(34, &sink),
            SubmitOutcome::Ignored(IgnoreReason::InFlight)
        );
        assert_eq!(
            session.submit(10, &sink),
            SubmitOutcome::Ignored(IgnoreReason::InFlight)
        );

        let calls = sink.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], ("viewer".into(), 5, guess.report.candidate_id.clone(), 31));
        assert_eq!(guess.report.entry.guesser_id, "viewer");
        assert_eq!(guess.report.entry.guess_value, 31);
    }

    #[test]
    fn empty_candidate_list_is_terminal() {
        let (mut session, provider, sink) = session_with(&[]);
        assert!(session.has_no_candidates());
        assert!(session.displayed_candidate().is_none());
        assert_eq!(
            session.submit(30, &sink),
            SubmitOutcome::Ignored(IgnoreReason::NoCandidate)
        );
        assert!(sink.calls.lock().unwrap().is_empty());

        provider.set_ages(&[30]);
        assert_eq!(session.refresh(&provider), RebuildOutcome::Rebuilt(1));
        assert!(!session.has_no_candidates());
        assert!(matches!(session.submit(30, &sink), SubmitOutcome::Accepted(_)));
    }

    #[test]
    fn submissions_without_viewer_are_ignored() {
        let mut session = GuessSession::new(GuessTimings::default());
        let provider = FixedProvider::with_ages(&[30]);
        assert_eq!(session.refresh(&provider), RebuildOutcome::NoViewer);
        assert_eq!(
            session.submit(30, &RecordingSink::default()),
            SubmitOutcome::Ignored(IgnoreReason::NoCandidate)
        );
    }

    #[test]
    fn viewer_change_is_deferred_while_in_flight() {
        let (mut session, provider, sink) = session_with(&[34, 34]);
        let pinned = session.displayed_candidate().unwrap().clone();
        let guess = accepted(session.submit(20, &sink));

        provider.set_ages(&[70, 71, 72]);
        assert_eq!(
            session.set_viewer("someone-else".into(), &provider),
            RebuildOutcome::Deferred
        );
        assert!(session.has_deferred_rebuild());
        assert_eq!(session.displayed_candidate().unwrap(), &pinned);
        assert_eq!(session.queue().viewer_id(), Some("viewer"));

        session.on_timer(guess.timer.ticket, &provider);
        assert_eq!(session.queue().viewer_id(), Some("someone-else"));
        assert_eq!(session.queue().len(), 3);
        assert_eq!(session.queue().position(), 0);
        assert!(!session.has_deferred_rebuild());
    }

    #[test]
    fn same_viewer_does_not_rebuild() {
        let (mut session, provider, _sink) = session_with(&[34, 34]);
        assert_eq!(
            session.set_viewer("viewer".into(), &provider),
            RebuildOutcome::Unchanged
        );
    }

    #[test]
    fn stale_timers_are_ignored() {
        let (mut session, provider, sink) = session_with(&[34, 34]);
        let guess = accepted(session.submit(34, &sink));
        let TimerOutcome::Rearm(next) = session.on_timer(guess.timer.ticket, &provider) else {
            panic!("expected rearm");
        };

        assert_eq!(
            session.on_timer(guess.timer.ticket, &provider),
            TimerOutcome::Stale
        );
        assert_eq!(session.reveal_phase(), RevealPhase::ShowingBrand);
        assert!(matches!(
            session.on_timer(next.ticket, &provider),
            TimerOutcome::Rearm(_)
        ));
    }

    #[test]
    fn cancel_discards_the_lock_and_orphans_timers() {
        let (mut session, provider, sink) = session_with(&[34, 34]);
        let guess = accepted(session.submit(34, &sink));
        session.set_viewer("other".into(), &provider);

        session.cancel();
        assert_eq!(session.phase(), &GuessPhase::Idle);
        assert_eq!(session.reveal_phase(), RevealPhase::Idle);
        assert!(!session.has_deferred_rebuild());
        assert_eq!(
            session.on_timer(guess.timer.ticket, &provider),
            TimerOutcome::Stale
        );
        assert_eq!(session.queue().position(), 0);
    }

    #[test]
    fn wrapping_reshuffles_from_a_fresh_snapshot() {
        let (mut session, provider, sink) = session_with(&[34]);
        let guess = accepted(session.submit(34, &sink));
        provider.set_ages(&[]);

        let mut ticket = guess.timer.ticket;
        loop {
            match session.on_timer(ticket, &provider) {
                TimerOutcome::Rearm(next) => ticket = next.ticket,
                TimerOutcome::Settled(advance) => {
                    assert_eq!(advance, Advance::Wrapped);
                    break;
                }
                TimerOutcome::Stale => panic!("unexpected stale timer"),
            }
        }
        assert!(session.has_no_candidates());
    }
}
