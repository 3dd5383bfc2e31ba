use thiserror::Error;

use crate::state::{game::GuessSnapshot, reveal::RevealPhase};

/// Largest difference that still earns on-screen feedback.
pub const CLOSE_MISS_MAX_DIFFERENCE: u8 = 3;

/// Phases a single guess goes through.
///
/// Anything other than [`GuessPhase::Idle`] means a guess is in flight; that is the
/// only submission lock the session has.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuessPhase {
    /// Waiting for the viewer to release the slider.
    Idle,
    /// A guess was latched and is being scored.
    Submitting(GuessSnapshot),
    /// The guess was exact; the reveal animation is playing.
    ExactMatchReveal {
        /// Latched guess.
        guess: GuessSnapshot,
        /// Current step of the reveal animation.
        reveal: RevealPhase,
    },
    /// The guess was off by a few years; the difference is displayed.
    CloseMissFeedback {
        /// Latched guess.
        guess: GuessSnapshot,
        /// Difference shown to the viewer.
        difference: u8,
    },
    /// The guess was far off; nothing is displayed before moving on.
    WideMissSilent {
        /// Latched guess.
        guess: GuessSnapshot,
    },
}

impl GuessPhase {
    /// True while a guess holds the submission lock.
    pub fn is_in_flight(&self) -> bool {
        !matches!(self, GuessPhase::Idle)
    }

    /// Guess currently in flight, if any.
    pub fn guess(&self) -> Option<&GuessSnapshot> {
        match self {
            GuessPhase::Idle => None,
            GuessPhase::Submitting(guess)
            | GuessPhase::ExactMatchReveal { guess, .. }
            | GuessPhase::CloseMissFeedback { guess, .. }
            | GuessPhase::WideMissSilent { guess } => Some(guess),
        }
    }
}

/// Which terminal branch a scored guess takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuessBranch {
    /// Difference of zero.
    ExactMatch,
    /// Difference between one and [`CLOSE_MISS_MAX_DIFFERENCE`].
    CloseMiss,
    /// Any larger difference.
    WideMiss,
}

impl GuessBranch {
    /// Classify a difference.
    pub fn for_difference(difference: u8) -> Self {
        match difference {
            0 => GuessBranch::ExactMatch,
            1..=CLOSE_MISS_MAX_DIFFERENCE => GuessBranch::CloseMiss,
            _ => GuessBranch::WideMiss,
        }
    }
}

/// Events that can be applied to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuessEvent {
    /// The slider was released; latch the guess.
    Release(GuessSnapshot),
    /// Scoring finished; pick the branch from the latched difference.
    Scored,
    /// The reveal animation moved to another phase.
    RevealProgress(RevealPhase),
    /// The branch timer fired or the reveal completed; release the lock.
    Settled,
    /// Teardown: drop whatever is in flight.
    Cancel,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the state machine was in when the invalid event was received.
    pub from: GuessPhase,
    /// The event that cannot be applied from this phase.
    pub event: GuessEvent,
}

/// State machine for the guess submission pipeline.
///
/// `version` bumps on every applied transition and doubles as the ticket for
/// timers, so a timer armed in an earlier phase is recognised as stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuessStateMachine {
    phase: GuessPhase,
    version: u64,
}

impl Default for GuessStateMachine {
    fn default() -> Self {
        Self {
            phase: GuessPhase::Idle,
            version: 0,
        }
    }
}

impl GuessStateMachine {
    /// Create a new state machine initialised in the idle state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect the current phase.
    pub fn phase(&self) -> &GuessPhase {
        &self.phase
    }

    /// Number of transitions applied so far.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Apply `event`, returning the new phase.
    pub fn apply(&mut self, event: GuessEvent) -> Result<&GuessPhase, InvalidTransition> {
        let next = self.compute_transition(event)?;
        self.phase = next;
        self.version += 1;
        Ok(&self.phase)
    }

    fn compute_transition(&self, event: GuessEvent) -> Result<GuessPhase, InvalidTransition> {
        let next = match (&self.phase, event) {
            (GuessPhase::Idle, GuessEvent::Release(guess)) => GuessPhase::Submitting(guess),
            (GuessPhase::Submitting(guess), GuessEvent::Scored) => {
                let difference = guess.difference();
                let guess = guess.clone();
                match GuessBranch::for_difference(difference) {
                    GuessBranch::ExactMatch => GuessPhase::ExactMatchReveal {
                        guess,
                        reveal: RevealPhase::Idle,
                    },
                    GuessBranch::CloseMiss => GuessPhase::CloseMissFeedback { guess, difference },
                    GuessBranch::WideMiss => GuessPhase::WideMissSilent { guess },
                }
            }
            (GuessPhase::ExactMatchReveal { guess, .. }, GuessEvent::RevealProgress(reveal)) => {
                GuessPhase::ExactMatchReveal {
                    guess: guess.clone(),
                    reveal,
                }
            }
            (
                GuessPhase::ExactMatchReveal { .. }
                | GuessPhase::CloseMissFeedback { .. }
                | GuessPhase::WideMissSilent { .. },
                GuessEvent::Settled,
            ) => GuessPhase::Idle,
            (_, GuessEvent::Cancel) => GuessPhase::Idle,
            (from, event) => {
                return Err(InvalidTransition {
                    from: from.clone(),
                    event,
                });
            }
        };

        Ok(next)
    }
}
