use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::state::{
    game::Candidate,
    reveal::RevealPhase,
    session::{AcceptedGuess, GuessSession, IgnoreReason},
    state_machine::GuessPhase,
};

/// Payload used to open a session for a viewer.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateSessionRequest {
    /// Identifier of the signed-in viewer.
    #[validate(length(min = 1, max = 128))]
    pub viewer_id: String,
}

/// Payload sent when the signed-in viewer changes.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateViewerRequest {
    /// Identifier of the new viewer.
    #[validate(length(min = 1, max = 128))]
    pub viewer_id: String,
}

/// Payload sent when the viewer releases the age slider.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SubmitGuessRequest {
    /// Guessed age.
    #[validate(range(min = 1, max = 100))]
    #[schema(minimum = 1, maximum = 100)]
    pub guess: i64,
}

/// Pipeline phase exposed to clients.
#[derive(Debug, Clone, Copy, Serialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Waiting for a guess.
    Idle,
    /// A guess is being scored.
    Submitting,
    /// Exact guess; the reveal animation plays.
    ExactMatchReveal,
    /// Close miss; the difference is displayed.
    CloseMissFeedback,
    /// Wide miss; moving on silently.
    WideMissSilent,
}

impl From<&GuessPhase> for SessionPhase {
    fn from(phase: &GuessPhase) -> Self {
        match phase {
            GuessPhase::Idle => SessionPhase::Idle,
            GuessPhase::Submitting(_) => SessionPhase::Submitting,
            GuessPhase::ExactMatchReveal { .. } => SessionPhase::ExactMatchReveal,
            GuessPhase::CloseMissFeedback { .. } => SessionPhase::CloseMissFeedback,
            GuessPhase::WideMissSilent { .. } => SessionPhase::WideMissSilent,
        }
    }
}

/// Reveal animation step exposed to clients.
#[derive(Debug, Clone, Copy, Serialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RevealStepView {
    /// No reveal running.
    Idle,
    /// The profile fades out.
    FadingOutProfile,
    /// The brand is displayed.
    ShowingBrand,
    /// The brand is displayed with its suffix.
    ShowingBrandWithSuffix,
    /// The reveal finished.
    Complete,
}

impl From<RevealPhase> for RevealStepView {
    fn from(phase: RevealPhase) -> Self {
        match phase {
            RevealPhase::Idle => RevealStepView::Idle,
            RevealPhase::FadingOutProfile => RevealStepView::FadingOutProfile,
            RevealPhase::ShowingBrand => RevealStepView::ShowingBrand,
            RevealPhase::ShowingBrandWithSuffix => RevealStepView::ShowingBrandWithSuffix,
            RevealPhase::Complete => RevealStepView::Complete,
        }
    }
}

/// Candidate as shown before a guess: the age stays hidden.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
pub struct CandidateView {
    /// Candidate identifier.
    pub id: String,
    /// Photo to display.
    pub photo: String,
}

impl From<&Candidate> for CandidateView {
    fn from(candidate: &Candidate) -> Self {
        Self {
            id: candidate.id.clone(),
            photo: candidate.photo.clone(),
        }
    }
}

/// On-screen feedback for the guess in flight.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GuessFeedback {
    /// The age was guessed exactly and is revealed.
    ExactMatch {
        /// Revealed age.
        age: u8,
        /// Name revealed with the age.
        #[serde(skip_serializing_if = "Option::is_none")]
        display_name: Option<String>,
    },
    /// The guess missed by at most three years.
    CloseMiss {
        /// Years between the guess and the real age.
        difference: u8,
    },
}

impl GuessFeedback {
    /// Feedback for `phase`, if the phase displays any.
    pub fn for_phase(phase: &GuessPhase) -> Option<Self> {
        match phase {
            GuessPhase::ExactMatchReveal { guess, .. } => Some(GuessFeedback::ExactMatch {
                age: guess.candidate.actual_age,
                display_name: guess.candidate.display_name.clone(),
            }),
            GuessPhase::CloseMissFeedback { difference, .. } => Some(GuessFeedback::CloseMiss {
                difference: *difference,
            }),
            _ => None,
        }
    }
}

/// Full view of a session.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
pub struct SessionView {
    /// Session identifier.
    pub id: Uuid,
    /// Viewer attached to the session.
    pub viewer_id: Option<String>,
    /// Pipeline phase.
    pub phase: SessionPhase,
    /// Reveal animation step.
    pub reveal: RevealStepView,
    /// Candidate on screen.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate: Option<CandidateView>,
    /// Feedback for the guess in flight.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<GuessFeedback>,
    /// True when nobody is left to guess.
    pub no_candidates: bool,
    /// Zero-based position in the queue.
    pub position: usize,
    /// Number of candidates in the queue.
    pub queue_length: usize,
}

impl From<&GuessSession> for SessionView {
    fn from(session: &GuessSession) -> Self {
        Self {
            id: session.id(),
            viewer_id: session.viewer_id().map(str::to_owned),
            phase: session.phase().into(),
            reveal: session.reveal_phase().into(),
            candidate: session
                .displayed_candidate()
                .map(|candidate| CandidateView::from(candidate.as_ref())),
            feedback: GuessFeedback::for_phase(session.phase()),
            no_candidates: session.has_no_candidates(),
            position: session.queue().position(),
            queue_length: session.queue().len(),
        }
    }
}

/// Scored result returned to the viewer who made the guess.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
pub struct GuessResult {
    /// Candidate that was guessed.
    pub candidate_id: String,
    /// Clamped guess.
    pub guess: u8,
    /// Real age of the candidate.
    pub actual_age: u8,
    /// Years between the guess and the real age.
    pub difference: u8,
    /// Points earned.
    pub points: u8,
}

impl From<&AcceptedGuess> for GuessResult {
    fn from(accepted: &AcceptedGuess) -> Self {
        Self {
            candidate_id: accepted.guess.candidate.id.clone(),
            guess: accepted.guess.guess,
            actual_age: accepted.guess.candidate.actual_age,
            difference: accepted.difference,
            points: accepted.points,
        }
    }
}

/// Why a guess was not taken into account.
#[derive(Debug, Clone, Copy, Serialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IgnoredReason {
    /// An earlier guess is still being processed.
    GuessInFlight,
    /// No candidate is on screen.
    NoCandidate,
}

impl From<IgnoreReason> for IgnoredReason {
    fn from(reason: IgnoreReason) -> Self {
        match reason {
            IgnoreReason::InFlight => IgnoredReason::GuessInFlight,
            IgnoreReason::NoCandidate => IgnoredReason::NoCandidate,
        }
    }
}

/// Response to a guess submission.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmitGuessResponse {
    /// The guess was scored.
    Accepted {
        /// Scored result.
        result: GuessResult,
        /// Session right after scoring.
        session: SessionView,
    },
    /// The guess was dropped.
    Ignored {
        /// Why it was dropped.
        reason: IgnoredReason,
        /// Session as it stands.
        session: SessionView,
    },
}
