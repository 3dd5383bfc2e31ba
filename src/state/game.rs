use std::{sync::Arc, time::SystemTime};

use crate::{
    dao::models::{GuessLogEntity, ProfileEntity, ViewerStatsEntity},
    state::scoring::{self, MAX_AGE, MIN_AGE},
};

/// Identifier of the signed-in user playing the game.
pub type ViewerId = String;
/// Identifier of a profile that can be guessed.
pub type CandidateId = String;

/// A profile shown to viewers so they can guess its age.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Profile identifier (same namespace as [`ViewerId`]).
    pub id: CandidateId,
    /// Photo URL or data URI displayed to the viewer.
    pub photo: String,
    /// True age, always within [`MIN_AGE`]..=[`MAX_AGE`].
    pub actual_age: u8,
    /// Optional name shown once the age is revealed.
    pub display_name: Option<String>,
}

impl Candidate {
    /// Build a candidate from a stored profile.
    ///
    /// Returns `None` when the profile cannot be guessed: no age on record, an age
    /// outside the playable range, or no photo.
    pub fn from_profile(profile: ProfileEntity) -> Option<Self> {
        let age = profile.age?;
        if !(MIN_AGE..=MAX_AGE).contains(&age) || profile.photo.trim().is_empty() {
            return None;
        }

        Some(Self {
            id: profile.id,
            photo: profile.photo,
            actual_age: age,
            display_name: profile.display_name,
        })
    }
}

/// Guess latched when the slider is released.
///
/// The snapshot pins the target candidate, so neither a later slider movement nor
/// a queue rebuild can change what the in-flight guess is scored against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuessSnapshot {
    /// Candidate the guess targets.
    pub candidate: Arc<Candidate>,
    /// Guessed age, clamped into the playable range.
    pub guess: u8,
}

impl GuessSnapshot {
    /// Latch `guess` against `candidate`, clamping it into the playable range.
    pub fn latch(candidate: Arc<Candidate>, guess: i64) -> Self {
        Self {
            candidate,
            guess: scoring::clamp_age(guess),
        }
    }

    /// Distance between the guess and the candidate's true age.
    pub fn difference(&self) -> u8 {
        scoring::age_difference(self.guess, self.candidate.actual_age)
    }

    /// Points earned by this guess.
    pub fn points(&self) -> u8 {
        scoring::score(self.guess, self.candidate.actual_age)
    }

    /// Log entry appended to the candidate's aggregate record.
    pub fn log_entry(&self, guesser_id: &str) -> GuessLogEntity {
        GuessLogEntity {
            guesser_id: guesser_id.to_owned(),
            guess_value: self.guess,
            guessed_at: SystemTime::now(),
        }
    }
}

/// Running totals for a viewer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewerStats {
    /// Number of guesses completed.
    pub games_played: u32,
    /// Sum of all points earned.
    pub total_score: u64,
}

impl ViewerStats {
    /// Account for one more completed guess.
    pub fn record(&mut self, points: u8) {
        self.games_played = self.games_played.saturating_add(1);
        self.total_score = self.total_score.saturating_add(points as u64);
    }
}

impl From<ViewerStatsEntity> for ViewerStats {
    fn from(value: ViewerStatsEntity) -> Self {
        Self {
            games_played: value.games_played,
            total_score: value.total_score,
        }
    }
}

/// One guess made by a viewer, kept for history and the no-repeat rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuessRecord {
    /// Candidate that was guessed.
    pub candidate_id: CandidateId,
    /// Guessed age.
    pub guess: u8,
    /// Points earned.
    pub points: u8,
    /// When the guess was latched.
    pub guessed_at: SystemTime,
}
