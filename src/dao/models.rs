use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Profile that may be offered to other viewers as a guessing candidate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfileEntity {
    /// Identifier of the user owning the profile.
    pub id: String,
    /// Name shown once the age is revealed.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Photo URL or data URI.
    #[serde(default)]
    pub photo: String,
    /// Age derived from the date of birth; absent until the user provided it.
    #[serde(default)]
    pub age: Option<u8>,
}

/// One entry of a candidate's guess log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GuessLogEntity {
    /// Viewer who made the guess.
    pub guesser_id: String,
    /// Guessed age.
    pub guess_value: u8,
    /// When the guess was latched.
    pub guessed_at: SystemTime,
}

/// Community aggregate stored per candidate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CandidateStatsEntity {
    /// Candidate the aggregate belongs to.
    pub candidate_id: String,
    /// Sum of every guessed age.
    pub guess_total: u64,
    /// Number of guesses received.
    pub guess_count: u64,
    /// Append-only log of guesses, oldest first.
    pub guesses: Vec<GuessLogEntity>,
}

impl CandidateStatsEntity {
    /// Mean guessed age rounded to one decimal, or `None` without guesses.
    pub fn average_guess(&self) -> Option<f64> {
        if self.guess_count == 0 {
            return None;
        }
        let average = self.guess_total as f64 / self.guess_count as f64;
        Some((average * 10.0).round() / 10.0)
    }
}

/// Persisted totals for a viewer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ViewerStatsEntity {
    /// Viewer the totals belong to.
    pub viewer_id: String,
    /// Number of guesses completed.
    pub games_played: u32,
    /// Sum of points earned.
    pub total_score: u64,
    /// Last time the totals changed.
    pub updated_at: SystemTime,
}

/// One completed guess to add to a viewer's stored totals.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ViewerOutcomeEntity {
    /// Viewer who made the guess.
    pub viewer_id: String,
    /// Points earned by the guess.
    pub points: u8,
    /// When the guess was latched.
    pub played_at: SystemTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(total: u64, count: u64) -> CandidateStatsEntity {
        CandidateStatsEntity {
            candidate_id: "c".into(),
            guess_total: total,
            guess_count: count,
            guesses: Vec::new(),
        }
    }

    #[test]
    fn average_rounds_to_one_decimal() {
        assert_eq!(stats(0, 0).average_guess(), None);
        assert_eq!(stats(100, 3).average_guess(), Some(33.3));
        assert_eq!(stats(68, 2).average_guess(), Some(34.0));
    }
}
