use serde::Serialize;
use utoipa::ToSchema;

use crate::{dao::models::CandidateStatsEntity, state::game::ViewerStats};

/// Totals of a viewer.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
pub struct ViewerStatsResponse {
    /// Viewer the totals belong to.
    pub viewer_id: String,
    /// Guesses completed.
    pub games_played: u32,
    /// Points earned.
    pub total_score: u64,
}

impl ViewerStatsResponse {
    /// Build the response for `viewer_id`.
    pub fn new(viewer_id: String, stats: ViewerStats) -> Self {
        Self {
            viewer_id,
            games_played: stats.games_played,
            total_score: stats.total_score,
        }
    }
}

/// What the community guessed for a candidate.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq)]
pub struct CommunityStatsResponse {
    /// Candidate the stats belong to.
    pub candidate_id: String,
    /// Mean guessed age rounded to one decimal, `null` without guesses.
    pub average: Option<f64>,
    /// Number of guesses received.
    pub total_guesses: u64,
}

impl CommunityStatsResponse {
    /// Stats for a candidate nobody guessed yet.
    pub fn empty(candidate_id: String) -> Self {
        Self {
            candidate_id,
            average: None,
            total_guesses: 0,
        }
    }
}

impl From<CandidateStatsEntity> for CommunityStatsResponse {
    fn from(stats: CandidateStatsEntity) -> Self {
        Self {
            average: stats.average_guess(),
            total_guesses: stats.guess_count,
            candidate_id: stats.candidate_id,
        }
    }
}
