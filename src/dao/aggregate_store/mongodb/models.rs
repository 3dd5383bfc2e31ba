use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};

use crate::dao::models::{
    CandidateStatsEntity, GuessLogEntity, ProfileEntity, ViewerOutcomeEntity, ViewerStatsEntity,
};

/// Candidate aggregate as stored in the `candidate_stats` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoCandidateStatsDocument {
    #[serde(rename = "_id")]
    id: String,
    #[serde(default)]
    guess_total: i64,
    #[serde(default)]
    guess_count: i64,
    #[serde(default)]
    guesses: Vec<MongoGuessDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MongoGuessDocument {
    guesser_id: String,
    guess_value: i32,
    guessed_at: DateTime,
}

impl From<MongoCandidateStatsDocument> for CandidateStatsEntity {
    fn from(value: MongoCandidateStatsDocument) -> Self {
        Self {
            candidate_id: value.id,
            guess_total: non_negative(value.guess_total),
            guess_count: non_negative(value.guess_count),
            guesses: value
                .guesses
                .into_iter()
                .map(|guess| GuessLogEntity {
                    guesser_id: guess.guesser_id,
                    guess_value: u8::try_from(guess.guess_value).unwrap_or(u8::MAX),
                    guessed_at: guess.guessed_at.to_system_time(),
                })
                .collect(),
        }
    }
}

/// Viewer totals as stored in the `viewer_stats` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoViewerStatsDocument {
    #[serde(rename = "_id")]
    id: String,
    #[serde(default)]
    games_played: i64,
    #[serde(default)]
    total_score: i64,
    updated_at: DateTime,
}

impl From<MongoViewerStatsDocument> for ViewerStatsEntity {
    fn from(value: MongoViewerStatsDocument) -> Self {
        Self {
            viewer_id: value.id,
            games_played: u32::try_from(value.games_played.max(0)).unwrap_or(u32::MAX),
            total_score: non_negative(value.total_score),
            updated_at: value.updated_at.to_system_time(),
        }
    }
}

/// Profile as stored in the `profiles` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoProfileDocument {
    #[serde(rename = "_id")]
    id: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    photo: String,
    #[serde(default)]
    age: Option<i32>,
}

impl From<MongoProfileDocument> for ProfileEntity {
    fn from(value: MongoProfileDocument) -> Self {
        Self {
            id: value.id,
            display_name: value.display_name,
            photo: value.photo,
            age: value.age.and_then(|age| u8::try_from(age).ok()),
        }
    }
}

/// Single update adding one guess to a candidate aggregate.
pub fn record_guess_update(entry: &GuessLogEntity) -> Document {
    doc! {
        "$inc": {
            "guess_total": i64::from(entry.guess_value),
            "guess_count": 1_i64,
        },
        "$push": {
            "guesses": {
                "guesser_id": entry.guesser_id.as_str(),
                "guess_value": i32::from(entry.guess_value),
                "guessed_at": DateTime::from_system_time(entry.guessed_at),
            }
        },
    }
}

/// Single update counting one more game for a viewer.
pub fn viewer_outcome_update(outcome: &ViewerOutcomeEntity) -> Document {
    doc! {
        "$inc": {
            "games_played": 1_i64,
            "total_score": i64::from(outcome.points),
        },
        "$set": {
            "updated_at": DateTime::from_system_time(outcome.played_at),
        },
    }
}

pub fn doc_id(id: &str) -> Document {
    doc! { "_id": id }
}

fn non_negative(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}
