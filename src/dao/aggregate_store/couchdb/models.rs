use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dao::models::{CandidateStatsEntity, GuessLogEntity, ProfileEntity, ViewerStatsEntity};

pub const CANDIDATE_STATS_PREFIX: &str = "candidate_stats::";
pub const VIEWER_STATS_PREFIX: &str = "viewer_stats::";
pub const PROFILE_PREFIX: &str = "profile::";
pub const END_SUFFIX: &str = "\u{ffff}";

pub const DESIGN_DOC_ID: &str = "_design/gage";
pub const RECORD_GUESS_HANDLER: &str = "_design/gage/_update/record_guess";
pub const VIEWER_OUTCOME_HANDLER: &str = "_design/gage/_update/record_viewer_outcome";

/// Update handler adding one guess inside CouchDB, creating the document on first use.
const RECORD_GUESS_SOURCE: &str = r#"function (doc, req) {
  var entry = JSON.parse(req.body);
  if (!doc) {
    doc = { _id: req.id, guess_total: 0, guess_count: 0, guesses: [] };
  }
  doc.guess_total += entry.guess_value;
  doc.guess_count += 1;
  doc.guesses.push(entry);
  return [doc, "recorded"];
}"#;

/// Update handler counting one more game for a viewer.
const VIEWER_OUTCOME_SOURCE: &str = r#"function (doc, req) {
  var outcome = JSON.parse(req.body);
  if (!doc) {
    doc = { _id: req.id, games_played: 0, total_score: 0 };
  }
  doc.games_played += 1;
  doc.total_score += outcome.points;
  doc.updated_at = outcome.played_at;
  return [doc, "recorded"];
}"#;

#[derive(Debug, Deserialize)]
pub struct AllDocsResponse {
    pub rows: Vec<AllDocsRow>,
}

#[derive(Debug, Deserialize)]
pub struct AllDocsRow {
    #[serde(default)]
    pub doc: Option<Value>,
}

/// Design document carrying the update handlers.
#[derive(Debug, Serialize)]
pub struct CouchDesignDocument {
    #[serde(rename = "_id")]
    id: &'static str,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    rev: Option<String>,
    updates: DesignUpdates,
}

#[derive(Debug, Serialize)]
struct DesignUpdates {
    record_guess: &'static str,
    record_viewer_outcome: &'static str,
}

impl Default for CouchDesignDocument {
    fn default() -> Self {
        Self {
            id: DESIGN_DOC_ID,
            rev: None,
            updates: DesignUpdates {
                record_guess: RECORD_GUESS_SOURCE,
                record_viewer_outcome: VIEWER_OUTCOME_SOURCE,
            },
        }
    }
}

impl CouchDesignDocument {
    /// Document replacing `existing`, or `None` when it already carries these handlers.
    pub fn replacing(existing: &Value) -> Option<Self> {
        let current = Self::default();
        let handlers = serde_json::to_value(&current.updates).ok()?;
        if existing.get("updates") == Some(&handlers) {
            return None;
        }
        Some(Self {
            rev: existing
                .get("_rev")
                .and_then(Value::as_str)
                .map(str::to_owned),
            ..current
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchCandidateStatsDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub guess_total: u64,
    #[serde(default)]
    pub guess_count: u64,
    #[serde(default)]
    pub guesses: Vec<GuessLogEntity>,
}

impl CouchCandidateStatsDocument {
    pub fn into_entity(self) -> CandidateStatsEntity {
        CandidateStatsEntity {
            candidate_id: strip_prefix(&self.id, CANDIDATE_STATS_PREFIX),
            guess_total: self.guess_total,
            guess_count: self.guess_count,
            guesses: self.guesses,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CouchViewerStatsDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub games_played: u32,
    #[serde(default)]
    pub total_score: u64,
    pub updated_at: SystemTime,
}

impl CouchViewerStatsDocument {
    pub fn into_entity(self) -> ViewerStatsEntity {
        ViewerStatsEntity {
            viewer_id: strip_prefix(&self.id, VIEWER_STATS_PREFIX),
            games_played: self.games_played,
            total_score: self.total_score,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CouchProfileDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub photo: String,
    #[serde(default)]
    pub age: Option<u8>,
}

impl CouchProfileDocument {
    pub fn into_entity(self) -> ProfileEntity {
        ProfileEntity {
            id: strip_prefix(&self.id, PROFILE_PREFIX),
            display_name: self.display_name,
            photo: self.photo,
            age: self.age,
        }
    }
}

pub fn candidate_stats_doc_id(candidate_id: &str) -> String {
    format!("{CANDIDATE_STATS_PREFIX}{candidate_id}")
}

pub fn viewer_stats_doc_id(viewer_id: &str) -> String {
    format!("{VIEWER_STATS_PREFIX}{viewer_id}")
}

fn strip_prefix(doc_id: &str, prefix: &str) -> String {
    doc_id.strip_prefix(prefix).unwrap_or(doc_id).to_owned()
}
