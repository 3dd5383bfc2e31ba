use std::{
    collections::HashSet,
    sync::{Arc, PoisonError, RwLock},
    time::SystemTime,
};

use dashmap::DashMap;
use indexmap::IndexMap;
use time::{Date, OffsetDateTime};

use crate::{
    dao::models::ProfileEntity,
    state::game::{Candidate, CandidateId, GuessRecord, ViewerId, ViewerStats},
};

/// Supplies the profiles a viewer may guess right now.
pub trait CandidateProvider: Send + Sync {
    /// Snapshot of guessable candidates for `viewer_id`.
    fn available_candidates(&self, viewer_id: &str) -> Vec<Arc<Candidate>>;
}

/// Receives the local, optimistic outcome of every accepted guess.
pub trait ViewerStatsSink: Send + Sync {
    /// Count one completed guess worth `points` for `viewer_id`.
    fn apply_guess_outcome(&self, viewer_id: &str, points: u8, candidate: &Candidate, guess: u8);
}

/// Stats and history kept for one viewer.
#[derive(Debug, Clone, Default)]
pub struct ViewerLedger {
    /// Running totals.
    pub stats: ViewerStats,
    /// Guesses recorded on the UTC day of the latest guess.
    pub history: Vec<GuessRecord>,
}

/// In-memory directory of guessable profiles and per-viewer ledgers.
///
/// A candidate is offered to a viewer unless it is the viewer's own profile or the
/// viewer already guessed it during the current UTC day.
#[derive(Debug, Default)]
pub struct ProfileDirectory {
    candidates: RwLock<IndexMap<CandidateId, Arc<Candidate>>>,
    ledgers: DashMap<ViewerId, ViewerLedger>,
}

impl ProfileDirectory {
    /// Empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace profiles, returning how many were guessable.
    pub fn load_profiles(&self, profiles: impl IntoIterator<Item = ProfileEntity>) -> usize {
        let mut candidates = self
            .candidates
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let mut loaded = 0;
        for profile in profiles {
            let id = profile.id.clone();
            match Candidate::from_profile(profile) {
                Some(candidate) => {
                    candidates.insert(id, Arc::new(candidate));
                    loaded += 1;
                }
                None => {
                    candidates.shift_remove(&id);
                }
            }
        }
        loaded
    }

    /// Number of guessable profiles.
    pub fn candidate_count(&self) -> usize {
        self.candidates
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Current totals for `viewer_id`.
    pub fn viewer_stats(&self, viewer_id: &str) -> ViewerStats {
        self.ledgers
            .get(viewer_id)
            .map(|ledger| ledger.stats)
            .unwrap_or_default()
    }

    /// Guesses `viewer_id` made on the day of their latest guess, oldest first.
    pub fn history(&self, viewer_id: &str) -> Vec<GuessRecord> {
        self.ledgers
            .get(viewer_id)
            .map(|ledger| ledger.history.clone())
            .unwrap_or_default()
    }

    /// Seed totals loaded from storage, keeping whichever side counted more games.
    pub fn restore_viewer_stats(&self, viewer_id: &str, stats: ViewerStats) {
        let mut ledger = self.ledgers.entry(viewer_id.to_owned()).or_default();
        if stats.games_played > ledger.stats.games_played {
            ledger.stats = stats;
        }
    }

    /// Record a guess and return the updated totals.
    pub fn record_guess(
        &self,
        viewer_id: &str,
        points: u8,
        candidate: &Candidate,
        guess: u8,
    ) -> ViewerStats {
        self.record_guess_at(viewer_id, points, candidate, guess, SystemTime::now())
    }

    fn record_guess_at(
        &self,
        viewer_id: &str,
        points: u8,
        candidate: &Candidate,
        guess: u8,
        now: SystemTime,
    ) -> ViewerStats {
        let today = utc_day(now);
        let mut ledger = self.ledgers.entry(viewer_id.to_owned()).or_default();
        ledger.stats.record(points);
        ledger
            .history
            .retain(|record| utc_day(record.guessed_at) == today);
        ledger.history.push(GuessRecord {
            candidate_id: candidate.id.clone(),
            guess,
            points,
            guessed_at: now,
        });
        ledger.stats
    }

    /// Candidates available to `viewer_id` as of `now`.
    pub fn available_candidates_at(&self, viewer_id: &str, now: SystemTime) -> Vec<Arc<Candidate>> {
        let today = utc_day(now);
        let guessed_today: HashSet<CandidateId> = self
            .ledgers
            .get(viewer_id)
            .map(|ledger| {
                ledger
                    .history
                    .iter()
                    .filter(|record| utc_day(record.guessed_at) == today)
                    .map(|record| record.candidate_id.clone())
                    .collect()
            })
            .unwrap_or_default();

        self.candidates
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(id, _)| id.as_str() != viewer_id && !guessed_today.contains(*id))
            .map(|(_, candidate)| candidate.clone())
            .collect()
    }
}

fn utc_day(at: SystemTime) -> Date {
    OffsetDateTime::from(at).date()
}

impl CandidateProvider for ProfileDirectory {
    fn available_candidates(&self, viewer_id: &str) -> Vec<Arc<Candidate>> {
        self.available_candidates_at(viewer_id, SystemTime::now())
    }
}

impl ViewerStatsSink for ProfileDirectory {
    fn apply_guess_outcome(&self, viewer_id: &str, points: u8, candidate: &Candidate, guess: u8) {
        self.record_guess(viewer_id, points, candidate, guess);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn profile(id: &str, age: Option<u8>) -> ProfileEntity {
        ProfileEntity {
            id: id.into(),
            display_name: None,
            photo: format!("https://img/{id}.jpg"),
            age,
        }
    }

    fn ids(candidates: Vec<Arc<Candidate>>) -> Vec<String> {
        let mut ids: Vec<_> = candidates.into_iter().map(|c| c.id.clone()).collect();
        ids.sort();
        ids
    }

    #[test]
    fn excludes_self_and_unusable_profiles() {
        let directory = ProfileDirectory::new();
        let loaded = directory.load_profiles([
            profile("alice", Some(30)),
            profile("bob", Some(41)),
            profile("carol", None),
        ]);
        assert_eq!(loaded, 2);

        assert_eq!(ids(directory.available_candidates("alice")), vec!["bob"]);
        assert_eq!(
            ids(directory.available_candidates("dave")),
            vec!["alice", "bob"]
        );
    }

    #[test]
    fn guessed_candidates_are_hidden_for_the_rest_of_the_day() {
        let directory = ProfileDirectory::new();
        directory.load_profiles([profile("alice", Some(30)), profile("bob", Some(41))]);
        let bob = directory
            .available_candidates("alice")
            .into_iter()
            .next()
            .unwrap();

        directory.apply_guess_outcome("alice", 9, &bob, 40);
        assert!(directory.available_candidates("alice").is_empty());
        assert_eq!(ids(directory.available_candidates("carol")).len(), 2);

        let tomorrow = SystemTime::now() + Duration::from_secs(60 * 60 * 24);
        assert_eq!(
            ids(directory.available_candidates_at("alice", tomorrow)),
            vec!["bob"]
        );
    }

    #[test]
    fn sink_updates_stats_and_history() {
        let directory = ProfileDirectory::new();
        directory.load_profiles([profile("bob", Some(41))]);
        let bob = directory.available_candidates("alice").remove(0);

        directory.apply_guess_outcome("alice", 9, &bob, 40);
        directory.apply_guess_outcome("alice", 0, &bob, 10);

        let stats = directory.viewer_stats("alice");
        assert_eq!(stats.games_played, 2);
        assert_eq!(stats.total_score, 9);
        let history = directory.history("alice");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].guess, 40);
        assert_eq!(history[1].points, 0);
    }

    #[test]
    fn history_only_keeps_the_current_day() {
        let directory = ProfileDirectory::new();
        directory.load_profiles([profile("bob", Some(41)), profile("eve", Some(25))]);
        let bob = directory.available_candidates("alice").remove(0);
        let eve = directory.available_candidates("alice").remove(1);

        let yesterday = SystemTime::now() - Duration::from_secs(60 * 60 * 24);
        directory.record_guess_at("alice", 9, &bob, 40, yesterday);
        directory.record_guess_at("alice", 0, &bob, 10, yesterday);
        assert_eq!(directory.history("alice").len(), 2);
        assert!(
            ids(directory.available_candidates_at("alice", yesterday)).contains(&"eve".to_owned())
        );

        directory.apply_guess_outcome("alice", 10, &eve, 25);
        let history = directory.history("alice");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].candidate_id, "eve");
        assert_eq!(directory.viewer_stats("alice").games_played, 3);
        assert_eq!(ids(directory.available_candidates("alice")), vec!["bob"]);
    }

    #[test]
    fn restore_keeps_the_larger_count() {
        let directory = ProfileDirectory::new();
        directory.restore_viewer_stats(
            "alice",
            ViewerStats {
                games_played: 4,
                total_score: 20,
            },
        );
        directory.restore_viewer_stats(
            "alice",
            ViewerStats {
                games_played: 1,
                total_score: 10,
            },
        );
        assert_eq!(directory.viewer_stats("alice").total_score, 20);
    }

    #[test]
    fn reloading_an_unusable_profile_removes_it() {
        let directory = ProfileDirectory::new();
        directory.load_profiles([profile("bob", Some(41))]);
        directory.load_profiles([profile("bob", None)]);
        assert_eq!(directory.candidate_count(), 0);
    }
}
