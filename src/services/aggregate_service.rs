use futures::future::BoxFuture;
use tracing::debug;

use crate::{
    dto::stats::{CommunityStatsResponse, ViewerStatsResponse},
    error::ServiceError,
    state::{AppState, SharedState, session::GuessReport},
};

/// Sends accepted guesses to the community aggregate.
pub trait GuessReporter: Send + Sync {
    /// Apply `report` to the remote aggregate.
    fn report_guess(&self, report: GuessReport) -> BoxFuture<'static, Result<(), ServiceError>>;
}

impl GuessReporter for AppState {
    fn report_guess(&self, report: GuessReport) -> BoxFuture<'static, Result<(), ServiceError>> {
        let store = self.healthy_store();
        Box::pin(async move {
            let store = store.ok_or(ServiceError::Degraded)?;
            store
                .record_guess(report.candidate_id, report.entry)
                .await
                .map_err(Into::into)
        })
    }
}

/// Community average and guess count of a candidate.
pub async fn community_stats(
    state: &SharedState,
    candidate_id: String,
) -> Result<CommunityStatsResponse, ServiceError> {
    let store = state.healthy_store().ok_or(ServiceError::Degraded)?;
    let stats = store.find_candidate_stats(candidate_id.clone()).await?;
    Ok(stats
        .map(CommunityStatsResponse::from)
        .unwrap_or_else(|| CommunityStatsResponse::empty(candidate_id)))
}

/// Totals of a viewer, merged with what storage knows when it is reachable.
pub async fn viewer_stats(state: &SharedState, viewer_id: String) -> ViewerStatsResponse {
    if let Some(store) = state.healthy_store() {
        match store.find_viewer_stats(viewer_id.clone()).await {
            Ok(Some(stored)) => state
                .directory()
                .restore_viewer_stats(&viewer_id, stored.into()),
            Ok(None) => {}
            Err(err) => debug!(viewer_id = %viewer_id, error = %err, "falling back to local viewer stats"),
        }
    }
    let stats = state.directory().viewer_stats(&viewer_id);
    ViewerStatsResponse::new(viewer_id, stats)
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::SystemTime,
    };

    use futures::future::{self, BoxFuture};
    use tokio::task::yield_now;

    use super::*;
    use crate::{
        dao::{
            aggregate_store::AggregateStore,
            models::{
                CandidateStatsEntity, GuessLogEntity, ProfileEntity, ViewerOutcomeEntity,
                ViewerStatsEntity,
            },
            storage::StorageResult,
        },
        services::profile_service,
        state::{directory::ViewerStatsSink, session::GuessTimings},
    };

    #[derive(Default)]
    struct MemoryStore {
        stats: Mutex<Vec<CandidateStatsEntity>>,
        viewers: Mutex<Vec<ViewerStatsEntity>>,
    }

    impl AggregateStore for MemoryStore {
        fn record_guess(
            &self,
            candidate_id: String,
            entry: GuessLogEntity,
        ) -> BoxFuture<'static, StorageResult<()>> {
            let mut stats = self.stats.lock().unwrap();
            match stats.iter_mut().find(|s| s.candidate_id == candidate_id) {
                Some(existing) => {
                    existing.guess_total += u64::from(entry.guess_value);
                    existing.guess_count += 1;
                    existing.guesses.push(entry);
                }
                None => stats.push(CandidateStatsEntity {
                    candidate_id,
                    guess_total: u64::from(entry.guess_value),
                    guess_count: 1,
                    guesses: vec![entry],
                }),
            }
            Box::pin(future::ready(Ok(())))
        }

        fn find_candidate_stats(
            &self,
            candidate_id: String,
        ) -> BoxFuture<'static, StorageResult<Option<CandidateStatsEntity>>> {
            let found = self
                .stats
                .lock()
                .unwrap()
                .iter()
                .find(|s| s.candidate_id == candidate_id)
                .cloned();
            Box::pin(future::ready(Ok(found)))
        }

        fn increment_viewer_stats(
            &self,
            outcome: ViewerOutcomeEntity,
        ) -> BoxFuture<'static, StorageResult<()>> {
            let mut viewers = self.viewers.lock().unwrap();
            match viewers.iter_mut().find(|s| s.viewer_id == outcome.viewer_id) {
                Some(existing) => {
                    existing.games_played += 1;
                    existing.total_score += u64::from(outcome.points);
                    existing.updated_at = outcome.played_at;
                }
                None => viewers.push(ViewerStatsEntity {
                    viewer_id: outcome.viewer_id,
                    games_played: 1,
                    total_score: u64::from(outcome.points),
                    updated_at: outcome.played_at,
                }),
            }
            Box::pin(future::ready(Ok(())))
        }

        fn find_viewer_stats(
            &self,
            viewer_id: String,
        ) -> BoxFuture<'static, StorageResult<Option<ViewerStatsEntity>>> {
            let found = self
                .viewers
                .lock()
                .unwrap()
                .iter()
                .find(|s| s.viewer_id == viewer_id)
                .cloned();
            Box::pin(future::ready(Ok(found)))
        }

        fn list_profiles(&self) -> BoxFuture<'static, StorageResult<Vec<ProfileEntity>>> {
            Box::pin(future::ready(Ok(Vec::new())))
        }

        fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
            Box::pin(future::ready(Ok(())))
        }

        fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
            Box::pin(future::ready(Ok(())))
        }
    }

    fn report(candidate_id: &str, guess_value: u8) -> GuessReport {
        GuessReport {
            candidate_id: candidate_id.into(),
            entry: GuessLogEntity {
                guesser_id: "alice".into(),
                guess_value,
                guessed_at: SystemTime::now(),
            },
        }
    }

    #[tokio::test]
    async fn reports_feed_the_community_average() {
        let state = AppState::new(GuessTimings::default());
        state.set_store(Arc::new(MemoryStore::default()));

        state.report_guess(report("bob", 40)).await.unwrap();
        state.report_guess(report("bob", 45)).await.unwrap();
        state.report_guess(report("bob", 46)).await.unwrap();

        let stats = community_stats(&state, "bob".into()).await.unwrap();
        assert_eq!(stats.total_guesses, 3);
        assert_eq!(stats.average, Some(43.7));

        let empty = community_stats(&state, "eve".into()).await.unwrap();
        assert_eq!(empty.average, None);
        assert_eq!(empty.total_guesses, 0);
    }

    #[tokio::test]
    async fn degraded_mode_drops_reports() {
        let state = AppState::new(GuessTimings::default());
        let err = state.report_guess(report("bob", 40)).await.unwrap_err();
        assert!(matches!(err, ServiceError::Degraded));
        assert!(matches!(
            community_stats(&state, "bob".into()).await,
            Err(ServiceError::Degraded)
        ));
    }

    fn store_with_alice(games_played: u32, total_score: u64) -> Arc<MemoryStore> {
        let store = MemoryStore::default();
        store.viewers.lock().unwrap().push(ViewerStatsEntity {
            viewer_id: "alice".into(),
            games_played,
            total_score,
            updated_at: SystemTime::now(),
        });
        Arc::new(store)
    }

    #[tokio::test]
    async fn viewer_stats_prefer_the_larger_stored_count() {
        let state = AppState::new(GuessTimings::default());
        state.set_store(store_with_alice(12, 80));

        let stats = viewer_stats(&state, "alice".into()).await;
        assert_eq!(stats.games_played, 12);
        assert_eq!(stats.total_score, 80);
    }

    #[tokio::test]
    async fn guess_before_any_restore_adds_to_stored_totals() {
        let state = AppState::new(GuessTimings::default());
        let store = store_with_alice(12, 80);
        state.set_store(store.clone());
        profile_service::seed_profiles(
            &state,
            vec![ProfileEntity {
                id: "bob".into(),
                display_name: None,
                photo: "https://img/bob.jpg".into(),
                age: Some(41),
            }],
        );
        let bob = state
            .directory()
            .available_candidates_at("alice", SystemTime::now())
            .remove(0);

        state.apply_guess_outcome("alice", 10, &bob, 41);
        state.apply_guess_outcome("alice", 5, &bob, 38);
        for _ in 0..4 {
            yield_now().await;
        }

        let stored = store.viewers.lock().unwrap()[0].clone();
        assert_eq!(stored.games_played, 14);
        assert_eq!(stored.total_score, 95);

        let stats = viewer_stats(&state, "alice".into()).await;
        assert_eq!(stats.games_played, 14);
        assert_eq!(stats.total_score, 95);
    }
}
