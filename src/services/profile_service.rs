use std::{sync::Arc, time::SystemTime};

use tracing::{info, warn};

use crate::{
    dao::{
        aggregate_store::AggregateStore,
        models::{ProfileEntity, ViewerOutcomeEntity},
        storage::StorageResult,
    },
    services::session_service,
    state::{
        AppState, SharedState,
        directory::{CandidateProvider, ViewerStatsSink},
        game::Candidate,
    },
};

impl CandidateProvider for AppState {
    fn available_candidates(&self, viewer_id: &str) -> Vec<Arc<Candidate>> {
        self.directory().available_candidates(viewer_id)
    }
}

impl ViewerStatsSink for AppState {
    fn apply_guess_outcome(&self, viewer_id: &str, points: u8, candidate: &Candidate, guess: u8) {
        self.directory()
            .record_guess(viewer_id, points, candidate, guess);

        let Some(store) = self.healthy_store() else {
            warn!(viewer_id, "viewer stats kept locally (degraded mode)");
            return;
        };
        // Stored totals only ever move by this increment, whatever the local ledger holds.
        let outcome = ViewerOutcomeEntity {
            viewer_id: viewer_id.to_owned(),
            points,
            played_at: SystemTime::now(),
        };
        tokio::spawn(async move {
            let viewer_id = outcome.viewer_id.clone();
            if let Err(err) = store.increment_viewer_stats(outcome).await {
                warn!(%viewer_id, error = %err, "failed to persist viewer stats");
            }
        });
    }
}

/// Load profiles shipped with the configuration.
pub fn seed_profiles(state: &SharedState, profiles: Vec<ProfileEntity>) {
    if profiles.is_empty() {
        return;
    }
    let loaded = state.directory().load_profiles(profiles);
    info!(loaded, "seed profiles loaded");
}

/// Pull every profile from `store` into the directory, then let open sessions
/// pick up the new candidates.
pub async fn sync_profiles(
    state: &SharedState,
    store: &Arc<dyn AggregateStore>,
) -> StorageResult<usize> {
    let before = state.directory().candidate_count();
    let profiles = store.list_profiles().await?;
    let loaded = state.directory().load_profiles(profiles);
    let after = state.directory().candidate_count();
    info!(loaded, candidates = after, "profiles synchronised from storage");

    if after != before {
        session_service::refresh_all(state).await;
    }
    Ok(loaded)
}
