use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{aggregate_store::AggregateStore, storage::StorageError},
    services::profile_service,
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Keep a storage backend connected, toggling degraded mode while it is unreachable
/// and reloading profiles whenever it comes back.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn AggregateStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        let store = match connect().await {
            Ok(store) => store,
            Err(err) => {
                warn!(error = %err, "storage connection attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
                continue;
            }
        };

        state.set_store(store.clone());
        info!("storage connection established; leaving degraded mode");
        delay = INITIAL_DELAY;
        load_profiles(&state, &store).await;

        while watch_health(&state, &store).await {
            load_profiles(&state, &store).await;
        }

        warn!("exhausted storage reconnect attempts; staying in degraded mode");
        sleep(delay).await;
        delay = (delay * 2).min(MAX_DELAY);
    }
}

/// Poll `store` until it fails and cannot be reconnected (`false`), or until it was
/// reconnected after an outage (`true`).
async fn watch_health(state: &SharedState, store: &Arc<dyn AggregateStore>) -> bool {
    loop {
        match store.health_check().await {
            Ok(()) => {
                if state.is_degraded() {
                    info!("storage healthy again; leaving degraded mode");
                    state.update_degraded(false);
                }
                sleep(HEALTH_POLL_INTERVAL).await;
            }
            Err(err) => {
                warn!(error = %err, "storage health check failed; entering degraded mode");
                state.update_degraded(true);
                return reconnect(store).await;
            }
        }
    }
}

async fn reconnect(store: &Arc<dyn AggregateStore>) -> bool {
    let mut reconnect_delay = INITIAL_DELAY;
    for attempt in 1..=MAX_RECONNECT_ATTEMPTS {
        match store.try_reconnect().await {
            Ok(()) => {
                info!(attempt, "storage reconnection succeeded");
                return true;
            }
            Err(err) => {
                warn!(attempt, error = %err, "storage reconnect attempt failed");
                sleep(reconnect_delay).await;
                reconnect_delay = (reconnect_delay * 2).min(MAX_DELAY);
            }
        }
    }
    false
}

async fn load_profiles(state: &SharedState, store: &Arc<dyn AggregateStore>) {
    if let Err(err) = profile_service::sync_profiles(state, store).await {
        warn!(error = %err, "failed to load profiles from storage");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicU32, Ordering},
    };

    use futures::future::{self, BoxFuture};

    use super::*;
    use crate::{
        dao::{
            models::{
                CandidateStatsEntity, GuessLogEntity, ProfileEntity, ViewerOutcomeEntity,
                ViewerStatsEntity,
            },
            storage::StorageResult,
        },
        state::{AppState, session::GuessTimings},
    };

    /// Store whose health check fails while `healthy` is false and never reconnects.
    struct FlakyStore {
        healthy: Mutex<bool>,
        reconnects: AtomicU32,
    }

    fn offline() -> StorageError {
        StorageError::unavailable("offline".into(), std::io::Error::other("offline"))
    }

    impl AggregateStore for FlakyStore {
        fn record_guess(&self, _: String, _: GuessLogEntity) -> BoxFuture<'static, StorageResult<()>> {
            Box::pin(future::ready(Ok(())))
        }

        fn find_candidate_stats(
            &self,
            _: String,
        ) -> BoxFuture<'static, StorageResult<Option<CandidateStatsEntity>>> {
            Box::pin(future::ready(Ok(None)))
        }

        fn increment_viewer_stats(
            &self,
            _: ViewerOutcomeEntity,
        ) -> BoxFuture<'static, StorageResult<()>> {
            Box::pin(future::ready(Ok(())))
        }

        fn find_viewer_stats(
            &self,
            _: String,
        ) -> BoxFuture<'static, StorageResult<Option<ViewerStatsEntity>>> {
            Box::pin(future::ready(Ok(None)))
        }

        fn list_profiles(&self) -> BoxFuture<'static, StorageResult<Vec<ProfileEntity>>> {
            Box::pin(future::ready(Ok(vec![ProfileEntity {
                id: "bob".into(),
                display_name: None,
                photo: "https://img/bob.jpg".into(),
                age: Some(41),
            }])))
        }

        fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
            let result = if *self.healthy.lock().unwrap() {
                Ok(())
            } else {
                Err(offline())
            };
            Box::pin(future::ready(result))
        }

        fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.reconnects.fetch_add(1, Ordering::SeqCst);
            Box::pin(future::ready(Err(offline())))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_health_check_enters_degraded_mode() {
        let state = AppState::new(GuessTimings::default());
        let store = Arc::new(FlakyStore {
            healthy: Mutex::new(true),
            reconnects: AtomicU32::new(0),
        });

        let connected: Arc<dyn AggregateStore> = store.clone();
        let supervisor = tokio::spawn(run(state.clone(), move || {
            let store = connected.clone();
            async move { Ok(store) }
        }));

        sleep(Duration::from_millis(10)).await;
        assert!(!state.is_degraded());
        assert_eq!(state.directory().candidate_count(), 1);

        *store.healthy.lock().unwrap() = false;
        sleep(HEALTH_POLL_INTERVAL + Duration::from_millis(10)).await;
        assert!(state.is_degraded());
        assert!(store.reconnects.load(Ordering::SeqCst) >= 1);

        supervisor.abort();
    }
}
