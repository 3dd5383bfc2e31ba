pub mod directory;
pub mod game;
pub mod queue;
pub mod reveal;
pub mod scheduler;
pub mod scoring;
pub mod session;
mod sse;
pub mod state_machine;

use std::sync::{Arc, PoisonError, RwLock};

use dashmap::DashMap;
use tokio::sync::watch;
use uuid::Uuid;

use crate::{
    dao::aggregate_store::AggregateStore,
    services::session_service::SessionHandle,
    state::{directory::ProfileDirectory, game::ViewerId, session::GuessTimings},
};

pub use self::sse::SseHub;

/// Shared handle to the application state.
pub type SharedState = Arc<AppState>;

/// Central application state: storage handle, profile directory and open sessions.
pub struct AppState {
    store: RwLock<Option<Arc<dyn AggregateStore>>>,
    degraded: watch::Sender<bool>,
    directory: ProfileDirectory,
    sessions: DashMap<Uuid, SessionHandle>,
    viewer_sessions: DashMap<ViewerId, Uuid>,
    timings: GuessTimings,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`].
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(timings: GuessTimings) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            store: RwLock::new(None),
            degraded: degraded_tx,
            directory: ProfileDirectory::new(),
            sessions: DashMap::new(),
            viewer_sessions: DashMap::new(),
            timings,
        })
    }

    /// Current store, if one is installed.
    pub fn store(&self) -> Option<Arc<dyn AggregateStore>> {
        self.store
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Store to use for remote calls, or `None` while degraded.
    pub fn healthy_store(&self) -> Option<Arc<dyn AggregateStore>> {
        if self.is_degraded() {
            return None;
        }
        self.store()
    }

    /// Install a store implementation and leave degraded mode.
    pub fn set_store(&self, store: Arc<dyn AggregateStore>) {
        *self.store.write().unwrap_or_else(PoisonError::into_inner) = Some(store);
        self.update_degraded(false);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            let changed = *current != value;
            *current = value;
            changed
        });
    }

    /// Guessable profiles and viewer ledgers.
    pub fn directory(&self) -> &ProfileDirectory {
        &self.directory
    }

    /// Open sessions keyed by their identifier.
    pub fn sessions(&self) -> &DashMap<Uuid, SessionHandle> {
        &self.sessions
    }

    /// Session each viewer is bound to; a viewer has at most one open session.
    pub fn viewer_sessions(&self) -> &DashMap<ViewerId, Uuid> {
        &self.viewer_sessions
    }

    /// Timings handed to new sessions.
    pub fn timings(&self) -> GuessTimings {
        self.timings
    }
}
