use axum::Router;

use crate::state::SharedState;

pub mod docs;
pub mod health;
pub mod session;
pub mod stats;

/// Every route of the service, bound to `state`.
pub fn router(state: SharedState) -> Router<()> {
    Router::new()
        .merge(health::router())
        .merge(session::router())
        .merge(stats::router())
        .merge(docs::router())
        .with_state(state)
}
