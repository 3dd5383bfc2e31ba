//! Gage Back binary entrypoint wiring REST, SSE, and the aggregate store supervisor.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use gage_back::{
    config::AppConfig,
    dao::{aggregate_store::AggregateStore, storage::StorageError},
    routes,
    services::{profile_service, storage_supervisor},
    state::{AppState, SharedState},
};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let app_state = AppState::new(config.timings);
    profile_service::seed_profiles(&app_state, config.seed_profiles);

    let backend = StoreBackend::from_env();
    info!(?backend, "selected aggregate store backend");
    tokio::spawn(storage_supervisor::run(app_state.clone(), move || {
        connect_store(backend)
    }));

    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Document store backing community aggregates, chosen with `GAGE_STORE`.
#[derive(Debug, Clone, Copy)]
enum StoreBackend {
    #[cfg(feature = "mongo-store")]
    Mongo,
    #[cfg(feature = "couch-store")]
    Couch,
}

impl StoreBackend {
    fn from_env() -> Self {
        let requested = env::var("GAGE_STORE").unwrap_or_default();
        match requested.to_ascii_lowercase().as_str() {
            #[cfg(feature = "couch-store")]
            "couch" | "couchdb" => StoreBackend::Couch,
            #[cfg(feature = "mongo-store")]
            _ => StoreBackend::Mongo,
            #[cfg(not(feature = "mongo-store"))]
            _ => StoreBackend::Couch,
        }
    }
}

async fn connect_store(backend: StoreBackend) -> Result<Arc<dyn AggregateStore>, StorageError> {
    match backend {
        #[cfg(feature = "mongo-store")]
        StoreBackend::Mongo => {
            use gage_back::dao::aggregate_store::mongodb::{MongoAggregateStore, MongoConfig};

            let config = MongoConfig::from_env().await?;
            let store = MongoAggregateStore::connect(config).await?;
            Ok(Arc::new(store))
        }
        #[cfg(feature = "couch-store")]
        StoreBackend::Couch => {
            use gage_back::dao::aggregate_store::couchdb::{CouchAggregateStore, CouchConfig};

            let config = CouchConfig::from_env()?;
            let store = CouchAggregateStore::connect(config).await?;
            Ok(Arc::new(store))
        }
    }
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
