//! Live Match Back binary entrypoint wiring REST, WebSocket, SSE and storage layers.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use live_match_back::{
    config::AppConfig,
    dao::{
        directory::memory::MemoryDirectory,
        live_store::memory::MemoryLiveStore,
        models::GameStatus,
    },
    routes,
    services::badges::{BadgeAwarder, LoggingBadgeAwarder},
    state::{AppState, SharedState, StorageBackend},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let badges = badge_awarder(&config);
    let app_state = AppState::new(config, badges);

    start_storage(app_state.clone()).await;
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

/// Pick the badge awarder: the configured webhook, or a log-only fallback.
fn badge_awarder(config: &AppConfig) -> Arc<dyn BadgeAwarder> {
    #[cfg(feature = "badge-webhook")]
    {
        use live_match_back::services::badges::WebhookBadgeAwarder;

        if let Some(url) = config.badge_webhook_url.as_deref() {
            match WebhookBadgeAwarder::new(url, config.badge_timeout) {
                Ok(awarder) => {
                    info!(url, "badge webhook configured");
                    return Arc::new(awarder);
                }
                Err(err) => warn!(
                    error = %err,
                    "badge webhook unusable; logging finished games only"
                ),
            }
        }
    }

    #[cfg(not(feature = "badge-webhook"))]
    {
        if config.badge_webhook_url.is_some() {
            warn!("badge webhook configured but the `badge-webhook` feature is disabled");
        }
    }

    Arc::new(LoggingBadgeAwarder)
}

/// Supervise MongoDB when `MONGO_URI` is set; otherwise serve from memory.
async fn start_storage(state: SharedState) {
    #[cfg(feature = "mongo-store")]
    {
        if env::var("MONGO_URI").is_ok() {
            use live_match_back::{
                dao::{
                    live_store::mongodb::{MongoConfig, MongoLiveStore},
                    storage::StorageError,
                },
                services::storage_supervisor,
            };

            tokio::spawn(storage_supervisor::run(state, || async {
                let config = MongoConfig::from_env().await?;
                let store = MongoLiveStore::connect(config).await?;
                Ok::<_, StorageError>(StorageBackend::from_store(store))
            }));
            return;
        }
    }

    warn!("MONGO_URI not set; live data is kept in memory only");
    let directory = MemoryDirectory::new();
    if let Ok(game_id) = env::var("DEMO_GAME_ID") {
        let owner = env::var("DEMO_OWNER_ID").unwrap_or_else(|_| "organizer".into());
        info!(game_id = %game_id, owner = %owner, "registering demo game");
        directory.register_game(&game_id, &owner, GameStatus::Live).await;
    }

    state
        .install_storage(StorageBackend {
            live: Arc::new(MemoryLiveStore::new()),
            confirmations: Arc::new(directory.clone()),
            games: Arc::new(directory),
        })
        .await;
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
                warn!(error = %err, "SIGTERM handler unavailable; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
