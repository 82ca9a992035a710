//! Forum service binary.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use forum_server::{
    build_router,
    chat::Hub,
    config::Config,
    cors_layer, db,
    state::AppState,
    store::{SqliteMessageStore, SqlitePostRepository},
};
use forum_shared::{TokenService, DEFAULT_ISSUER};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// The forum service only verifies tokens; this lifetime is never used to issue one.
const VERIFY_ONLY_TTL: Duration = Duration::from_secs(36000);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "forum_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let db = db::init_database(&config.db_path).context("failed to open forum database")?;
    let tokens = TokenService::new(&config.jwt_secret, VERIFY_ONLY_TTL, DEFAULT_ISSUER)?;
    let messages = Arc::new(SqliteMessageStore::new(db.clone()));
    let posts = Arc::new(SqlitePostRepository::new(db));
    let hub = Hub::spawn(config.hub.clone(), messages.clone());

    let state = AppState::new(posts, messages, tokens, hub.clone());
    let app = build_router(state, cors_layer(config.cors_origin.as_deref()));

    tracing::info!("Starting forum service on {}", config.addr);
    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(hub))
        .await?;

    tracing::info!("Forum service stopped");
    Ok(())
}

/// Wait for Ctrl-C or SIGTERM, then close every chat session so that open
/// websockets do not hold the graceful shutdown open.
async fn shutdown_signal(hub: Hub) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
    hub.shutdown().await;
}
