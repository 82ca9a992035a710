//! Forum auth service binary.

use std::sync::Arc;

use anyhow::Context;
use forum_auth::{
    build_router, config::Config, cors_layer, db, service::AuthService, state::AppState,
    store::SqliteUserRepository,
};
use forum_shared::{TokenService, DEFAULT_ISSUER};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "forum_auth=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let db = db::init_database(&config.db_path).context("failed to open credential database")?;
    let tokens = TokenService::new(&config.jwt_secret, config.jwt_ttl, DEFAULT_ISSUER)?;
    let auth = AuthService::new(Arc::new(SqliteUserRepository::new(db)), tokens);

    let app = build_router(AppState::new(auth), cors_layer(config.cors_origin.as_deref()));

    tracing::info!("Starting auth service on {}", config.addr);
    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Auth service stopped");
    Ok(())
}

async fn shutdown_signal() {
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
}
