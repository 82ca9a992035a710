//! Forum auth service: registration, login and session token issuance.

pub mod config;
pub mod db;
pub mod error;
pub mod password;
pub mod routes;
pub mod service;
pub mod state;
pub mod store;

use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use state::AppState;

/// Build the CORS layer; `None` allows any origin.
pub fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    match origin.and_then(|o| o.parse::<HeaderValue>().ok()) {
        Some(origin) => cors.allow_origin(origin),
        None => cors.allow_origin(Any),
    }
}

pub fn build_router(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/api/v1/register", post(routes::register))
        .route("/api/v1/login", post(routes::login))
        .route("/api/v1/validate", get(routes::validate))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
