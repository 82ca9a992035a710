//! Authentication routes (register, login, validate).

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    Json,
};
use forum_shared::{
    bearer_token, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse,
    ValidateResponse,
};

use crate::error::AuthError;
use crate::state::AppState;

/// Register a new user account
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AuthError> {
    tracing::info!(username = %payload.username, "Registering user");

    let (user_id, access_token) = state.auth.register(payload).await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user_id: user_id.to_string(),
            access_token,
        }),
    ))
}

/// Login to an existing account
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AuthError> {
    tracing::info!(username = %payload.username, "Logging in user");

    let access_token = state.auth.login(payload).await?;
    Ok(Json(LoginResponse { access_token }))
}

/// Validate the token in the `Authorization` header. Both `Bearer <token>` and a
/// bare token are accepted.
pub async fn validate(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ValidateResponse>, AuthError> {
    let raw = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AuthError::Unauthorized("Authorization header required".to_string()))?;
    let token = bearer_token(raw).unwrap_or(raw);

    let user_id = state.auth.validate(token).await?;
    Ok(Json(ValidateResponse { user_id }))
}

pub async fn health() -> &'static str {
    "ok"
}
