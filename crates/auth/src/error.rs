//! Auth service errors and their HTTP rendering.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use forum_shared::{ProblemDetails, TokenError, PROBLEM_CONTENT_TYPE};

use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => AuthError::Conflict(msg),
            other => AuthError::Internal(other.to_string()),
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired | TokenError::Invalid(_) => AuthError::Unauthorized("invalid token".to_string()),
            other => AuthError::Internal(other.to_string()),
        }
    }
}

impl AuthError {
    fn problem(&self) -> ProblemDetails {
        match self {
            AuthError::Validation(msg) => ProblemDetails::bad_request(msg.clone()),
            AuthError::InvalidCredentials => ProblemDetails::unauthorized("invalid credentials"),
            AuthError::Conflict(msg) => ProblemDetails::conflict(msg.clone()),
            AuthError::Unauthorized(msg) => ProblemDetails::unauthorized(msg.clone()),
            // Internal details go to the log, not the client.
            AuthError::Internal(_) => ProblemDetails::internal_error("internal server error"),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if let AuthError::Internal(detail) = &self {
            tracing::error!(error = %detail, "Request failed");
        }
        let problem = self.problem();
        let status = StatusCode::from_u16(problem.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (
            status,
            [(header::CONTENT_TYPE, PROBLEM_CONTENT_TYPE)],
            Json(problem),
        )
            .into_response()
    }
}
