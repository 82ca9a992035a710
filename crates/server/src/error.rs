//! Forum service errors and their HTTP rendering.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use forum_shared::{ProblemDetails, PROBLEM_CONTENT_TYPE};

use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => AppError::NotFound(msg),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl AppError {
    fn problem(&self) -> ProblemDetails {
        match self {
            AppError::BadRequest(msg) => ProblemDetails::bad_request(msg.clone()),
            AppError::Unauthorized(msg) => ProblemDetails::unauthorized(msg.clone()),
            AppError::NotFound(msg) => ProblemDetails::not_found(msg.clone()),
            AppError::Internal(_) => ProblemDetails::internal_error("internal server error"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Internal(detail) = &self {
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
