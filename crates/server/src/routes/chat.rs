//! Chat history route.

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use forum_shared::ChatMessage;
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
    /// Only messages strictly older than this instant.
    pub before: Option<DateTime<Utc>>,
}

pub async fn history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<ChatMessage>>, AppError> {
    let limit = query.limit.unwrap_or(0);
    let messages = match query.before {
        Some(before) => state.messages.before(before, limit).await?,
        None => state.messages.recent(limit).await?,
    };
    Ok(Json(messages))
}
