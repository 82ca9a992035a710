//! Post routes.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use forum_shared::{CreatePostRequest, Post, StatusMessage};
use serde::Deserialize;

use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::state::AppState;
use crate::store::posts::{page_bounds, NewPost};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub offset: Option<i64>,
    pub limit: Option<i64>,
}

/// List posts, newest first. Paginated when `offset` or `limit` is given.
pub async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Post>>, AppError> {
    let posts = if query.offset.is_none() && query.limit.is_none() {
        state.posts.list().await?
    } else {
        let (offset, limit) = page_bounds(query.offset, query.limit);
        state.posts.list_page(offset, limit).await?
    };
    Ok(Json(posts))
}

pub async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Post>, AppError> {
    if id <= 0 {
        return Err(AppError::BadRequest("invalid post ID".to_string()));
    }
    state
        .posts
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("post not found".to_string()))
}

/// Create a post authored by the caller.
pub async fn create_post(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Json(payload): Json<CreatePostRequest>,
) -> Result<(StatusCode, Json<Post>), AppError> {
    let post = NewPost {
        title: payload.title,
        content: payload.content,
        author_id: identity.user_id,
        author: identity.username,
    }
    .validated()
    .map_err(AppError::BadRequest)?;

    let created = state.posts.create(post).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Delete one of the caller's own posts.
pub async fn delete_post(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<StatusMessage>, AppError> {
    if id <= 0 {
        return Err(AppError::BadRequest("invalid post ID".to_string()));
    }
    state.posts.delete(id, identity.user_id).await?;
    Ok(Json(StatusMessage {
        message: "post deleted successfully".to_string(),
    }))
}
