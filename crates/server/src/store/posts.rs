//! Post store and post validation.

use async_trait::async_trait;
use chrono::{SubsecRound, Utc};
use forum_shared::Post;
use rusqlite::OptionalExtension;

use super::{format_ts, ts_column, with_conn, StoreError};
use crate::db::DbPool;

pub const TITLE_MIN_CHARS: usize = 3;
pub const TITLE_MAX_CHARS: usize = 100;
pub const CONTENT_MIN_CHARS: usize = 10;

pub const DEFAULT_PAGE_LIMIT: i64 = 10;
pub const MAX_PAGE_LIMIT: i64 = 100;

#[derive(Debug, Clone)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub author_id: i64,
    pub author: String,
}

impl NewPost {
    /// Trim the text fields and check the creation rules.
    pub fn validated(self) -> Result<Self, String> {
        let title = self.title.trim().to_string();
        let content = self.content.trim().to_string();

        let title_len = title.chars().count();
        if !(TITLE_MIN_CHARS..=TITLE_MAX_CHARS).contains(&title_len) {
            return Err(format!(
                "title must be between {TITLE_MIN_CHARS} and {TITLE_MAX_CHARS} characters"
            ));
        }
        if content.chars().count() < CONTENT_MIN_CHARS {
            return Err(format!("content must be at least {CONTENT_MIN_CHARS} characters"));
        }
        if self.author_id <= 0 {
            return Err("author is required".to_string());
        }

        Ok(Self { title, content, ..self })
    }
}

/// Clamp client-supplied paging parameters.
pub fn page_bounds(offset: Option<i64>, limit: Option<i64>) -> (i64, i64) {
    let offset = offset.unwrap_or(0).max(0);
    let limit = match limit {
        Some(l) if l > 0 => l.min(MAX_PAGE_LIMIT),
        _ => DEFAULT_PAGE_LIMIT,
    };
    (offset, limit)
}

#[async_trait]
pub trait PostRepository: Send + Sync {
    async fn create(&self, post: NewPost) -> Result<Post, StoreError>;
    async fn get(&self, id: i64) -> Result<Option<Post>, StoreError>;
    /// Every post, newest first.
    async fn list(&self) -> Result<Vec<Post>, StoreError>;
    async fn list_page(&self, offset: i64, limit: i64) -> Result<Vec<Post>, StoreError>;
    /// Delete a post owned by `author_id`. Missing and foreign posts are both `NotFound`.
    async fn delete(&self, id: i64, author_id: i64) -> Result<(), StoreError>;
}

pub struct SqlitePostRepository {
    db: DbPool,
}

impl SqlitePostRepository {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

const POST_COLUMNS: &str = "id, title, content, author_id, author, created_at";

fn post_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        author_id: row.get(3)?,
        author: row.get(4)?,
        created_at: ts_column(row, 5)?,
    })
}

#[async_trait]
impl PostRepository for SqlitePostRepository {
    async fn create(&self, post: NewPost) -> Result<Post, StoreError> {
        with_conn(&self.db, move |conn| {
            // Stored at millisecond precision; return exactly what a read yields.
            let created_at = Utc::now().trunc_subsecs(3);
            conn.execute(
                "INSERT INTO posts (title, content, author_id, author, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![post.title, post.content, post.author_id, post.author, format_ts(created_at)],
            )?;
            let id = conn.last_insert_rowid();
            tracing::info!(post_id = id, author_id = post.author_id, "Post created");
            Ok(Post {
                id,
                title: post.title,
                content: post.content,
                author_id: post.author_id,
                author: post.author,
                created_at,
            })
        })
        .await
    }

    async fn get(&self, id: i64) -> Result<Option<Post>, StoreError> {
        with_conn(&self.db, move |conn| {
            conn.query_row(
                &format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?1"),
                [id],
                post_from_row,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn list(&self) -> Result<Vec<Post>, StoreError> {
        with_conn(&self.db, |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {POST_COLUMNS} FROM posts ORDER BY created_at DESC, id DESC"
            ))?;
            let posts = stmt
                .query_map([], post_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(posts)
        })
        .await
    }

    async fn list_page(&self, offset: i64, limit: i64) -> Result<Vec<Post>, StoreError> {
        with_conn(&self.db, move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {POST_COLUMNS} FROM posts ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2"
            ))?;
            let posts = stmt
                .query_map([limit, offset], post_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(posts)
        })
        .await
    }

    async fn delete(&self, id: i64, author_id: i64) -> Result<(), StoreError> {
        with_conn(&self.db, move |conn| {
            let affected = conn.execute(
                "DELETE FROM posts WHERE id = ?1 AND author_id = ?2",
                [id, author_id],
            )?;
            if affected == 0 {
                return Err(StoreError::NotFound(
                    "post not found or you're not the author".to_string(),
                ));
            }
            tracing::info!(post_id = id, author_id, "Post deleted");
            Ok(())
        })
        .await
    }
}
