//! Relational stores for posts and chat messages.

pub mod messages;
pub mod posts;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;

use crate::db::DbPool;

pub use messages::{MessageStore, NewChatMessage, SqliteMessageStore};
pub use posts::{NewPost, PostRepository, SqlitePostRepository};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0}")]
    NotFound(String),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("database unavailable: {0}")]
    Unavailable(String),
}

/// Run a closure against the connection on the blocking pool.
pub(crate) async fn with_conn<T, F>(db: &DbPool, f: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {e}")))?;
        f(&conn)
    })
    .await
    .map_err(|e| StoreError::Unavailable(e.to_string()))?
}

/// Fixed-width RFC3339 so that lexical order in SQL equals time order.
pub(crate) fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn ts_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}
