//! Chat message persistence and history queries.

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use forum_shared::ChatMessage;

use super::{format_ts, ts_column, with_conn, StoreError};
use crate::db::DbPool;

pub const DEFAULT_HISTORY_LIMIT: i64 = 50;
pub const MAX_HISTORY_LIMIT: i64 = 1000;

/// Non-positive limits fall back to the default; large ones are capped.
pub fn normalize_limit(limit: i64) -> i64 {
    if limit <= 0 {
        DEFAULT_HISTORY_LIMIT
    } else {
        limit.min(MAX_HISTORY_LIMIT)
    }
}

#[derive(Debug, Clone)]
pub struct NewChatMessage {
    pub content: String,
    pub username: String,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn save(&self, message: NewChatMessage) -> Result<ChatMessage, StoreError>;
    /// Most recent messages, newest first.
    async fn recent(&self, limit: i64) -> Result<Vec<ChatMessage>, StoreError>;
    /// Messages strictly older than `before`, newest first.
    async fn before(&self, before: DateTime<Utc>, limit: i64) -> Result<Vec<ChatMessage>, StoreError>;
}

pub struct SqliteMessageStore {
    db: DbPool,
}

impl SqliteMessageStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

const MESSAGE_COLUMNS: &str = "id, content, username, user_id, created_at";

fn message_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatMessage> {
    Ok(ChatMessage {
        id: row.get(0)?,
        content: row.get(1)?,
        username: row.get(2)?,
        user_id: row.get(3)?,
        created_at: ts_column(row, 4)?,
    })
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn save(&self, message: NewChatMessage) -> Result<ChatMessage, StoreError> {
        with_conn(&self.db, move |conn| {
            let created_at = message.created_at.trunc_subsecs(3);
            conn.execute(
                "INSERT INTO messages (content, username, user_id, created_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    message.content,
                    message.username,
                    message.user_id,
                    format_ts(created_at)
                ],
            )?;
            Ok(ChatMessage {
                id: conn.last_insert_rowid(),
                content: message.content,
                username: message.username,
                user_id: message.user_id,
                created_at,
            })
        })
        .await
    }

    async fn recent(&self, limit: i64) -> Result<Vec<ChatMessage>, StoreError> {
        let limit = normalize_limit(limit);
        with_conn(&self.db, move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages ORDER BY created_at DESC, id DESC LIMIT ?1"
            ))?;
            let messages = stmt
                .query_map([limit], message_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(messages)
        })
        .await
    }

    async fn before(&self, before: DateTime<Utc>, limit: i64) -> Result<Vec<ChatMessage>, StoreError> {
        let limit = normalize_limit(limit);
        with_conn(&self.db, move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages WHERE created_at < ?1 \
                 ORDER BY created_at DESC, id DESC LIMIT ?2"
            ))?;
            let messages = stmt
                .query_map(rusqlite::params![format_ts(before), limit], message_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(messages)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database;
    use chrono::{Duration, TimeZone};

    fn store() -> SqliteMessageStore {
        SqliteMessageStore::new(init_database(":memory:").unwrap())
    }

    fn at(secs: i64, content: &str) -> NewChatMessage {
        NewChatMessage {
            content: content.to_string(),
            username: "alice".to_string(),
            user_id: 1,
            created_at: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
        }
    }

    #[test]
    fn limits_are_normalized() {
        assert_eq!(normalize_limit(0), DEFAULT_HISTORY_LIMIT);
        assert_eq!(normalize_limit(-3), DEFAULT_HISTORY_LIMIT);
        assert_eq!(normalize_limit(20), 20);
        assert_eq!(normalize_limit(5000), MAX_HISTORY_LIMIT);
    }

    #[tokio::test]
    async fn recent_is_newest_first() {
        let store = store();
        for i in 0..5 {
            store.save(at(i, &format!("m{i}"))).await.unwrap();
        }

        let recent = store.recent(3).await.unwrap();
        let contents: Vec<_> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m4", "m3", "m2"]);
    }

    #[tokio::test]
    async fn before_excludes_the_boundary() {
        let store = store();
        for i in 0..5 {
            store.save(at(i, &format!("m{i}"))).await.unwrap();
        }

        let boundary = Utc.timestamp_opt(1_700_000_000 + 3, 0).unwrap();
        let older = store.before(boundary, 0).await.unwrap();
        let contents: Vec<_> = older.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m1", "m0"]);

        let none = store.before(boundary - Duration::days(1), 10).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn saved_timestamp_matches_stored_precision() {
        let store = store();
        let precise = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let saved = store
            .save(NewChatMessage { created_at: precise, ..at(0, "precise") })
            .await
            .unwrap();

        assert_eq!(saved.created_at, Utc.timestamp_opt(1_700_000_000, 123_000_000).unwrap());
        assert_eq!(store.recent(1).await.unwrap(), vec![saved]);
    }

    #[tokio::test]
    async fn save_round_trips_fields() {
        let store = store();
        let saved = store.save(at(0, "hello")).await.unwrap();
        assert!(saved.id > 0);
        assert_eq!(store.recent(10).await.unwrap(), vec![saved]);
    }
}
