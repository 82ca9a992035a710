//! Database initialization and schema setup.

use rusqlite::Connection;
use std::sync::{Arc, Mutex};

/// rusqlite is synchronous: the connection sits behind a mutex and every query
/// runs inside `spawn_blocking`.
pub type DbPool = Arc<Mutex<Connection>>;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS posts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        content TEXT NOT NULL,
        author_id INTEGER NOT NULL,
        author TEXT NOT NULL,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_posts_created_at ON posts (created_at);

    CREATE TABLE IF NOT EXISTS messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        content TEXT NOT NULL,
        username TEXT NOT NULL,
        user_id INTEGER NOT NULL,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_messages_created_at ON messages (created_at);
";

/// Open (or create) the forum database and apply the schema.
/// `":memory:"` yields a private in-memory database.
pub fn init_database(path: &str) -> rusqlite::Result<DbPool> {
    let conn = Connection::open(path)?;
    if path != ":memory:" {
        conn.pragma_update(None, "journal_mode", "WAL")?;
    }
    conn.execute_batch(SCHEMA)?;

    tracing::info!(path = %path, "Forum database initialized");
    Ok(Arc::new(Mutex::new(conn)))
}
