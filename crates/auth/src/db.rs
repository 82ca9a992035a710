//! Database initialization and schema setup.

use rusqlite::Connection;
use std::sync::{Arc, Mutex};

/// rusqlite is synchronous: the connection sits behind a mutex and every query
/// runs inside `spawn_blocking`.
pub type DbPool = Arc<Mutex<Connection>>;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        email TEXT NOT NULL UNIQUE,
        created_at TEXT NOT NULL
    );
";

/// Open (or create) the credential database and apply the schema.
/// `":memory:"` yields a private in-memory database.
pub fn init_database(path: &str) -> rusqlite::Result<DbPool> {
    let conn = Connection::open(path)?;
    if path != ":memory:" {
        conn.pragma_update(None, "journal_mode", "WAL")?;
    }
    conn.execute_batch(SCHEMA)?;

    tracing::info!(path = %path, "Credential database initialized");
    Ok(Arc::new(Mutex::new(conn)))
}
