//! Pooled SQLite connections for the registry database.

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OpenFlags};
use std::time::Duration;
use thiserror::Error;

/// Per-connection settings applied when the pool opens a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbRuntimeSettings {
    /// How long a writer waits on a locked registry before giving up.
    pub busy_timeout_ms: u64,

    pub pool_max_size: u32,
}

impl Default for DbRuntimeSettings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            pool_max_size: 8,
        }
    }
}

/// Shared handle to the registry database.
pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("registry database unavailable: {0}")]
    PoolInit(#[from] r2d2::Error),
}

/// Opens the registry database at `db_path` behind a connection pool.
///
/// `:memory:` gives every connection a private database; pair it with
/// `pool_max_size = 1`.
///
/// # Errors
///
/// Returns [`PoolError::PoolInit`] if the first connection cannot be opened
/// or configured.
pub fn create_pool(db_path: &str, settings: DbRuntimeSettings) -> Result<DbPool, PoolError> {
    let manager = SqliteConnectionManager::file(db_path)
        .with_flags(
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        )
        .with_init(move |conn| configure_connection(conn, settings.busy_timeout_ms));

    let pool = Pool::builder()
        .max_size(settings.pool_max_size)
        .build(manager)?;

    tracing::debug!(
        path = db_path,
        pool_max_size = settings.pool_max_size,
        "created registry database pool"
    );
    Ok(pool)
}

/// Switches `conn` to write-ahead logging and turns on foreign keys, which
/// the delete cascade relies on.
fn configure_connection(conn: &Connection, busy_timeout_ms: u64) -> rusqlite::Result<()> {
    let journal: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    if !matches!(journal.as_str(), "wal" | "memory") {
        return Err(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
            Some(format!(
                "registry database refused write-ahead logging (journal_mode={journal})"
            )),
        ));
    }
    conn.pragma_update(None, "foreign_keys", true)?;
    conn.busy_timeout(Duration::from_millis(busy_timeout_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_file_pool_applies_pragmas() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let path = dir.path().join("registry.db");
        let settings = DbRuntimeSettings {
            busy_timeout_ms: 2_500,
            pool_max_size: 3,
        };

        let pool = create_pool(path.to_str().expect("utf-8 path"), settings)
            .expect("pool creation should succeed");
        let conn = pool.get().expect("should get a connection");

        let mode: String = conn
            .query_row("PRAGMA journal_mode;", [], |row| row.get(0))
            .expect("should query journal_mode");
        assert_eq!(mode, "wal");

        let fk: i32 = conn
            .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
            .expect("should query foreign_keys");
        assert_eq!(fk, 1, "foreign keys should be enabled");

        let busy_timeout: i32 = conn
            .query_row("PRAGMA busy_timeout;", [], |row| row.get(0))
            .expect("should query busy_timeout");
        assert_eq!(busy_timeout, 2_500, "busy timeout should match settings");

        assert_eq!(pool.max_size(), 3, "pool max size should match settings");
    }

    #[test]
    fn configured_connection_enforces_foreign_keys() {
        let conn = Connection::open_in_memory().expect("should open connection");
        configure_connection(&conn, 750).expect("should configure connection");
        conn.execute_batch(
            "CREATE TABLE parent (id INTEGER PRIMARY KEY);
             CREATE TABLE child (parent_id INTEGER NOT NULL REFERENCES parent(id));",
        )
        .expect("should create tables");

        assert!(conn
            .execute("INSERT INTO child (parent_id) VALUES (42)", [])
            .is_err());
        let busy_timeout: i64 = conn
            .query_row("PRAGMA busy_timeout", [], |row| row.get(0))
            .expect("should query busy_timeout");
        assert_eq!(busy_timeout, 750);
    }

    #[test]
    fn create_in_memory_pool() {
        let settings = DbRuntimeSettings {
            busy_timeout_ms: 1_000,
            pool_max_size: 1,
        };
        let pool = create_pool(":memory:", settings).expect("pool creation should succeed");
        let conn = pool.get().expect("should get a connection");
        let mode: String = conn
            .query_row("PRAGMA journal_mode;", [], |row| row.get(0))
            .expect("should query journal_mode");
        assert_eq!(mode, "memory");
    }
}
