//! Embedded SQL migration runner.
//!
//! Migrations are SQL files embedded at compile time. They run sequentially
//! on startup, tracked by the `_fedreg_migrations` table. Each migration
//! runs exactly once; already-applied migrations are skipped.

use rusqlite::Connection;
use thiserror::Error;

/// A single embedded migration.
struct Migration {
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. New migrations are appended here.
const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "000_entities",
        sql: include_str!("migrations/000_entities.sql"),
    },
    Migration {
        name: "001_metadata",
        sql: include_str!("migrations/001_metadata.sql"),
    },
    Migration {
        name: "002_connectivity",
        sql: include_str!("migrations/002_connectivity.sql"),
    },
    Migration {
        name: "003_users",
        sql: include_str!("migrations/003_users.sql"),
    },
];

/// Errors that can occur during migration execution.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// A SQL statement within a migration failed.
    #[error("migration '{name}' failed: {source}")]
    ExecutionFailed {
        /// The name of the migration that failed.
        name: String,
        /// The underlying SQLite error.
        source: rusqlite::Error,
    },

    /// Failed to query migration state.
    #[error("failed to check migration state: {0}")]
    StateQuery(rusqlite::Error),
}

/// Runs all pending migrations against the given connection.
///
/// Returns the number of migrations applied by this call.
///
/// # Errors
///
/// Returns `MigrationError` if any migration fails to execute or if the
/// migration tracking table cannot be queried.
pub fn run_migrations(conn: &Connection) -> Result<usize, MigrationError> {
    run_migrations_from_list(conn, MIGRATIONS)
}

fn run_migrations_from_list(
    conn: &Connection,
    migrations: &[Migration],
) -> Result<usize, MigrationError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _fedreg_migrations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .map_err(|e| MigrationError::ExecutionFailed {
        name: "_fedreg_migrations_bootstrap".to_string(),
        source: e,
    })?;

    let mut applied = 0;

    for migration in migrations {
        let already_applied: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM _fedreg_migrations WHERE name = ?1",
                [migration.name],
                |row| row.get(0),
            )
            .map_err(MigrationError::StateQuery)?;

        if already_applied {
            tracing::debug!(
                migration = migration.name,
                "migration already applied, skipping"
            );
            continue;
        }

        tracing::info!(migration = migration.name, "applying migration");

        let failed = |source| MigrationError::ExecutionFailed {
            name: migration.name.to_string(),
            source,
        };

        let tx = conn.unchecked_transaction().map_err(failed)?;
        tx.execute_batch(migration.sql).map_err(failed)?;
        tx.execute(
            "INSERT INTO _fedreg_migrations (name) VALUES (?1)",
            [migration.name],
        )
        .map_err(failed)?;
        tx.commit().map_err(failed)?;

        applied += 1;
    }

    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            [name],
            |row| row.get(0),
        )
        .expect("should query sqlite_master")
    }

    #[test]
    fn run_migrations_on_fresh_db() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        let applied = run_migrations(&conn).expect("migrations should succeed");
        assert_eq!(applied, 4);

        let count: i32 = conn
            .query_row("SELECT COUNT(*) FROM _fedreg_migrations", [], |row| {
                row.get(0)
            })
            .expect("should query migration count");
        assert_eq!(count, 4);
    }

    #[test]
    fn run_migrations_idempotent() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");

        let first = run_migrations(&conn).expect("first run should succeed");
        assert_eq!(first, 4);

        let second = run_migrations(&conn).expect("second run should succeed");
        assert_eq!(second, 0, "no new migrations to apply");
    }

    #[test]
    fn registry_schema_is_created() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        run_migrations(&conn).expect("migrations should succeed");

        for table in [
            "entities",
            "entity_revisions",
            "metadata",
            "allowed_entities",
            "blocked_entities",
            "users",
            "has_entity",
            "subscriptions",
        ] {
            assert!(table_exists(&conn, table), "{table} table should exist");
        }
    }

    #[test]
    fn revision_numbers_are_unique_per_entity() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        run_migrations(&conn).expect("migrations should succeed");

        conn.execute("INSERT INTO entities DEFAULT VALUES", [])
            .expect("should insert entity");
        let insert = "INSERT INTO entity_revisions (eid, revision_id, entity_id, state, entity_type)
                      VALUES (1, 0, 'urn:sp', 'pending', 'saml20-sp')";
        conn.execute(insert, []).expect("first revision should insert");
        assert!(
            conn.execute(insert, []).is_err(),
            "duplicate (eid, revision_id) must be rejected"
        );
    }

    #[test]
    fn migration_side_effects_rollback_when_tracking_insert_fails() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        let migrations = [Migration {
            name: "001_tracking_insert_conflict",
            sql: "
                CREATE TABLE rollback_marker (id INTEGER PRIMARY KEY);
                INSERT INTO _fedreg_migrations (name) VALUES ('001_tracking_insert_conflict');
            ",
        }];

        let err = run_migrations_from_list(&conn, &migrations)
            .expect_err("tracking insert conflict should fail migration");

        match err {
            MigrationError::ExecutionFailed { name, .. } => {
                assert_eq!(name, "001_tracking_insert_conflict")
            }
            other => panic!("unexpected error type: {other:?}"),
        }

        assert!(
            !table_exists(&conn, "rollback_marker"),
            "schema side effects should be rolled back when tracking insert fails"
        );
    }
}
