//! Database schema migrations for focusroom.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};

/// Schema version after every migration has run.
pub const CURRENT_VERSION: i32 = 2;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Get the current schema version from the database.
///
/// Returns 0 if no version is set (initial database).
pub fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or_else(|e| {
        if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            tracing::warn!(error = %e, "failed to read schema_version");
        }
        0
    })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Migration v1: sessions and the key-value table.
///
/// Timestamps are stored as fixed-width UTC RFC 3339 text so range
/// filters can compare them lexically.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS sessions (
            id              TEXT PRIMARY KEY,
            user_id         TEXT NOT NULL,
            subject_id      TEXT,
            phase_kind      TEXT NOT NULL DEFAULT 'focus',
            start_time      TEXT NOT NULL,
            end_time        TEXT,
            elapsed_seconds INTEGER NOT NULL DEFAULT 0,
            focus_score     INTEGER
        );

        CREATE TABLE IF NOT EXISTS kv (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_sessions_user_end ON sessions(user_id, end_time);
        CREATE INDEX IF NOT EXISTS idx_sessions_user_start ON sessions(user_id, start_time);",
    )?;

    set_schema_version(&tx, 1)?;
    tx.commit()
}

/// Migration v2: one-shot achievement unlocks.
///
/// `unlocked` is kept as an integer flag so rows written by older clients
/// that stored 0/1 or other truthy integers still read back correctly.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS achievements (
            id          TEXT PRIMARY KEY,
            unlocked    INTEGER NOT NULL DEFAULT 1,
            unlocked_at TEXT NOT NULL
        );",
    )?;

    set_schema_version(&tx, 2)?;
    tx.commit()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrate_from_scratch() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();

        assert_eq!(get_schema_version(&conn), CURRENT_VERSION);

        conn.execute(
            "INSERT INTO sessions (id, user_id, start_time) VALUES ('s1', 'local', '2024-01-01T12:00:00.000Z')",
            [],
        )
        .unwrap();
        let (phase, elapsed): (String, i64) = conn
            .query_row(
                "SELECT phase_kind, elapsed_seconds FROM sessions WHERE id = 's1'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(phase, "focus");
        assert_eq!(elapsed, 0);
    }

    #[test]
    fn test_migrate_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), CURRENT_VERSION);
    }

    #[test]
    fn test_incremental_migration() {
        let conn = Connection::open_in_memory().unwrap();
        create_schema_version_table(&conn).unwrap();
        migrate_v1(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), 1);

        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), 2);

        let stmt = conn
            .prepare("SELECT id, unlocked, unlocked_at FROM achievements")
            .unwrap();
        drop(stmt);
    }
}
