//! Schema migration runner.
//!
//! Migrations are embedded at compile time via [`include_str!`] and executed
//! in version order. Each migration runs inside a transaction — a failure
//! rolls back cleanly with no partial schema state.
//!
//! The `schema_version` table tracks which migrations have been applied.
//! Running the migrator is idempotent: already-applied versions are skipped.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::errors::{Result, StoreError};

/// A single migration with a version number and SQL to execute.
struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

/// All migrations in version order.
const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "Complete schema — users, sessions, rooms, messages, social graph",
    sql: include_str!("v001_schema.sql"),
}];

/// Run all pending migrations on the given connection.
///
/// Creates the `schema_version` table if it doesn't exist, then applies
/// each migration whose version exceeds the current maximum. Each migration
/// runs in its own transaction.
///
/// # Errors
///
/// Returns [`StoreError::Migration`] if any migration SQL fails.
pub fn run_migrations(conn: &Connection) -> Result<u32> {
    ensure_version_table(conn)?;
    let current = current_version(conn)?;
    let mut applied = 0;

    for migration in MIGRATIONS {
        if migration.version <= current {
            debug!(
                version = migration.version,
                description = migration.description,
                "migration already applied, skipping"
            );
            continue;
        }

        info!(
            version = migration.version,
            description = migration.description,
            "applying migration"
        );

        apply_migration(conn, migration)?;
        applied += 1;
    }

    if applied > 0 {
        info!(applied, "migrations complete");
    }

    Ok(applied)
}

/// Return the highest applied migration version, or 0 if none.
pub fn current_version(conn: &Connection) -> Result<u32> {
    let version: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .map_err(|e| StoreError::Migration {
            message: format!("failed to read schema_version: {e}"),
        })?;
    Ok(version)
}

/// Return the latest migration version defined in code.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |m| m.version)
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal
// ─────────────────────────────────────────────────────────────────────────────

fn ensure_version_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
           version     INTEGER PRIMARY KEY,
           applied_at  TEXT    NOT NULL,
           description TEXT
         );",
    )
    .map_err(|e| StoreError::Migration {
        message: format!("failed to create schema_version table: {e}"),
    })?;
    Ok(())
}

fn apply_migration(conn: &Connection, migration: &Migration) -> Result<()> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| StoreError::Migration {
            message: format!(
                "failed to begin transaction for v{}: {e}",
                migration.version
            ),
        })?;

    tx.execute_batch(migration.sql)
        .map_err(|e| StoreError::Migration {
            message: format!(
                "migration v{} ({}) failed: {e}",
                migration.version, migration.description
            ),
        })?;

    let _ = tx.execute(
        "INSERT INTO schema_version (version, applied_at, description) VALUES (?1, datetime('now'), ?2)",
        rusqlite::params![migration.version, migration.description],
    )
    .map_err(|e| StoreError::Migration {
        message: format!("failed to record v{} in schema_version: {e}", migration.version),
    })?;

    tx.commit().map_err(|e| StoreError::Migration {
        message: format!("failed to commit v{}: {e}", migration.version),
    })?;

    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn open_memory() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;",
        )
        .unwrap();
        conn
    }

    #[test]
    fn run_migrations_creates_all_tables() {
        let conn = open_memory();
        let applied = run_migrations(&conn).unwrap();
        assert_eq!(applied, 1);

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        let expected = [
            "users",
            "sessions",
            "private_rooms",
            "groups",
            "group_rooms",
            "private_messages",
            "group_messages",
            "follow_requests",
            "follows",
            "group_members",
            "group_invites",
            "group_join_requests",
            "events",
            "event_responses",
            "schema_version",
        ];
        for table in &expected {
            assert!(
                tables.contains(&(*table).to_string()),
                "missing table: {table}"
            );
        }
    }

    #[test]
    fn run_migrations_is_idempotent() {
        let conn = open_memory();
        assert_eq!(run_migrations(&conn).unwrap(), 1);
        assert_eq!(run_migrations(&conn).unwrap(), 0);
    }

    #[test]
    fn current_version_starts_at_zero() {
        let conn = open_memory();
        ensure_version_table(&conn).unwrap();
        assert_eq!(current_version(&conn).unwrap(), 0);
    }

    #[test]
    fn current_version_after_migration() {
        let conn = open_memory();
        run_migrations(&conn).unwrap();
        assert_eq!(current_version(&conn).unwrap(), latest_version());
    }

    #[test]
    fn schema_version_records_applied_migration() {
        let conn = open_memory();
        run_migrations(&conn).unwrap();

        let (version, desc): (u32, String) = conn
            .query_row(
                "SELECT version, description FROM schema_version WHERE version = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();

        assert_eq!(version, 1);
        assert!(desc.contains("Complete schema"));
    }

    #[test]
    fn indexes_are_created() {
        let conn = open_memory();
        run_migrations(&conn).unwrap();

        let indexes: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'index' AND name LIKE 'idx_%'")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        let expected = [
            "idx_sessions_expires",
            "idx_private_messages_room",
            "idx_private_messages_unread",
            "idx_group_messages_room",
            "idx_follow_requests_target",
            "idx_follows_followee",
            "idx_group_members_user",
            "idx_group_invites_user",
            "idx_group_join_requests_group",
            "idx_events_group",
            "idx_event_responses_user",
        ];
        for idx in &expected {
            assert!(indexes.contains(&(*idx).to_string()), "missing index: {idx}");
        }
    }

    #[test]
    fn private_room_pair_must_be_canonical() {
        let conn = open_memory();
        run_migrations(&conn).unwrap();

        for id in 1..=2 {
            conn.execute(
                "INSERT INTO users (id, email, password_hash, first_name, last_name, created_at)
                 VALUES (?1, ?2, 'x', 'F', 'L', '2026-01-01T00:00:00Z')",
                rusqlite::params![id, format!("u{id}@example.com")],
            )
            .unwrap();
        }

        // Reversed pair violates the canonical-order CHECK.
        let result = conn.execute(
            "INSERT INTO private_rooms (room_id, user_lo, user_hi, created_at)
             VALUES ('r1', 2, 1, '2026-01-01T00:00:00Z')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn duplicate_private_room_pair_rejected() {
        let conn = open_memory();
        run_migrations(&conn).unwrap();

        for id in 1..=2 {
            conn.execute(
                "INSERT INTO users (id, email, password_hash, first_name, last_name, created_at)
                 VALUES (?1, ?2, 'x', 'F', 'L', '2026-01-01T00:00:00Z')",
                rusqlite::params![id, format!("u{id}@example.com")],
            )
            .unwrap();
        }
        conn.execute(
            "INSERT INTO private_rooms (room_id, user_lo, user_hi, created_at)
             VALUES ('r1', 1, 2, '2026-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        let duplicate = conn.execute(
            "INSERT INTO private_rooms (room_id, user_lo, user_hi, created_at)
             VALUES ('r2', 1, 2, '2026-01-01T00:00:00Z')",
            [],
        );
        assert!(duplicate.is_err());
    }

    #[test]
    fn foreign_keys_enforced() {
        let conn = open_memory();
        run_migrations(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO sessions (token, user_id, expires_at)
             VALUES ('tok', 999, '2026-01-01T00:00:00Z')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn self_follow_rejected() {
        let conn = open_memory();
        run_migrations(&conn).unwrap();

        conn.execute(
            "INSERT INTO users (id, email, password_hash, first_name, last_name, created_at)
             VALUES (1, 'a@example.com', 'x', 'F', 'L', '2026-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        let result = conn.execute(
            "INSERT INTO follows (follower_id, followee_id, created_at)
             VALUES (1, 1, '2026-01-01T00:00:00Z')",
            [],
        );
        assert!(result.is_err());
    }
}
