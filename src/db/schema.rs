use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension};

struct Migration {
    version: &'static str,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "001",
        name: "initial",
        sql: include_str!("migrations/001_initial.sql"),
    },
    Migration {
        version: "002",
        name: "tasks_and_bookings",
        sql: include_str!("migrations/002_tasks_and_bookings.sql"),
    },
];

pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )",
    )
    .context("Failed to create schema_migrations table")?;

    for migration in MIGRATIONS {
        if !is_applied(conn, migration.version)? {
            apply_migration(conn, migration)?;
        }
    }

    Ok(())
}

fn is_applied(conn: &Connection, version: &str) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM schema_migrations WHERE version = ?",
            [version],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

fn apply_migration(conn: &mut Connection, migration: &Migration) -> Result<()> {
    tracing::info!(
        "Applying migration {}: {}",
        migration.version,
        migration.name
    );

    // Schema change and its bookkeeping row commit together.
    let tx = conn.transaction()?;
    tx.execute_batch(migration.sql).with_context(|| {
        format!(
            "Failed to apply migration {}: {}",
            migration.version, migration.name
        )
    })?;
    tx.execute(
        "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?, ?, ?)",
        (
            migration.version,
            migration.name,
            super::timestamp(chrono::Utc::now()),
        ),
    )?;
    tx.commit()?;

    tracing::info!("Migration {} applied successfully", migration.version);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn applied_versions(conn: &Connection) -> Result<Vec<String>> {
        let mut stmt = conn.prepare("SELECT version FROM schema_migrations ORDER BY version")?;
        let versions = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(versions)
    }

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?",
            [name],
            |row| row.get::<_, i32>(0),
        )
        .unwrap()
            == 1
    }

    #[test]
    fn test_migrations_run_on_fresh_db() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();

        for table in [
            "users",
            "projects",
            "project_students",
            "project_applications",
            "tasks",
            "task_assignees",
            "mentorship_bookings",
            "booking_students",
        ] {
            assert!(table_exists(&conn, table), "missing table {table}");
        }

        assert_eq!(applied_versions(&conn).unwrap(), vec!["001", "002"]);
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();
        run_migrations(&mut conn).unwrap();

        assert_eq!(applied_versions(&conn).unwrap(), vec!["001", "002"]);
    }

    #[test]
    fn test_partially_migrated_db_catches_up() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE schema_migrations (version TEXT PRIMARY KEY, name TEXT NOT NULL, applied_at TEXT NOT NULL);",
        )
        .unwrap();
        conn.execute_batch(MIGRATIONS[0].sql).unwrap();
        conn.execute(
            "INSERT INTO schema_migrations VALUES ('001', 'initial', '2024-01-01T00:00:00.000000Z')",
            [],
        )
        .unwrap();

        run_migrations(&mut conn).unwrap();

        assert!(table_exists(&conn, "mentorship_bookings"));
        assert_eq!(applied_versions(&conn).unwrap(), vec!["001", "002"]);
    }
}
