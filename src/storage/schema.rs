//! `SQLite` schema and migrations for the aggregation layer's two tables:
//! the persisted response cache and the credential rows.

use rusqlite::Connection;

use crate::error::Result;

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sql: include_str!("../../migrations/001_response_cache.sql"),
    },
    Migration {
        version: 2,
        sql: include_str!("../../migrations/002_credentials.sql"),
    },
];

/// Run schema migrations. Returns the latest schema version applied.
///
/// # Errors
/// Returns an error if creating the migrations table, reading the schema
/// version, or applying any migration fails.
pub fn run_migrations(conn: &mut Connection) -> Result<i32> {
    ensure_schema_migrations_table(conn)?;

    let mut current_version = get_schema_version(conn)?;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            apply_migration(conn, migration)?;
            current_version = migration.version;
        }
    }

    Ok(current_version)
}

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: i32,
    sql: &'static str,
}

fn ensure_schema_migrations_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (\
            version INTEGER PRIMARY KEY,\
            applied_at TEXT DEFAULT (datetime('now'))\
        );",
    )
    .map_err(|e| anyhow::anyhow!("create schema_migrations: {e}"))?;

    Ok(())
}

fn get_schema_version(conn: &Connection) -> Result<i32> {
    let version: Option<i32> = conn
        .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
            row.get(0)
        })
        .map_err(|e| anyhow::anyhow!("read schema version: {e}"))?;

    Ok(version.unwrap_or(0))
}

fn apply_migration(conn: &mut Connection, migration: &Migration) -> Result<()> {
    let tx = conn
        .transaction()
        .map_err(|e| anyhow::anyhow!("begin migration: {e}"))?;

    tx.execute_batch(migration.sql)
        .map_err(|e| anyhow::anyhow!("apply migration {}: {e}", migration.version))?;

    tx.execute(
        "INSERT INTO schema_migrations (version) VALUES (?1)",
        [migration.version],
    )
    .map_err(|e| anyhow::anyhow!("record migration {}: {e}", migration.version))?;

    tx.commit()
        .map_err(|e| anyhow::anyhow!("commit migration {}: {e}", migration.version))?;

    Ok(())
}
