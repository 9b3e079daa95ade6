// SQLite schema for the durable tier.
//
// The base tables are created with IF NOT EXISTS on every open. Later
// changes are numbered migrations recorded in `schema_version`; each runs
// at most once per database file, inside its own transaction.

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension};

const BASE_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS schema_version (
        version INTEGER PRIMARY KEY,
        applied_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    -- One moderation result per (fingerprint, content type), written once
    CREATE TABLE IF NOT EXISTS classifications (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        fingerprint TEXT NOT NULL,         -- SHA-256 hex of the canonical content bytes
        content_type TEXT NOT NULL,        -- 'text' or 'image'
        result_json TEXT NOT NULL,         -- serialized verdict
        metadata_json TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL,
        UNIQUE (fingerprint, content_type)
    );
";

/// Numbered migrations applied after the base schema, in order.
const MIGRATIONS: &[(i64, &str)] = &[(
    2,
    "CREATE INDEX IF NOT EXISTS idx_classifications_created
        ON classifications(created_at);",
)];

/// Create tables and apply pending migrations. Safe on every startup.
pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(BASE_SCHEMA)
        .context("Failed to create database tables")?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (1)",
        [],
    )?;

    for &(version, sql) in MIGRATIONS {
        if applied(conn, version)? {
            continue;
        }
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(sql)
            .with_context(|| format!("Migration v{version} failed"))?;
        tx.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [version],
        )?;
        tx.commit()?;
    }
    Ok(())
}

fn applied(conn: &Connection, version: i64) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT version FROM schema_version WHERE version = ?1",
            [version],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Number of user tables, shown by `sift init`.
pub fn table_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}
