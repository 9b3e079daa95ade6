// Database layer: the durable tier for moderation results.
//
// SQLite (rusqlite, bundled) is the default backend; PostgreSQL is available
// behind the `postgres` feature. Both sit behind the async `Database` trait so
// the rest of the crate never touches a driver directly. The SQLite file lives
// wherever SIFT_DB_PATH points (defaults to ./sift.db).

pub mod models;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod queries;
pub mod schema;
pub mod sqlite;
pub mod traits;

pub use traits::Database;

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;

use crate::config::Config;

/// Open (or create) the SQLite database and run migrations.
///
/// Called by `sift init` and by `connect` when no Postgres URL is set.
pub fn initialize_sqlite(db_path: &str) -> Result<Connection> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory for database: {db_path}"))?;
        }
    }

    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open database at {db_path}"))?;

    // WAL lets readers proceed while a writer holds the lock
    conn.pragma_update(None, "journal_mode", "WAL")?;

    schema::create_tables(&conn)?;

    Ok(conn)
}

/// Open an existing SQLite database (fails if it doesn't exist yet).
pub fn open_sqlite(db_path: &str) -> Result<Connection> {
    if !Path::new(db_path).exists() {
        anyhow::bail!("Database not found at {db_path}. Run `sift init` first.");
    }

    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open database at {db_path}"))?;

    conn.pragma_update(None, "journal_mode", "WAL")?;

    // Pick up migrations added since the file was created
    schema::create_tables(&conn)?;

    Ok(conn)
}

#[cfg(feature = "postgres")]
pub async fn connect_postgres(database_url: &str) -> Result<postgres::PgDatabase> {
    postgres::PgDatabase::connect(database_url).await
}

/// Connect to whichever backend the configuration selects.
///
/// `DATABASE_URL` wins when set; otherwise the SQLite file is opened, or
/// created when `create` is true.
pub async fn connect(config: &Config, create: bool) -> Result<Arc<dyn Database>> {
    if let Some(url) = &config.database_url {
        #[cfg(feature = "postgres")]
        {
            let db = connect_postgres(url).await?;
            return Ok(Arc::new(db));
        }
        #[cfg(not(feature = "postgres"))]
        {
            let _ = url;
            anyhow::bail!("DATABASE_URL is set but sift was built without the `postgres` feature");
        }
    }

    let conn = if create {
        initialize_sqlite(&config.db_path)?
    } else {
        open_sqlite(&config.db_path)?
    };
    Ok(Arc::new(sqlite::SqliteDatabase::new(conn)))
}
