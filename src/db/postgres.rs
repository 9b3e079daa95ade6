// PgDatabase: PostgreSQL backend implementing the Database trait.
//
// Uses sqlx PgPool for native async queries. All queries use runtime
// parameter binding (not compile-time macros) to avoid requiring
// DATABASE_URL at compile time.
//
// Key differences from SQLite:
// - TIMESTAMPTZ instead of TEXT for created_at
// - JSONB for request metadata
// - $1/$2 parameter syntax (handled by sqlx)
// - GENERATED ALWAYS AS IDENTITY for auto-increment

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx_core::pool::Pool;
use sqlx_core::row::Row;
use sqlx_postgres::{PgRow, Postgres};

use super::models::{ClassificationCounts, ClassificationRecord};
use super::traits::Database;
use crate::fingerprint::{ContentFingerprint, ContentType};

/// Type alias for the PostgreSQL connection pool.
pub type PgPool = Pool<Postgres>;

const SELECT_RECORD: &str = "SELECT fingerprint, content_type, result_json, metadata_json::text,
            to_char(created_at AT TIME ZONE 'UTC', 'YYYY-MM-DD\"T\"HH24:MI:SS.US\"+00:00\"')
     FROM classifications";

pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    /// Connect to PostgreSQL and run migrations.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Run all pending migrations.
    ///
    /// Holds a session-level advisory lock on one dedicated connection so two
    /// instances starting together don't race to apply the same migration.
    /// The lock and unlock MUST run on that same physical connection. The
    /// unlock always runs; a migration error takes priority over an unlock
    /// error when both happen.
    async fn run_migrations(&self) -> Result<()> {
        // ASCII "SIFTSIFT" as a big-endian i64.
        const MIGRATION_LOCK_KEY: i64 = 0x5349465453494654_u64 as i64;

        let mut lock_conn = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire connection for migration advisory lock")?;

        sqlx_core::query::query("SELECT pg_advisory_lock($1)")
            .bind(MIGRATION_LOCK_KEY)
            .execute(&mut *lock_conn)
            .await
            .context("Failed to acquire migration advisory lock")?;

        let migration_result: Result<()> = async {
            sqlx_core::query::query(
                "CREATE TABLE IF NOT EXISTS schema_version (
                    version INTEGER PRIMARY KEY,
                    applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                )",
            )
            .execute(&self.pool)
            .await?;

            let migrations = [
                (
                    1,
                    include_str!("../../migrations/postgres/0001_initial.sql"),
                ),
                (
                    2,
                    include_str!("../../migrations/postgres/0002_created_index.sql"),
                ),
            ];

            for (version, sql) in migrations {
                let applied: bool = sqlx_core::query::query(
                    "SELECT COUNT(*) > 0 FROM schema_version WHERE version = $1",
                )
                .bind(version)
                .fetch_one(&self.pool)
                .await
                .map(|row| row.get::<bool, _>(0))
                .unwrap_or(false);

                if !applied {
                    // Each migration and its schema_version insert commit together.
                    let mut tx = self.pool.begin().await?;
                    sqlx_core::raw_sql::raw_sql(sql).execute(&mut *tx).await?;
                    tx.commit()
                        .await
                        .with_context(|| format!("Migration v{version} failed"))?;
                }
            }

            Ok(())
        }
        .await;

        let unlock_result = sqlx_core::query::query("SELECT pg_advisory_unlock($1)")
            .bind(MIGRATION_LOCK_KEY)
            .execute(&mut *lock_conn)
            .await
            .context("Failed to release migration advisory lock");

        migration_result?;
        unlock_result?;

        Ok(())
    }
}

fn record_from_row(row: &PgRow) -> Result<ClassificationRecord> {
    let content_type: String = row.get(1);
    let content_type: ContentType = content_type
        .parse()
        .map_err(|t| anyhow::anyhow!("unknown content type in database: {t}"))?;
    Ok(ClassificationRecord {
        fingerprint: row.get(0),
        content_type,
        result_json: row.get(2),
        metadata_json: row.get(3),
        created_at: row.get(4),
    })
}

#[async_trait]
impl Database for PgDatabase {
    async fn table_count(&self) -> Result<i64> {
        let row = sqlx_core::query::query(
            "SELECT COUNT(*)::bigint FROM information_schema.tables
             WHERE table_schema = 'public' AND table_type = 'BASE TABLE'",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<i64, _>(0))
    }

    async fn get_classification(
        &self,
        fingerprint: &ContentFingerprint,
        content_type: ContentType,
    ) -> Result<Option<ClassificationRecord>> {
        let row = sqlx_core::query::query(&format!(
            "{SELECT_RECORD} WHERE fingerprint = $1 AND content_type = $2"
        ))
        .bind(fingerprint.to_hex())
        .bind(content_type.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn insert_classification(&self, record: &ClassificationRecord) -> Result<bool> {
        let result = sqlx_core::query::query(
            "INSERT INTO classifications
                (fingerprint, content_type, result_json, metadata_json, created_at)
             VALUES ($1, $2, $3, $4::jsonb, $5::timestamptz)
             ON CONFLICT (fingerprint, content_type) DO NOTHING",
        )
        .bind(&record.fingerprint)
        .bind(record.content_type.as_str())
        .bind(&record.result_json)
        .bind(&record.metadata_json)
        .bind(&record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn classification_counts(&self) -> Result<ClassificationCounts> {
        let rows = sqlx_core::query::query(
            "SELECT content_type, COUNT(*)::bigint FROM classifications GROUP BY content_type",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut counts = ClassificationCounts::default();
        for row in &rows {
            let n = row.get::<i64, _>(1);
            match row.get::<String, _>(0).as_str() {
                "text" => counts.text = n,
                "image" => counts.image = n,
                _ => {}
            }
        }
        Ok(counts)
    }

    async fn recent_classifications(&self, limit: u32) -> Result<Vec<ClassificationRecord>> {
        let rows = sqlx_core::query::query(&format!(
            "{SELECT_RECORD} ORDER BY created_at DESC, id DESC LIMIT $1"
        ))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }
}
