// Database trait: backend-agnostic async interface for the durable tier.
//
// Implementors: SqliteDatabase (wraps rusqlite), PgDatabase (wraps sqlx).
// All methods are async so both sync (rusqlite via Mutex) and native async
// (sqlx) backends fit behind a single interface.

use anyhow::Result;
use async_trait::async_trait;

use super::models::{ClassificationCounts, ClassificationRecord};
use crate::fingerprint::{ContentFingerprint, ContentType};

#[async_trait]
pub trait Database: Send + Sync {
    // --- Lifecycle ---

    /// Count the number of user-created tables in the database.
    async fn table_count(&self) -> Result<i64>;

    // --- Classifications ---

    /// Look up the record for a fingerprint.
    async fn get_classification(
        &self,
        fingerprint: &ContentFingerprint,
        content_type: ContentType,
    ) -> Result<Option<ClassificationRecord>>;

    /// Create the record if none exists for its (fingerprint, content type).
    ///
    /// Returns `true` when this call created it, `false` when a record was
    /// already there (first writer wins; the existing row is left untouched).
    async fn insert_classification(&self, record: &ClassificationRecord) -> Result<bool>;

    /// Number of stored records per content type.
    async fn classification_counts(&self) -> Result<ClassificationCounts>;

    /// Most recent records, newest first.
    async fn recent_classifications(&self, limit: u32) -> Result<Vec<ClassificationRecord>>;
}
