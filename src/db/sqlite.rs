// SqliteDatabase: rusqlite backend implementing the Database trait.
//
// The Connection is wrapped in tokio::sync::Mutex because Connection is !Sync.
// Trait methods lock the mutex, do synchronous rusqlite work, and return.
// The lock is never held across .await points.

use anyhow::Result;
use async_trait::async_trait;
use rusqlite::Connection;
use tokio::sync::Mutex;

use super::models::{ClassificationCounts, ClassificationRecord};
use super::traits::Database;
use crate::fingerprint::{ContentFingerprint, ContentType};

pub struct SqliteDatabase {
    conn: Mutex<Connection>,
}

impl SqliteDatabase {
    /// Wrap an already-opened rusqlite Connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Fresh in-memory database with the schema applied.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        super::schema::create_tables(&conn)?;
        Ok(Self::new(conn))
    }
}

#[async_trait]
impl Database for SqliteDatabase {
    async fn table_count(&self) -> Result<i64> {
        let conn = self.conn.lock().await;
        super::schema::table_count(&conn)
    }

    async fn get_classification(
        &self,
        fingerprint: &ContentFingerprint,
        content_type: ContentType,
    ) -> Result<Option<ClassificationRecord>> {
        let conn = self.conn.lock().await;
        super::queries::get_classification(&conn, fingerprint, content_type)
    }

    async fn insert_classification(&self, record: &ClassificationRecord) -> Result<bool> {
        let conn = self.conn.lock().await;
        super::queries::insert_classification(&conn, record)
    }

    async fn classification_counts(&self) -> Result<ClassificationCounts> {
        let conn = self.conn.lock().await;
        super::queries::classification_counts(&conn)
    }

    async fn recent_classifications(&self, limit: u32) -> Result<Vec<ClassificationRecord>> {
        let conn = self.conn.lock().await;
        super::queries::recent_classifications(&conn, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::fingerprint;

    #[tokio::test]
    async fn test_trait_roundtrip() {
        let db = SqliteDatabase::in_memory().unwrap();
        assert_eq!(db.table_count().await.unwrap(), 2);

        let fp = fingerprint(b"content");
        let rec = ClassificationRecord::new(&fp, ContentType::Image, "{}".into(), "{}".into());
        assert!(db.insert_classification(&rec).await.unwrap());
        assert!(!db.insert_classification(&rec).await.unwrap());

        let loaded = db
            .get_classification(&fp, ContentType::Image)
            .await
            .unwrap();
        assert_eq!(loaded, Some(rec));
        assert!(db
            .get_classification(&fp, ContentType::Text)
            .await
            .unwrap()
            .is_none());
        assert_eq!(db.classification_counts().await.unwrap().image, 1);
    }
}
