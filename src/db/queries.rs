// Database queries: CRUD operations for the classifications table.
//
// Every SQLite interaction goes through this module. This keeps SQL
// contained in one place and gives the rest of the app clean Rust interfaces.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::models::{ClassificationCounts, ClassificationRecord};
use crate::fingerprint::{ContentFingerprint, ContentType};

const RECORD_COLUMNS: &str = "fingerprint, content_type, result_json, metadata_json, created_at";

/// Look up the record for a fingerprint and content type.
pub fn get_classification(
    conn: &Connection,
    fingerprint: &ContentFingerprint,
    content_type: ContentType,
) -> Result<Option<ClassificationRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RECORD_COLUMNS} FROM classifications
         WHERE fingerprint = ?1 AND content_type = ?2"
    ))?;
    let raw = stmt
        .query_row(
            params![fingerprint.to_hex(), content_type.as_str()],
            raw_record,
        )
        .optional()?;
    raw.map(into_record).transpose()
}

/// Insert unless a record already exists. Returns whether a row was written.
pub fn insert_classification(conn: &Connection, record: &ClassificationRecord) -> Result<bool> {
    let changed = conn.execute(
        "INSERT INTO classifications
            (fingerprint, content_type, result_json, metadata_json, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(fingerprint, content_type) DO NOTHING",
        params![
            record.fingerprint,
            record.content_type.as_str(),
            record.result_json,
            record.metadata_json,
            record.created_at,
        ],
    )?;
    Ok(changed == 1)
}

/// Number of stored records per content type.
pub fn classification_counts(conn: &Connection) -> Result<ClassificationCounts> {
    let mut stmt =
        conn.prepare("SELECT content_type, COUNT(*) FROM classifications GROUP BY content_type")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;

    let mut counts = ClassificationCounts::default();
    for row in rows {
        let (content_type, n) = row?;
        match content_type.as_str() {
            "text" => counts.text = n,
            "image" => counts.image = n,
            _ => {}
        }
    }
    Ok(counts)
}

/// Most recent records, newest first.
pub fn recent_classifications(conn: &Connection, limit: u32) -> Result<Vec<ClassificationRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RECORD_COLUMNS} FROM classifications
         ORDER BY created_at DESC, id DESC
         LIMIT ?1"
    ))?;
    let rows = stmt.query_map(params![limit], raw_record)?;
    rows.map(|r| into_record(r?)).collect()
}

type RawRecord = (String, String, String, String, String);

fn raw_record(row: &Row<'_>) -> rusqlite::Result<RawRecord> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
    ))
}

fn into_record(raw: RawRecord) -> Result<ClassificationRecord> {
    let (fingerprint, content_type, result_json, metadata_json, created_at) = raw;
    let content_type = content_type
        .parse()
        .map_err(|t| anyhow::anyhow!("unknown content type in database: {t}"))
        .context("Corrupt classification row")?;
    Ok(ClassificationRecord {
        fingerprint,
        content_type,
        result_json,
        metadata_json,
        created_at,
    })
}
