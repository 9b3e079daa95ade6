// Data models: Rust structs that map to database rows.
//
// These are the types that flow through the application. They're separate
// from the database queries so other modules can use them without depending
// on rusqlite or sqlx directly.

use serde::{Deserialize, Serialize};

use crate::fingerprint::{ContentFingerprint, ContentType, CACHE_KEY_PREFIX};

/// One moderation result, stored exactly once per (fingerprint, content type).
///
/// The raw content is never stored; the fingerprint is enough to find the
/// record again and the result is what callers want back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRecord {
    /// 64-char lowercase hex SHA-256
    pub fingerprint: String,
    pub content_type: ContentType,
    /// Serialized verdict, exactly as returned to the caller
    pub result_json: String,
    /// Request metadata as a JSON object
    pub metadata_json: String,
    /// RFC 3339 UTC timestamp
    pub created_at: String,
}

impl ClassificationRecord {
    pub fn new(
        fingerprint: &ContentFingerprint,
        content_type: ContentType,
        result_json: String,
        metadata_json: String,
    ) -> Self {
        Self {
            fingerprint: fingerprint.to_hex(),
            content_type,
            result_json,
            metadata_json,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Ephemeral-tier key for this record.
    pub fn cache_key(&self) -> String {
        format!(
            "{CACHE_KEY_PREFIX}{}:{}",
            self.content_type.as_str(),
            self.fingerprint
        )
    }
}

/// Record counts for `sift status`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationCounts {
    pub text: i64,
    pub image: i64,
}

impl ClassificationCounts {
    pub fn total(&self) -> i64 {
        self.text + self.image
    }
}
