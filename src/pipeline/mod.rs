// Moderation pipeline and the wire form of batch items.

pub mod moderator;

pub use moderator::{ModerateOptions, Moderator, ModeratorSettings};

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{parse_content_type, ModerationError};
use crate::fingerprint::{Content, ContentType};

/// One entry of a batch request: `{"type": "text" | "image", "content": ...}`.
///
/// Image content is standard base64.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItem {
    #[serde(rename = "type")]
    pub content_type: String,
    pub content: String,
}

impl BatchItem {
    pub fn into_content(self) -> Result<Content, ModerationError> {
        match parse_content_type(&self.content_type)? {
            ContentType::Text => Ok(Content::Text(self.content)),
            ContentType::Image => decode_image(&self.content).map(Content::Image),
        }
    }
}

/// Decode base64 image content from an untrusted source.
pub fn decode_image(encoded: &str) -> Result<Vec<u8>, ModerationError> {
    base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| ModerationError::Validation(format!("image is not valid base64: {e}")))
}

/// Convert every item, failing on the first unsupported or undecodable one.
pub fn parse_batch(items: Vec<BatchItem>) -> Result<Vec<Content>, ModerationError> {
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            item.into_content().map_err(|e| match e {
                ModerationError::Validation(msg) => {
                    ModerationError::Validation(format!("item {index}: {msg}"))
                }
                other => other,
            })
        })
        .collect()
}
