// Errors surfaced by the moderation pipeline.
//
// Inside adapters and storage everything is `anyhow::Result`. At the
// pipeline boundary callers need to tell "your input was bad" from "try
// again" from "we broke", so failures are classified here. Internal detail
// stays in the logs; `Analysis` carries only the generic message.

use thiserror::Error;

use crate::analysis::image_meta::{detect_format, ImageFormat};
use crate::fingerprint::{Content, ContentType};

pub const MAX_TEXT_CHARS: usize = 10_000;
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone, Error)]
pub enum ModerationError {
    /// Malformed or oversized input, rejected before fingerprinting.
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),

    /// A waiter gave up on another request's in-flight computation.
    #[error("timed out waiting for an in-flight moderation of the same content")]
    DedupTimeout,

    /// The job queue has stopped accepting work for good.
    #[error("job queue is shut down")]
    ShuttingDown,

    /// Anything else. Details are logged where the failure happened.
    #[error("Content moderation failed")]
    Analysis,
}

impl ModerationError {
    /// The same request may succeed if retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ModerationError::DedupTimeout | ModerationError::Analysis)
    }

    /// The caller sent something we will never accept.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ModerationError::Validation(_) | ModerationError::UnsupportedContentType(_)
        )
    }

    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            ModerationError::Validation(_) => "validation_error",
            ModerationError::UnsupportedContentType(_) => "unsupported_content_type",
            ModerationError::DedupTimeout => "dedup_timeout",
            ModerationError::ShuttingDown => "shutting_down",
            ModerationError::Analysis => "moderation_failed",
        }
    }
}

/// Reject text that is empty or longer than the limit.
pub fn validate_text(text: &str) -> Result<(), ModerationError> {
    if text.trim().is_empty() {
        return Err(ModerationError::Validation("text must not be empty".into()));
    }
    let chars = text.chars().count();
    if chars > MAX_TEXT_CHARS {
        return Err(ModerationError::Validation(format!(
            "text is {chars} characters, the limit is {MAX_TEXT_CHARS}"
        )));
    }
    Ok(())
}

/// Reject images that are empty, over the size limit, or not a container
/// format we recognize. Returns the detected format.
pub fn validate_image(bytes: &[u8]) -> Result<ImageFormat, ModerationError> {
    if bytes.is_empty() {
        return Err(ModerationError::Validation("image must not be empty".into()));
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(ModerationError::Validation(format!(
            "image is {} bytes, the limit is {MAX_IMAGE_BYTES}",
            bytes.len()
        )));
    }
    detect_format(bytes).ok_or_else(|| {
        ModerationError::Validation("image must be jpeg, png, gif or webp".into())
    })
}

/// Check content against the limits for its type.
pub fn validate_content(content: &Content) -> Result<(), ModerationError> {
    match content {
        Content::Text(text) => validate_text(text),
        Content::Image(bytes) => validate_image(bytes).map(|_| ()),
    }
}

/// Parse a content type name from an untrusted source.
pub fn parse_content_type(raw: &str) -> Result<ContentType, ModerationError> {
    raw.parse()
        .map_err(|_| ModerationError::UnsupportedContentType(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(ModerationError::Validation("x".into()).is_client_error());
        assert!(ModerationError::UnsupportedContentType("video".into()).is_client_error());
        assert!(!ModerationError::DedupTimeout.is_client_error());
        assert!(ModerationError::DedupTimeout.is_retryable());
        assert!(!ModerationError::Validation("x".into()).is_retryable());
        assert!(!ModerationError::ShuttingDown.is_retryable());
        assert!(!ModerationError::ShuttingDown.is_client_error());
    }

    #[test]
    fn test_analysis_message_is_generic() {
        assert_eq!(ModerationError::Analysis.to_string(), "Content moderation failed");
    }

    #[test]
    fn test_text_limits() {
        assert!(validate_text("ok").is_ok());
        assert!(validate_text("   ").is_err());
        assert!(validate_text(&"a".repeat(MAX_TEXT_CHARS)).is_ok());
        assert!(validate_text(&"a".repeat(MAX_TEXT_CHARS + 1)).is_err());
        // Limit counts characters, not bytes
        assert!(validate_text(&"é".repeat(MAX_TEXT_CHARS)).is_ok());
    }

    #[test]
    fn test_image_limits() {
        assert!(validate_image(&[]).is_err());
        assert!(validate_image(b"not an image").is_err());
        assert_eq!(validate_image(b"GIF89a").unwrap(), ImageFormat::Gif);
        let mut big = b"GIF89a".to_vec();
        big.resize(MAX_IMAGE_BYTES + 1, 0);
        assert!(validate_image(&big).is_err());
    }

    #[test]
    fn test_parse_content_type() {
        assert_eq!(parse_content_type("text").unwrap(), ContentType::Text);
        let err = parse_content_type("video").unwrap_err();
        assert!(matches!(err, ModerationError::UnsupportedContentType(ref t) if t == "video"));
    }
}
