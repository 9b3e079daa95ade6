// Verdict aggregation: typed results and the pure functions that build them.
//
// `text` and `image` turn raw adapter outputs into a single result. Neither
// does any I/O; the pipeline gathers the signals and hands them over.

pub mod image;
pub mod text;
pub mod types;

use anyhow::{Context, Result};
use serde::Serialize;

pub use types::{ImageAnalysisResult, Signal, TextModerationResult};

use crate::fingerprint::ContentType;

/// The unified moderation result for either content type.
///
/// Serializes as the inner result with no wrapper, which is also the form
/// stored in both cache tiers; the content type travels alongside it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Verdict {
    Text(TextModerationResult),
    Image(ImageAnalysisResult),
}

impl Verdict {
    pub fn content_type(&self) -> ContentType {
        match self {
            Verdict::Text(_) => ContentType::Text,
            Verdict::Image(_) => ContentType::Image,
        }
    }

    /// Signals that failed and were replaced by neutral defaults.
    pub fn missing_signals(&self) -> &[Signal] {
        match self {
            Verdict::Text(r) => &r.missing_signals,
            Verdict::Image(r) => &r.missing_signals,
        }
    }

    pub fn is_degraded(&self) -> bool {
        !self.missing_signals().is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to serialize verdict")
    }

    /// Parse a stored result of the given content type.
    pub fn from_json(content_type: ContentType, json: &str) -> Result<Self> {
        match content_type {
            ContentType::Text => serde_json::from_str(json)
                .map(Verdict::Text)
                .context("Malformed stored text verdict"),
            ContentType::Image => serde_json::from_str(json)
                .map(Verdict::Image)
                .context("Malformed stored image verdict"),
        }
    }
}
