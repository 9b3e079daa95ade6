// Result records returned to callers and stored in both cache tiers.
//
// Field names serialize in camelCase to match the wire format clients
// already consume.

use serde::{Deserialize, Serialize};

use crate::analysis::image_meta::Dimensions;
use crate::analysis::spam::SpamAnalysisResult;

/// A remote signal the aggregator can report as missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    Sentiment,
    ContentSafety,
    Language,
    Nsfw,
    Objects,
    Faces,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Sentiment => "sentiment",
            Signal::ContentSafety => "content_safety",
            Signal::Language => "language",
            Signal::Nsfw => "nsfw",
            Signal::Objects => "objects",
            Signal::Faces => "faces",
        }
    }
}

/// A (category, confidence) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub category: String,
    pub confidence: f64,
}

// --- Text ---

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ToxicityCategories {
    pub hate: f64,
    pub harassment: f64,
    pub profanity: f64,
    pub threat: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Toxicity {
    pub score: f64,
    pub categories: ToxicityCategories,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

impl SentimentLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Neutral => "neutral",
            SentimentLabel::Negative => "negative",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    /// -1.0 to 1.0
    pub score: f64,
    pub magnitude: f64,
    pub label: SentimentLabel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Language {
    pub detected: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextModerationResult {
    pub classifications: Vec<Classification>,
    pub toxicity: Toxicity,
    pub sentiment: Sentiment,
    pub spam: SpamAnalysisResult,
    pub language: Language,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_signals: Vec<Signal>,
}

// --- Image ---

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NsfwCategories {
    pub adult: f64,
    pub suggestive: f64,
    pub violence: f64,
    pub hate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Nsfw {
    pub score: f64,
    pub categories: NsfwCategories,
    /// Raw classifier output, one entry per class
    pub predictions: Vec<Classification>,
}

/// Box in (x, y, width, height) form.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    pub class: String,
    pub confidence: f64,
    pub bbox: BoundingBox,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceDetection {
    pub confidence: f64,
    pub bbox: BoundingBox,
    pub landmarks: Vec<Point>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Faces {
    pub count: usize,
    pub detections: Vec<FaceDetection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub dimensions: Dimensions,
    pub format: String,
    /// Bytes
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAnalysisResult {
    pub nsfw: Nsfw,
    pub objects: Vec<DetectedObject>,
    pub faces: Faces,
    pub metadata: ImageMetadata,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_signals: Vec<Signal>,
}
