// Signal adapter traits: the narrow interface to every remote classifier.
//
// The pipeline only ever sees these traits. Concrete implementations live in
// sibling modules (Google, Azure, local ONNX, generic image endpoint) and are
// built once at startup by `SignalBackends::from_config`. Each call may fail
// independently; the pipeline treats a failure as a missing signal.

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Document-level sentiment as reported by the sentiment backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SentimentScore {
    /// -1.0 (negative) to 1.0 (positive)
    pub score: f64,
    /// Overall emotional strength, 0.0 and up
    pub magnitude: f64,
}

/// Best-guess language of a text.
#[derive(Debug, Clone, PartialEq)]
pub struct LanguageGuess {
    /// ISO 639-1 code (e.g. "en")
    pub code: String,
    pub confidence: f64,
}

/// Content-safety label confidences. The aggregator reads the `negative`
/// label; everything else is surfaced as a classification.
pub type SafetyScores = BTreeMap<String, f64>;

/// One raw NSFW class probability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NsfwPrediction {
    pub class_name: String,
    pub probability: f64,
}

/// Corner-format bounding box (x1, y1) – (x2, y2) as classifiers emit it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Corners {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

/// Object detection before confidence filtering and box normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawObject {
    pub class: String,
    pub confidence: f64,
    pub corners: Corners,
}

/// Face detection before filtering. Landmarks are a flat x,y,x,y… list.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFace {
    pub confidence: f64,
    pub corners: Corners,
    pub landmarks: Vec<f64>,
}

#[async_trait]
pub trait SentimentAnalyzer: Send + Sync {
    async fn analyze_sentiment(&self, text: &str) -> Result<SentimentScore>;
}

#[async_trait]
pub trait LanguageDetector: Send + Sync {
    async fn detect_language(&self, text: &str) -> Result<LanguageGuess>;
}

#[async_trait]
pub trait ContentSafetyClassifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<SafetyScores>;
}

#[async_trait]
pub trait ImageClassifier: Send + Sync {
    async fn classify_nsfw(&self, image: &[u8]) -> Result<Vec<NsfwPrediction>>;
    async fn detect_objects(&self, image: &[u8]) -> Result<Vec<RawObject>>;
    async fn detect_faces(&self, image: &[u8]) -> Result<Vec<RawFace>>;
}

/// Best-effort URL reputation lookup used by the spam analyzer.
/// Returns a suspicion score in [0, 1] for the set of URLs.
#[async_trait]
pub trait UrlReputation: Send + Sync {
    async fn suspicious_score(&self, urls: &[String]) -> Result<f64>;
}

/// Reputation check that never flags anything.
pub struct NoopUrlReputation;

#[async_trait]
impl UrlReputation for NoopUrlReputation {
    async fn suspicious_score(&self, _urls: &[String]) -> Result<f64> {
        Ok(0.0)
    }
}

/// Stand-in for an adapter that failed to initialize or was never configured.
///
/// Every call fails with the recorded reason, so the signal shows up as
/// missing in the verdict instead of silently producing a fake score.
#[derive(Debug, Clone)]
pub struct Unavailable {
    pub name: &'static str,
    pub reason: String,
}

impl Unavailable {
    pub fn new(name: &'static str, reason: impl Into<String>) -> Self {
        Self {
            name,
            reason: reason.into(),
        }
    }

    fn fail<T>(&self) -> Result<T> {
        anyhow::bail!("{} unavailable: {}", self.name, self.reason)
    }
}

#[async_trait]
impl SentimentAnalyzer for Unavailable {
    async fn analyze_sentiment(&self, _text: &str) -> Result<SentimentScore> {
        self.fail()
    }
}

#[async_trait]
impl LanguageDetector for Unavailable {
    async fn detect_language(&self, _text: &str) -> Result<LanguageGuess> {
        self.fail()
    }
}

#[async_trait]
impl ContentSafetyClassifier for Unavailable {
    async fn classify(&self, _text: &str) -> Result<SafetyScores> {
        self.fail()
    }
}

#[async_trait]
impl ImageClassifier for Unavailable {
    async fn classify_nsfw(&self, _image: &[u8]) -> Result<Vec<NsfwPrediction>> {
        self.fail()
    }

    async fn detect_objects(&self, _image: &[u8]) -> Result<Vec<RawObject>> {
        self.fail()
    }

    async fn detect_faces(&self, _image: &[u8]) -> Result<Vec<RawFace>> {
        self.fail()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unavailable_fails_with_reason() {
        let adapter = Unavailable::new("sentiment", "GOOGLE_API_KEY not set");
        let err = adapter.analyze_sentiment("hi").await.unwrap_err();
        assert!(err.to_string().contains("GOOGLE_API_KEY not set"));
    }

    #[tokio::test]
    async fn test_noop_reputation_is_zero() {
        let score = NoopUrlReputation
            .suspicious_score(&["https://example.com".to_string()])
            .await
            .unwrap();
        assert_eq!(score, 0.0);
    }
}
