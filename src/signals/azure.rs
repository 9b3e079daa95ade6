// Azure AI Language (Text Analytics v3.1): content safety and language.
//
// Content safety is read from the sentiment endpoint's per-document
// confidence scores (positive / neutral / negative); the aggregator derives
// toxicity from `negative`. Language detection uses the `/languages`
// endpoint. Both calls send a single-document batch.
//
// API docs: https://learn.microsoft.com/azure/ai-services/language-service/

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::rate_limiter::RateLimiter;
use super::traits::{ContentSafetyClassifier, LanguageDetector, LanguageGuess, SafetyScores};

const SUBSCRIPTION_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// Client for one Azure Language resource. Implements both
/// `ContentSafetyClassifier` and `LanguageDetector`.
pub struct AzureTextAnalytics {
    client: Client,
    endpoint: String,
    api_key: String,
    rate_limiter: RateLimiter,
}

impl AzureTextAnalytics {
    pub fn new(endpoint: &str, api_key: String, rate_limiter: RateLimiter) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("sift/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
            rate_limiter,
        })
    }

    async fn post<T: for<'de> Deserialize<'de>>(&self, path: &str, text: &str) -> Result<T> {
        self.rate_limiter.acquire().await;

        let url = format!("{}/text/analytics/v3.1/{}", self.endpoint, path);
        let request = DocumentBatch {
            documents: vec![InputDocument { id: "1", text }],
        };

        let response = self
            .client
            .post(&url)
            .header(SUBSCRIPTION_HEADER, &self.api_key)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Failed to call Azure Text Analytics /{path}"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Azure Text Analytics /{} returned {}: {}", path, status, body);
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse Azure Text Analytics /{path} response"))
    }
}

#[async_trait]
impl ContentSafetyClassifier for AzureTextAnalytics {
    async fn classify(&self, text: &str) -> Result<SafetyScores> {
        let response: SentimentResponse = self.post("sentiment", text).await?;
        let scores = safety_from_response(response)?;
        debug!(negative = ?scores.get("negative"), "Content safety scored");
        Ok(scores)
    }
}

#[async_trait]
impl LanguageDetector for AzureTextAnalytics {
    async fn detect_language(&self, text: &str) -> Result<LanguageGuess> {
        let response: LanguageResponse = self.post("languages", text).await?;
        language_from_response(response)
    }
}

fn safety_from_response(response: SentimentResponse) -> Result<SafetyScores> {
    let doc = response
        .documents
        .into_iter()
        .next()
        .ok_or_else(|| first_error("sentiment", &response.errors))?;

    let mut scores = SafetyScores::new();
    scores.insert("positive".to_string(), doc.confidence_scores.positive);
    scores.insert("neutral".to_string(), doc.confidence_scores.neutral);
    scores.insert("negative".to_string(), doc.confidence_scores.negative);
    Ok(scores)
}

fn language_from_response(response: LanguageResponse) -> Result<LanguageGuess> {
    let doc = response
        .documents
        .into_iter()
        .next()
        .ok_or_else(|| first_error("languages", &response.errors))?;

    Ok(LanguageGuess {
        code: doc.detected_language.iso6391_name,
        confidence: doc.detected_language.confidence_score,
    })
}

fn first_error(path: &str, errors: &[DocumentError]) -> anyhow::Error {
    match errors.first() {
        Some(e) => anyhow::anyhow!(
            "Azure Text Analytics /{} rejected document: {}",
            path,
            e.error.message
        ),
        None => anyhow::anyhow!("Azure Text Analytics /{} returned no documents", path),
    }
}

// --- Azure request/response types ---

#[derive(Serialize)]
struct DocumentBatch<'a> {
    documents: Vec<InputDocument<'a>>,
}

#[derive(Serialize)]
struct InputDocument<'a> {
    id: &'static str,
    text: &'a str,
}

#[derive(Deserialize)]
struct SentimentResponse {
    documents: Vec<SentimentDocument>,
    #[serde(default)]
    errors: Vec<DocumentError>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SentimentDocument {
    confidence_scores: ConfidenceScores,
}

#[derive(Deserialize)]
struct ConfidenceScores {
    positive: f64,
    neutral: f64,
    negative: f64,
}

#[derive(Deserialize)]
struct LanguageResponse {
    documents: Vec<LanguageDocument>,
    #[serde(default)]
    errors: Vec<DocumentError>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LanguageDocument {
    detected_language: DetectedLanguage,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetectedLanguage {
    iso6391_name: String,
    confidence_score: f64,
}

#[derive(Deserialize)]
struct DocumentError {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}
