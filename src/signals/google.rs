// Google Cloud Natural Language: document sentiment.
//
// One request per call, no session state. The API key is passed as a query
// parameter; the endpoint base is overridable so tests and proxies can point
// it elsewhere.
//
// API docs: https://cloud.google.com/natural-language/docs/reference/rest/v1/documents/analyzeSentiment

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::rate_limiter::RateLimiter;
use super::traits::{SentimentAnalyzer, SentimentScore};

pub const DEFAULT_GOOGLE_NL_URL: &str = "https://language.googleapis.com";

/// Sentiment adapter backed by Google Natural Language.
pub struct GoogleSentiment {
    client: Client,
    base_url: String,
    api_key: String,
    rate_limiter: RateLimiter,
}

impl GoogleSentiment {
    pub fn new(base_url: &str, api_key: String, rate_limiter: RateLimiter) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("sift/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            rate_limiter,
        })
    }
}

#[async_trait]
impl SentimentAnalyzer for GoogleSentiment {
    async fn analyze_sentiment(&self, text: &str) -> Result<SentimentScore> {
        self.rate_limiter.acquire().await;

        let url = format!("{}/v1/documents:analyzeSentiment", self.base_url);
        let request = AnalyzeSentimentRequest {
            document: Document {
                kind: "PLAIN_TEXT",
                content: text,
            },
            encoding_type: "UTF8",
        };

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .context("Failed to call Natural Language API")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Natural Language API returned {}: {}", status, body);
        }

        let parsed: AnalyzeSentimentResponse = response
            .json()
            .await
            .context("Failed to parse Natural Language API response")?;

        let score = sentiment_from_response(&parsed);
        debug!(score = score.score, magnitude = score.magnitude, "Sentiment scored");
        Ok(score)
    }
}

/// Missing sentiment fields mean "no opinion", not an error.
fn sentiment_from_response(response: &AnalyzeSentimentResponse) -> SentimentScore {
    let sentiment = response.document_sentiment.as_ref();
    SentimentScore {
        score: sentiment.and_then(|s| s.score).unwrap_or(0.0),
        magnitude: sentiment.and_then(|s| s.magnitude).unwrap_or(0.0),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeSentimentRequest<'a> {
    document: Document<'a>,
    encoding_type: &'static str,
}

#[derive(Serialize)]
struct Document<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeSentimentResponse {
    document_sentiment: Option<DocumentSentiment>,
}

#[derive(Deserialize)]
struct DocumentSentiment {
    score: Option<f64>,
    magnitude: Option<f64>,
}
