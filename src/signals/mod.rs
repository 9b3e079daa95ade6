// Remote signal adapters and the startup wiring that picks between them.
//
// Every adapter is built once in `SignalBackends::from_config`. An adapter
// that cannot be built (missing key, missing model file) is replaced by an
// `Unavailable` stand-in and recorded in the readiness report, so the
// process still starts and the affected signal is reported as missing.

pub mod azure;
pub mod download;
pub mod google;
pub mod image;
pub mod onnx;
pub mod rate_limiter;
pub mod traits;

use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{Config, SafetyBackend};
use crate::verdict::Signal;
use azure::AzureTextAnalytics;
use google::GoogleSentiment;
use image::HttpImageClassifier;
use onnx::OnnxSafetyClassifier;
use rate_limiter::RateLimiter;
use traits::{
    ContentSafetyClassifier, ImageClassifier, LanguageDetector, NoopUrlReputation,
    SentimentAnalyzer, Unavailable, UrlReputation,
};

/// Readiness of one adapter as decided at startup.
#[derive(Debug, Clone, PartialEq)]
pub enum Readiness {
    Ready,
    Unavailable(String),
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready)
    }
}

impl fmt::Display for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Readiness::Ready => write!(f, "ready"),
            Readiness::Unavailable(reason) => write!(f, "unavailable ({reason})"),
        }
    }
}

/// The full set of signal adapters injected into the moderation pipeline.
#[derive(Clone)]
pub struct SignalBackends {
    pub sentiment: Arc<dyn SentimentAnalyzer>,
    pub language: Arc<dyn LanguageDetector>,
    pub content_safety: Arc<dyn ContentSafetyClassifier>,
    pub image: Arc<dyn ImageClassifier>,
    pub url_reputation: Arc<dyn UrlReputation>,
    /// (signal name, readiness) in a stable display order
    pub readiness: Vec<(&'static str, Readiness)>,
}

impl SignalBackends {
    /// Bundle adapters that are already constructed. All are reported ready.
    pub fn new(
        sentiment: Arc<dyn SentimentAnalyzer>,
        language: Arc<dyn LanguageDetector>,
        content_safety: Arc<dyn ContentSafetyClassifier>,
        image: Arc<dyn ImageClassifier>,
    ) -> Self {
        Self {
            sentiment,
            language,
            content_safety,
            image,
            url_reputation: Arc::new(NoopUrlReputation),
            readiness: ["sentiment", "language", "content_safety", "image"]
                .into_iter()
                .map(|name| (name, Readiness::Ready))
                .collect(),
        }
    }

    pub fn with_url_reputation(mut self, url_reputation: Arc<dyn UrlReputation>) -> Self {
        self.url_reputation = url_reputation;
        self
    }

    /// Build every adapter from configuration.
    ///
    /// Never fails: an adapter that can't be built becomes `Unavailable`.
    pub fn from_config(config: &Config) -> Self {
        let limiter = RateLimiter::new(config.adapter_qps);
        let mut readiness = Vec::new();

        let sentiment: Arc<dyn SentimentAnalyzer> = if config.google_api_key.is_empty() {
            unavailable(&mut readiness, "sentiment", "GOOGLE_API_KEY not set")
        } else {
            match GoogleSentiment::new(
                &config.google_nl_url,
                config.google_api_key.clone(),
                limiter.clone(),
            ) {
                Ok(adapter) => ready(&mut readiness, "sentiment", adapter),
                Err(e) => unavailable(&mut readiness, "sentiment", format!("{e:#}")),
            }
        };

        let azure = if config.require_azure().is_ok() {
            AzureTextAnalytics::new(
                &config.azure_endpoint,
                config.azure_api_key.clone(),
                limiter.clone(),
            )
            .map(Arc::new)
            .map_err(|e| format!("{e:#}"))
        } else {
            Err("AZURE_ENDPOINT / AZURE_API_KEY not set".to_string())
        };

        let language: Arc<dyn LanguageDetector> = match &azure {
            Ok(client) => {
                readiness.push(("language", Readiness::Ready));
                client.clone()
            }
            Err(reason) => unavailable(&mut readiness, "language", reason.clone()),
        };

        let content_safety: Arc<dyn ContentSafetyClassifier> = match config.safety_backend {
            SafetyBackend::Azure => match &azure {
                Ok(client) => {
                    readiness.push(("content_safety", Readiness::Ready));
                    client.clone()
                }
                Err(reason) => unavailable(&mut readiness, "content_safety", reason.clone()),
            },
            SafetyBackend::Onnx => match OnnxSafetyClassifier::load(&config.model_dir) {
                Ok(adapter) => ready(&mut readiness, "content_safety", adapter),
                Err(e) => unavailable(&mut readiness, "content_safety", format!("{e:#}")),
            },
        };

        let image: Arc<dyn ImageClassifier> = if config.image_endpoint.is_empty() {
            unavailable(&mut readiness, "image", "SIFT_IMAGE_ENDPOINT not set")
        } else {
            match HttpImageClassifier::new(&config.image_endpoint, limiter) {
                Ok(adapter) => ready(&mut readiness, "image", adapter),
                Err(e) => unavailable(&mut readiness, "image", format!("{e:#}")),
            }
        };

        Self {
            sentiment,
            language,
            content_safety,
            image,
            url_reputation: Arc::new(NoopUrlReputation),
            readiness,
        }
    }

    /// True when every adapter came up.
    pub fn all_ready(&self) -> bool {
        self.readiness.iter().all(|(_, r)| r.is_ready())
    }

    /// Startup readiness of the adapter that produces `signal`.
    pub fn readiness_of(&self, signal: Signal) -> Option<&Readiness> {
        let name = match signal {
            Signal::Sentiment => "sentiment",
            Signal::Language => "language",
            Signal::ContentSafety => "content_safety",
            Signal::Nsfw | Signal::Objects | Signal::Faces => "image",
        };
        self.readiness
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, r)| r)
    }

    /// True when `signal` went missing although its adapter came up at
    /// startup, so a later attempt could produce it.
    pub fn is_transient_miss(&self, signal: Signal) -> bool {
        self.readiness_of(signal).is_some_and(Readiness::is_ready)
    }

    /// Mark the adapter `name` unavailable after construction.
    pub fn mark_unavailable(&mut self, name: &'static str, reason: impl Into<String>) {
        let reason = reason.into();
        match self.readiness.iter_mut().find(|(n, _)| *n == name) {
            Some((_, r)) => *r = Readiness::Unavailable(reason),
            None => self.readiness.push((name, Readiness::Unavailable(reason))),
        }
    }
}

fn ready<T: 'static>(
    readiness: &mut Vec<(&'static str, Readiness)>,
    name: &'static str,
    adapter: T,
) -> Arc<T> {
    info!(signal = name, "Signal adapter ready");
    readiness.push((name, Readiness::Ready));
    Arc::new(adapter)
}

fn unavailable(
    readiness: &mut Vec<(&'static str, Readiness)>,
    name: &'static str,
    reason: impl Into<String>,
) -> Arc<Unavailable> {
    let reason = reason.into();
    warn!(signal = name, reason = %reason, "Signal adapter unavailable");
    readiness.push((name, Readiness::Unavailable(reason.clone())));
    Arc::new(Unavailable::new(name, reason))
}
