// The moderation pipeline: lookup -> dedup guard -> fan-out -> aggregate ->
// publish -> commit -> release.
//
// Identical content is analyzed at most once at a time. The first request for
// a fingerprint owns the computation; concurrent requests for the same
// fingerprint wait on its result instead of fanning out again. A finished
// computation is committed to both cache tiers so later requests never reach
// the adapters at all.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::analysis::image_meta;
use crate::analysis::profanity::ProfanityRules;
use crate::analysis::spam::{self, SpamConfig, SpamPatterns};
use crate::cache::{
    CommitOutcome, ComputeSlot, EphemeralCache, MemoryCache, ResultCache, SlotGuard, WaitOutcome,
};
use crate::config::Config;
use crate::db::models::ClassificationRecord;
use crate::db::Database;
use crate::error::{validate_content, validate_image, ModerationError};
use crate::fingerprint::{Content, ContentFingerprint};
use crate::signals::SignalBackends;
use crate::verdict::image::{aggregate_image, ImageSignals, DEFAULT_DETECTION_FLOOR};
use crate::verdict::text::{aggregate_text, TextSignals};
use crate::verdict::{Signal, Verdict};

/// Per-call knobs.
#[derive(Debug, Clone, Default)]
pub struct ModerateOptions {
    /// Overrides the configured `require_all_signals` for this call.
    pub require_all_signals: Option<bool>,
    /// Stored alongside the result when this call is the one that computes it.
    pub metadata: BTreeMap<String, String>,
}

/// Pipeline behavior taken from configuration.
#[derive(Debug, Clone)]
pub struct ModeratorSettings {
    pub adapter_timeout: Duration,
    pub dedup_wait: Duration,
    pub detection_floor: f64,
    pub require_all_signals: bool,
    /// Leave degraded verdicts uncached when a missing signal's adapter is
    /// up, so the next request tries it again.
    pub defer_transient_failures: bool,
}

impl ModeratorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            adapter_timeout: config.adapter_timeout,
            dedup_wait: config.dedup_wait,
            detection_floor: config.detection_floor,
            require_all_signals: config.require_all_signals,
            defer_transient_failures: config.defer_transient_failures,
        }
    }
}

impl Default for ModeratorSettings {
    fn default() -> Self {
        Self {
            adapter_timeout: Duration::from_secs(5),
            dedup_wait: Duration::from_secs(30),
            detection_floor: DEFAULT_DETECTION_FLOOR,
            require_all_signals: false,
            defer_transient_failures: false,
        }
    }
}

pub struct Moderator {
    backends: SignalBackends,
    cache: Arc<ResultCache>,
    profanity: ProfanityRules,
    spam: SpamConfig,
    settings: ModeratorSettings,
}

impl Moderator {
    pub fn new(
        backends: SignalBackends,
        cache: Arc<ResultCache>,
        profanity: ProfanityRules,
        spam: SpamConfig,
        settings: ModeratorSettings,
    ) -> Self {
        Self {
            backends,
            cache,
            profanity,
            spam,
            settings,
        }
    }

    /// Wire up a moderator from configuration over an already-connected store.
    pub fn from_config(config: &Config, store: Arc<dyn Database>) -> Result<Self> {
        let profanity = ProfanityRules::load(config.profanity_rules.as_deref())?;
        info!(words = profanity.word_count(), "Profanity rules loaded");
        let spam = config
            .spam
            .clone()
            .with_patterns(SpamPatterns::load(config.spam_patterns.as_deref())?);

        let ephemeral: Arc<dyn EphemeralCache> = Arc::new(MemoryCache::new());
        let cache = Arc::new(ResultCache::new(ephemeral, store, config.cache_ttl));

        Ok(Self::new(
            SignalBackends::from_config(config),
            cache,
            profanity,
            spam,
            ModeratorSettings::from_config(config),
        ))
    }

    pub fn backends(&self) -> &SignalBackends {
        &self.backends
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    pub async fn moderate_text(
        &self,
        text: &str,
        options: &ModerateOptions,
    ) -> Result<Verdict, ModerationError> {
        self.moderate(Content::Text(text.to_string()), options).await
    }

    pub async fn moderate_image(
        &self,
        image: Vec<u8>,
        options: &ModerateOptions,
    ) -> Result<Verdict, ModerationError> {
        self.moderate(Content::Image(image), options).await
    }

    /// Moderate several items concurrently.
    ///
    /// Every item is validated before any work starts; one bad item rejects
    /// the whole batch. After that, each item succeeds or fails on its own.
    pub async fn moderate_batch(
        &self,
        items: Vec<Content>,
        options: &ModerateOptions,
    ) -> Result<Vec<Result<Verdict, ModerationError>>, ModerationError> {
        for (index, item) in items.iter().enumerate() {
            validate_content(item).map_err(|e| match e {
                ModerationError::Validation(msg) => {
                    ModerationError::Validation(format!("item {index}: {msg}"))
                }
                other => other,
            })?;
        }

        let results =
            futures::future::join_all(items.into_iter().map(|item| self.moderate(item, options)))
                .await;
        Ok(results)
    }

    /// Moderate one piece of content, reusing any earlier result for it.
    pub async fn moderate(
        &self,
        content: Content,
        options: &ModerateOptions,
    ) -> Result<Verdict, ModerationError> {
        validate_content(&content)?;

        let content_type = content.content_type();
        let fingerprint = content.fingerprint();
        let deadline = Instant::now() + self.settings.dedup_wait;

        loop {
            if let Some(verdict) = self.cache.lookup(&fingerprint, content_type).await {
                debug!(fingerprint = %fingerprint, content_type = %content_type, "Cache hit");
                return self.check_complete(verdict, options);
            }

            match self.cache.acquire_compute_slot(&fingerprint, content_type) {
                ComputeSlot::Exclusive(guard) => {
                    return self.lead(guard, &content, &fingerprint, options).await;
                }
                ComputeSlot::InFlight(waiter) => {
                    debug!(fingerprint = %fingerprint, "Waiting on in-flight moderation");
                    match waiter.wait_until(deadline).await {
                        WaitOutcome::Ready(result) => {
                            return result.and_then(|v| self.check_complete(v, options));
                        }
                        WaitOutcome::Abandoned => {
                            debug!(fingerprint = %fingerprint, "In-flight moderation abandoned, retrying");
                        }
                        WaitOutcome::TimedOut => {
                            warn!(
                                fingerprint = %fingerprint,
                                wait_ms = self.settings.dedup_wait.as_millis() as u64,
                                "Gave up waiting on in-flight moderation"
                            );
                            return Err(ModerationError::DedupTimeout);
                        }
                    }
                }
            }
        }
    }

    /// Compute, publish, and commit while holding the slot for `fingerprint`.
    async fn lead(
        &self,
        guard: SlotGuard,
        content: &Content,
        fingerprint: &ContentFingerprint,
        options: &ModerateOptions,
    ) -> Result<Verdict, ModerationError> {
        // A leader may have committed between our lookup and acquiring the slot
        if let Some(verdict) = self.cache.lookup(fingerprint, content.content_type()).await {
            guard.publish(Ok(verdict.clone()));
            return self.check_complete(verdict, options);
        }

        let started = std::time::Instant::now();
        let verdict = match self.analyze(content).await {
            Ok(verdict) => verdict,
            Err(e) => {
                guard.publish(Err(e.clone()));
                return Err(e);
            }
        };
        info!(
            fingerprint = %fingerprint,
            content_type = %content.content_type(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            degraded = verdict.is_degraded(),
            "Content analyzed"
        );

        guard.publish(Ok(verdict.clone()));
        let verdict = self.persist(fingerprint, verdict, options).await;
        drop(guard);

        self.check_complete(verdict, options)
    }

    async fn analyze(&self, content: &Content) -> Result<Verdict, ModerationError> {
        match content {
            Content::Text(text) => Ok(Verdict::Text(self.analyze_text(text).await)),
            Content::Image(bytes) => {
                let format = validate_image(bytes)?;
                let timeout = self.settings.adapter_timeout;
                let image = &self.backends.image;

                let (nsfw, objects, faces) = tokio::join!(
                    bounded(Signal::Nsfw, timeout, image.classify_nsfw(bytes)),
                    bounded(Signal::Objects, timeout, image.detect_objects(bytes)),
                    bounded(Signal::Faces, timeout, image.detect_faces(bytes)),
                );

                let signals = ImageSignals {
                    nsfw,
                    objects,
                    faces,
                    format,
                    dimensions: image_meta::dimensions(format, bytes),
                    size: bytes.len() as u64,
                };
                Ok(Verdict::Image(aggregate_image(
                    signals,
                    self.settings.detection_floor,
                )))
            }
        }
    }

    async fn analyze_text(&self, text: &str) -> crate::verdict::TextModerationResult {
        let timeout = self.settings.adapter_timeout;

        let spam_analysis = async {
            let reputation = self.backends.url_reputation.as_ref();
            match tokio::time::timeout(timeout, spam::analyze(&self.spam, text, reputation)).await
            {
                Ok(result) => result,
                Err(_) => {
                    debug!("URL reputation timed out, scoring 0");
                    spam::analyze_with_reputation(&self.spam, text, 0.0)
                }
            }
        };

        let (sentiment, content_safety, language, spam) = tokio::join!(
            bounded(
                Signal::Sentiment,
                timeout,
                self.backends.sentiment.analyze_sentiment(text)
            ),
            bounded(
                Signal::ContentSafety,
                timeout,
                self.backends.content_safety.classify(text)
            ),
            bounded(
                Signal::Language,
                timeout,
                self.backends.language.detect_language(text)
            ),
            spam_analysis,
        );

        aggregate_text(TextSignals {
            sentiment,
            content_safety,
            language,
            profanity: self.profanity.analyze(text),
            spam,
        })
    }

    /// Commit the verdict to both tiers. Returns what callers should see.
    ///
    /// Degraded verdicts are committed too; they record their missing
    /// signals. With `defer_transient_failures` set, a verdict missing a
    /// signal whose adapter is up is returned uncached instead.
    async fn persist(
        &self,
        fingerprint: &ContentFingerprint,
        verdict: Verdict,
        options: &ModerateOptions,
    ) -> Verdict {
        if self.settings.defer_transient_failures
            && verdict
                .missing_signals()
                .iter()
                .any(|signal| self.backends.is_transient_miss(*signal))
        {
            warn!(
                fingerprint = %fingerprint,
                missing = ?verdict.missing_signals(),
                "Transient signal failure, verdict returned but not cached"
            );
            return verdict;
        }

        let result_json = match verdict.to_json() {
            Ok(json) => json,
            Err(e) => {
                error!(fingerprint = %fingerprint, error = %e, "Could not serialize verdict");
                return verdict;
            }
        };
        let metadata_json =
            serde_json::to_string(&options.metadata).unwrap_or_else(|_| "{}".to_string());
        let record = ClassificationRecord::new(
            fingerprint,
            verdict.content_type(),
            result_json,
            metadata_json,
        );

        match self.cache.commit(record).await {
            Ok(CommitOutcome::Committed) => verdict,
            Ok(CommitOutcome::AlreadyExists(stored)) => stored.unwrap_or(verdict),
            Err(failure) => {
                warn!(error = %failure, "Returning unpersisted verdict, retrying write in background");
                self.cache.spawn_persist_retry(failure.record);
                verdict
            }
        }
    }

    fn check_complete(
        &self,
        verdict: Verdict,
        options: &ModerateOptions,
    ) -> Result<Verdict, ModerationError> {
        let required = options
            .require_all_signals
            .unwrap_or(self.settings.require_all_signals);
        if required && verdict.is_degraded() {
            warn!(
                missing = ?verdict.missing_signals(),
                "Rejecting degraded verdict, all signals are required"
            );
            return Err(ModerationError::Analysis);
        }
        Ok(verdict)
    }
}

/// Run one adapter call under its own timeout. Failure of any kind is
/// logged and becomes `None`, which the aggregator reports as missing.
async fn bounded<T>(
    signal: Signal,
    timeout: Duration,
    call: impl Future<Output = Result<T>>,
) -> Option<T> {
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            warn!(signal = signal.as_str(), error = %e, "Signal failed, using neutral default");
            None
        }
        Err(_) => {
            warn!(
                signal = signal.as_str(),
                timeout_ms = timeout.as_millis() as u64,
                "Signal timed out, using neutral default"
            );
            None
        }
    }
}
