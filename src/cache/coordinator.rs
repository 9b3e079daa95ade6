// ResultCache: the two-tier lookup/populate protocol.
//
// Reads go ephemeral tier first, then the durable store; a durable hit is
// copied back into the ephemeral tier with the configured TTL. Writes are
// create-if-absent in the durable store, and the ephemeral tier is populated
// whether or not the durable write succeeded. Neither tier failing ever
// fails a request: a broken tier just behaves like an empty one.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::ephemeral::EphemeralCache;
use super::inflight::{ComputeSlot, InFlightMap};
use crate::db::models::ClassificationRecord;
use crate::db::Database;
use crate::fingerprint::{cache_key, ContentFingerprint, ContentType};
use crate::verdict::Verdict;

/// Attempts made by the background persist task, including the first.
const PERSIST_ATTEMPTS: u32 = 3;

/// Delay before the second attempt; doubles each time after.
const PERSIST_BASE_BACKOFF: Duration = Duration::from_millis(500);

/// How a durable write ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    /// This call created the record.
    Committed,
    /// Someone else got there first. Carries the stored verdict when it
    /// could be read back, so callers can return exactly what was persisted.
    AlreadyExists(Option<Verdict>),
}

/// The durable write failed. The record is handed back so it can be retried.
#[derive(Debug, Error)]
#[error("durable store write failed for {fp}: {error:#}", fp = .record.fingerprint)]
pub struct StoreFailure {
    pub record: ClassificationRecord,
    pub error: anyhow::Error,
}

pub struct ResultCache {
    ephemeral: Arc<dyn EphemeralCache>,
    store: Arc<dyn Database>,
    inflight: InFlightMap,
    ttl: Duration,
}

impl ResultCache {
    pub fn new(ephemeral: Arc<dyn EphemeralCache>, store: Arc<dyn Database>, ttl: Duration) -> Self {
        Self {
            ephemeral,
            store,
            inflight: InFlightMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn store(&self) -> &Arc<dyn Database> {
        &self.store
    }

    /// Keys with a computation currently running.
    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }

    /// Find a previously computed verdict in either tier.
    pub async fn lookup(
        &self,
        fingerprint: &ContentFingerprint,
        content_type: ContentType,
    ) -> Option<Verdict> {
        let key = cache_key(content_type, fingerprint);

        match self.ephemeral.get(&key).await {
            Ok(Some(json)) => match Verdict::from_json(content_type, &json) {
                Ok(verdict) => {
                    debug!(key = %key, "Ephemeral cache hit");
                    return Some(verdict);
                }
                Err(e) => warn!(key = %key, error = %e, "Ignoring unreadable cache entry"),
            },
            Ok(None) => {}
            Err(e) => warn!(
                key = %key,
                error = %e,
                "Ephemeral cache unavailable, falling back to durable store"
            ),
        }

        let record = match self.store.get_classification(fingerprint, content_type).await {
            Ok(Some(record)) => record,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %key, error = %e, "Durable store read failed, treating as a miss");
                return None;
            }
        };

        match Verdict::from_json(content_type, &record.result_json) {
            Ok(verdict) => {
                debug!(key = %key, "Durable store hit, backfilling ephemeral cache");
                self.backfill(&key, &record.result_json).await;
                Some(verdict)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Ignoring unreadable durable record");
                None
            }
        }
    }

    /// Persist a freshly computed record, first writer wins.
    pub async fn commit(&self, record: ClassificationRecord) -> Result<CommitOutcome, StoreFailure> {
        let content_type = record.content_type;
        let key = record.cache_key();

        match self.store.insert_classification(&record).await {
            Ok(true) => {
                debug!(key = %key, "Committed classification");
                self.backfill(&key, &record.result_json).await;
                Ok(CommitOutcome::Committed)
            }
            Ok(false) => {
                debug!(key = %key, "Classification already stored, keeping the first");
                let stored = self.read_back(&record).await;
                let json = stored.as_deref().unwrap_or(&record.result_json);
                self.backfill(&key, json).await;
                let verdict = stored.and_then(|json| Verdict::from_json(content_type, &json).ok());
                Ok(CommitOutcome::AlreadyExists(verdict))
            }
            Err(error) => {
                self.backfill(&key, &record.result_json).await;
                Err(StoreFailure { record, error })
            }
        }
    }

    /// Claim the right to compute this content, or join whoever has it.
    pub fn acquire_compute_slot(
        &self,
        fingerprint: &ContentFingerprint,
        content_type: ContentType,
    ) -> ComputeSlot {
        self.inflight.acquire(&cache_key(content_type, fingerprint))
    }

    /// Retry a failed durable write in the background.
    pub fn spawn_persist_retry(&self, record: ClassificationRecord) -> JoinHandle<bool> {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move { persist_with_backoff(store.as_ref(), &record).await })
    }

    async fn read_back(&self, record: &ClassificationRecord) -> Option<String> {
        let fingerprint = ContentFingerprint::from_hex(&record.fingerprint).ok()?;
        match self
            .store
            .get_classification(&fingerprint, record.content_type)
            .await
        {
            Ok(stored) => stored.map(|r| r.result_json),
            Err(e) => {
                warn!(fingerprint = %record.fingerprint, error = %e, "Could not read back stored classification");
                None
            }
        }
    }

    async fn backfill(&self, key: &str, json: &str) {
        if let Err(e) = self.ephemeral.set(key, json, self.ttl).await {
            warn!(key = %key, error = %e, "Failed to populate ephemeral cache");
        }
    }
}

/// Returns whether the record ended up stored (by us or an earlier writer).
async fn persist_with_backoff(store: &dyn Database, record: &ClassificationRecord) -> bool {
    for attempt in 1..=PERSIST_ATTEMPTS {
        match store.insert_classification(record).await {
            Ok(created) => {
                info!(
                    fingerprint = %record.fingerprint,
                    attempt,
                    created,
                    "Persisted classification after retry"
                );
                return true;
            }
            Err(e) if attempt < PERSIST_ATTEMPTS => {
                let backoff = PERSIST_BASE_BACKOFF.saturating_mul(1u32 << (attempt - 1));
                warn!(
                    fingerprint = %record.fingerprint,
                    attempt,
                    max_attempts = PERSIST_ATTEMPTS,
                    error = %e,
                    "Durable write failed, retrying in {:.1}s",
                    backoff.as_secs_f64()
                );
                tokio::time::sleep(backoff).await;
            }
            Err(e) => {
                error!(
                    fingerprint = %record.fingerprint,
                    content_type = %record.content_type,
                    error = %e,
                    "Classification left unpersisted after {PERSIST_ATTEMPTS} attempts"
                );
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ephemeral::MemoryCache;
    use crate::db::models::ClassificationCounts;
    use crate::db::sqlite::SqliteDatabase;
    use crate::fingerprint::fingerprint;
    use crate::verdict::types::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn sample_verdict() -> Verdict {
        Verdict::Image(ImageAnalysisResult {
            nsfw: Nsfw::default(),
            objects: vec![],
            faces: Faces::default(),
            metadata: ImageMetadata {
                dimensions: crate::analysis::image_meta::Dimensions {
                    width: 4,
                    height: 3,
                },
                format: "png".into(),
                size: 120,
            },
            missing_signals: vec![],
        })
    }

    fn record_for(content: &[u8], verdict: &Verdict) -> ClassificationRecord {
        ClassificationRecord::new(
            &fingerprint(content),
            ContentType::Image,
            verdict.to_json().unwrap(),
            "{}".into(),
        )
    }

    fn cache_with(memory: Arc<MemoryCache>) -> ResultCache {
        let store: Arc<dyn Database> = Arc::new(SqliteDatabase::in_memory().unwrap());
        ResultCache::new(memory, store, Duration::from_secs(3600))
    }

    /// Store whose writes fail a fixed number of times before succeeding.
    struct FlakyStore {
        inner: SqliteDatabase,
        failures_left: AtomicU32,
        writes: AtomicU32,
    }

    #[async_trait]
    impl Database for FlakyStore {
        async fn table_count(&self) -> Result<i64> {
            self.inner.table_count().await
        }
        async fn get_classification(
            &self,
            fp: &ContentFingerprint,
            ct: ContentType,
        ) -> Result<Option<ClassificationRecord>> {
            self.inner.get_classification(fp, ct).await
        }
        async fn insert_classification(&self, record: &ClassificationRecord) -> Result<bool> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                anyhow::bail!("database is locked");
            }
            self.inner.insert_classification(record).await
        }
        async fn classification_counts(&self) -> Result<ClassificationCounts> {
            self.inner.classification_counts().await
        }
        async fn recent_classifications(&self, limit: u32) -> Result<Vec<ClassificationRecord>> {
            self.inner.recent_classifications(limit).await
        }
    }

    fn flaky(failures: u32) -> Arc<FlakyStore> {
        Arc::new(FlakyStore {
            inner: SqliteDatabase::in_memory().unwrap(),
            failures_left: AtomicU32::new(failures),
            writes: AtomicU32::new(0),
        })
    }

    #[tokio::test]
    async fn test_commit_then_lookup() {
        let memory = Arc::new(MemoryCache::new());
        let cache = cache_with(Arc::clone(&memory));
        let verdict = sample_verdict();
        let fp = fingerprint(b"img");

        assert_eq!(cache.lookup(&fp, ContentType::Image).await, None);
        let outcome = cache.commit(record_for(b"img", &verdict)).await.unwrap();
        assert_eq!(outcome, CommitOutcome::Committed);
        assert_eq!(memory.len(), 1);
        assert_eq!(cache.lookup(&fp, ContentType::Image).await, Some(verdict));
    }

    #[tokio::test]
    async fn test_duplicate_commit_returns_stored() {
        let cache = cache_with(Arc::new(MemoryCache::new()));
        let first = sample_verdict();
        let mut second = sample_verdict();
        if let Verdict::Image(r) = &mut second {
            r.metadata.size = 999;
        }

        cache.commit(record_for(b"img", &first)).await.unwrap();
        let outcome = cache.commit(record_for(b"img", &second)).await.unwrap();
        assert_eq!(outcome, CommitOutcome::AlreadyExists(Some(first)));
        assert_eq!(
            cache.store().classification_counts().await.unwrap().image,
            1
        );
    }

    #[tokio::test]
    async fn test_durable_hit_backfills_with_ttl() {
        let memory = Arc::new(MemoryCache::new());
        let cache = cache_with(Arc::clone(&memory));
        let verdict = sample_verdict();
        let fp = fingerprint(b"img");
        cache
            .store()
            .insert_classification(&record_for(b"img", &verdict))
            .await
            .unwrap();
        assert!(memory.is_empty());

        assert_eq!(cache.lookup(&fp, ContentType::Image).await, Some(verdict));
        let key = cache_key(ContentType::Image, &fp);
        let ttl = memory.ttl(&key).unwrap();
        assert!(ttl > Duration::from_secs(3590) && ttl <= Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn test_store_failure_still_populates_ephemeral() {
        let memory = Arc::new(MemoryCache::new());
        let store = flaky(1);
        let cache = ResultCache::new(
            Arc::clone(&memory) as Arc<dyn EphemeralCache>,
            Arc::clone(&store) as Arc<dyn Database>,
            Duration::from_secs(60),
        );
        let verdict = sample_verdict();

        let failure = cache.commit(record_for(b"img", &verdict)).await.unwrap_err();
        assert!(failure.to_string().contains("database is locked"));
        assert_eq!(
            cache.lookup(&fingerprint(b"img"), ContentType::Image).await,
            Some(verdict)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_persist_retry_recovers() {
        let store = flaky(2);
        let cache = ResultCache::new(
            Arc::new(MemoryCache::new()),
            Arc::clone(&store) as Arc<dyn Database>,
            Duration::from_secs(60),
        );
        let record = record_for(b"img", &sample_verdict());

        assert!(cache.spawn_persist_retry(record).await.unwrap());
        assert_eq!(store.writes.load(Ordering::SeqCst), 3);
        assert_eq!(store.classification_counts().await.unwrap().image, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persist_retry_gives_up() {
        let store = flaky(10);
        let cache = ResultCache::new(
            Arc::new(MemoryCache::new()),
            Arc::clone(&store) as Arc<dyn Database>,
            Duration::from_secs(60),
        );
        let record = record_for(b"img", &sample_verdict());

        assert!(!cache.spawn_persist_retry(record).await.unwrap());
        assert_eq!(store.writes.load(Ordering::SeqCst), PERSIST_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_compute_slot_is_per_content_type() {
        let cache = cache_with(Arc::new(MemoryCache::new()));
        let fp = fingerprint(b"same");
        let text = cache.acquire_compute_slot(&fp, ContentType::Text);
        let image = cache.acquire_compute_slot(&fp, ContentType::Image);
        assert!(matches!(text, ComputeSlot::Exclusive(_)));
        assert!(matches!(image, ComputeSlot::Exclusive(_)));
        assert!(matches!(
            cache.acquire_compute_slot(&fp, ContentType::Text),
            ComputeSlot::InFlight(_)
        ));
        assert_eq!(cache.in_flight(), 2);
        drop(text);
        drop(image);
        assert_eq!(cache.in_flight(), 0);
    }
}
