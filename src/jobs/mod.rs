// Job queue: background and batch moderation on a fixed worker pool.
//
// Jobs go through a bounded channel, so `submit` waits when the pool is
// saturated instead of letting the backlog grow without limit. Delivery is
// at-least-once: a job that fails with a retryable error is run again, up to
// `max_attempts`. Re-running is safe because moderation is idempotent per
// fingerprint; a repeat either hits the cache or joins the in-flight run.
//
// Status for each job lives in a watch channel so callers can either poll
// (`status`) or await completion (`wait`). Finished jobs are kept for the
// retention window, then swept on the next submit.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{validate_content, ModerationError};
use crate::fingerprint::Content;
use crate::pipeline::{ModerateOptions, Moderator};
use crate::verdict::Verdict;

pub type JobId = Uuid;

/// Jobs that can be buffered per worker before `submit` starts waiting.
const QUEUE_DEPTH_PER_WORKER: usize = 64;

/// Delay before re-running a failed job; grows linearly with the attempt.
const RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// How long a finished job's status stays queryable.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running { attempt: u32 },
    Completed { verdict: Verdict },
    Failed { code: String, error: String, attempts: u32 },
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed { .. } | JobStatus::Failed { .. })
    }
}

struct Job {
    id: JobId,
    content: Content,
    options: ModerateOptions,
}

struct JobEntry {
    tx: watch::Sender<JobStatus>,
    /// Set when the job reaches a terminal state
    finished_at: Option<Instant>,
}

type StatusMap = DashMap<JobId, JobEntry>;

pub struct JobQueue {
    tx: RwLock<Option<mpsc::Sender<Job>>>,
    statuses: Arc<StatusMap>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    retention: Duration,
}

impl JobQueue {
    /// Spawn `workers` workers pulling from a shared queue.
    pub fn start(moderator: Arc<Moderator>, workers: usize, max_attempts: u32) -> Self {
        let workers = workers.max(1);
        let max_attempts = max_attempts.max(1);
        let (tx, rx) = mpsc::channel(workers * QUEUE_DEPTH_PER_WORKER);
        let rx = Arc::new(Mutex::new(rx));
        let statuses: Arc<StatusMap> = Arc::new(DashMap::new());

        let handles = (0..workers)
            .map(|worker| {
                let rx = Arc::clone(&rx);
                let moderator = Arc::clone(&moderator);
                let statuses = Arc::clone(&statuses);
                tokio::spawn(async move {
                    worker_loop(worker, rx, moderator, statuses, max_attempts).await;
                })
            })
            .collect();

        info!(workers, max_attempts, "Job queue started");

        Self {
            tx: RwLock::new(Some(tx)),
            statuses,
            workers: Mutex::new(handles),
            retention: DEFAULT_RETENTION,
        }
    }

    /// Keep finished jobs queryable for `retention` instead of the default.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Queue one item. Invalid content is rejected here, not in a worker.
    pub async fn submit(
        &self,
        content: Content,
        options: ModerateOptions,
    ) -> Result<JobId, ModerationError> {
        validate_content(&content)?;
        self.enqueue(content, options).await
    }

    /// Queue several items. The whole batch is rejected if any item is invalid.
    pub async fn submit_batch(
        &self,
        items: Vec<Content>,
        options: ModerateOptions,
    ) -> Result<Vec<JobId>, ModerationError> {
        for (index, item) in items.iter().enumerate() {
            validate_content(item).map_err(|e| match e {
                ModerationError::Validation(msg) => {
                    ModerationError::Validation(format!("item {index}: {msg}"))
                }
                other => other,
            })?;
        }

        let mut ids = Vec::with_capacity(items.len());
        for item in items {
            ids.push(self.enqueue(item, options.clone()).await?);
        }
        Ok(ids)
    }

    pub fn status(&self, id: &JobId) -> Option<JobStatus> {
        self.statuses.get(id).map(|entry| entry.tx.borrow().clone())
    }

    /// Resolve once the job reaches a terminal state.
    pub async fn wait(&self, id: &JobId) -> Option<JobStatus> {
        let mut rx = self.statuses.get(id)?.tx.subscribe();
        let status = rx.wait_for(JobStatus::is_terminal).await.ok()?;
        Some(status.clone())
    }

    /// Stop accepting jobs, let the workers drain the queue, and join them.
    pub async fn shutdown(&self) {
        self.tx.write().await.take();
        let handles = std::mem::take(&mut *self.workers.lock().await);
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Job worker panicked");
            }
        }
        info!("Job queue drained");
    }

    async fn enqueue(
        &self,
        content: Content,
        options: ModerateOptions,
    ) -> Result<JobId, ModerationError> {
        let Some(tx) = self.tx.read().await.clone() else {
            warn!("Job submitted after shutdown");
            return Err(ModerationError::ShuttingDown);
        };

        self.sweep_finished();

        let id = Uuid::new_v4();
        let (status_tx, _) = watch::channel(JobStatus::Queued);
        self.statuses.insert(
            id,
            JobEntry {
                tx: status_tx,
                finished_at: None,
            },
        );

        if tx.send(Job { id, content, options }).await.is_err() {
            self.statuses.remove(&id);
            warn!(job = %id, "Job queue closed before the job was accepted");
            return Err(ModerationError::ShuttingDown);
        }
        debug!(job = %id, "Job queued");
        Ok(id)
    }

    /// Drop finished jobs older than the retention window.
    fn sweep_finished(&self) {
        let now = Instant::now();
        let before = self.statuses.len();
        self.statuses.retain(|_, entry| match entry.finished_at {
            Some(at) => now.duration_since(at) < self.retention,
            None => true,
        });
        let evicted = before.saturating_sub(self.statuses.len());
        if evicted > 0 {
            debug!(evicted, "Expired finished jobs");
        }
    }
}

async fn worker_loop(
    worker: usize,
    rx: Arc<Mutex<mpsc::Receiver<Job>>>,
    moderator: Arc<Moderator>,
    statuses: Arc<StatusMap>,
    max_attempts: u32,
) {
    loop {
        // Hold the receiver lock only while taking the next job
        let job = rx.lock().await.recv().await;
        let Some(job) = job else {
            debug!(worker, "Job worker exiting");
            return;
        };

        let status = run_job(&moderator, &job, max_attempts, |status| {
            set_status(&statuses, &job.id, status)
        })
        .await;
        set_status(&statuses, &job.id, status);
    }
}

/// Run a job to a terminal state, retrying retryable failures.
async fn run_job(
    moderator: &Moderator,
    job: &Job,
    max_attempts: u32,
    report: impl Fn(JobStatus),
) -> JobStatus {
    let mut attempt = 1;
    loop {
        report(JobStatus::Running { attempt });

        match moderator.moderate(job.content.clone(), &job.options).await {
            Ok(verdict) => {
                debug!(job = %job.id, attempt, "Job completed");
                return JobStatus::Completed { verdict };
            }
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                warn!(job = %job.id, attempt, max_attempts, error = %e, "Job failed, retrying");
                tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                attempt += 1;
            }
            Err(e) => {
                error!(job = %job.id, attempt, error = %e, "Job failed");
                return JobStatus::Failed {
                    code: e.code().to_string(),
                    error: e.to_string(),
                    attempts: attempt,
                };
            }
        }
    }
}

fn set_status(statuses: &StatusMap, id: &JobId, status: JobStatus) {
    if let Some(mut entry) = statuses.get_mut(id) {
        if status.is_terminal() {
            entry.finished_at = Some(Instant::now());
        }
        entry.tx.send_replace(status);
    }
}
