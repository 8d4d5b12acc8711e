//! Job queue: bounded submission channel, worker pool and per-step retry.
//!
//! Shutdown: [`JobQueue::shutdown`] stops the dispatcher from taking new jobs; chains
//! already running keep going until they finish or time out.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use catalog_core::{Config, JobError};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::time::sleep;
use uuid::Uuid;

use crate::pipeline::ChainHandler;

/// Upper bound on the delay between two attempts of one step.
pub const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(60);

/// Delay before attempt `attempt + 1`: exponential in the attempt number, capped.
#[inline]
pub(crate) fn compute_retry_backoff(base: Duration, attempt: u32) -> Duration {
    let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor).min(MAX_RETRY_BACKOFF)
}

/// Retry budget applied to each step of a chain independently.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts allowed, timeouts included.
    pub tries: u32,
    /// Errors returned by the step allowed before giving up. Timeouts do not count.
    pub max_exceptions: u32,
    /// Wall-clock ceiling for one attempt.
    pub timeout: Duration,
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            tries: 3,
            max_exceptions: 3,
            timeout: Duration::from_secs(300),
            backoff_base: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            tries: config.job_tries,
            max_exceptions: config.job_max_exceptions,
            timeout: Duration::from_secs(config.job_timeout_seconds),
            backoff_base: Duration::from_millis(config.job_retry_backoff_ms),
        }
    }
}

#[derive(Clone, Debug)]
pub struct JobQueueConfig {
    pub max_workers: usize,
    pub queue_size: usize,
    pub retry: RetryPolicy,
}

impl Default for JobQueueConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            queue_size: 1000,
            retry: RetryPolicy::default(),
        }
    }
}

impl JobQueueConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_workers: config.job_queue_max_workers,
            queue_size: config.job_queue_size,
            retry: RetryPolicy::from_config(config),
        }
    }
}

/// The two ordered steps of an upload chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChainStep {
    MarkProcessing,
    Ingest,
}

impl fmt::Display for ChainStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainStep::MarkProcessing => f.write_str("mark_processing"),
            ChainStep::Ingest => f.write_str("ingest"),
        }
    }
}

/// How a chain ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChainOutcome {
    Completed,
    /// The upload was (or should have been) marked failed with this message.
    Failed(String),
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Job queue is full")]
    Full,

    #[error("Upload {0} is already queued or running")]
    AlreadyQueued(Uuid),

    #[error("Job queue is shut down")]
    Closed,

    #[error("Job was dropped before reporting an outcome")]
    Dropped,
}

/// Handle to a submitted chain.
#[derive(Debug)]
pub struct JobTicket {
    pub upload_id: Uuid,
    done_rx: oneshot::Receiver<ChainOutcome>,
}

impl JobTicket {
    /// Wait for the chain to finish.
    pub async fn wait(self) -> Result<ChainOutcome, QueueError> {
        self.done_rx.await.map_err(|_| QueueError::Dropped)
    }
}

struct UploadJob {
    upload_id: Uuid,
    done_tx: oneshot::Sender<ChainOutcome>,
}

enum StepFailure {
    Exhausted { attempts: u32, error: anyhow::Error },
    Unrecoverable(JobError),
}

impl StepFailure {
    fn message(&self) -> String {
        match self {
            StepFailure::Exhausted { error, .. } => {
                format!("Job failed after maximum retries: {}", error)
            }
            StepFailure::Unrecoverable(error) => format!("Job failed: {}", error),
        }
    }
}

type InFlight = Arc<Mutex<HashSet<Uuid>>>;

fn lock_in_flight(in_flight: &InFlight) -> MutexGuard<'_, HashSet<Uuid>> {
    in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// At most one chain per upload is queued or running at a time.
#[derive(Clone)]
pub struct JobQueue {
    job_tx: mpsc::Sender<UploadJob>,
    shutdown_tx: mpsc::Sender<()>,
    in_flight: InFlight,
}

impl JobQueue {
    /// Spawn the dispatcher and return a handle for submitting chains.
    pub fn start(handler: Arc<dyn ChainHandler>, config: JobQueueConfig) -> Self {
        let (job_tx, job_rx) = mpsc::channel(config.queue_size.max(1));
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let in_flight = InFlight::default();

        let pool_in_flight = in_flight.clone();
        tokio::spawn(async move {
            Self::worker_pool(handler, config, job_rx, shutdown_rx, pool_in_flight).await;
        });

        Self {
            job_tx,
            shutdown_tx,
            in_flight,
        }
    }

    /// Submit the chain for `upload_id`. Never waits: a full queue is an error.
    #[tracing::instrument(skip(self))]
    pub fn enqueue(&self, upload_id: Uuid) -> Result<JobTicket, QueueError> {
        let mut in_flight = lock_in_flight(&self.in_flight);
        if !in_flight.insert(upload_id) {
            return Err(QueueError::AlreadyQueued(upload_id));
        }

        let (done_tx, done_rx) = oneshot::channel();
        if let Err(e) = self.job_tx.try_send(UploadJob { upload_id, done_tx }) {
            in_flight.remove(&upload_id);
            return Err(match e {
                mpsc::error::TrySendError::Full(_) => QueueError::Full,
                mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
            });
        }
        drop(in_flight);

        tracing::info!(upload_id = %upload_id, "Upload chain submitted to queue");
        Ok(JobTicket { upload_id, done_rx })
    }

    async fn worker_pool(
        handler: Arc<dyn ChainHandler>,
        config: JobQueueConfig,
        mut job_rx: mpsc::Receiver<UploadJob>,
        mut shutdown_rx: mpsc::Receiver<()>,
        in_flight: InFlight,
    ) {
        tracing::info!(
            max_workers = config.max_workers,
            queue_size = config.queue_size,
            tries = config.retry.tries,
            timeout_seconds = config.retry.timeout.as_secs(),
            "Job queue worker pool started"
        );

        let semaphore = Arc::new(Semaphore::new(config.max_workers.max(1)));
        let policy = Arc::new(config.retry);

        loop {
            let job = tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Job queue worker pool shutting down");
                    break;
                }
                job = job_rx.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            };

            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            let handler = handler.clone();
            let policy = policy.clone();
            let in_flight = in_flight.clone();
            tokio::spawn(async move {
                let _permit = permit;
                let outcome = run_chain(handler.as_ref(), &policy, job.upload_id).await;
                lock_in_flight(&in_flight).remove(&job.upload_id);
                let _ = job.done_tx.send(outcome);
            });
        }

        tracing::info!("Job queue worker pool stopped");
    }

    pub async fn shutdown(&self) {
        tracing::info!("Initiating job queue shutdown");
        let _ = self.shutdown_tx.send(()).await;
    }
}

/// Run both steps in order. A step that fails for good ends the chain and marks the
/// upload failed.
#[tracing::instrument(skip(handler, policy))]
pub(crate) async fn run_chain(
    handler: &dyn ChainHandler,
    policy: &RetryPolicy,
    upload_id: Uuid,
) -> ChainOutcome {
    let result = match run_step(policy, upload_id, ChainStep::MarkProcessing, || {
        handler.mark_processing(upload_id)
    })
    .await
    {
        Ok(()) => run_step(policy, upload_id, ChainStep::Ingest, || handler.ingest(upload_id))
            .await
            .map(|_| ()),
        Err(failure) => Err(failure),
    };

    match result {
        Ok(()) => {
            tracing::info!(upload_id = %upload_id, "Upload chain completed");
            ChainOutcome::Completed
        }
        Err(failure) => {
            let message = failure.message();
            match &failure {
                StepFailure::Exhausted { attempts, .. } => tracing::error!(
                    upload_id = %upload_id,
                    attempts,
                    error = %message,
                    "Upload chain failed after maximum retries"
                ),
                StepFailure::Unrecoverable(_) => tracing::error!(
                    upload_id = %upload_id,
                    error = %message,
                    "Upload chain failed with unrecoverable error, will not retry"
                ),
            }
            handler.fail(upload_id, message.clone()).await;
            ChainOutcome::Failed(message)
        }
    }
}

async fn run_step<T, F, Fut>(
    policy: &RetryPolicy,
    upload_id: Uuid,
    step: ChainStep,
    mut op: F,
) -> Result<T, StepFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, JobError>>,
{
    let mut attempts = 0u32;
    let mut exceptions = 0u32;

    loop {
        attempts += 1;
        let error = match tokio::time::timeout(policy.timeout, op()).await {
            Ok(Ok(value)) => {
                tracing::debug!(upload_id = %upload_id, step = %step, attempts, "Step succeeded");
                return Ok(value);
            }
            Ok(Err(e)) if !e.is_recoverable() => return Err(StepFailure::Unrecoverable(e)),
            Ok(Err(e)) => {
                exceptions += 1;
                e.into_inner()
            }
            Err(_) => anyhow::anyhow!(
                "Step {} timed out after {} seconds",
                step,
                policy.timeout.as_secs()
            ),
        };

        tracing::warn!(
            upload_id = %upload_id,
            step = %step,
            attempt = attempts,
            exceptions,
            error = %error,
            "Step attempt failed"
        );

        if attempts >= policy.tries || exceptions >= policy.max_exceptions {
            return Err(StepFailure::Exhausted { attempts, error });
        }

        let backoff = compute_retry_backoff(policy.backoff_base, attempts);
        tracing::info!(
            upload_id = %upload_id,
            step = %step,
            next_attempt = attempts + 1,
            backoff_ms = backoff.as_millis() as u64,
            "Scheduling step retry"
        );
        sleep(backoff).await;
    }
}
