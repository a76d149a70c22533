//! Generic worker runtime: bounded concurrency, rate-limited dispatch,
//! retry/backoff and dead-lettering driven by the handler's reported
//! outcome.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{JobError, QueueError, QueueResult};
use crate::job::{JobDelivery, JobPayload};
use crate::options::{JobOptions, RateLimit};
use crate::queue::{Delivered, JobQueue};

/// Direct (non-keyed) limiter used to cap job dispatch.
pub type DispatchRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Handler for one queue's jobs.
///
/// Handlers never touch queue bookkeeping; they report the outcome and
/// the runtime decides between ack, delayed retry and dead-letter.
#[async_trait]
pub trait JobHandler<T: JobPayload>: Send + Sync + 'static {
    async fn handle(&self, job: JobDelivery<T>) -> Result<(), JobError>;
}

#[async_trait]
impl<T: JobPayload, H: JobHandler<T>> JobHandler<T> for Arc<H> {
    async fn handle(&self, job: JobDelivery<T>) -> Result<(), JobError> {
        (**self).handle(job).await
    }
}

/// Worker registration options.
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Jobs of this queue executing in parallel within this process
    pub concurrency: usize,
    /// Optional dispatch cap, independent of concurrency
    pub rate_limit: Option<RateLimit>,
    /// How often due retries are promoted back onto the stream
    pub promote_interval: Duration,
    /// How often stale pending jobs are claimed (crash recovery)
    pub claim_interval: Duration,
    /// Minimum idle time before a pending job can be claimed
    pub claim_min_idle: Duration,
    /// Grace period for in-flight jobs on shutdown
    pub shutdown_grace: Duration,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            concurrency: 2,
            rate_limit: None,
            promote_interval: Duration::from_secs(1),
            claim_interval: Duration::from_secs(30),
            claim_min_idle: Duration::from_secs(300),
            shutdown_grace: Duration::from_secs(60),
        }
    }
}

impl WorkerOptions {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_rate_limit(mut self, limit: RateLimit) -> Self {
        self.rate_limit = Some(limit);
        self
    }
}

/// What the runtime does with a finished attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Ack,
    Retry {
        attempts_made: u32,
        delay_ms: u64,
    },
    DeadLetter {
        attempts_made: u32,
    },
}

/// Pure retry decision: `attempts_before` counts completed attempts
/// prior to the run that produced `result`.
pub(crate) fn decide(
    result: &Result<(), JobError>,
    attempts_before: u32,
    opts: &JobOptions,
) -> Outcome {
    match result {
        Ok(()) => Outcome::Ack,
        Err(JobError::Terminal(_)) => Outcome::DeadLetter {
            attempts_made: attempts_before + 1,
        },
        Err(JobError::Retryable(_)) => {
            let attempts_made = attempts_before + 1;
            if attempts_made < opts.attempts.max(1) {
                Outcome::Retry {
                    attempts_made,
                    delay_ms: opts.backoff.delay_for_attempt(attempts_made).as_millis() as u64,
                }
            } else {
                Outcome::DeadLetter { attempts_made }
            }
        }
    }
}

/// Worker runtime for one queue.
pub struct WorkerRuntime<T: JobPayload, H: JobHandler<T>> {
    queue: Arc<JobQueue<T>>,
    handler: Arc<H>,
    options: WorkerOptions,
    semaphore: Arc<Semaphore>,
    limiter: Option<Arc<DispatchRateLimiter>>,
    shutdown: watch::Sender<bool>,
    consumer_name: String,
}

impl<T: JobPayload, H: JobHandler<T>> WorkerRuntime<T, H> {
    /// Register a worker for the queue.
    pub fn new(queue: Arc<JobQueue<T>>, handler: H, options: WorkerOptions) -> QueueResult<Self> {
        let limiter = options
            .rate_limit
            .as_ref()
            .map(build_limiter)
            .transpose()?
            .map(Arc::new);
        let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));
        let (shutdown, _) = watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Ok(Self {
            queue,
            handler: Arc::new(handler),
            options,
            semaphore,
            limiter,
            shutdown,
            consumer_name,
        })
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Run the worker until shutdown.
    pub async fn run(&self) -> QueueResult<()> {
        info!(
            queue = %self.queue.queue_name(),
            "Starting worker '{}' with {} max concurrent jobs",
            self.consumer_name, self.options.concurrency
        );

        self.queue.init().await?;

        let mut shutdown_rx = self.shutdown.subscribe();
        let maintenance = self.spawn_maintenance();

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!(queue = %self.queue.queue_name(), "Shutdown signal received, stopping worker");
                        break;
                    }
                }
                result = self.consume_batch() => {
                    if let Err(e) = result {
                        error!(queue = %self.queue.queue_name(), "Error consuming jobs: {}", e);
                        // Back off on error
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        maintenance.abort();

        info!("Waiting for in-flight jobs to complete...");
        let _ = tokio::time::timeout(self.options.shutdown_grace, self.wait_for_jobs()).await;

        info!(queue = %self.queue.queue_name(), "Worker stopped");
        Ok(())
    }

    /// Periodic promotion of due retries plus crash-recovery claiming.
    fn spawn_maintenance(&self) -> tokio::task::JoinHandle<()> {
        let queue = Arc::clone(&self.queue);
        let handler = Arc::clone(&self.handler);
        let semaphore = Arc::clone(&self.semaphore);
        let limiter = self.limiter.clone();
        let consumer_name = self.consumer_name.clone();
        let promote_interval = self.options.promote_interval;
        let claim_interval = self.options.claim_interval;
        let claim_min_idle = self.options.claim_min_idle;
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut promote = tokio::time::interval(promote_interval);
            let mut claim = tokio::time::interval(claim_interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = promote.tick() => {
                        if let Err(e) = queue.promote_due().await {
                            warn!("Failed to promote delayed jobs: {}", e);
                        }
                    }
                    _ = claim.tick() => {
                        match queue.claim_stale(&consumer_name, claim_min_idle.as_millis() as u64, 5).await {
                            Ok(jobs) if !jobs.is_empty() => {
                                info!("Claimed {} stale jobs", jobs.len());
                                for delivered in jobs {
                                    if let Some(limiter) = &limiter {
                                        limiter.until_ready().await;
                                    }
                                    let permit = match Arc::clone(&semaphore).acquire_owned().await {
                                        Ok(p) => p,
                                        Err(_) => break,
                                    };
                                    let queue = Arc::clone(&queue);
                                    let handler = Arc::clone(&handler);
                                    tokio::spawn(async move {
                                        let _permit = permit;
                                        execute_job(queue, handler, delivered).await;
                                    });
                                }
                            }
                            Ok(_) => {}
                            Err(e) => {
                                warn!("Failed to claim stale jobs: {}", e);
                            }
                        }
                    }
                }
            }
        })
    }

    /// Consume and dispatch one batch.
    async fn consume_batch(&self) -> QueueResult<()> {
        let available = self.semaphore.available_permits();
        if available == 0 {
            // All slots busy, wait a bit
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let jobs = self
            .queue
            .consume(&self.consumer_name, 1000, available.min(5))
            .await?;

        if jobs.is_empty() {
            return Ok(());
        }

        debug!(queue = %self.queue.queue_name(), "Consumed {} jobs", jobs.len());

        for delivered in jobs {
            if let Some(limiter) = &self.limiter {
                limiter.until_ready().await;
            }
            let permit = Arc::clone(&self.semaphore)
                .acquire_owned()
                .await
                .map_err(|_| QueueError::config("semaphore closed"))?;
            let queue = Arc::clone(&self.queue);
            let handler = Arc::clone(&self.handler);
            tokio::spawn(async move {
                let _permit = permit;
                execute_job(queue, handler, delivered).await;
            });
        }

        Ok(())
    }

    /// Wait for all in-flight jobs to complete.
    async fn wait_for_jobs(&self) {
        loop {
            if self.semaphore.available_permits() == self.options.concurrency.max(1) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

/// Execute one delivered job and apply the retry decision.
async fn execute_job<T: JobPayload, H: JobHandler<T>>(
    queue: Arc<JobQueue<T>>,
    handler: Arc<H>,
    delivered: Delivered<T>,
) {
    let job_id = delivered.envelope.id.clone();
    let queue_label = queue.queue_name().as_str();
    info!(
        job_id = %job_id,
        queue = queue_label,
        "Executing job (attempt {})",
        delivered.attempts_made + 1
    );

    let delivery = JobDelivery {
        id: job_id.clone(),
        data: delivered.envelope.data.clone(),
        attempts_made: delivered.attempts_made,
    };
    let result = handler.handle(delivery).await;

    match decide(&result, delivered.attempts_made, &delivered.envelope.opts) {
        Outcome::Ack => {
            metrics::counter!("edumart_jobs_completed_total", "queue" => queue_label).increment(1);
            info!(job_id = %job_id, "Job completed successfully");
            if let Err(e) = queue
                .ack(&delivered.message_id, delivered.envelope.opts.remove_on_complete)
                .await
            {
                error!(job_id = %job_id, "Failed to ack job: {}", e);
            }
            if let Err(e) = queue.clear_dedup(&delivered.envelope).await {
                warn!(job_id = %job_id, "Failed to clear dedup key: {}", e);
            }
        }
        Outcome::Retry {
            attempts_made,
            delay_ms,
        } => {
            metrics::counter!("edumart_jobs_failed_total", "queue" => queue_label).increment(1);
            let reason = result.as_ref().err().map(ToString::to_string).unwrap_or_default();
            info!(
                job_id = %job_id,
                "Job failed (attempt {}/{}), retrying: {}",
                attempts_made, delivered.envelope.opts.attempts, reason
            );
            if let Err(e) = queue
                .schedule_retry(
                    &delivered.message_id,
                    delivered.envelope,
                    attempts_made,
                    Duration::from_millis(delay_ms),
                )
                .await
            {
                error!(job_id = %job_id, "Failed to schedule retry: {}", e);
            }
        }
        Outcome::DeadLetter { attempts_made } => {
            metrics::counter!("edumart_jobs_failed_total", "queue" => queue_label).increment(1);
            let reason = result.as_ref().err().map(ToString::to_string).unwrap_or_default();
            error!(
                job_id = %job_id,
                "Job terminally failed after {} attempts: {}",
                attempts_made, reason
            );
            if let Err(e) = queue
                .dead_letter(&delivered.message_id, &delivered.envelope, attempts_made, &reason)
                .await
            {
                error!(job_id = %job_id, "Failed to dead-letter job: {}", e);
            }
        }
    }
}

fn build_limiter(limit: &RateLimit) -> QueueResult<DispatchRateLimiter> {
    let max = NonZeroU32::new(limit.max)
        .ok_or_else(|| QueueError::config("rate limit max must be positive"))?;
    if limit.per.is_zero() {
        return Err(QueueError::config("rate limit window must be positive"));
    }
    let quota = Quota::with_period(limit.per / limit.max)
        .ok_or_else(|| QueueError::config("rate limit window too small"))?
        .allow_burst(max);
    Ok(RateLimiter::direct(quota))
}
