//! Durable job queues on Redis Streams.
//!
//! One `JobQueue<T>` instance per queue, each with its own stream,
//! consumer group, dead letter stream and delayed set. Retries are
//! parked in the delayed sorted set (scored by their due time) and
//! promoted back onto the stream once the backoff has elapsed.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::time::Duration;

use chrono::Utc;
use redis::AsyncCommands;
use tracing::{debug, info, warn};
use validator::Validate;

use edumart_models::JobId;

use crate::error::{QueueError, QueueResult};
use crate::job::{JobEnvelope, JobPayload, QueueName};
use crate::options::{FailureRetention, JobOptions};

/// How many delayed entries one promotion pass moves at most.
const PROMOTE_BATCH: usize = 32;

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Key prefix for every queue structure
    pub prefix: String,
    /// TTL on deduplication keys
    pub dedup_ttl: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            prefix: "edumart".to_string(),
            dedup_ttl: Duration::from_secs(3600),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            prefix: std::env::var("QUEUE_PREFIX").unwrap_or_else(|_| "edumart".to_string()),
            dedup_ttl: Duration::from_secs(
                std::env::var("QUEUE_DEDUP_TTL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3600),
            ),
        }
    }
}

/// A job pulled off the stream, not yet acknowledged.
#[derive(Debug, Clone)]
pub struct Delivered<T> {
    /// Stream message id (ack token)
    pub message_id: String,
    /// The stored job record
    pub envelope: JobEnvelope<T>,
    /// Completed attempts before this delivery
    pub attempts_made: u32,
}

/// Serialized form parked in the delayed set between attempts.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct DelayedRecord<T> {
    envelope: JobEnvelope<T>,
    attempts_made: u32,
}

/// Queue client for one named queue.
pub struct JobQueue<T> {
    client: redis::Client,
    config: QueueConfig,
    _payload: PhantomData<fn() -> T>,
}

impl<T: JobPayload> JobQueue<T> {
    /// Create a new queue client.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self {
            client,
            config,
            _payload: PhantomData,
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    /// The queue this client is bound to.
    pub fn queue_name(&self) -> QueueName {
        T::QUEUE
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    fn stream_key(&self) -> String {
        format!("{}:jobs:{}", self.config.prefix, T::QUEUE)
    }

    fn group_name(&self) -> String {
        format!("{}:workers:{}", self.config.prefix, T::QUEUE)
    }

    fn dlq_key(&self) -> String {
        format!("{}:dlq:{}", self.config.prefix, T::QUEUE)
    }

    fn delayed_key(&self) -> String {
        format!("{}:delayed:{}", self.config.prefix, T::QUEUE)
    }

    fn payload_dedup_key(&self, key: &str) -> String {
        format!("{}:dedup:{}", self.config.prefix, key)
    }

    fn id_dedup_key(&self, id: &JobId) -> String {
        format!("{}:dedup:id:{}:{}", self.config.prefix, T::QUEUE, id)
    }

    /// Initialize the queue (create consumer group if not exists).
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(self.stream_key())
            .arg(self.group_name())
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("Created consumer group: {}", self.group_name()),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group already exists: {}", self.group_name());
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    /// Enqueue with default options.
    pub async fn enqueue(&self, data: T) -> QueueResult<JobId> {
        self.enqueue_with_opts(data, JobOptions::default()).await
    }

    /// Enqueue a job. Payloads carrying an idempotency key are rejected
    /// while an identical job is still live.
    pub async fn enqueue_with_opts(&self, data: T, opts: JobOptions) -> QueueResult<JobId> {
        data.validate()?;
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let dedup_key = data.idempotency_key().map(|k| self.payload_dedup_key(&k));
        if let Some(key) = &dedup_key {
            let exists: bool = conn.exists(key).await?;
            if exists {
                warn!(queue = %T::QUEUE, "Duplicate job rejected: {}", key);
                return Err(QueueError::enqueue_failed("Duplicate job"));
            }
        }

        let envelope = self.envelope(JobId::new(), data, opts);
        let message_id = self.push(&mut conn, &envelope, 0).await?;

        if let Some(key) = &dedup_key {
            conn.set_ex::<_, _, ()>(key, "1", self.config.dedup_ttl.as_secs())
                .await?;
        }

        metrics::counter!("edumart_jobs_enqueued_total", "queue" => T::QUEUE.as_str())
            .increment(1);
        info!(
            queue = %T::QUEUE,
            "Enqueued job {} with message ID {}",
            envelope.id, message_id
        );
        Ok(envelope.id)
    }

    /// Enqueue under a caller-supplied job id. Re-enqueueing the same id
    /// while its dedup key is live is a no-op, not a duplicate.
    pub async fn enqueue_with_id(&self, id: JobId, data: T, opts: JobOptions) -> QueueResult<JobId> {
        data.validate()?;
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let dedup_key = self.id_dedup_key(&id);
        let claimed: Option<String> = redis::cmd("SET")
            .arg(&dedup_key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(self.config.dedup_ttl.as_secs())
            .query_async(&mut conn)
            .await?;
        if claimed.is_none() {
            debug!(queue = %T::QUEUE, "Job {} already enqueued, skipping", id);
            return Ok(id);
        }

        let envelope = self.envelope(id.clone(), data, opts);
        let message_id = self.push(&mut conn, &envelope, 0).await?;

        metrics::counter!("edumart_jobs_enqueued_total", "queue" => T::QUEUE.as_str())
            .increment(1);
        info!(
            queue = %T::QUEUE,
            "Enqueued job {} with message ID {}",
            id, message_id
        );
        Ok(id)
    }

    fn envelope(&self, id: JobId, data: T, opts: JobOptions) -> JobEnvelope<T> {
        JobEnvelope {
            id,
            name: T::QUEUE.as_str().to_string(),
            data,
            opts,
            created_at: Utc::now(),
        }
    }

    async fn push(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        envelope: &JobEnvelope<T>,
        attempts_made: u32,
    ) -> QueueResult<String> {
        let payload = serde_json::to_string(envelope)?;
        let message_id: String = redis::cmd("XADD")
            .arg(self.stream_key())
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("attempt")
            .arg(attempts_made)
            .query_async(conn)
            .await?;
        Ok(message_id)
    }

    /// Consume jobs from the queue.
    pub async fn consume(
        &self,
        consumer_name: &str,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<Delivered<T>>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let result: redis::streams::StreamReadReply = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(self.group_name())
            .arg(consumer_name)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(self.stream_key())
            .arg(">") // Only new messages
            .query_async(&mut conn)
            .await?;

        let mut jobs = Vec::new();
        for stream_key in result.keys {
            for entry in stream_key.ids {
                if let Some(delivered) = self.parse_entry(entry.id.clone(), &entry.map).await {
                    jobs.push(delivered);
                }
            }
        }
        Ok(jobs)
    }

    /// Claim pending jobs that have been idle for too long. This hands
    /// jobs from crashed workers to a live consumer.
    pub async fn claim_stale(
        &self,
        consumer_name: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<Delivered<T>>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let pending: redis::streams::StreamPendingReply = redis::cmd("XPENDING")
            .arg(self.stream_key())
            .arg(self.group_name())
            .query_async(&mut conn)
            .await?;

        if pending.count() == 0 {
            return Ok(Vec::new());
        }

        let result: redis::streams::StreamClaimReply = redis::cmd("XCLAIM")
            .arg(self.stream_key())
            .arg(self.group_name())
            .arg(consumer_name)
            .arg(min_idle_ms)
            .arg("0-0")
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        let mut jobs = Vec::new();
        for entry in result.ids {
            if let Some(delivered) = self.parse_entry(entry.id.clone(), &entry.map).await {
                info!(queue = %T::QUEUE, "Claimed stale job {}", delivered.envelope.id);
                jobs.push(delivered);
            }
        }
        Ok(jobs)
    }

    async fn parse_entry(
        &self,
        message_id: String,
        fields: &HashMap<String, redis::Value>,
    ) -> Option<Delivered<T>> {
        let payload = match fields.get("job") {
            Some(redis::Value::BulkString(payload)) => String::from_utf8_lossy(payload).into_owned(),
            _ => {
                warn!("Stream entry {} without job field", message_id);
                self.ack(&message_id, true).await.ok();
                return None;
            }
        };
        let attempts_made = match fields.get("attempt") {
            Some(redis::Value::BulkString(raw)) => {
                String::from_utf8_lossy(raw).parse().unwrap_or(0)
            }
            _ => 0,
        };

        match serde_json::from_str::<JobEnvelope<T>>(&payload) {
            Ok(envelope) => Some(Delivered {
                message_id,
                envelope,
                attempts_made,
            }),
            Err(e) => {
                warn!("Failed to parse job payload: {}", e);
                // Ack the malformed message to prevent reprocessing
                self.ack(&message_id, true).await.ok();
                None
            }
        }
    }

    /// Acknowledge a job; optionally delete its stream record.
    pub async fn ack(&self, message_id: &str, remove: bool) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        redis::cmd("XACK")
            .arg(self.stream_key())
            .arg(self.group_name())
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        if remove {
            redis::cmd("XDEL")
                .arg(self.stream_key())
                .arg(message_id)
                .query_async::<()>(&mut conn)
                .await?;
        }

        debug!("Acknowledged job: {}", message_id);
        Ok(())
    }

    /// Park a failed job in the delayed set, due after `delay`.
    /// `attempts_made` counts the attempt that just failed.
    pub async fn schedule_retry(
        &self,
        message_id: &str,
        envelope: JobEnvelope<T>,
        attempts_made: u32,
        delay: Duration,
    ) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let job_id = envelope.id.clone();
        let record = serde_json::to_string(&DelayedRecord {
            envelope,
            attempts_made,
        })?;
        let due = Utc::now().timestamp_millis() + delay.as_millis() as i64;

        redis::cmd("ZADD")
            .arg(self.delayed_key())
            .arg(due)
            .arg(&record)
            .query_async::<()>(&mut conn)
            .await?;

        // The stream record is superseded by the delayed entry.
        self.ack(message_id, true).await?;

        metrics::counter!("edumart_jobs_retried_total", "queue" => T::QUEUE.as_str())
            .increment(1);
        info!(
            queue = %T::QUEUE,
            "Job {} scheduled for retry in {:?} (attempt {})",
            job_id, delay, attempts_made
        );
        Ok(())
    }

    /// Move due delayed jobs back onto the stream. Returns how many were
    /// promoted. Safe to run from multiple processes: ZREM arbitrates.
    pub async fn promote_due(&self) -> QueueResult<usize> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let now = Utc::now().timestamp_millis();

        let due: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(self.delayed_key())
            .arg("-inf")
            .arg(now)
            .arg("LIMIT")
            .arg(0)
            .arg(PROMOTE_BATCH)
            .query_async(&mut conn)
            .await?;

        let mut promoted = 0usize;
        for member in due {
            let removed: i64 = redis::cmd("ZREM")
                .arg(self.delayed_key())
                .arg(&member)
                .query_async(&mut conn)
                .await?;
            if removed == 0 {
                // Another process promoted this entry first.
                continue;
            }

            match serde_json::from_str::<DelayedRecord<T>>(&member) {
                Ok(record) => {
                    self.push(&mut conn, &record.envelope, record.attempts_made)
                        .await?;
                    promoted += 1;
                }
                Err(e) => warn!("Dropping malformed delayed record: {}", e),
            }
        }

        if promoted > 0 {
            debug!(queue = %T::QUEUE, "Promoted {} delayed jobs", promoted);
        }
        Ok(promoted)
    }

    /// Terminally fail a job: record it on the DLQ per the retention
    /// policy and drop the stream record.
    pub async fn dead_letter(
        &self,
        message_id: &str,
        envelope: &JobEnvelope<T>,
        attempts_made: u32,
        error: &str,
    ) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        match envelope.opts.remove_on_fail {
            FailureRetention::Drop => {}
            FailureRetention::Keep(limit) => {
                let payload = serde_json::to_string(envelope)?;
                redis::cmd("XADD")
                    .arg(self.dlq_key())
                    .arg("*")
                    .arg("job")
                    .arg(&payload)
                    .arg("error")
                    .arg(error)
                    .arg("attempts")
                    .arg(attempts_made)
                    .arg("original_id")
                    .arg(message_id)
                    .query_async::<()>(&mut conn)
                    .await?;
                redis::cmd("XTRIM")
                    .arg(self.dlq_key())
                    .arg("MAXLEN")
                    .arg("~")
                    .arg(limit)
                    .query_async::<()>(&mut conn)
                    .await?;
            }
        }

        self.ack(message_id, true).await?;
        self.clear_dedup(envelope).await.ok();

        metrics::counter!("edumart_jobs_dead_lettered_total", "queue" => T::QUEUE.as_str())
            .increment(1);
        warn!(
            queue = %T::QUEUE,
            "Moved job {} to DLQ after {} attempts: {}",
            envelope.id, attempts_made, error
        );
        Ok(())
    }

    /// Drop the dedup keys once a job reaches a terminal state, so the
    /// same logical job can be submitted again.
    pub async fn clear_dedup(&self, envelope: &JobEnvelope<T>) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let mut keys = vec![self.id_dedup_key(&envelope.id)];
        if let Some(key) = envelope.data.idempotency_key() {
            keys.push(self.payload_dedup_key(&key));
        }
        conn.del::<_, ()>(keys).await?;
        Ok(())
    }

    /// Get queue length.
    pub async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.xlen(self.stream_key()).await?;
        Ok(len)
    }

    /// Get DLQ length.
    pub async fn dlq_len(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.xlen(self.dlq_key()).await?;
        Ok(len)
    }

    /// How many jobs are parked awaiting their retry slot.
    pub async fn delayed_len(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.zcard(self.delayed_key()).await?;
        Ok(len)
    }
}
