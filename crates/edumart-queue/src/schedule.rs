//! Recurring job registration and firing.
//!
//! Repeat registrations live in a Redis hash keyed by a caller-supplied
//! job id, so registering the same id twice is a no-op rather than a
//! second schedule. The tick loop derives each schedule's most recent
//! fire slot and enqueues exactly one job per slot, arbitrated through
//! a per-slot marker so concurrent scheduler processes agree.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use validator::Validate;

use edumart_models::JobId;

use crate::error::{QueueError, QueueResult};
use crate::job::JobPayload;
use crate::options::JobOptions;
use crate::queue::JobQueue;

/// Fired-slot markers outlive the slot by two days, then expire.
const FIRED_MARKER_TTL_SECS: u64 = 172_800;

/// Recurring schedule: cron expression plus IANA timezone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepeatPolicy {
    pub cron: String,
    pub timezone: String,
}

impl RepeatPolicy {
    pub fn daily(cron: impl Into<String>, timezone: impl Into<String>) -> Self {
        Self {
            cron: cron.into(),
            timezone: timezone.into(),
        }
    }
}

/// Parsed daily schedule.
///
/// The supported cron form is `"M H * * *"` (one firing per day at a
/// fixed local time) which is the only shape this system schedules;
/// anything else is rejected at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailySchedule {
    minute: u32,
    hour: u32,
    tz: Tz,
}

impl DailySchedule {
    pub fn parse(cron: &str, timezone: &str) -> QueueResult<Self> {
        let fields: Vec<&str> = cron.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(QueueError::invalid_schedule(format!(
                "expected 5 cron fields, got {}",
                fields.len()
            )));
        }
        if fields[2..] != ["*", "*", "*"] {
            return Err(QueueError::invalid_schedule(
                "only daily schedules (\"M H * * *\") are supported",
            ));
        }

        let minute: u32 = fields[0]
            .parse()
            .map_err(|_| QueueError::invalid_schedule(format!("bad minute: {}", fields[0])))?;
        let hour: u32 = fields[1]
            .parse()
            .map_err(|_| QueueError::invalid_schedule(format!("bad hour: {}", fields[1])))?;
        if minute > 59 || hour > 23 {
            return Err(QueueError::invalid_schedule(format!(
                "{}:{} is not a valid time of day",
                hour, minute
            )));
        }

        let tz: Tz = timezone
            .parse()
            .map_err(|_| QueueError::invalid_schedule(format!("unknown timezone: {}", timezone)))?;

        Ok(Self { minute, hour, tz })
    }

    /// The latest slot at or before `now`, as a UTC instant.
    ///
    /// Walks back a day at a time to cope with slots still ahead of the
    /// local clock and with DST gaps swallowing a local time.
    pub fn most_recent_slot(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let local_now = now.with_timezone(&self.tz);
        let mut date = local_now.date_naive();

        for _ in 0..3 {
            if let Some(naive) = date.and_hms_opt(self.hour, self.minute, 0) {
                if let Some(slot) = self.tz.from_local_datetime(&naive).earliest() {
                    if slot <= local_now {
                        return Some(slot.with_timezone(&Utc));
                    }
                }
            }
            date = date.pred_opt()?;
        }
        None
    }
}

/// One registered recurring job.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RepeatRegistration<T> {
    job_id: String,
    repeat: RepeatPolicy,
    data: T,
    opts: JobOptions,
}

/// Scheduler for one queue's recurring jobs.
pub struct Scheduler<T> {
    queue: Arc<JobQueue<T>>,
    client: redis::Client,
    tick_interval: Duration,
}

impl<T: JobPayload> Scheduler<T> {
    pub fn new(queue: Arc<JobQueue<T>>) -> QueueResult<Self> {
        let client = redis::Client::open(queue.config().redis_url.as_str())?;
        Ok(Self {
            queue,
            client,
            tick_interval: Duration::from_secs(30),
        })
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    fn registry_key(&self) -> String {
        format!(
            "{}:repeat:{}",
            self.queue.config().prefix,
            self.queue.queue_name()
        )
    }

    fn fired_key(&self, job_id: &str, slot: DateTime<Utc>) -> String {
        format!(
            "{}:repeat:fired:{}:{}@{}",
            self.queue.config().prefix,
            self.queue.queue_name(),
            job_id,
            slot.timestamp()
        )
    }

    /// Register a recurring job. Returns `false` when the id was already
    /// registered (a no-op, not an error, and not a duplicate schedule).
    pub async fn register(
        &self,
        job_id: &str,
        repeat: RepeatPolicy,
        data: T,
        opts: JobOptions,
    ) -> QueueResult<bool> {
        DailySchedule::parse(&repeat.cron, &repeat.timezone)?;
        data.validate()?;

        let record = serde_json::to_string(&RepeatRegistration {
            job_id: job_id.to_string(),
            repeat,
            data,
            opts,
        })?;

        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let inserted: i64 = redis::cmd("HSETNX")
            .arg(self.registry_key())
            .arg(job_id)
            .arg(&record)
            .query_async(&mut conn)
            .await?;

        if inserted == 1 {
            info!(queue = %self.queue.queue_name(), "Registered recurring job '{}'", job_id);
        } else {
            debug!(queue = %self.queue.queue_name(), "Recurring job '{}' already registered", job_id);
        }
        Ok(inserted == 1)
    }

    /// Remove a recurring registration.
    pub async fn unregister(&self, job_id: &str) -> QueueResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let removed: i64 = redis::cmd("HDEL")
            .arg(self.registry_key())
            .arg(job_id)
            .query_async(&mut conn)
            .await?;
        Ok(removed == 1)
    }

    /// Run the firing loop until shutdown.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            queue = %self.queue.queue_name(),
            "Starting repeat scheduler (interval: {:?})",
            self.tick_interval
        );
        let mut ticker = tokio::time::interval(self.tick_interval);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.tick_once(Utc::now()).await {
                        error!(queue = %self.queue.queue_name(), "Scheduler tick failed: {}", e);
                    }
                }
            }
        }
        info!(queue = %self.queue.queue_name(), "Repeat scheduler stopped");
    }

    /// Fire every registration whose current slot has not been fired
    /// yet. Returns how many jobs were enqueued.
    pub async fn tick_once(&self, now: DateTime<Utc>) -> QueueResult<u32> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let entries: std::collections::HashMap<String, String> = redis::cmd("HGETALL")
            .arg(self.registry_key())
            .query_async(&mut conn)
            .await?;

        let mut fired = 0u32;
        for (job_id, record) in entries {
            let registration: RepeatRegistration<T> = match serde_json::from_str(&record) {
                Ok(r) => r,
                Err(e) => {
                    warn!("Skipping malformed repeat registration '{}': {}", job_id, e);
                    continue;
                }
            };

            let schedule =
                DailySchedule::parse(&registration.repeat.cron, &registration.repeat.timezone)?;
            let Some(slot) = schedule.most_recent_slot(now) else {
                continue;
            };

            let marker = self.fired_key(&job_id, slot);
            let claimed: Option<String> = redis::cmd("SET")
                .arg(&marker)
                .arg("1")
                .arg("NX")
                .arg("EX")
                .arg(FIRED_MARKER_TTL_SECS)
                .query_async(&mut conn)
                .await?;
            if claimed.is_none() {
                continue; // slot already fired
            }

            let slot_job_id = JobId::from_string(format!("{}@{}", job_id, slot.timestamp()));
            self.queue
                .enqueue_with_id(slot_job_id, registration.data.clone(), registration.opts)
                .await?;
            info!(
                queue = %self.queue.queue_name(),
                "Fired recurring job '{}' for slot {}",
                job_id, slot
            );
            fired += 1;
        }
        Ok(fired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn parse_accepts_the_daily_form() {
        let schedule = DailySchedule::parse("0 1 * * *", "Asia/Kolkata").unwrap();
        assert_eq!(schedule.minute, 0);
        assert_eq!(schedule.hour, 1);
    }

    #[test]
    fn parse_rejects_non_daily_expressions() {
        assert!(DailySchedule::parse("*/5 * * * *", "UTC").is_err());
        assert!(DailySchedule::parse("0 1 * * 1", "UTC").is_err());
        assert!(DailySchedule::parse("0 1 1 * *", "UTC").is_err());
        assert!(DailySchedule::parse("61 1 * * *", "UTC").is_err());
        assert!(DailySchedule::parse("0 24 * * *", "UTC").is_err());
        assert!(DailySchedule::parse("0 1 * *", "UTC").is_err());
    }

    #[test]
    fn parse_rejects_unknown_timezones() {
        assert!(DailySchedule::parse("0 1 * * *", "Mars/Olympus").is_err());
    }

    #[test]
    fn most_recent_slot_is_today_once_the_time_has_passed() {
        let schedule = DailySchedule::parse("0 1 * * *", "UTC").unwrap();
        let now = Utc.with_ymd_and_hms(2026, 8, 5, 6, 0, 0).unwrap();
        let slot = schedule.most_recent_slot(now).unwrap();
        assert_eq!(slot, Utc.with_ymd_and_hms(2026, 8, 5, 1, 0, 0).unwrap());
    }

    #[test]
    fn most_recent_slot_is_yesterday_before_the_time() {
        let schedule = DailySchedule::parse("0 1 * * *", "UTC").unwrap();
        let now = Utc.with_ymd_and_hms(2026, 8, 5, 0, 30, 0).unwrap();
        let slot = schedule.most_recent_slot(now).unwrap();
        assert_eq!(slot, Utc.with_ymd_and_hms(2026, 8, 4, 1, 0, 0).unwrap());
    }

    #[test]
    fn most_recent_slot_respects_the_timezone() {
        // 01:00 in Kolkata is 19:30 UTC the previous day.
        let schedule = DailySchedule::parse("0 1 * * *", "Asia/Kolkata").unwrap();
        let now = Utc.with_ymd_and_hms(2026, 8, 5, 6, 0, 0).unwrap();
        let slot = schedule.most_recent_slot(now).unwrap();
        assert_eq!(slot, Utc.with_ymd_and_hms(2026, 8, 4, 19, 30, 0).unwrap());
    }

    #[test]
    fn slot_instants_are_exact_minutes() {
        let schedule = DailySchedule::parse("30 13 * * *", "UTC").unwrap();
        let now = Utc.with_ymd_and_hms(2026, 8, 5, 13, 30, 0).unwrap();
        // The slot boundary itself counts as fired.
        let slot = schedule.most_recent_slot(now).unwrap();
        assert_eq!(slot.minute(), 30);
        assert_eq!(slot, now);
    }
}
