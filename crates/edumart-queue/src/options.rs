//! Per-job execution options: attempts, backoff, retention, rate limits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Backoff strategy between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    Fixed,
    Exponential,
}

/// Delay policy applied before each retry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    pub kind: BackoffKind,
    pub delay: Duration,
}

impl BackoffPolicy {
    pub fn fixed(delay: Duration) -> Self {
        Self {
            kind: BackoffKind::Fixed,
            delay,
        }
    }

    pub fn exponential(delay: Duration) -> Self {
        Self {
            kind: BackoffKind::Exponential,
            delay,
        }
    }

    /// Delay before retry number `attempt` (1-based).
    ///
    /// Exponential: `delay * 2^(attempt - 1)`; fixed: constant `delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self.kind {
            BackoffKind::Fixed => self.delay,
            BackoffKind::Exponential => self
                .delay
                .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1))),
        }
    }
}

/// What happens to terminally failed job records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureRetention {
    /// Discard the record entirely.
    Drop,
    /// Keep the most recent N records on the dead letter stream.
    Keep(u64),
}

/// Options attached to a job at enqueue time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JobOptions {
    /// Total attempts allowed, including the first run. Must be >= 1.
    pub attempts: u32,
    /// Backoff between retries.
    pub backoff: BackoffPolicy,
    /// Delete the stream record once completed.
    pub remove_on_complete: bool,
    /// Retention for terminally failed records.
    pub remove_on_fail: FailureRetention,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: BackoffPolicy::exponential(Duration::from_secs(5)),
            remove_on_complete: true,
            remove_on_fail: FailureRetention::Keep(1000),
        }
    }
}

impl JobOptions {
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn keep_on_complete(mut self) -> Self {
        self.remove_on_complete = false;
        self
    }

    pub fn with_failure_retention(mut self, retention: FailureRetention) -> Self {
        self.remove_on_fail = retention;
        self
    }
}

/// Dispatch cap for a queue's worker: at most `max` jobs started per
/// `per` window, independent of the concurrency limit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimit {
    pub max: u32,
    pub per: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_backoff_doubles_per_attempt() {
        let policy = BackoffPolicy::exponential(Duration::from_millis(100));

        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(800));
    }

    #[test]
    fn fixed_backoff_is_constant() {
        let policy = BackoffPolicy::fixed(Duration::from_secs(2));

        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(7), Duration::from_secs(2));
    }

    #[test]
    fn job_options_clamp_attempts_to_at_least_one() {
        let opts = JobOptions::default().with_attempts(0);
        assert_eq!(opts.attempts, 1);
    }
}
