//! Worker configuration.

use std::time::Duration;

use edumart_queue::RateLimit;

/// Worker process configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Concurrency per queue
    pub analytics_concurrency: usize,
    pub email_concurrency: usize,
    pub notification_concurrency: usize,
    pub subscription_concurrency: usize,
    pub wishlist_concurrency: usize,
    /// Dispatch cap for outbound email
    pub email_rate_limit: RateLimit,
    /// Cron expression for the daily subscription sweep
    pub sweep_cron: String,
    /// IANA timezone the sweep schedule is anchored to
    pub sweep_timezone: String,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            analytics_concurrency: 5,
            email_concurrency: 5,
            notification_concurrency: 5,
            subscription_concurrency: 1,
            wishlist_concurrency: 10,
            email_rate_limit: RateLimit {
                max: 50,
                per: Duration::from_secs(60),
            },
            sweep_cron: "0 1 * * *".to_string(),
            sweep_timezone: "Asia/Kolkata".to_string(),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            analytics_concurrency: env_usize("WORKER_ANALYTICS_CONCURRENCY")
                .unwrap_or(defaults.analytics_concurrency),
            email_concurrency: env_usize("WORKER_EMAIL_CONCURRENCY")
                .unwrap_or(defaults.email_concurrency),
            notification_concurrency: env_usize("WORKER_NOTIFICATION_CONCURRENCY")
                .unwrap_or(defaults.notification_concurrency),
            subscription_concurrency: env_usize("WORKER_SUBSCRIPTION_CONCURRENCY")
                .unwrap_or(defaults.subscription_concurrency),
            wishlist_concurrency: env_usize("WORKER_WISHLIST_CONCURRENCY")
                .unwrap_or(defaults.wishlist_concurrency),
            email_rate_limit: RateLimit {
                max: env_u32("WORKER_EMAIL_RATE_MAX").unwrap_or(defaults.email_rate_limit.max),
                per: Duration::from_secs(
                    env_u64("WORKER_EMAIL_RATE_WINDOW_SECS")
                        .unwrap_or(defaults.email_rate_limit.per.as_secs()),
                ),
            },
            sweep_cron: std::env::var("WORKER_SWEEP_CRON").unwrap_or(defaults.sweep_cron),
            sweep_timezone: std::env::var("WORKER_SWEEP_TZ").unwrap_or(defaults.sweep_timezone),
            shutdown_timeout: Duration::from_secs(
                env_u64("WORKER_SHUTDOWN_TIMEOUT").unwrap_or(30),
            ),
        }
    }
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}
