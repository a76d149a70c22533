//! Redis Streams job queues for the EduMart backend.
//!
//! This crate provides:
//! - Job enqueueing via Redis Streams, one stream per queue
//! - A generic worker runtime with bounded concurrency, dispatch rate
//!   limits, delayed retries with backoff and a dead letter stream
//! - Idempotent recurring-job registration with a daily scheduler
//! - Room events via Redis Pub/Sub

pub mod error;
pub mod job;
pub mod options;
pub mod producers;
pub mod queue;
pub mod realtime;
pub mod schedule;
pub mod worker;

pub use error::{JobError, QueueError, QueueResult};
pub use job::{
    AnalyticsJob, EmailJob, JobDelivery, JobEnvelope, JobPayload, NotificationJob, QueueName,
    SubscriptionSweepJob, WishlistJob,
};
pub use options::{BackoffKind, BackoffPolicy, FailureRetention, JobOptions, RateLimit};
pub use queue::{Delivered, JobQueue, QueueConfig};
pub use realtime::{RealtimePublisher, RoomChannel};
pub use schedule::{DailySchedule, RepeatPolicy, Scheduler};
pub use worker::{JobHandler, WorkerOptions, WorkerRuntime};
