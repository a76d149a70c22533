//! Queue names, job payload types and the stored job record.
//!
//! Each queue carries exactly one payload type; the binding is encoded
//! in [`JobPayload::QUEUE`], so a payload can never be enqueued onto the
//! wrong stream. Payloads are validated before they touch Redis.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

use edumart_models::{JobId, NewNotification, RecipientType, WishlistAction};

use crate::options::JobOptions;

/// The five job queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueName {
    Analytics,
    Email,
    Notification,
    Subscription,
    Wishlist,
}

impl QueueName {
    pub const ALL: [QueueName; 5] = [
        QueueName::Analytics,
        QueueName::Email,
        QueueName::Notification,
        QueueName::Subscription,
        QueueName::Wishlist,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::Analytics => "analytics",
            QueueName::Email => "email",
            QueueName::Notification => "notification",
            QueueName::Subscription => "subscription",
            QueueName::Wishlist => "wishlist",
        }
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A payload type bound to one queue.
pub trait JobPayload:
    Serialize + DeserializeOwned + Validate + Clone + fmt::Debug + Send + Sync + 'static
{
    /// The queue this payload is enqueued onto.
    const QUEUE: QueueName;

    /// Deduplication key, when the payload defines one. Enqueueing a
    /// second job with the same live key is rejected.
    fn idempotency_key(&self) -> Option<String> {
        None
    }
}

/// Stored job record: `{id, name, data, opts}` plus the creation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEnvelope<T> {
    /// Job ID (caller-supplied for idempotent registrations)
    pub id: JobId,
    /// Queue job name, e.g. `"wishlist"`
    pub name: String,
    /// Typed payload
    pub data: T,
    /// Execution options
    pub opts: JobOptions,
    /// When the job was enqueued
    pub created_at: DateTime<Utc>,
}

/// What a handler receives: `{id, data, attemptsMade}`.
#[derive(Debug, Clone)]
pub struct JobDelivery<T> {
    pub id: JobId,
    pub data: T,
    /// Completed attempts before this one (0 on the first run).
    pub attempts_made: u32,
}

/// Order/course completion event feeding the analytics queue.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsJob {
    #[validate(length(min = 1))]
    pub order_id: String,
    #[validate(length(min = 1))]
    pub student_id: String,
    #[validate(length(min = 1))]
    pub course_id: String,
    #[validate(email)]
    pub student_email: String,
    pub student_name: String,
    pub course_title: String,
    #[validate(range(min = 0.0))]
    pub amount_paid: f64,
    pub created_at: DateTime<Utc>,
}

impl JobPayload for AnalyticsJob {
    const QUEUE: QueueName = QueueName::Analytics;

    fn idempotency_key(&self) -> Option<String> {
        Some(format!("analytics:{}", self.order_id))
    }
}

/// Payment completion event feeding the email queue.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EmailJob {
    #[validate(email)]
    pub recipient: String,
    pub student_name: String,
    pub course_title: String,
    #[validate(range(min = 0.0))]
    pub amount_paid: f64,
    #[validate(length(min = 1))]
    pub order_id: String,
}

impl JobPayload for EmailJob {
    const QUEUE: QueueName = QueueName::Email;

    fn idempotency_key(&self) -> Option<String> {
        Some(format!("email:{}", self.order_id))
    }
}

/// Domain alert feeding the notification queue.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NotificationJob {
    #[validate(length(min = 1))]
    pub title: String,
    pub description: String,
    #[validate(length(min = 1))]
    pub category: String,
    pub recipient: RecipientType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub institution_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch_id: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl NotificationJob {
    /// The record this job persists.
    pub fn to_new_notification(&self) -> NewNotification {
        NewNotification {
            title: self.title.clone(),
            description: self.description.clone(),
            category: self.category.clone(),
            recipient: self.recipient,
            institution_id: self.institution_id.clone(),
            admin_id: self.admin_id.clone(),
            student_id: self.student_id.clone(),
            branch_id: self.branch_id.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

impl JobPayload for NotificationJob {
    const QUEUE: QueueName = QueueName::Notification;
}

/// Daily subscription-expiry sweep (scheduled, not user-triggered).
/// Carries no parameters: the sweep always works off the clock at
/// execution time, which keeps re-runs idempotent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionSweepJob {}

impl JobPayload for SubscriptionSweepJob {
    const QUEUE: QueueName = QueueName::Subscription;
}

/// Wishlist toggle request.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct WishlistJob {
    #[validate(length(min = 1))]
    pub student_id: String,
    #[validate(length(min = 1))]
    pub course_id: String,
    pub action: WishlistAction,
}

impl JobPayload for WishlistJob {
    const QUEUE: QueueName = QueueName::Wishlist;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_serde_roundtrip() {
        let job = WishlistJob {
            student_id: "st1".to_string(),
            course_id: "c1".to_string(),
            action: WishlistAction::Add,
        };
        let envelope = JobEnvelope {
            id: JobId::new(),
            name: WishlistJob::QUEUE.as_str().to_string(),
            data: job.clone(),
            opts: JobOptions::default(),
            created_at: Utc::now(),
        };

        let json = serde_json::to_string(&envelope).expect("serialize envelope");
        let decoded: JobEnvelope<WishlistJob> =
            serde_json::from_str(&json).expect("deserialize envelope");

        assert_eq!(decoded.id, envelope.id);
        assert_eq!(decoded.name, "wishlist");
        assert_eq!(decoded.data.student_id, job.student_id);
        assert_eq!(decoded.opts, envelope.opts);
    }

    #[test]
    fn payloads_validate_at_the_boundary() {
        let job = EmailJob {
            recipient: "not-an-email".to_string(),
            student_name: "A".to_string(),
            course_title: "B".to_string(),
            amount_paid: 10.0,
            order_id: "o1".to_string(),
        };
        assert!(job.validate().is_err());

        let job = WishlistJob {
            student_id: String::new(),
            course_id: "c1".to_string(),
            action: WishlistAction::Remove,
        };
        assert!(job.validate().is_err());
    }

    #[test]
    fn idempotency_keys_are_order_scoped() {
        let job = EmailJob {
            recipient: "a@example.com".to_string(),
            student_name: "A".to_string(),
            course_title: "B".to_string(),
            amount_paid: 10.0,
            order_id: "o1".to_string(),
        };
        assert_eq!(job.idempotency_key().as_deref(), Some("email:o1"));
    }
}
