//! Typed producers, one per queue.
//!
//! The HTTP layer calls these; it never builds envelopes or touches
//! streams directly.

use edumart_models::JobId;
use tracing::warn;

use crate::error::QueueResult;
use crate::job::{AnalyticsJob, EmailJob, NotificationJob, WishlistJob};
use crate::queue::JobQueue;

impl JobQueue<AnalyticsJob> {
    /// Record an order/course completion.
    ///
    /// Best-effort: analytics must never fail the request that
    /// triggered it, so enqueue errors are logged and swallowed.
    pub async fn enqueue_order_completed(&self, job: AnalyticsJob) -> Option<JobId> {
        match self.enqueue(job).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("Failed to enqueue analytics job: {}", e);
                None
            }
        }
    }
}

impl JobQueue<EmailJob> {
    /// Queue the payment-success email for a completed payment.
    pub async fn enqueue_payment_email(&self, job: EmailJob) -> QueueResult<JobId> {
        self.enqueue(job).await
    }
}

impl JobQueue<NotificationJob> {
    /// Queue a notification for persistence and room fan-out.
    pub async fn enqueue_notification(&self, job: NotificationJob) -> QueueResult<JobId> {
        self.enqueue(job).await
    }
}

impl JobQueue<WishlistJob> {
    /// Queue a wishlist toggle.
    pub async fn enqueue_wishlist_toggle(&self, job: WishlistJob) -> QueueResult<JobId> {
        self.enqueue(job).await
    }
}
