//! Notification queue handler: persist, then fan out.
//!
//! The durable write is the guarantee; the room publish is best-effort
//! and never fails the job.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use edumart_models::RealtimeEvent;
use edumart_queue::{JobDelivery, JobError, JobHandler, NotificationJob, RealtimePublisher};
use edumart_store::DocumentStore;

use crate::error::WorkerResult;
use crate::logging::JobLogger;

pub struct NotificationHandler {
    store: Arc<dyn DocumentStore>,
    publisher: Arc<dyn RealtimePublisher>,
}

impl NotificationHandler {
    pub fn new(store: Arc<dyn DocumentStore>, publisher: Arc<dyn RealtimePublisher>) -> Self {
        Self { store, publisher }
    }

    async fn process(&self, job: &JobDelivery<NotificationJob>) -> WorkerResult<()> {
        let logger = JobLogger::new(&job.id, "notification");
        logger.start(&format!("{} -> {:?}", job.data.category, job.data.recipient));

        let record = self
            .store
            .insert_notification(job.data.to_new_notification())
            .await?;

        match record.target_room() {
            Some(room) => {
                let event = RealtimeEvent::notification_created(record);
                if let Err(e) = self.publisher.emit_to_room(&room, &event).await {
                    warn!(room = %room, "Notification publish failed (record persisted): {}", e);
                }
            }
            None => {
                // No target id for the recipient type: the record is
                // persisted, there is just nowhere to broadcast.
                logger.skipped("no target id for recipient, publish skipped");
            }
        }

        logger.completed("notification persisted");
        Ok(())
    }
}

#[async_trait]
impl JobHandler<NotificationJob> for NotificationHandler {
    async fn handle(&self, job: JobDelivery<NotificationJob>) -> Result<(), JobError> {
        self.process(&job).await.map_err(JobError::from)
    }
}
