//! Wishlist queue handler: transactional set-add/remove.

use std::sync::Arc;

use async_trait::async_trait;

use edumart_queue::{JobDelivery, JobError, JobHandler, WishlistJob};
use edumart_store::{DocumentStore, WishlistOutcome};

use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;

pub struct WishlistHandler {
    store: Arc<dyn DocumentStore>,
}

impl WishlistHandler {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    async fn process(&self, job: &JobDelivery<WishlistJob>) -> WorkerResult<()> {
        let logger = JobLogger::new(&job.id, "wishlist");
        let data = &job.data;
        logger.start(&format!("{:?} course {} for {}", data.action, data.course_id, data.student_id));

        let student = self
            .store
            .get_student(&data.student_id)
            .await?
            .ok_or_else(|| {
                WorkerError::not_eligible(format!("student {} does not exist", data.student_id))
            })?;
        if !student.is_student() {
            return Err(WorkerError::not_eligible(format!(
                "account {} is not a student",
                data.student_id
            )));
        }

        let outcome = self
            .store
            .wishlist_toggle(&data.student_id, &data.course_id, data.action)
            .await?;

        match outcome {
            WishlistOutcome::Added | WishlistOutcome::Removed => {
                logger.completed(&format!("wishlist {:?}", outcome));
            }
            WishlistOutcome::AlreadyPresent => {
                logger.progress("course already wishlisted, no-op");
            }
            WishlistOutcome::NotPresent => {
                logger.progress("course was not wishlisted, no-op");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl JobHandler<WishlistJob> for WishlistHandler {
    async fn handle(&self, job: JobDelivery<WishlistJob>) -> Result<(), JobError> {
        self.process(&job).await.map_err(JobError::from)
    }
}
