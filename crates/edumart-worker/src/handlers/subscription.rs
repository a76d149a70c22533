//! Subscription queue handler: the daily expiry sweep.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use edumart_queue::{JobDelivery, JobError, JobHandler, SubscriptionSweepJob};
use edumart_store::DocumentStore;

use crate::error::WorkerResult;
use crate::logging::JobLogger;

pub struct SubscriptionHandler {
    store: Arc<dyn DocumentStore>,
}

impl SubscriptionHandler {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    async fn process(&self, job: &JobDelivery<SubscriptionSweepJob>) -> WorkerResult<()> {
        let logger = JobLogger::new(&job.id, "subscription_sweep");
        logger.start("expiring past-due subscriptions");

        let expired = self.store.expire_due_subscriptions(Utc::now()).await?;
        logger.completed(&format!("{} subscriptions expired", expired));
        Ok(())
    }
}

#[async_trait]
impl JobHandler<SubscriptionSweepJob> for SubscriptionHandler {
    async fn handle(&self, job: JobDelivery<SubscriptionSweepJob>) -> Result<(), JobError> {
        self.process(&job).await.map_err(JobError::from)
    }
}
