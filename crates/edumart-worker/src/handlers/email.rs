//! Email queue handler: payment completion emails.

use std::sync::Arc;

use async_trait::async_trait;

use edumart_queue::{EmailJob, JobDelivery, JobError, JobHandler};

use crate::error::WorkerResult;
use crate::logging::JobLogger;
use crate::mailer::{Mailer, PaymentEmail};

pub struct EmailHandler {
    mailer: Arc<dyn Mailer>,
}

impl EmailHandler {
    pub fn new(mailer: Arc<dyn Mailer>) -> Self {
        Self { mailer }
    }

    async fn process(&self, job: &JobDelivery<EmailJob>) -> WorkerResult<()> {
        let logger = JobLogger::new(&job.id, "email");
        logger.start(&format!("payment email for order {}", job.data.order_id));

        let email = PaymentEmail {
            recipient: job.data.recipient.clone(),
            student_name: job.data.student_name.clone(),
            course_title: job.data.course_title.clone(),
            amount_paid: job.data.amount_paid,
            order_id: job.data.order_id.clone(),
        };
        self.mailer.send_payment_success(&email).await?;

        logger.completed("payment-success email sent");
        Ok(())
    }
}

#[async_trait]
impl JobHandler<EmailJob> for EmailHandler {
    async fn handle(&self, job: JobDelivery<EmailJob>) -> Result<(), JobError> {
        self.process(&job).await.map_err(JobError::from)
    }
}
