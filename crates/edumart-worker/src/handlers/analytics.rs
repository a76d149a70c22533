//! Analytics queue handler: order/course completion events.

use std::sync::Arc;

use async_trait::async_trait;

use edumart_queue::{AnalyticsJob, JobDelivery, JobError, JobHandler};

use crate::error::WorkerResult;
use crate::logging::JobLogger;
use crate::mailer::{Mailer, PaymentEmail};

pub struct AnalyticsHandler {
    mailer: Arc<dyn Mailer>,
}

impl AnalyticsHandler {
    pub fn new(mailer: Arc<dyn Mailer>) -> Self {
        Self { mailer }
    }

    async fn process(&self, job: &JobDelivery<AnalyticsJob>) -> WorkerResult<()> {
        let logger = JobLogger::new(&job.id, "analytics");
        logger.start(&format!("order {} completed", job.data.order_id));

        let email = PaymentEmail {
            recipient: job.data.student_email.clone(),
            student_name: job.data.student_name.clone(),
            course_title: job.data.course_title.clone(),
            amount_paid: job.data.amount_paid,
            order_id: job.data.order_id.clone(),
        };
        self.mailer.send_payment_success(&email).await?;

        logger.completed("payment-success notification email sent");
        Ok(())
    }
}

#[async_trait]
impl JobHandler<AnalyticsJob> for AnalyticsHandler {
    async fn handle(&self, job: JobDelivery<AnalyticsJob>) -> Result<(), JobError> {
        self.process(&job).await.map_err(JobError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailer::{MailerError, MockMailer};
    use chrono::Utc;
    use edumart_models::JobId;

    fn delivery() -> JobDelivery<AnalyticsJob> {
        JobDelivery {
            id: JobId::new(),
            data: AnalyticsJob {
                order_id: "o1".to_string(),
                student_id: "st1".to_string(),
                course_id: "c1".to_string(),
                student_email: "asha@example.com".to_string(),
                student_name: "Asha".to_string(),
                course_title: "BSc Physics".to_string(),
                amount_paid: 99.0,
                created_at: Utc::now(),
            },
            attempts_made: 0,
        }
    }

    #[tokio::test]
    async fn sends_the_payment_success_email() {
        let mut mailer = MockMailer::new();
        mailer
            .expect_send_payment_success()
            .withf(|email| email.order_id == "o1" && email.recipient == "asha@example.com")
            .times(1)
            .returning(|_| Ok(()));

        let handler = AnalyticsHandler::new(Arc::new(mailer));
        handler.handle(delivery()).await.unwrap();
    }

    #[tokio::test]
    async fn mailer_failures_are_retryable() {
        let mut mailer = MockMailer::new();
        mailer
            .expect_send_payment_success()
            .returning(|_| Err(MailerError::send("smtp timeout")));

        let handler = AnalyticsHandler::new(Arc::new(mailer));
        let err = handler.handle(delivery()).await.unwrap_err();
        assert!(!err.is_terminal());
    }
}
