//! Outbound email seam.
//!
//! Template rendering and delivery belong to an external service; the
//! worker only hands over the payment-success payload.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum MailerError {
    #[error("send failed: {0}")]
    Send(String),
}

impl MailerError {
    pub fn send(msg: impl Into<String>) -> Self {
        Self::Send(msg.into())
    }
}

/// Payment-success email payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentEmail {
    pub recipient: String,
    pub student_name: String,
    pub course_title: String,
    pub amount_paid: f64,
    pub order_id: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync + 'static {
    async fn send_payment_success(&self, email: &PaymentEmail) -> Result<(), MailerError>;
}

/// Mailer that only records the send. Used by the embedded deployment
/// and anywhere the delivery service is not wired up.
pub struct TracingMailer;

#[async_trait]
impl Mailer for TracingMailer {
    async fn send_payment_success(&self, email: &PaymentEmail) -> Result<(), MailerError> {
        info!(
            recipient = %email.recipient,
            order_id = %email.order_id,
            "Payment-success email dispatched"
        );
        Ok(())
    }
}
