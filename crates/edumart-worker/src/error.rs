//! Worker error taxonomy.

use thiserror::Error;

use edumart_queue::{JobError, QueueError};
use edumart_store::StoreError;

use crate::mailer::MailerError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Mailer error: {0}")]
    Mailer(#[from] MailerError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Actor not eligible: {0}")]
    NotEligible(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl WorkerError {
    pub fn not_eligible(msg: impl Into<String>) -> Self {
        Self::NotEligible(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether retrying can help. Infrastructure hiccups are retryable;
    /// domain rejections and missing documents are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::Mailer(_) | WorkerError::Queue(_) => true,
            WorkerError::Store(e) => matches!(
                e,
                StoreError::Unavailable(_) | StoreError::TransactionAborted(_)
            ),
            WorkerError::NotEligible(_) | WorkerError::Config(_) => false,
        }
    }
}

impl From<WorkerError> for JobError {
    fn from(e: WorkerError) -> Self {
        if e.is_retryable() {
            JobError::retryable(e.to_string())
        } else {
            JobError::terminal(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_not_found_is_terminal() {
        let err = WorkerError::from(StoreError::not_found("student st1"));
        assert!(!err.is_retryable());
        assert!(JobError::from(err).is_terminal());
    }

    #[test]
    fn transaction_aborts_are_retryable() {
        let err = WorkerError::from(StoreError::transaction_aborted("write conflict"));
        assert!(err.is_retryable());
        assert!(!JobError::from(err).is_terminal());
    }

    #[test]
    fn mailer_failures_are_retryable() {
        let err = WorkerError::from(MailerError::send("smtp timeout"));
        assert!(err.is_retryable());
    }
}
