//! Structured job logging.

use edumart_models::JobId;
use tracing::{error, info, warn};

/// Logger carrying the job id and operation through a handler's
/// lifecycle events.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    operation: &'static str,
}

impl JobLogger {
    pub fn new(job_id: &JobId, operation: &'static str) -> Self {
        Self {
            job_id: job_id.to_string(),
            operation,
        }
    }

    pub fn start(&self, message: &str) {
        info!(job_id = %self.job_id, operation = self.operation, "Job started: {}", message);
    }

    pub fn progress(&self, message: &str) {
        info!(job_id = %self.job_id, operation = self.operation, "{}", message);
    }

    pub fn skipped(&self, message: &str) {
        warn!(job_id = %self.job_id, operation = self.operation, "Skipped: {}", message);
    }

    pub fn completed(&self, message: &str) {
        info!(job_id = %self.job_id, operation = self.operation, "Job completed: {}", message);
    }

    pub fn failed(&self, message: &str) {
        error!(job_id = %self.job_id, operation = self.operation, "Job failed: {}", message);
    }
}
