//! TaskQueue port - scheduled, retryable job execution.
//!
//! Delivery is at-least-once: a claimed job that is neither completed nor
//! retried before its visibility timeout becomes claimable again. Handlers
//! must therefore be idempotent.

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::foundation::{DomainError, JobId};
use crate::domain::job::Job;

/// Port for the job queue.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Enqueues `job` to become due after `delay`.
    async fn schedule(&self, delay: Duration, job: Job) -> Result<JobId, DomainError>;

    /// Enqueues `job` to be due immediately.
    async fn schedule_now(&self, job: Job) -> Result<JobId, DomainError> {
        self.schedule(Duration::ZERO, job).await
    }

    /// Claims up to `limit` due jobs, hiding them for `visibility`.
    async fn claim_due(&self, limit: u32, visibility: Duration) -> Result<Vec<Job>, DomainError>;

    /// Acknowledges a claimed job.
    async fn complete(&self, id: &JobId) -> Result<(), DomainError>;

    /// Re-queues a claimed job with its attempt counter incremented.
    async fn retry(&self, job: &Job, delay: Duration) -> Result<(), DomainError>;
}
