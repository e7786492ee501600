//! WorkerPool - claims due jobs from the task queue and runs them.
//!
//! Each poll claims up to `concurrency` due jobs with a visibility timeout
//! and runs them in parallel. Completed jobs are removed; jobs failing with
//! a transient error go back on the queue with exponential backoff until
//! `max_attempts`, after which they are dropped with an alert. A worker that
//! dies mid-job leaves the claim to expire, so the job runs again elsewhere.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::time;
use tracing::{error, info, warn};

use crate::domain::foundation::DomainError;
use crate::domain::job::Job;
use crate::ports::TaskQueue;

use super::jobs::JobRegistry;

#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Jobs claimed and run in parallel per poll.
    pub concurrency: u32,
    pub poll_interval: Duration,
    /// How long a claimed job stays invisible to other workers.
    pub visibility_timeout: Duration,
    pub max_attempts: u32,
    pub retry_base: Duration,
    pub retry_max: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            poll_interval: Duration::from_millis(100),
            visibility_timeout: Duration::from_secs(60),
            max_attempts: 5,
            retry_base: Duration::from_millis(500),
            retry_max: Duration::from_secs(60),
        }
    }
}

impl WorkerPoolConfig {
    pub fn with_concurrency(mut self, concurrency: u32) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Backoff before re-running a job that failed `attempt` times.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.retry_base.saturating_mul(factor).min(self.retry_max)
    }
}

/// What happened to a claimed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Retried,
    /// Dropped after a permanent error or exhausted attempts.
    Dropped,
}

pub struct WorkerPool {
    queue: Arc<dyn TaskQueue>,
    registry: JobRegistry,
    config: WorkerPoolConfig,
}

impl WorkerPool {
    pub fn new(queue: Arc<dyn TaskQueue>, registry: JobRegistry, config: WorkerPoolConfig) -> Self {
        Self {
            queue,
            registry,
            config,
        }
    }

    /// Polls the queue until shutdown; jobs already claimed finish first.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), DomainError> {
        let mut interval = time::interval(self.config.poll_interval);
        info!(concurrency = self.config.concurrency, "Worker pool started");

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Worker pool stopped");
                        return Ok(());
                    }
                }
                _ = interval.tick() => {
                    if let Err(e) = self.poll_once().await {
                        error!(error = %e, "Failed to claim jobs");
                    }
                }
            }
        }
    }

    /// Claims and runs one batch of due jobs.
    pub async fn poll_once(&self) -> Result<Vec<JobOutcome>, DomainError> {
        let jobs = self
            .queue
            .claim_due(self.config.concurrency, self.config.visibility_timeout)
            .await?;
        let outcomes = join_all(jobs.iter().map(|job| self.run_job(job))).await;
        outcomes.into_iter().collect()
    }

    /// Runs claimed jobs until none are due. Returns how many ran.
    pub async fn drain(&self) -> Result<usize, DomainError> {
        let mut total = 0;
        loop {
            let ran = self.poll_once().await?.len();
            if ran == 0 {
                return Ok(total);
            }
            total += ran;
        }
    }

    async fn run_job(&self, job: &Job) -> Result<JobOutcome, DomainError> {
        let Some(handler) = self.registry.get(job.kind.name()) else {
            error!(
                alert = true,
                job_id = %job.id,
                kind = job.kind.name(),
                "No handler registered for job kind; dropping"
            );
            self.queue.complete(&job.id).await?;
            return Ok(JobOutcome::Dropped);
        };

        match handler.handle(job).await {
            Ok(()) => {
                self.queue.complete(&job.id).await?;
                Ok(JobOutcome::Completed)
            }
            Err(e) if e.is_transient() && job.attempt + 1 < self.config.max_attempts => {
                let delay = self.config.retry_delay(job.attempt + 1);
                warn!(
                    job_id = %job.id,
                    kind = job.kind.name(),
                    attempt = job.attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Job failed; retrying"
                );
                self.queue.retry(job, delay).await?;
                Ok(JobOutcome::Retried)
            }
            Err(e) => {
                error!(
                    alert = true,
                    job_id = %job.id,
                    kind = job.kind.name(),
                    attempt = job.attempt + 1,
                    error = %e,
                    "Job failed permanently; dropping"
                );
                self.queue.complete(&job.id).await?;
                Ok(JobOutcome::Dropped)
            }
        }
    }
}
