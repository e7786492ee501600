//! In-memory task queue with due times and visibility timeouts.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::foundation::{DomainError, JobId, Timestamp};
use crate::domain::job::Job;
use crate::ports::TaskQueue;

#[derive(Debug, Clone)]
struct QueuedJob {
    job: Job,
    due_at: Timestamp,
    claimed_until: Option<Timestamp>,
}

impl QueuedJob {
    fn is_claimable(&self, now: &Timestamp) -> bool {
        !self.due_at.is_after(now)
            && self
                .claimed_until
                .map_or(true, |until| !until.is_after(now))
    }
}

/// Queue held in process memory. Jobs are claimed in due-time order.
#[derive(Default)]
pub struct InMemoryTaskQueue {
    jobs: Mutex<Vec<QueuedJob>>,
}

impl InMemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every queued job with its due time.
    pub async fn jobs(&self) -> Vec<(Job, Timestamp)> {
        self.jobs
            .lock()
            .await
            .iter()
            .map(|q| (q.job.clone(), q.due_at))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.lock().await.is_empty()
    }

    /// Removes and returns every job regardless of due time.
    pub async fn drain(&self) -> Vec<Job> {
        let mut jobs = self.jobs.lock().await;
        let mut drained: Vec<QueuedJob> = jobs.drain(..).collect();
        drained.sort_by_key(|q| q.due_at);
        drained.into_iter().map(|q| q.job).collect()
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn schedule(&self, delay: Duration, job: Job) -> Result<JobId, DomainError> {
        let id = job.id;
        self.jobs.lock().await.push(QueuedJob {
            job,
            due_at: Timestamp::now().plus(delay),
            claimed_until: None,
        });
        Ok(id)
    }

    async fn claim_due(&self, limit: u32, visibility: Duration) -> Result<Vec<Job>, DomainError> {
        let now = Timestamp::now();
        let hidden_until = now.plus(visibility);
        let mut jobs = self.jobs.lock().await;
        jobs.sort_by_key(|q| q.due_at);

        let mut claimed = Vec::new();
        for queued in jobs.iter_mut() {
            if claimed.len() >= limit as usize {
                break;
            }
            if queued.is_claimable(&now) {
                queued.claimed_until = Some(hidden_until);
                claimed.push(queued.job.clone());
            }
        }
        Ok(claimed)
    }

    async fn complete(&self, id: &JobId) -> Result<(), DomainError> {
        self.jobs.lock().await.retain(|q| &q.job.id != id);
        Ok(())
    }

    async fn retry(&self, job: &Job, delay: Duration) -> Result<(), DomainError> {
        let mut jobs = self.jobs.lock().await;
        jobs.retain(|q| q.job.id != job.id);
        jobs.push(QueuedJob {
            job: job.next_attempt(),
            due_at: Timestamp::now().plus(delay),
            claimed_until: None,
        });
        Ok(())
    }
}
