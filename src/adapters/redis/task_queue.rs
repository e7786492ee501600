//! Redis-backed task queue for multi-worker deployments.
//!
//! Two keys per queue:
//! - `<prefix>:jobs:due` - sorted set of job ids scored by due time (ms)
//! - `<prefix>:jobs:data` - hash of job id to JSON-encoded job
//!
//! Claiming is a Lua script that picks due ids and pushes their score past
//! the visibility timeout in one step, so two workers never claim the same
//! job while a claim is live. A worker that dies leaves the score to lapse
//! and the job is claimed again (at-least-once delivery).

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};
use tracing::warn;

use crate::domain::foundation::{DomainError, ErrorCode, JobId, Timestamp};
use crate::domain::job::Job;
use crate::ports::TaskQueue;

const CLAIM_SCRIPT: &str = r#"
local ids = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, tonumber(ARGV[3]))
if #ids == 0 then
    return {}
end
for _, id in ipairs(ids) do
    redis.call('ZADD', KEYS[1], ARGV[2], id)
end
return redis.call('HMGET', KEYS[2], unpack(ids))
"#;

#[derive(Clone)]
pub struct RedisTaskQueue {
    conn: MultiplexedConnection,
    due_key: String,
    data_key: String,
}

impl RedisTaskQueue {
    pub fn new(conn: MultiplexedConnection, key_prefix: &str) -> Self {
        Self {
            conn,
            due_key: format!("{}:jobs:due", key_prefix),
            data_key: format!("{}:jobs:data", key_prefix),
        }
    }

    async fn put(&self, job: &Job, due_at: Timestamp) -> Result<(), DomainError> {
        let payload = serde_json::to_string(job)?;
        let id = job.id.to_string();
        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .hset(&self.data_key, &id, payload)
            .ignore()
            .zadd(&self.due_key, &id, due_at.as_unix_millis())
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(queue_error)
    }
}

#[async_trait]
impl TaskQueue for RedisTaskQueue {
    async fn schedule(&self, delay: Duration, job: Job) -> Result<JobId, DomainError> {
        self.put(&job, Timestamp::now().plus(delay)).await?;
        Ok(job.id)
    }

    async fn claim_due(&self, limit: u32, visibility: Duration) -> Result<Vec<Job>, DomainError> {
        let now = Timestamp::now();
        let mut conn = self.conn.clone();
        let payloads: Vec<Option<String>> = Script::new(CLAIM_SCRIPT)
            .key(&self.due_key)
            .key(&self.data_key)
            .arg(now.as_unix_millis())
            .arg(now.plus(visibility).as_unix_millis())
            .arg(limit)
            .invoke_async(&mut conn)
            .await
            .map_err(queue_error)?;

        let mut jobs = Vec::with_capacity(payloads.len());
        for payload in payloads.into_iter().flatten() {
            match serde_json::from_str::<Job>(&payload) {
                Ok(job) => jobs.push(job),
                Err(e) => warn!(error = %e, "Dropping undecodable job payload"),
            }
        }
        Ok(jobs)
    }

    async fn complete(&self, id: &JobId) -> Result<(), DomainError> {
        let id = id.to_string();
        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .zrem(&self.due_key, &id)
            .ignore()
            .hdel(&self.data_key, &id)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(queue_error)
    }

    async fn retry(&self, job: &Job, delay: Duration) -> Result<(), DomainError> {
        self.put(&job.next_attempt(), Timestamp::now().plus(delay))
            .await
    }
}

impl RedisTaskQueue {
    /// Number of queued jobs, claimed or not.
    pub async fn len(&self) -> Result<u64, DomainError> {
        let mut conn = self.conn.clone();
        conn.zcard(&self.due_key).await.map_err(queue_error)
    }
}

fn queue_error(e: redis::RedisError) -> DomainError {
    DomainError::new(ErrorCode::QueueError, format!("Task queue unavailable: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_script_touches_both_keys() {
        assert!(CLAIM_SCRIPT.contains("ZRANGEBYSCORE"));
        assert!(CLAIM_SCRIPT.contains("HMGET"));
    }

    // Requires a running Redis; run with `cargo test -- --ignored`.
    #[tokio::test]
    #[ignore]
    async fn claims_due_jobs_once_until_visibility_lapses() {
        use crate::domain::foundation::CorrelationKey;
        use serde_json::json;

        let client = redis::Client::open("redis://127.0.0.1/").unwrap();
        let conn = client.get_multiplexed_async_connection().await.unwrap();
        let prefix = format!("convoflow-test-{}", uuid::Uuid::new_v4());
        let queue = RedisTaskQueue::new(conn, &prefix);

        let job = Job::process_callback(CorrelationKey::new("PAY-1").unwrap(), json!({}));
        queue.schedule_now(job.clone()).await.unwrap();

        let claimed = queue.claim_due(10, Duration::from_secs(30)).await.unwrap();
        assert_eq!(claimed, vec![job.clone()]);
        assert!(queue.claim_due(10, Duration::from_secs(30)).await.unwrap().is_empty());

        queue.complete(&job.id).await.unwrap();
        assert_eq!(queue.len().await.unwrap(), 0);
    }
}
