//! Redis adapters.

mod task_queue;

pub use task_queue::RedisTaskQueue;

use redis::aio::MultiplexedConnection;

use crate::config::RedisConfig;
use crate::domain::foundation::{DomainError, ErrorCode};

pub async fn connect(config: &RedisConfig) -> Result<MultiplexedConnection, DomainError> {
    let client = redis::Client::open(config.url.as_str()).map_err(|e| {
        DomainError::new(ErrorCode::CacheError, format!("Invalid Redis URL: {}", e))
    })?;
    tokio::time::timeout(config.timeout(), client.get_multiplexed_async_connection())
        .await
        .map_err(|_| DomainError::new(ErrorCode::CacheError, "Timed out connecting to Redis"))?
        .map_err(|e| {
            DomainError::new(ErrorCode::CacheError, format!("Failed to connect to Redis: {}", e))
        })
}
