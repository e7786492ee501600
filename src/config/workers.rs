//! Worker configuration (job pool and outbox relay)

use serde::Deserialize;
use std::time::Duration;

use crate::application::{OutboxRelayConfig, WorkerPoolConfig};

use super::error::ValidationError;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    /// Jobs run in parallel by this process
    pub pool_size: u32,
    pub poll_interval_ms: u64,
    /// How long a claimed job stays hidden from other workers
    pub visibility_timeout_secs: u64,
    pub max_attempts: u32,
    pub retry_base_ms: u64,
    pub retry_max_ms: u64,

    pub outbox_poll_ms: u64,
    pub outbox_batch_size: u32,
    pub outbox_max_attempts: u32,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            pool_size: 8,
            poll_interval_ms: 100,
            visibility_timeout_secs: 60,
            max_attempts: 5,
            retry_base_ms: 500,
            retry_max_ms: 60_000,
            outbox_poll_ms: 500,
            outbox_batch_size: 100,
            outbox_max_attempts: 10,
        }
    }
}

impl WorkersConfig {
    pub fn worker_pool_config(&self) -> WorkerPoolConfig {
        WorkerPoolConfig {
            concurrency: self.pool_size,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            visibility_timeout: Duration::from_secs(self.visibility_timeout_secs),
            max_attempts: self.max_attempts,
            retry_base: Duration::from_millis(self.retry_base_ms),
            retry_max: Duration::from_millis(self.retry_max_ms),
        }
    }

    pub fn outbox_relay_config(&self) -> OutboxRelayConfig {
        OutboxRelayConfig::default()
            .with_poll_interval(Duration::from_millis(self.outbox_poll_ms))
            .with_batch_size(self.outbox_batch_size)
            .with_max_attempts(self.outbox_max_attempts)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.pool_size == 0 || self.pool_size > 256 {
            return Err(ValidationError::InvalidWorkerSetting("pool_size"));
        }
        if self.poll_interval_ms == 0 || self.outbox_poll_ms == 0 {
            return Err(ValidationError::InvalidWorkerSetting("poll_interval_ms"));
        }
        if self.visibility_timeout_secs == 0 {
            return Err(ValidationError::InvalidWorkerSetting("visibility_timeout_secs"));
        }
        if self.max_attempts == 0 || self.outbox_max_attempts == 0 {
            return Err(ValidationError::InvalidWorkerSetting("max_attempts"));
        }
        if self.outbox_batch_size == 0 {
            return Err(ValidationError::InvalidWorkerSetting("outbox_batch_size"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_convert_to_runtime_configs() {
        let config = WorkersConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.worker_pool_config().concurrency, 8);
        assert_eq!(config.outbox_relay_config().batch_size, 100);
    }

    #[test]
    fn rejects_empty_pool() {
        let config = WorkersConfig {
            pool_size: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ValidationError::InvalidWorkerSetting("pool_size"))
        );
    }
}
