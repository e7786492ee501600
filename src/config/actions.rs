//! Action execution configuration (timeouts, default retry policy)

use serde::Deserialize;
use std::time::Duration;

use crate::application::ExecutorSettings;
use crate::domain::action::RetryPolicy;

use super::error::ValidationError;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ActionsConfig {
    /// Timeout for handlers that don't declare one
    pub default_timeout_ms: u64,

    /// Total attempts, including the first
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for ActionsConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            default_timeout_ms: 10_000,
            max_attempts: retry.max_attempts,
            base_delay_ms: retry.base_delay_ms,
            max_delay_ms: retry.max_delay_ms,
            multiplier: retry.multiplier,
        }
    }
}

impl ActionsConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay_ms: self.base_delay_ms,
            max_delay_ms: self.max_delay_ms,
            multiplier: self.multiplier,
        }
    }

    pub fn executor_settings(&self) -> ExecutorSettings {
        ExecutorSettings {
            default_timeout: Duration::from_millis(self.default_timeout_ms),
            retry: self.retry_policy(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.default_timeout_ms == 0 {
            return Err(ValidationError::InvalidTimeout);
        }
        if self.max_attempts == 0 {
            return Err(ValidationError::InvalidRetryPolicy("max_attempts must be at least 1"));
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(ValidationError::InvalidRetryPolicy("base_delay_ms exceeds max_delay_ms"));
        }
        if !(self.multiplier >= 1.0) {
            return Err(ValidationError::InvalidRetryPolicy("multiplier must be >= 1"));
        }
        Ok(())
    }
}
