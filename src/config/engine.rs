//! Engine configuration (leases, turn limits, requeue, idle sweep)

use serde::Deserialize;
use std::time::Duration;

use crate::application::{
    EngineSettings, GuardSettings, IdleSweeperConfig, InterpreterSettings,
};

use super::error::ValidationError;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Lifetime of a contact lease row in seconds
    pub lease_ttl_secs: u64,

    /// How long a turn waits for a busy contact before requeueing
    pub lock_wait_ms: u64,

    /// Pause between lease attempts while another worker holds it
    pub lock_poll_ms: u64,

    /// Identifies this worker in lease rows
    pub node_id: String,

    /// Automatic transitions allowed in one turn
    pub max_auto_transitions: u32,

    pub conflict_retries: u32,

    /// Reprompts at input steps that don't declare their own limit
    pub default_max_reprompts: u32,

    pub requeue_base_ms: u64,
    pub requeue_max_ms: u64,

    /// Inbound message ids remembered per session
    pub seen_window: usize,

    /// Sent to a contact whose session halts for review
    pub fallback_message: String,

    /// Sessions idle longer than this are abandoned
    pub idle_ttl_secs: u64,
    pub sweep_interval_secs: u64,
    pub invocation_retention_hours: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let interpreter = InterpreterSettings::default();
        Self {
            lease_ttl_secs: 30,
            lock_wait_ms: 5_000,
            lock_poll_ms: 25,
            node_id: "convoflow".to_string(),
            max_auto_transitions: interpreter.max_hops,
            conflict_retries: 3,
            default_max_reprompts: interpreter.default_max_reprompts,
            requeue_base_ms: 200,
            requeue_max_ms: 10_000,
            seen_window: 32,
            fallback_message: interpreter.fallback_message,
            idle_ttl_secs: 24 * 60 * 60,
            sweep_interval_secs: 60,
            invocation_retention_hours: 7 * 24,
        }
    }
}

impl EngineConfig {
    pub fn guard_settings(&self) -> GuardSettings {
        GuardSettings {
            lease_ttl: Duration::from_secs(self.lease_ttl_secs),
            wait_timeout: Duration::from_millis(self.lock_wait_ms),
            poll_interval: Duration::from_millis(self.lock_poll_ms),
            node_id: self.node_id.clone(),
        }
    }

    pub fn interpreter_settings(&self) -> InterpreterSettings {
        InterpreterSettings {
            max_hops: self.max_auto_transitions,
            default_max_reprompts: self.default_max_reprompts,
            fallback_message: self.fallback_message.clone(),
        }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            conflict_retries: self.conflict_retries,
            seen_window: self.seen_window,
            requeue_base: Duration::from_millis(self.requeue_base_ms),
            requeue_max: Duration::from_millis(self.requeue_max_ms),
        }
    }

    pub fn sweeper_config(&self) -> IdleSweeperConfig {
        IdleSweeperConfig {
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
            idle_ttl: Duration::from_secs(self.idle_ttl_secs),
            invocation_retention: Duration::from_secs(self.invocation_retention_hours * 3600),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.lease_ttl_secs == 0 {
            return Err(ValidationError::InvalidEngineSetting("lease_ttl_secs"));
        }
        // A lease must outlive the wait for it, or waiters reclaim live leases.
        if Duration::from_millis(self.lock_wait_ms) >= Duration::from_secs(self.lease_ttl_secs) {
            return Err(ValidationError::InvalidEngineSetting("lock_wait_ms"));
        }
        if self.lock_poll_ms == 0 {
            return Err(ValidationError::InvalidEngineSetting("lock_poll_ms"));
        }
        if self.max_auto_transitions == 0 {
            return Err(ValidationError::InvalidEngineSetting("max_auto_transitions"));
        }
        if self.requeue_base_ms > self.requeue_max_ms {
            return Err(ValidationError::InvalidEngineSetting("requeue_base_ms"));
        }
        if self.seen_window == 0 {
            return Err(ValidationError::InvalidEngineSetting("seen_window"));
        }
        if self.node_id.trim().is_empty() {
            return Err(ValidationError::MissingRequired("ENGINE__NODE_ID"));
        }
        if self.idle_ttl_secs == 0 || self.sweep_interval_secs == 0 {
            return Err(ValidationError::InvalidEngineSetting("idle_ttl_secs"));
        }
        Ok(())
    }
}
