//! Static declarations every action handler publishes about itself.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::spec::ActionType;

/// What kind of side effect an action has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideEffectCategory {
    OutboundMessage,
    ExternalApiCall,
    PersistenceWrite,
}

/// How the idempotency key handed to an action is derived.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdempotencyStrategy {
    /// Unique per attempt: (session, step, version, hop).
    PerAttempt,
    /// Stable across retries of one visit to the step.
    PerStepVisit,
    /// Read from a session variable.
    Variable(String),
}

/// Declaration published by an action handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionDescriptor {
    pub action_type: ActionType,
    pub required_inputs: Vec<String>,
    pub side_effect: SideEffectCategory,
    pub idempotency: IdempotencyStrategy,
    /// The action may return a pending result that suspends the session.
    pub may_suspend: bool,
    /// Bounded timeout; external-API calls always declare one.
    pub timeout: Option<Duration>,
}

impl ActionDescriptor {
    pub fn new(action_type: ActionType, side_effect: SideEffectCategory) -> Self {
        Self {
            action_type,
            required_inputs: Vec::new(),
            side_effect,
            idempotency: IdempotencyStrategy::PerStepVisit,
            may_suspend: false,
            timeout: None,
        }
    }

    pub fn requires(mut self, inputs: &[&str]) -> Self {
        self.required_inputs = inputs.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn idempotency(mut self, strategy: IdempotencyStrategy) -> Self {
        self.idempotency = strategy;
        self
    }

    pub fn suspending(mut self) -> Self {
        self.may_suspend = true;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn is_external(&self) -> bool {
        self.side_effect == SideEffectCategory::ExternalApiCall
    }
}
