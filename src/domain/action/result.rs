//! Results and failures of action invocations.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::domain::foundation::CorrelationKey;
use crate::domain::session::OutboundBody;

use super::spec::ActionType;

/// Outcome of a completed action invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    /// Variables merged into the step's namespace.
    #[serde(default)]
    pub outputs: BTreeMap<String, Value>,
    #[serde(default)]
    pub error: Option<String>,
    /// Set when the session should suspend awaiting this callback key.
    #[serde(default)]
    pub pending: Option<CorrelationKey>,
    /// Messages to stage in the outbox.
    #[serde(default)]
    pub outbound: Vec<OutboundBody>,
}

impl ActionResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            outputs: BTreeMap::new(),
            error: None,
            pending: None,
            outbound: Vec::new(),
        }
    }

    /// A business-level failure reported by the action itself (no retry).
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::ok()
        }
    }

    pub fn with_output(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.outputs.insert(key.into(), value.into());
        self
    }

    pub fn with_message(mut self, body: OutboundBody) -> Self {
        self.outbound.push(body);
        self
    }

    pub fn pending_on(mut self, key: CorrelationKey) -> Self {
        self.pending = Some(key);
        self
    }
}

/// Errors raised while invoking an action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error("Action timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Rejected by remote: {0}")]
    Rejected(String),

    #[error("Missing required inputs: {}", .0.join(", "))]
    MissingInput(Vec<String>),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("No handler registered for action '{0}'")]
    NotRegistered(ActionType),
}

impl ActionError {
    /// Timeouts and transport failures are retried per the action policy.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ActionError::Timeout { .. } | ActionError::Transport(_))
    }
}
