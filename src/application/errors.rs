//! Engine error taxonomy.
//!
//! Recoverable conditions (input mismatch, retryable action failures,
//! version conflicts) are handled inside the engine and only surface here
//! when they exhaust their budget.

use thiserror::Error;

use crate::domain::action::ActionError;
use crate::domain::flow::{FlowError, InputMismatchError};
use crate::domain::foundation::{ContactId, CorrelationKey, DomainError, ErrorCode};

#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// Malformed flow definition or engine assembly.
    #[error("Flow validation failed: {0}")]
    Validation(#[from] FlowError),

    #[error("Input rejected: {0}")]
    InputMismatch(#[from] InputMismatchError),

    #[error("Action timed out after {after_ms}ms")]
    ActionTimeout { after_ms: u64 },

    #[error("Action failed: {0}")]
    ActionApi(String),

    #[error("Concurrent update: {0}")]
    ConcurrencyConflict(DomainError),

    #[error("No session is waiting on correlation key {0}")]
    CorrelationNotFound(CorrelationKey),

    /// The turn tried to wait on a key another session owns.
    #[error("Correlation key taken: {0}")]
    CorrelationTaken(DomainError),

    #[error("Flow '{flow_id}' exceeded {limit} automatic transitions at step '{step_id}'")]
    FlowAuthoringLoop {
        flow_id: String,
        step_id: String,
        limit: u32,
    },

    #[error("Timed out waiting for the lease on contact {contact_id}")]
    LockTimeout { contact_id: ContactId },

    #[error("Storage error: {0}")]
    Storage(DomainError),
}

impl EngineError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, EngineError::ConcurrencyConflict(_))
    }

    /// Whether the caller should retry the operation later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::ConcurrencyConflict(_)
                | EngineError::LockTimeout { .. }
                | EngineError::Storage(_)
        )
    }
}

impl From<DomainError> for EngineError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::ConcurrencyConflict => EngineError::ConcurrencyConflict(err),
            ErrorCode::AlreadyExists => EngineError::CorrelationTaken(err),
            _ => EngineError::Storage(err),
        }
    }
}

impl From<ActionError> for EngineError {
    fn from(err: ActionError) -> Self {
        match err {
            ActionError::Timeout { after_ms } => EngineError::ActionTimeout { after_ms },
            other => EngineError::ActionApi(other.to_string()),
        }
    }
}

impl From<EngineError> for DomainError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::ConcurrencyConflict(inner)
            | EngineError::CorrelationTaken(inner)
            | EngineError::Storage(inner) => inner,
            EngineError::Validation(flow) => flow.into(),
            EngineError::LockTimeout { contact_id } => {
                DomainError::new(ErrorCode::LeaseUnavailable, "Contact lease unavailable")
                    .with_detail("contact_id", contact_id.to_string())
            }
            EngineError::CorrelationNotFound(key) => {
                DomainError::new(ErrorCode::CorrelationNotFound, "Correlation key not found")
                    .with_detail("correlation_key", key.to_string())
            }
            other => DomainError::new(ErrorCode::InternalError, other.to_string()),
        }
    }
}
