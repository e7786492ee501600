//! Flow loading and lookup errors.

use std::fmt;
use thiserror::Error;

use crate::domain::action::ActionType;
use crate::domain::foundation::{DomainError, ErrorCode, FlowId, StepId};

/// A single structural problem found in a flow definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationProblem {
    pub step_id: Option<StepId>,
    pub message: String,
}

impl ValidationProblem {
    pub fn flow(message: impl Into<String>) -> Self {
        Self {
            step_id: None,
            message: message.into(),
        }
    }

    pub fn step(step_id: &StepId, message: impl Into<String>) -> Self {
        Self {
            step_id: Some(step_id.clone()),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.step_id {
            Some(step) => write!(f, "step '{}': {}", step, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Errors raised while loading or querying flow definitions.
///
/// Everything except `NotFound` is fatal at startup.
#[derive(Debug, Clone, Error)]
pub enum FlowError {
    #[error("Flow '{flow_id}' is invalid: {}", join(.problems))]
    Invalid {
        flow_id: String,
        problems: Vec<ValidationProblem>,
    },

    #[error("Flow '{0}' is defined more than once")]
    Duplicate(FlowId),

    #[error("Flow '{0}' not found")]
    NotFound(FlowId),

    #[error("Default flow '{0}' is not registered")]
    UnknownDefault(FlowId),

    #[error("Flow '{flow_id}' step '{step_id}' uses unregistered action '{action}'")]
    UnregisteredAction {
        flow_id: FlowId,
        step_id: StepId,
        action: ActionType,
    },

    #[error("Failed to read '{path}': {message}")]
    Io { path: String, message: String },

    #[error("Failed to parse '{path}': {message}")]
    Parse { path: String, message: String },
}

fn join(problems: &[ValidationProblem]) -> String {
    problems
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<FlowError> for DomainError {
    fn from(err: FlowError) -> Self {
        let code = match &err {
            FlowError::NotFound(_) | FlowError::UnknownDefault(_) => ErrorCode::FlowNotFound,
            _ => ErrorCode::ValidationFailed,
        };
        DomainError::new(code, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_lists_every_problem() {
        let err = FlowError::Invalid {
            flow_id: "checkout".into(),
            problems: vec![
                ValidationProblem::flow("entry step 'start' does not exist"),
                ValidationProblem::step(&StepId::new("ask").unwrap(), "no outgoing transitions"),
            ],
        };
        assert_eq!(
            err.to_string(),
            "Flow 'checkout' is invalid: entry step 'start' does not exist; step 'ask': no outgoing transitions"
        );
    }

    #[test]
    fn not_found_maps_to_flow_not_found_code() {
        let err: DomainError = FlowError::NotFound(FlowId::new("x").unwrap()).into();
        assert_eq!(err.code, ErrorCode::FlowNotFound);
    }
}
