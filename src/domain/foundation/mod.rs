//! Foundation module - Shared domain primitives.
//!
//! Identifiers, timestamps, lifecycle statuses and error types that form the
//! vocabulary of the conversational flow engine.

mod errors;
mod ids;
mod session_status;
mod state_machine;
mod timestamp;

pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::{
    ContactId, CorrelationKey, FlowId, InvocationId, JobId, SessionId, StepId,
};
pub use session_status::SessionStatus;
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;
