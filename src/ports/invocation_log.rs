//! InvocationLog port - deduplication of action invocations.
//!
//! Turns may be replayed: a worker can crash after committing but before
//! acknowledging its job, or a conflicting commit can force a re-run. Each
//! action invocation carries a deterministic id derived from
//! (session, step, version, hop); recording its result here lets a replay
//! return the recorded result instead of repeating the side effect.

use async_trait::async_trait;

use crate::domain::action::{ActionResult, ActionType};
use crate::domain::foundation::{DomainError, InvocationId, Timestamp};

/// Result of recording an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveResult {
    /// First record for this id.
    Inserted,
    /// The id was already recorded; the stored result wins.
    AlreadyExists,
}

/// A recorded action outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationRecord {
    pub invocation_id: InvocationId,
    pub action_type: ActionType,
    pub result: ActionResult,
    pub recorded_at: Timestamp,
}

/// Port for storing completed action invocations.
#[async_trait]
pub trait InvocationLog: Send + Sync {
    /// Returns the recorded invocation, if any.
    async fn get(&self, id: &InvocationId) -> Result<Option<InvocationRecord>, DomainError>;

    /// Records an invocation result. Recording the same id twice keeps the
    /// first result.
    async fn record(&self, record: InvocationRecord) -> Result<SaveResult, DomainError>;

    /// Deletes records older than `before`. Returns the number deleted.
    async fn delete_before(&self, before: Timestamp) -> Result<u64, DomainError>;
}
