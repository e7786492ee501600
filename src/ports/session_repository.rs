//! Session repository port - durable, optimistically-versioned session state.
//!
//! The repository is the single source of truth for sessions. Every write
//! goes through [`SessionRepository::commit`], which atomically:
//!
//! - inserts the session (expected version 0) or updates it only if the
//!   stored version still equals the expected one
//! - appends the turn's outbox entries
//! - registers or resolves correlation keys

use async_trait::async_trait;

use crate::domain::foundation::{
    ContactId, CorrelationKey, DomainError, SessionId, Timestamp,
};
use crate::domain::session::Session;

use super::outbox_store::OutboxEntry;

/// Change to the correlation index made by a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorrelationChange {
    /// A suspending action started; callbacks with this key target the session.
    Register(CorrelationKey),
    /// The callback arrived (or the session closed); later callbacks are no-ops.
    Resolve(CorrelationKey),
}

/// Index row linking a correlation key to its session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationRecord {
    pub correlation_key: CorrelationKey,
    pub session_id: SessionId,
    pub contact_id: ContactId,
    pub created_at: Timestamp,
    pub resolved_at: Option<Timestamp>,
}

impl CorrelationRecord {
    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }
}

/// Everything a turn persists, written atomically.
#[derive(Debug, Clone)]
pub struct SessionCommit {
    /// Session carrying its new version.
    pub session: Session,
    /// Version the stored row must still have; 0 inserts a new session.
    pub expected_version: u64,
    pub outbox: Vec<OutboxEntry>,
    pub correlations: Vec<CorrelationChange>,
}

/// Repository port for session persistence.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// The contact's open (active or waiting-external) session, if any.
    async fn find_open_by_contact(
        &self,
        contact_id: &ContactId,
    ) -> Result<Option<Session>, DomainError>;

    /// The contact's most recently updated session, open or closed.
    async fn find_latest_by_contact(
        &self,
        contact_id: &ContactId,
    ) -> Result<Option<Session>, DomainError>;

    async fn find_by_id(&self, id: &SessionId) -> Result<Option<Session>, DomainError>;

    /// Atomically persists a turn.
    ///
    /// # Errors
    ///
    /// - `ConcurrencyConflict` if the stored version differs from
    ///   `expected_version`, or an insert collides with another open session
    ///   for the same contact
    /// - `DatabaseError` on storage failure
    async fn commit(&self, commit: SessionCommit) -> Result<(), DomainError>;

    /// Looks up the correlation index.
    async fn find_correlation(
        &self,
        key: &CorrelationKey,
    ) -> Result<Option<CorrelationRecord>, DomainError>;

    /// Open sessions whose last update is older than `updated_before`.
    async fn find_idle(
        &self,
        updated_before: Timestamp,
        limit: u32,
    ) -> Result<Vec<Session>, DomainError>;
}
