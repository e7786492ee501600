//! OutboxStore port - post-commit side effects staged with the session.
//!
//! Implements the transactional outbox pattern for the engine:
//!
//! 1. A turn commits the session AND its outbox entries in one transaction
//!    (see `SessionRepository::commit`)
//! 2. The engine relays the new entries right after commit
//! 3. `OutboxRelay` polls for anything still pending (crash between commit
//!    and delivery) and delivers it again
//!
//! Entry ids are derived deterministically, so consumers deduplicate on them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{ContactId, DomainError, InvocationId, SessionId, Timestamp};
use crate::domain::job::Job;
use crate::domain::session::OutboundBody;

/// Delivery status of an outbox entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    /// Committed, not yet delivered
    Pending,
    /// Delivered (message sent or job scheduled)
    Delivered,
    /// Delivery failed; retried by the relay until attempts run out
    Failed,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "pending",
            OutboxStatus::Delivered => "delivered",
            OutboxStatus::Failed => "failed",
        }
    }
}

/// The side effect an entry performs once delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum OutboxEffect {
    /// Send a message to the session's contact.
    Deliver { body: OutboundBody },
    /// Put a job on the task queue, due at `run_at`.
    Schedule { job: Job, run_at: Timestamp },
}

/// An entry in the session outbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub id: InvocationId,
    pub session_id: SessionId,
    pub contact_id: ContactId,
    pub effect: OutboxEffect,
    pub status: OutboxStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: Timestamp,
}

impl OutboxEntry {
    /// Create a new pending entry.
    pub fn new(
        id: InvocationId,
        session_id: SessionId,
        contact_id: ContactId,
        effect: OutboxEffect,
    ) -> Self {
        Self {
            id,
            session_id,
            contact_id,
            effect,
            status: OutboxStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: Timestamp::now(),
        }
    }

    /// Mark the entry as delivered.
    pub fn mark_delivered(&mut self) {
        self.status = OutboxStatus::Delivered;
        self.attempts += 1;
    }

    /// Mark the entry as failed with an error.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = OutboxStatus::Failed;
        self.attempts += 1;
        self.last_error = Some(error.into());
    }
}

/// Port for reading and acknowledging outbox entries.
///
/// Writing happens inside `SessionRepository::commit`.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Entries still to deliver (pending, or failed with fewer than
    /// `max_attempts` attempts), oldest first.
    async fn pending(&self, limit: u32, max_attempts: u32) -> Result<Vec<OutboxEntry>, DomainError>;

    /// Mark an entry as delivered. Idempotent.
    async fn mark_delivered(&self, id: &InvocationId) -> Result<(), DomainError>;

    /// Record a failed delivery attempt.
    async fn mark_failed(&self, id: &InvocationId, error: &str) -> Result<(), DomainError>;
}
