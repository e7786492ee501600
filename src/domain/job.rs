//! Background job records executed by the worker pool.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::foundation::{ContactId, CorrelationKey, JobId, Timestamp};
use crate::domain::session::Event;

/// Work a job carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobKind {
    /// Feed an event to the contact's session.
    ProcessEvent { contact_id: ContactId, event: Event },
    /// Correlate and feed an external callback.
    ProcessCallback {
        correlation_key: CorrelationKey,
        payload: Value,
    },
}

impl JobKind {
    /// Registry key of the handler for this kind.
    pub fn name(&self) -> &'static str {
        match self {
            JobKind::ProcessEvent { .. } => "process_event",
            JobKind::ProcessCallback { .. } => "process_callback",
        }
    }
}

/// A queued unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    /// Delivery attempts already made (0 for a fresh job).
    pub attempt: u32,
    pub enqueued_at: Timestamp,
}

impl Job {
    pub fn new(kind: JobKind) -> Self {
        Self {
            id: JobId::new(),
            kind,
            attempt: 0,
            enqueued_at: Timestamp::now(),
        }
    }

    /// Job that re-feeds `event` after a lock timeout.
    pub fn process_event(contact_id: ContactId, event: Event) -> Self {
        Self::new(JobKind::ProcessEvent { contact_id, event })
    }

    pub fn process_callback(correlation_key: CorrelationKey, payload: Value) -> Self {
        Self::new(JobKind::ProcessCallback {
            correlation_key,
            payload,
        })
    }

    /// Same job, one attempt later.
    pub fn next_attempt(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self.clone()
        }
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }
}
