//! Request and response bodies of the intake endpoints.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::foundation::{ContactId, CorrelationKey, JobId, Timestamp};
use crate::domain::session::InboundMessage;

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// A normalized message from a channel connector.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundEventRequest {
    pub contact_id: ContactId,
    pub message_id: String,
    pub channel: String,
    pub payload: Value,
    /// Defaults to the time the request was accepted.
    #[serde(default)]
    pub received_at: Option<Timestamp>,
}

impl InboundEventRequest {
    pub fn into_parts(self) -> (ContactId, InboundMessage) {
        let message = InboundMessage {
            message_id: self.message_id,
            channel: self.channel,
            payload: self.payload,
            received_at: self.received_at.unwrap_or_else(Timestamp::now),
        };
        (self.contact_id, message)
    }
}

/// An asynchronous result from an external system.
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackRequest {
    pub correlation_key: CorrelationKey,
    #[serde(default)]
    pub payload: Value,
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptedResponse {
    pub job_id: JobId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}
