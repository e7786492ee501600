//! Events consumed by the step interpreter.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::foundation::{CorrelationKey, SessionId, StepId, Timestamp};

use super::variables::lookup_path;

/// A normalized inbound message from a messaging channel.
///
/// The payload stays opaque until it is matched against the expectation of
/// the session's current step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Channel-assigned message id, used for replay detection.
    pub message_id: String,
    pub channel: String,
    pub payload: Value,
    pub received_at: Timestamp,
}

impl InboundMessage {
    /// Extracts the text body, if the payload carries one.
    pub fn text(&self) -> Option<&str> {
        match &self.payload {
            Value::String(s) => Some(s.as_str()),
            Value::Object(map) => map.get("text").and_then(Value::as_str),
            _ => None,
        }
    }
}

/// Anything that can advance a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    InboundMessage(InboundMessage),
    ExternalCallback {
        correlation_key: CorrelationKey,
        payload: Value,
    },
    /// A scheduled retry of the action at `step_id`.
    Timeout {
        session_id: SessionId,
        step_id: StepId,
        attempt: u32,
    },
}

impl Event {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::InboundMessage(_) => "inbound_message",
            Event::ExternalCallback { .. } => "external_callback",
            Event::Timeout { .. } => "timeout",
        }
    }

    pub fn as_inbound(&self) -> Option<&InboundMessage> {
        match self {
            Event::InboundMessage(msg) => Some(msg),
            _ => None,
        }
    }

    /// Resolves an `event.<field>` reference.
    ///
    /// `type` names the event kind and `text` is the inbound text; any other
    /// field is looked up in the inbound or callback payload.
    pub fn field(&self, path: &str) -> Option<Value> {
        match path {
            "type" => return Some(Value::String(self.kind().to_string())),
            "text" => {
                if let Some(text) = self.as_inbound().and_then(InboundMessage::text) {
                    return Some(Value::String(text.to_string()));
                }
            }
            _ => {}
        }
        match self {
            Event::InboundMessage(msg) => lookup_path(&msg.payload, path).cloned(),
            Event::ExternalCallback {
                correlation_key,
                payload,
            } => {
                if path == "correlation_key" {
                    return Some(Value::String(correlation_key.to_string()));
                }
                lookup_path(payload, path).cloned()
            }
            Event::Timeout { attempt, .. } => match path {
                "attempt" => Some(Value::from(*attempt)),
                _ => None,
            },
        }
    }
}
