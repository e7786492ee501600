//! Message sender that records deliveries instead of sending them.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::domain::foundation::{ContactId, DomainError, ErrorCode, InvocationId};
use crate::domain::session::OutboundBody;
use crate::ports::MessageSender;

/// A delivered message.
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub delivery_id: InvocationId,
    pub contact_id: ContactId,
    pub body: OutboundBody,
}

#[derive(Default)]
struct SenderState {
    sent: Vec<SentMessage>,
    failures_remaining: u32,
}

/// Recording [`MessageSender`] for tests and local runs.
///
/// Deliveries with an already-seen delivery id are acknowledged without being
/// recorded twice, matching the dedup contract real channels offer.
#[derive(Default, Clone)]
pub struct RecordingMessageSender {
    inner: Arc<Mutex<SenderState>>,
}

impl RecordingMessageSender {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, SenderState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Configuration Methods
    // ════════════════════════════════════════════════════════════════════════════

    /// Makes the next `count` sends fail with a gateway error.
    pub fn fail_next(&self, count: u32) {
        self.state().failures_remaining = count;
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Assertions
    // ════════════════════════════════════════════════════════════════════════════

    pub fn sent(&self) -> Vec<SentMessage> {
        self.state().sent.clone()
    }

    /// Plain-text bodies delivered to one contact, in order.
    pub fn texts_for(&self, contact_id: &ContactId) -> Vec<String> {
        self.state()
            .sent
            .iter()
            .filter(|m| &m.contact_id == contact_id)
            .map(|m| m.body.to_plain_text())
            .collect()
    }

    pub fn clear(&self) {
        self.state().sent.clear();
    }
}

#[async_trait]
impl MessageSender for RecordingMessageSender {
    async fn send(
        &self,
        delivery_id: &InvocationId,
        contact_id: &ContactId,
        body: &OutboundBody,
    ) -> Result<(), DomainError> {
        let mut state = self.state();
        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            return Err(DomainError::new(
                ErrorCode::GatewayError,
                "Simulated delivery failure",
            ));
        }
        if state.sent.iter().any(|m| &m.delivery_id == delivery_id) {
            return Ok(());
        }
        state.sent.push(SentMessage {
            delivery_id: delivery_id.clone(),
            contact_id: contact_id.clone(),
            body: body.clone(),
        });
        Ok(())
    }
}

/// Sender that only logs, used when no messaging gateway is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingMessageSender;

#[async_trait]
impl MessageSender for LoggingMessageSender {
    async fn send(
        &self,
        delivery_id: &InvocationId,
        contact_id: &ContactId,
        body: &OutboundBody,
    ) -> Result<(), DomainError> {
        tracing::info!(
            delivery_id = %delivery_id,
            contact_id = %contact_id,
            text = %body.to_plain_text(),
            "Outbound message (no messaging gateway configured)"
        );
        Ok(())
    }
}
