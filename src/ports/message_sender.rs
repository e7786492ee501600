//! MessageSender port - outbound delivery to a messaging channel.

use async_trait::async_trait;

use crate::domain::foundation::{ContactId, DomainError, InvocationId};
use crate::domain::session::OutboundBody;

/// Port for delivering outbound messages.
///
/// `delivery_id` is stable across redeliveries of the same outbox entry;
/// implementations pass it to the channel as an idempotency key.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(
        &self,
        delivery_id: &InvocationId,
        contact_id: &ContactId,
        body: &OutboundBody,
    ) -> Result<(), DomainError>;
}
