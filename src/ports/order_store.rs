//! OrderStore port - orders created by flows.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{ContactId, DomainError, SessionId, Timestamp};

/// Order to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub idempotency_key: String,
    pub session_id: SessionId,
    pub contact_id: ContactId,
    pub sku: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
    pub currency: String,
}

/// A stored order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub contact_id: ContactId,
    pub sku: String,
    pub quantity: u32,
    pub total_cents: i64,
    pub currency: String,
    pub created_at: Timestamp,
}

/// Port for order persistence.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Creates an order, or returns the order previously created with the
    /// same idempotency key.
    async fn create_order(&self, order: NewOrder) -> Result<Order, DomainError>;
}
