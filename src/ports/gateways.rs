//! Payment and catalog gateway ports.
//!
//! Reached only through the action executor's external-API-call actions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::action::ActionError;
use crate::domain::foundation::ContactId;
use crate::domain::session::CatalogItem;

/// Failures talking to an external gateway.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("Gateway timed out")]
    Timeout,

    #[error("Gateway unreachable: {0}")]
    Transport(String),

    #[error("Gateway rejected the request: {0}")]
    Rejected(String),
}

impl From<GatewayError> for ActionError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Timeout => ActionError::Timeout { after_ms: 0 },
            GatewayError::Transport(msg) => ActionError::Transport(msg),
            GatewayError::Rejected(msg) => ActionError::Rejected(msg),
        }
    }
}

/// Request to start a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub idempotency_key: String,
    pub contact_id: ContactId,
    pub amount_cents: i64,
    pub currency: String,
    pub description: Option<String>,
}

/// A payment waiting for the customer to complete checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentInitiation {
    /// Gateway reference; callbacks carry it back as the correlation key.
    pub reference: String,
    pub checkout_url: String,
}

/// Port for the payment provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Starts a payment. Repeating a call with the same idempotency key must
    /// return the same initiation.
    async fn initiate(&self, request: PaymentRequest) -> Result<PaymentInitiation, GatewayError>;
}

/// Port for reading product data.
#[async_trait]
pub trait CatalogGateway: Send + Sync {
    async fn list_products(&self, category: Option<&str>) -> Result<Vec<CatalogItem>, GatewayError>;

    async fn find_product(&self, sku: &str) -> Result<Option<CatalogItem>, GatewayError>;
}
