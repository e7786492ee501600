//! In-memory order store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::foundation::{DomainError, Timestamp};
use crate::ports::{NewOrder, Order, OrderStore};

#[derive(Default)]
pub struct InMemoryOrderStore {
    orders: Mutex<HashMap<String, Order>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn orders(&self) -> Vec<Order> {
        let mut orders: Vec<Order> = self.orders.lock().await.values().cloned().collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        orders
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create_order(&self, order: NewOrder) -> Result<Order, DomainError> {
        let mut orders = self.orders.lock().await;
        if let Some(existing) = orders.get(&order.idempotency_key) {
            return Ok(existing.clone());
        }

        let created = Order {
            id: format!("ORD-{:04}", orders.len() + 1),
            contact_id: order.contact_id,
            sku: order.sku,
            quantity: order.quantity,
            total_cents: order.unit_price_cents * i64::from(order.quantity),
            currency: order.currency,
            created_at: Timestamp::now(),
        };
        orders.insert(order.idempotency_key, created.clone());
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{ContactId, SessionId};

    fn new_order(key: &str, quantity: u32) -> NewOrder {
        NewOrder {
            idempotency_key: key.into(),
            session_id: SessionId::new(),
            contact_id: ContactId::new("+15550100").unwrap(),
            sku: "TEA-GREEN".into(),
            quantity,
            unit_price_cents: 350,
            currency: "USD".into(),
        }
    }

    #[tokio::test]
    async fn create_is_idempotent_per_key() {
        let store = InMemoryOrderStore::new();
        let a = store.create_order(new_order("k", 2)).await.unwrap();
        let b = store.create_order(new_order("k", 5)).await.unwrap();

        assert_eq!(a, b);
        assert_eq!(a.total_cents, 700);
        assert_eq!(store.orders().await.len(), 1);
    }
}
