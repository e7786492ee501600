//! PostgreSQL implementation of OrderStore, idempotent on the action's key.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::PgPool;

use crate::domain::foundation::{ContactId, DomainError, Timestamp};
use crate::ports::{NewOrder, Order, OrderStore};

use super::session_store::{db_error, get, invalid_column};

#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn create_order(&self, order: NewOrder) -> Result<Order, DomainError> {
        let total_cents = order.unit_price_cents * i64::from(order.quantity);

        // A repeated key returns the order created the first time.
        let row = sqlx::query(
            r#"
            WITH inserted AS (
                INSERT INTO orders (
                    id, idempotency_key, session_id, contact_id, sku, quantity,
                    unit_price_cents, total_cents, currency, created_at
                ) VALUES (
                    'ORD-' || lpad(nextval('order_number_seq')::text, 4, '0'),
                    $1, $2, $3, $4, $5, $6, $7, $8, now()
                )
                ON CONFLICT (idempotency_key) DO NOTHING
                RETURNING id, contact_id, sku, quantity, total_cents, currency, created_at
            )
            SELECT * FROM inserted
            UNION ALL
            SELECT id, contact_id, sku, quantity, total_cents, currency, created_at
            FROM orders WHERE idempotency_key = $1
            LIMIT 1
            "#,
        )
        .bind(&order.idempotency_key)
        .bind(order.session_id.as_uuid())
        .bind(order.contact_id.as_str())
        .bind(&order.sku)
        .bind(order.quantity as i32)
        .bind(order.unit_price_cents)
        .bind(total_cents)
        .bind(&order.currency)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("create order"))?;

        row_to_order(row)
    }
}

fn row_to_order(row: PgRow) -> Result<Order, DomainError> {
    let quantity: i32 = get(&row, "quantity")?;
    Ok(Order {
        id: get(&row, "id")?,
        contact_id: ContactId::new(get::<String>(&row, "contact_id")?)
            .map_err(invalid_column("contact_id"))?,
        sku: get(&row, "sku")?,
        quantity: quantity as u32,
        total_cents: get(&row, "total_cents")?,
        currency: get(&row, "currency")?,
        created_at: Timestamp::from_datetime(get(&row, "created_at")?),
    })
}
