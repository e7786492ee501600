//! PostgreSQL adapters - Database implementations for the persistence ports.
//!
//! - `PostgresSessionStore` - sessions, correlation index and outbox, committed together
//! - `PostgresContactLock` - per-contact lease table
//! - `PostgresInvocationLog` - recorded action results
//! - `PostgresOrderStore` - orders created by the `create_order` action

mod contact_lock;
mod invocation_log;
mod order_store;
mod session_store;

pub use contact_lock::PostgresContactLock;
pub use invocation_log::PostgresInvocationLog;
pub use order_store::PostgresOrderStore;
pub use session_store::PostgresSessionStore;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::DatabaseConfig;
use crate::domain::foundation::{DomainError, ErrorCode};

/// Opens the pool and, when configured, applies `migrations/`.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, DomainError> {
    let pool = PgPoolOptions::new()
        .min_connections(config.min_connections)
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout())
        .connect(&config.url)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to connect to database: {}", e),
            )
        })?;

    if config.run_migrations {
        sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to run migrations: {}", e),
            )
        })?;
    }

    Ok(pool)
}
