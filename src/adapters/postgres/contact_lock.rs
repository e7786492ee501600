//! PostgreSQL lease table implementing ContactLock.
//!
//! One row per contact. Acquisition is a single upsert that only overwrites
//! a row whose lease expired (or that the caller already holds), so at most
//! one worker holds a live lease at any time.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::foundation::{ContactId, DomainError, Timestamp};
use crate::ports::{ContactLock, LeaseGrant};

use super::session_store::db_error;

#[derive(Clone)]
pub struct PostgresContactLock {
    pool: PgPool,
}

impl PostgresContactLock {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContactLock for PostgresContactLock {
    async fn try_acquire(
        &self,
        contact_id: &ContactId,
        holder: &str,
        ttl: Duration,
    ) -> Result<LeaseGrant, DomainError> {
        let now = Timestamp::now();
        let expires_at = now.plus(ttl);

        // Returns the previous row (if any) alongside whether we now hold it.
        let row: Option<(
            Option<String>,
            Option<String>,
            Option<chrono::DateTime<chrono::Utc>>,
        )> =
            sqlx::query_as(
                r#"
                WITH previous AS (
                    SELECT holder, expires_at FROM contact_leases WHERE contact_id = $1
                ),
                upsert AS (
                    INSERT INTO contact_leases (contact_id, holder, expires_at)
                    VALUES ($1, $2, $3)
                    ON CONFLICT (contact_id) DO UPDATE
                        SET holder = EXCLUDED.holder, expires_at = EXCLUDED.expires_at
                        WHERE contact_leases.expires_at <= $4
                           OR contact_leases.holder = EXCLUDED.holder
                    RETURNING holder
                )
                SELECT upsert.holder, previous.holder, previous.expires_at
                FROM upsert FULL OUTER JOIN previous ON TRUE
                "#,
            )
            .bind(contact_id.as_str())
            .bind(holder)
            .bind(expires_at.as_datetime())
            .bind(now.as_datetime())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("acquire contact lease"))?;

        let Some((acquired_by, previous_holder, previous_expiry)) = row else {
            // Row vanished between statements; treat as busy and let the caller retry.
            return Ok(LeaseGrant::Busy {
                holder: String::new(),
                expires_at: now,
            });
        };

        let granted = acquired_by.as_deref() == Some(holder);
        let previous = previous_holder.zip(previous_expiry.map(Timestamp::from_datetime));

        Ok(match (granted, previous) {
            (true, Some((previous_holder, expired_at))) if previous_holder != holder => {
                LeaseGrant::Reclaimed {
                    previous_holder,
                    expired_at,
                    expires_at,
                }
            }
            (true, _) => LeaseGrant::Acquired { expires_at },
            (false, Some((holder, expires_at))) => LeaseGrant::Busy { holder, expires_at },
            (false, None) => LeaseGrant::Busy {
                holder: String::new(),
                expires_at: now,
            },
        })
    }

    async fn release(&self, contact_id: &ContactId, holder: &str) -> Result<bool, DomainError> {
        let result = sqlx::query("DELETE FROM contact_leases WHERE contact_id = $1 AND holder = $2")
            .bind(contact_id.as_str())
            .bind(holder)
            .execute(&self.pool)
            .await
            .map_err(db_error("release contact lease"))?;
        Ok(result.rows_affected() > 0)
    }
}
