//! PostgreSQL implementation of InvocationLog.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::PgPool;

use crate::domain::action::{ActionResult, ActionType};
use crate::domain::foundation::{DomainError, InvocationId, Timestamp};
use crate::ports::{InvocationLog, InvocationRecord, SaveResult};

use super::session_store::{db_error, get, invalid_column};

#[derive(Clone)]
pub struct PostgresInvocationLog {
    pool: PgPool,
}

impl PostgresInvocationLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InvocationLog for PostgresInvocationLog {
    async fn get(&self, id: &InvocationId) -> Result<Option<InvocationRecord>, DomainError> {
        let row = sqlx::query(
            "SELECT invocation_id, action_type, result, recorded_at \
             FROM action_invocations WHERE invocation_id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("fetch invocation"))?;

        row.map(|row| {
            let action_type: String = get(&row, "action_type")?;
            let Json(result): Json<ActionResult> = get(&row, "result")?;
            Ok(InvocationRecord {
                invocation_id: InvocationId::from_string(get::<String>(&row, "invocation_id")?),
                action_type: serde_json::from_value::<ActionType>(Value::String(action_type))
                    .map_err(invalid_column("action_type"))?,
                result,
                recorded_at: Timestamp::from_datetime(get(&row, "recorded_at")?),
            })
        })
        .transpose()
    }

    async fn record(&self, record: InvocationRecord) -> Result<SaveResult, DomainError> {
        let result = sqlx::query(
            r#"
            INSERT INTO action_invocations (invocation_id, action_type, result, recorded_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (invocation_id) DO NOTHING
            "#,
        )
        .bind(record.invocation_id.as_str())
        .bind(record.action_type.as_str())
        .bind(Json(&record.result))
        .bind(record.recorded_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(db_error("record invocation"))?;

        Ok(if result.rows_affected() == 0 {
            SaveResult::AlreadyExists
        } else {
            SaveResult::Inserted
        })
    }

    async fn delete_before(&self, before: Timestamp) -> Result<u64, DomainError> {
        let result = sqlx::query("DELETE FROM action_invocations WHERE recorded_at < $1")
            .bind(before.as_datetime())
            .execute(&self.pool)
            .await
            .map_err(db_error("prune invocations"))?;
        Ok(result.rows_affected())
    }
}
