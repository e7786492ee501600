//! PostgreSQL implementation of SessionRepository and OutboxStore.
//!
//! A commit writes the session row, its correlation changes and its outbox
//! entries in one transaction. The session row is guarded by its version
//! (`UPDATE .. WHERE version = $expected`); inserting a new session races
//! on the partial unique index allowing one open session per contact.

use std::collections::VecDeque;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::domain::foundation::{
    ContactId, CorrelationKey, DomainError, ErrorCode, FlowId, InvocationId, SessionId,
    Timestamp,
};
use crate::domain::session::{Position, Session, VariableBag};
use crate::ports::{
    CorrelationChange, CorrelationRecord, OutboxEffect, OutboxEntry, OutboxStatus, OutboxStore,
    SessionCommit, SessionRepository,
};

const SESSION_COLUMNS: &str = "id, contact_id, flow_id, flow_version, status, position, \
     variables, recent_messages, closed_reason, diagnostic, version, created_at, updated_at";

#[derive(Clone)]
pub struct PostgresSessionStore {
    pool: PgPool,
}

impl PostgresSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_session(
        &self,
        filter: &str,
        bind: &str,
    ) -> Result<Option<Session>, DomainError> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE {filter}");
        let row = sqlx::query(&sql)
            .bind(bind)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("fetch session"))?;
        row.map(row_to_session).transpose()
    }

    async fn write_session(
        tx: &mut Transaction<'_, Postgres>,
        session: &Session,
        expected_version: u64,
    ) -> Result<(), DomainError> {
        if expected_version == 0 {
            let result = sqlx::query(
                r#"
                INSERT INTO sessions (
                    id, contact_id, flow_id, flow_version, status, position, variables,
                    recent_messages, closed_reason, diagnostic, version, created_at, updated_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                "#,
            )
            .bind(session.id().as_uuid())
            .bind(session.contact_id().as_str())
            .bind(session.flow_id().as_str())
            .bind(session.flow_version() as i32)
            .bind(session.status().as_str())
            .bind(Json(session.position()))
            .bind(Json(session.variables()))
            .bind(Json(session.recent_messages()))
            .bind(session.closed_reason())
            .bind(session.diagnostic())
            .bind(session.version() as i64)
            .bind(session.created_at().as_datetime())
            .bind(session.updated_at().as_datetime())
            .execute(&mut **tx)
            .await;

            return match result {
                Ok(_) => Ok(()),
                Err(e) if is_unique_violation(&e) => Err(DomainError::conflict(0, None)
                    .with_detail("contact_id", session.contact_id().as_str())),
                Err(e) => Err(db_error("insert session")(e)),
            };
        }

        let result = sqlx::query(
            r#"
            UPDATE sessions SET
                flow_version = $2,
                status = $3,
                position = $4,
                variables = $5,
                recent_messages = $6,
                closed_reason = $7,
                diagnostic = $8,
                version = $9,
                updated_at = $10
            WHERE id = $1 AND version = $11
            "#,
        )
        .bind(session.id().as_uuid())
        .bind(session.flow_version() as i32)
        .bind(session.status().as_str())
        .bind(Json(session.position()))
        .bind(Json(session.variables()))
        .bind(Json(session.recent_messages()))
        .bind(session.closed_reason())
        .bind(session.diagnostic())
        .bind(session.version() as i64)
        .bind(session.updated_at().as_datetime())
        .bind(expected_version as i64)
        .execute(&mut **tx)
        .await
        .map_err(db_error("update session"))?;

        if result.rows_affected() == 0 {
            let actual: Option<(i64,)> = sqlx::query_as("SELECT version FROM sessions WHERE id = $1")
                .bind(session.id().as_uuid())
                .fetch_optional(&mut **tx)
                .await
                .map_err(db_error("read session version"))?;
            return Err(DomainError::conflict(
                expected_version,
                actual.map(|(v,)| v as u64),
            )
            .with_detail("session_id", session.id().to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionRepository for PostgresSessionStore {
    async fn find_open_by_contact(
        &self,
        contact_id: &ContactId,
    ) -> Result<Option<Session>, DomainError> {
        self.fetch_session(
            "contact_id = $1 AND status IN ('active', 'waiting_external')",
            contact_id.as_str(),
        )
        .await
    }

    async fn find_latest_by_contact(
        &self,
        contact_id: &ContactId,
    ) -> Result<Option<Session>, DomainError> {
        self.fetch_session(
            "contact_id = $1 ORDER BY updated_at DESC LIMIT 1",
            contact_id.as_str(),
        )
        .await
    }

    async fn find_by_id(&self, id: &SessionId) -> Result<Option<Session>, DomainError> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("fetch session"))?;
        row.map(row_to_session).transpose()
    }

    async fn commit(&self, commit: SessionCommit) -> Result<(), DomainError> {
        let SessionCommit {
            session,
            expected_version,
            outbox,
            correlations,
        } = commit;
        let now = Timestamp::now();

        let mut tx = self.pool.begin().await.map_err(db_error("begin commit"))?;

        Self::write_session(&mut tx, &session, expected_version).await?;

        for change in &correlations {
            match change {
                CorrelationChange::Register(key) => {
                    // Re-registering for the same session is a no-op; any other
                    // owner aborts the whole commit.
                    let (owner,): (Uuid,) = sqlx::query_as(
                        r#"
                        INSERT INTO correlations (correlation_key, session_id, contact_id, created_at)
                        VALUES ($1, $2, $3, $4)
                        ON CONFLICT (correlation_key)
                            DO UPDATE SET correlation_key = correlations.correlation_key
                        RETURNING session_id
                        "#,
                    )
                    .bind(key.as_str())
                    .bind(session.id().as_uuid())
                    .bind(session.contact_id().as_str())
                    .bind(now.as_datetime())
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(db_error("register correlation"))?;
                    if owner != *session.id().as_uuid() {
                        return Err(DomainError::correlation_taken(
                            key.as_str(),
                            owner.to_string(),
                        ));
                    }
                }
                CorrelationChange::Resolve(key) => {
                    sqlx::query(
                        r#"
                        UPDATE correlations SET resolved_at = COALESCE(resolved_at, $2)
                        WHERE correlation_key = $1
                        "#,
                    )
                    .bind(key.as_str())
                    .bind(now.as_datetime())
                    .execute(&mut *tx)
                    .await
                    .map_err(db_error("resolve correlation"))?;
                }
            }
        }

        for entry in &outbox {
            sqlx::query(
                r#"
                INSERT INTO outbox (id, session_id, contact_id, effect, status, attempts, created_at)
                VALUES ($1, $2, $3, $4, 'pending', 0, $5)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(entry.id.as_str())
            .bind(entry.session_id.as_uuid())
            .bind(entry.contact_id.as_str())
            .bind(Json(&entry.effect))
            .bind(entry.created_at.as_datetime())
            .execute(&mut *tx)
            .await
            .map_err(db_error("insert outbox entry"))?;
        }

        tx.commit().await.map_err(|e| {
            if is_unique_violation(&e) {
                DomainError::conflict(expected_version, None)
            } else {
                db_error("commit")(e)
            }
        })
    }

    async fn find_correlation(
        &self,
        key: &CorrelationKey,
    ) -> Result<Option<CorrelationRecord>, DomainError> {
        let row = sqlx::query(
            r#"
            SELECT correlation_key, session_id, contact_id, created_at, resolved_at
            FROM correlations WHERE correlation_key = $1
            "#,
        )
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("fetch correlation"))?;

        row.map(|row| {
            Ok(CorrelationRecord {
                correlation_key: CorrelationKey::new(get::<String>(&row, "correlation_key")?)
                    .map_err(invalid_column("correlation_key"))?,
                session_id: SessionId::from_uuid(get(&row, "session_id")?),
                contact_id: ContactId::new(get::<String>(&row, "contact_id")?)
                    .map_err(invalid_column("contact_id"))?,
                created_at: Timestamp::from_datetime(get(&row, "created_at")?),
                resolved_at: get::<Option<chrono::DateTime<chrono::Utc>>>(&row, "resolved_at")?
                    .map(Timestamp::from_datetime),
            })
        })
        .transpose()
    }

    async fn find_idle(
        &self,
        updated_before: Timestamp,
        limit: u32,
    ) -> Result<Vec<Session>, DomainError> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM sessions \
             WHERE status IN ('active', 'waiting_external') AND updated_at < $1 \
             ORDER BY updated_at LIMIT $2"
        );
        let rows = sqlx::query(&sql)
            .bind(updated_before.as_datetime())
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("fetch idle sessions"))?;
        rows.into_iter().map(row_to_session).collect()
    }
}

#[async_trait]
impl OutboxStore for PostgresSessionStore {
    async fn pending(&self, limit: u32, max_attempts: u32) -> Result<Vec<OutboxEntry>, DomainError> {
        let rows = sqlx::query(
            r#"
            SELECT id, session_id, contact_id, effect, status, attempts, last_error, created_at
            FROM outbox
            WHERE status = 'pending' OR (status = 'failed' AND attempts < $2)
            ORDER BY created_at
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .bind(max_attempts as i32)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("fetch pending outbox"))?;

        rows.into_iter().map(row_to_outbox_entry).collect()
    }

    async fn mark_delivered(&self, id: &InvocationId) -> Result<(), DomainError> {
        sqlx::query(
            "UPDATE outbox SET status = 'delivered', attempts = attempts + 1 WHERE id = $1",
        )
        .bind(id.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_error("mark outbox delivered"))?;
        Ok(())
    }

    async fn mark_failed(&self, id: &InvocationId, error: &str) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            UPDATE outbox SET status = 'failed', attempts = attempts + 1, last_error = $2
            WHERE id = $1
            "#,
        )
        .bind(id.as_str())
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(db_error("mark outbox failed"))?;
        Ok(())
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Helper functions
// ════════════════════════════════════════════════════════════════════════════

pub(super) fn db_error(action: &'static str) -> impl Fn(sqlx::Error) -> DomainError {
    move |e| DomainError::new(ErrorCode::DatabaseError, format!("Failed to {}: {}", action, e))
}

pub(super) fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == "23505")
}

pub(super) fn get<'r, T>(row: &'r PgRow, column: &'static str) -> Result<T, DomainError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column).map_err(|e| {
        DomainError::new(
            ErrorCode::DatabaseError,
            format!("Failed to get {}: {}", column, e),
        )
    })
}

pub(super) fn invalid_column<E: std::fmt::Display>(
    column: &'static str,
) -> impl Fn(E) -> DomainError {
    move |e| DomainError::new(ErrorCode::DatabaseError, format!("Invalid {}: {}", column, e))
}

fn row_to_session(row: PgRow) -> Result<Session, DomainError> {
    let status: String = get(&row, "status")?;
    let Json(position): Json<Position> = get(&row, "position")?;
    let Json(variables): Json<VariableBag> = get(&row, "variables")?;
    let Json(recent_messages): Json<VecDeque<String>> = get(&row, "recent_messages")?;
    let flow_version: i32 = get(&row, "flow_version")?;
    let version: i64 = get(&row, "version")?;

    Ok(Session::reconstitute(
        SessionId::from_uuid(get(&row, "id")?),
        ContactId::new(get::<String>(&row, "contact_id")?).map_err(invalid_column("contact_id"))?,
        FlowId::new(get::<String>(&row, "flow_id")?).map_err(invalid_column("flow_id"))?,
        flow_version as u32,
        status.parse().map_err(invalid_column("status"))?,
        position,
        variables,
        recent_messages,
        get(&row, "closed_reason")?,
        get(&row, "diagnostic")?,
        version as u64,
        Timestamp::from_datetime(get(&row, "created_at")?),
        Timestamp::from_datetime(get(&row, "updated_at")?),
    ))
}

fn row_to_outbox_entry(row: PgRow) -> Result<OutboxEntry, DomainError> {
    let Json(effect): Json<OutboxEffect> = get(&row, "effect")?;
    let status = match get::<String>(&row, "status")?.as_str() {
        "pending" => OutboxStatus::Pending,
        "delivered" => OutboxStatus::Delivered,
        "failed" => OutboxStatus::Failed,
        other => {
            return Err(DomainError::new(
                ErrorCode::DatabaseError,
                format!("Invalid outbox status: {}", other),
            ))
        }
    };
    let attempts: i32 = get(&row, "attempts")?;

    Ok(OutboxEntry {
        id: InvocationId::from_string(get::<String>(&row, "id")?),
        session_id: SessionId::from_uuid(get(&row, "session_id")?),
        contact_id: ContactId::new(get::<String>(&row, "contact_id")?)
            .map_err(invalid_column("contact_id"))?,
        effect,
        status,
        attempts: attempts as u32,
        last_error: get(&row, "last_error")?,
        created_at: Timestamp::from_datetime(get(&row, "created_at")?),
    })
}
