//! Postgres-backed session store.
//!
//! ## Atomicity
//!
//! The partial unique index `sessions_one_live_per_device` enforces one live
//! row per `(user_external_id, COALESCE(user_agent, ''))`. Replacement is a
//! single `INSERT ... ON CONFLICT DO UPDATE` against that index, so there is
//! no window in which the slot is empty or doubly occupied.
//!
//! Rotation runs in one transaction:
//! 1. `DELETE` the consumed row, only while it is still live
//! 2. If nothing was deleted, roll back and report `AlreadyConsumed`
//! 3. Otherwise upsert the replacement and commit
//!
//! Concurrent rotations of the same row serialize on the row lock taken by the
//! `DELETE`; the loser sees zero affected rows once the winner commits.
//!
//! Both write paths also delete the owner's expired rows inside the same
//! transaction, and `list_active` never returns them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::{Span, field, instrument};
use uuid::Uuid;

use hrdesk_auth::{NewSession, RotateOutcome, Session, SessionStore, StoreError};
use hrdesk_core::{ExternalId, SessionId};

use crate::db::map_sqlx_error;

#[derive(Debug, Clone)]
pub struct PostgresSessionStore {
    pool: PgPool,
}

impl PostgresSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const UPSERT_FOR_DEVICE: &str = r#"
    INSERT INTO sessions
        (id, user_external_id, refresh_fingerprint, user_agent, origin, expires_at)
    VALUES ($1, $2, $3, $4, $5, $6)
    ON CONFLICT (user_external_id, COALESCE(user_agent, '')) WHERE NOT revoked
    DO UPDATE SET
        id = EXCLUDED.id,
        refresh_fingerprint = EXCLUDED.refresh_fingerprint,
        origin = EXCLUDED.origin,
        expires_at = EXCLUDED.expires_at,
        created_at = NOW(),
        updated_at = NOW()
    RETURNING id, user_external_id, refresh_fingerprint, user_agent, origin,
              expires_at, revoked, created_at
"#;

async fn upsert_for_device(
    tx: &mut Transaction<'_, Postgres>,
    session: &NewSession,
) -> Result<Session, StoreError> {
    let row = sqlx::query(UPSERT_FOR_DEVICE)
        .bind(session.id.as_uuid())
        .bind(session.user_external_id.as_uuid())
        .bind(&session.refresh_fingerprint)
        .bind(session.device.user_agent.as_deref())
        .bind(session.device.origin.as_deref())
        .bind(session.expires_at)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("upsert_session", e))?;

    SessionRow::from_row(&row)
        .map(Session::from)
        .map_err(|e| map_sqlx_error("decode_session", e))
}

async fn prune_expired(
    tx: &mut Transaction<'_, Postgres>,
    user: &ExternalId,
    now: DateTime<Utc>,
) -> Result<u64, StoreError> {
    let result = sqlx::query("DELETE FROM sessions WHERE user_external_id = $1 AND expires_at <= $2")
        .bind(user.as_uuid())
        .bind(now)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("prune_expired_sessions", e))?;
    Ok(result.rows_affected())
}

#[async_trait]
impl SessionStore for PostgresSessionStore {
    #[instrument(
        skip(self, session),
        fields(user = %session.user_external_id, pruned = field::Empty),
        err
    )]
    async fn replace_for_device(&self, session: NewSession) -> Result<Session, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let pruned = prune_expired(&mut tx, &session.user_external_id, Utc::now()).await?;
        Span::current().record("pruned", pruned);
        let stored = upsert_for_device(&mut tx, &session).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(stored)
    }

    #[instrument(skip(self, user), fields(user = %user, active = field::Empty), err)]
    async fn list_active(&self, user: &ExternalId) -> Result<Vec<Session>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_external_id, refresh_fingerprint, user_agent, origin,
                   expires_at, revoked, created_at
            FROM sessions
            WHERE user_external_id = $1 AND NOT revoked AND expires_at > $2
            ORDER BY created_at ASC
            "#,
        )
        .bind(user.as_uuid())
        .bind(Utc::now())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_active", e))?;

        let mut sessions = Vec::with_capacity(rows.len());
        for row in rows {
            let session = SessionRow::from_row(&row).map_err(|e| map_sqlx_error("decode_session", e))?;
            sessions.push(session.into());
        }

        Span::current().record("active", sessions.len());
        Ok(sessions)
    }

    #[instrument(skip(self, id), fields(session_id = %id), err)]
    async fn delete_by_id(&self, id: SessionId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_session", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, user), fields(user = %user, revoked = field::Empty), err)]
    async fn revoke_all_for_user(&self, user: &ExternalId) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE sessions SET revoked = TRUE, updated_at = NOW() WHERE user_external_id = $1 AND NOT revoked",
        )
        .bind(user.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("revoke_all_sessions", e))?;

        let revoked = result.rows_affected();
        Span::current().record("revoked", revoked);
        Ok(revoked)
    }

    #[instrument(skip(self, id), fields(session_id = %id), err)]
    async fn revoke_by_id(&self, id: SessionId) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE sessions SET revoked = TRUE, updated_at = NOW() WHERE id = $1 AND NOT revoked",
        )
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("revoke_session", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(
        skip(self, consumed, replacement),
        fields(consumed = %consumed, replacement = %replacement.id, outcome = field::Empty),
        err
    )]
    async fn rotate(
        &self,
        consumed: SessionId,
        replacement: NewSession,
    ) -> Result<RotateOutcome, StoreError> {
        let span = Span::current();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let deleted = sqlx::query("DELETE FROM sessions WHERE id = $1 AND NOT revoked")
            .bind(consumed.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("consume_session", e))?;

        if deleted.rows_affected() == 0 {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            span.record("outcome", "already_consumed");
            return Ok(RotateOutcome::AlreadyConsumed);
        }

        prune_expired(&mut tx, &replacement.user_external_id, Utc::now()).await?;
        let stored = upsert_for_device(&mut tx, &replacement).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        span.record("outcome", "rotated");
        Ok(RotateOutcome::Rotated(stored))
    }
}

struct SessionRow {
    id: Uuid,
    user_external_id: Uuid,
    refresh_fingerprint: String,
    user_agent: Option<String>,
    origin: Option<String>,
    expires_at: DateTime<Utc>,
    revoked: bool,
    created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for SessionRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(SessionRow {
            id: row.try_get("id")?,
            user_external_id: row.try_get("user_external_id")?,
            refresh_fingerprint: row.try_get("refresh_fingerprint")?,
            user_agent: row.try_get("user_agent")?,
            origin: row.try_get("origin")?,
            expires_at: row.try_get("expires_at")?,
            revoked: row.try_get("revoked")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Session {
            id: SessionId::from_uuid(row.id),
            user_external_id: ExternalId::from_uuid(row.user_external_id),
            refresh_fingerprint: row.refresh_fingerprint,
            user_agent: row.user_agent,
            origin: row.origin,
            expires_at: row.expires_at,
            revoked: row.revoked,
            created_at: row.created_at,
        }
    }
}
