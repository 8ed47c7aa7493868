//! Postgres-backed credential store.
//!
//! Each operation is one statement. The password update is a conditional
//! `UPDATE` keyed on the user id *and* the redeemed token, so two concurrent
//! redemptions of the same token cannot both succeed.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::{Span, field, instrument};
use uuid::Uuid;

use hrdesk_auth::{CredentialStore, EmployeeDirectory, NewUser, Role, StoreError, User};
use hrdesk_core::{ExternalId, UserId};

use crate::db::map_sqlx_error;

pub struct PostgresCredentialStore {
    pool: PgPool,
    employees: Arc<dyn EmployeeDirectory>,
}

impl PostgresCredentialStore {
    pub fn new(pool: PgPool, employees: Arc<dyn EmployeeDirectory>) -> Self {
        Self { pool, employees }
    }
}

const USER_COLUMNS: &str =
    "id, external_id, email, role, password_hash, reset_token, reset_token_expiry";

#[async_trait]
impl CredentialStore for PostgresCredentialStore {
    #[instrument(skip(self, email), fields(found = field::Empty), err)]
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_by_email", e))?;

        Span::current().record("found", row.is_some());
        row.map(|r| user_from_row(&r)).transpose()
    }

    async fn employee_exists(&self, email: &str) -> Result<bool, StoreError> {
        self.employees.employee_exists(email).await
    }

    #[instrument(skip(self, user), fields(external_id = %user.external_id), err)]
    async fn insert(&self, user: NewUser) -> Result<ExternalId, StoreError> {
        let external_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO users (external_id, email, role, password_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING external_id
            "#,
        )
        .bind(user.external_id.as_uuid())
        .bind(&user.email)
        .bind(user.role.as_str())
        .bind(&user.password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_user", e))?;

        Ok(ExternalId::from_uuid(external_id))
    }

    #[instrument(skip(self, email, token), fields(updated = field::Empty), err)]
    async fn set_reset_token(
        &self,
        email: &str,
        token: &str,
        expiry: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET reset_token = $2, reset_token_expiry = $3, updated_at = NOW()
            WHERE email = $1
            "#,
        )
        .bind(email)
        .bind(token)
        .bind(expiry)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("set_reset_token", e))?;

        let updated = result.rows_affected() > 0;
        Span::current().record("updated", updated);
        Ok(updated)
    }

    #[instrument(skip(self, token), err)]
    async fn find_by_valid_reset_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE reset_token = $1 AND reset_token_expiry > $2"
        ))
        .bind(token)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_by_valid_reset_token", e))?;

        row.map(|r| user_from_row(&r)).transpose()
    }

    #[instrument(skip(self, user_id, new_hash, redeemed_token), fields(user_id = %user_id), err)]
    async fn update_password_and_clear_reset(
        &self,
        user_id: UserId,
        new_hash: &str,
        redeemed_token: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $2,
                reset_token = NULL,
                reset_token_expiry = NULL,
                updated_at = NOW()
            WHERE id = $1 AND reset_token = $3 AND reset_token_expiry > $4
            "#,
        )
        .bind(user_id.get())
        .bind(new_hash)
        .bind(redeemed_token)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_password_and_clear_reset", e))?;

        Ok(result.rows_affected() == 1)
    }
}

fn user_from_row(row: &sqlx::postgres::PgRow) -> Result<User, StoreError> {
    let decode = |e: sqlx::Error| map_sqlx_error("decode_user", e);

    let role: String = row.try_get("role").map_err(decode)?;
    let role = role
        .parse::<Role>()
        .map_err(|e| StoreError::Corrupt(format!("users.role: {e}")))?;

    Ok(User {
        id: UserId::new(row.try_get("id").map_err(decode)?),
        external_id: ExternalId::from_uuid(row.try_get("external_id").map_err(decode)?),
        email: row.try_get("email").map_err(decode)?,
        role,
        password_hash: row.try_get("password_hash").map_err(decode)?,
        reset_token: row.try_get("reset_token").map_err(decode)?,
        reset_token_expiry: row.try_get("reset_token_expiry").map_err(decode)?,
    })
}
