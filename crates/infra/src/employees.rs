//! Employee roster lookups (read-only).

use std::collections::HashSet;
use std::sync::RwLock;

use async_trait::async_trait;
use sqlx::PgPool;

use hrdesk_auth::{EmployeeDirectory, StoreError, normalize_email};

use crate::db::map_sqlx_error;

/// Fixed roster for dev/tests.
#[derive(Debug, Default)]
pub struct InMemoryEmployeeDirectory {
    emails: RwLock<HashSet<String>>,
}

impl InMemoryEmployeeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_emails<I, S>(emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            emails: RwLock::new(emails.into_iter().map(|e| normalize_email(e.as_ref())).collect()),
        }
    }

    pub fn add(&self, email: &str) -> Result<(), StoreError> {
        self.emails
            .write()
            .map_err(|_| poisoned())?
            .insert(normalize_email(email));
        Ok(())
    }
}

fn poisoned() -> StoreError {
    StoreError::Unavailable("employee roster lock poisoned".to_string())
}

#[async_trait]
impl EmployeeDirectory for InMemoryEmployeeDirectory {
    async fn employee_exists(&self, email: &str) -> Result<bool, StoreError> {
        let set = self.emails.read().map_err(|_| poisoned())?;
        Ok(set.contains(&normalize_email(email)))
    }
}

/// Reads the `employees` table maintained by the HR directory modules.
#[derive(Debug, Clone)]
pub struct PostgresEmployeeDirectory {
    pool: PgPool,
}

impl PostgresEmployeeDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EmployeeDirectory for PostgresEmployeeDirectory {
    async fn employee_exists(&self, email: &str) -> Result<bool, StoreError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM employees WHERE lower(email) = $1)",
        )
        .bind(normalize_email(email))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("employee_exists", e))
    }
}
