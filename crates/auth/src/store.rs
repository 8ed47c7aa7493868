//! Storage seams consumed by the authentication service.
//!
//! The service only ever talks to these traits. Implementations live in
//! `hrdesk-infra` (in-memory for dev/tests, Postgres for production).
//!
//! ## Atomicity
//!
//! `SessionStore::replace_for_device` and `SessionStore::rotate` must each be
//! a single atomic unit. A reader must never see the (user, device) slot empty
//! in between, nor two live sessions for it, and two rotations of the same
//! session must never both succeed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use hrdesk_core::{DomainError, ExternalId, SessionId, UserId};

use crate::session::{NewSession, RotateOutcome, Session};
use crate::user::{NewUser, User};

/// Store operation error.
///
/// These are **infrastructure errors**; the service converts them into the
/// domain taxonomy.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Connectivity failure or any unexpected backend error.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A uniqueness constraint rejected the write.
    #[error("duplicate record: {0}")]
    Duplicate(String),

    /// A stored row could not be mapped back into a domain value.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl From<StoreError> for DomainError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Duplicate(_) => DomainError::conflict("email already registered"),
            StoreError::Unavailable(msg) | StoreError::Corrupt(msg) => {
                DomainError::StoreUnavailable(msg)
            }
        }
    }
}

/// The employee roster owned by the HR directory modules.
#[async_trait]
pub trait EmployeeDirectory: Send + Sync {
    async fn employee_exists(&self, email: &str) -> Result<bool, StoreError>;
}

/// Persisted user credentials.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Delegated read against the employee roster.
    async fn employee_exists(&self, email: &str) -> Result<bool, StoreError>;

    /// Insert a user. A taken email yields `StoreError::Duplicate`.
    async fn insert(&self, user: NewUser) -> Result<ExternalId, StoreError>;

    /// Set the reset token on the row keyed by `email`. Returns whether a row
    /// was updated.
    async fn set_reset_token(
        &self,
        email: &str,
        token: &str,
        expiry: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Only a row whose expiry is strictly after `now` is returned.
    async fn find_by_valid_reset_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, StoreError>;

    /// Replace the password hash and clear both reset fields, but only while
    /// the row still holds `redeemed_token` unexpired at `now`. Returns whether
    /// the update happened; `false` means the token was redeemed concurrently.
    async fn update_password_and_clear_reset(
        &self,
        user_id: UserId,
        new_hash: &str,
        redeemed_token: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;
}

/// Persisted per-device refresh sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Atomically drop any live session for the (user, user-agent) pair and
    /// store `session` in its place.
    async fn replace_for_device(&self, session: NewSession) -> Result<Session, StoreError>;

    /// Non-revoked sessions of `user`.
    async fn list_active(&self, user: &ExternalId) -> Result<Vec<Session>, StoreError>;

    async fn delete_by_id(&self, id: SessionId) -> Result<bool, StoreError>;

    /// Revoke every live session of `user`. Idempotent; returns how many
    /// sessions changed.
    async fn revoke_all_for_user(&self, user: &ExternalId) -> Result<u64, StoreError>;

    async fn revoke_by_id(&self, id: SessionId) -> Result<bool, StoreError>;

    /// Conditionally delete `consumed` and, only if that removed a live row,
    /// replace-for-device with `replacement`. One atomic unit.
    async fn rotate(
        &self,
        consumed: SessionId,
        replacement: NewSession,
    ) -> Result<RotateOutcome, StoreError>;
}
