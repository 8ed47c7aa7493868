//! User credential record.

use chrono::{DateTime, Utc};

use hrdesk_core::{ExternalId, UserId};

use crate::Role;

/// A persisted user as the credential store returns it.
///
/// # Invariants
/// - `email` is unique and stored normalized (see [`normalize_email`]).
/// - `reset_token` and `reset_token_expiry` are both `Some` or both `None`.
/// - `password_hash` never leaves the backend; `Debug` redacts it.
#[derive(Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub external_id: ExternalId,
    pub email: String,
    pub role: Role,
    pub password_hash: Option<String>,
    pub reset_token: Option<String>,
    pub reset_token_expiry: Option<DateTime<Utc>>,
}

impl core::fmt::Debug for User {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("external_id", &self.external_id)
            .field("email", &self.email)
            .field("role", &self.role)
            .field("password_hash", &self.password_hash.as_ref().map(|_| "<redacted>"))
            .field("reset_token", &self.reset_token.as_ref().map(|_| "<redacted>"))
            .field("reset_token_expiry", &self.reset_token_expiry)
            .finish()
    }
}

/// Input for creating a user.
#[derive(Clone)]
pub struct NewUser {
    pub external_id: ExternalId,
    pub email: String,
    pub role: Role,
    pub password_hash: String,
}

impl core::fmt::Debug for NewUser {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NewUser")
            .field("external_id", &self.external_id)
            .field("email", &self.email)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

/// Canonical form used for storage and lookup.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
