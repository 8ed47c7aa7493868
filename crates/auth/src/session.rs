//! Per-device refresh sessions.

use chrono::{DateTime, Utc};

use hrdesk_core::{ExternalId, SessionId};

/// Where a login came from. Only `user_agent` takes part in device identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceMetadata {
    pub user_agent: Option<String>,
    pub origin: Option<String>,
}

/// One outstanding refresh capability for one (user, device) pair.
///
/// # Invariants
/// - At most one non-revoked session per `(user_external_id, user_agent)`.
/// - `refresh_fingerprint` is a salted one-way value, never the raw token.
/// - `revoked` is terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: SessionId,
    pub user_external_id: ExternalId,
    pub refresh_fingerprint: String,
    pub user_agent: Option<String>,
    pub origin: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Whether this session occupies the device slot `(user, user_agent)`.
    pub fn same_device(&self, user: &ExternalId, user_agent: Option<&str>) -> bool {
        &self.user_external_id == user && self.user_agent.as_deref() == user_agent
    }

    pub fn device(&self) -> DeviceMetadata {
        DeviceMetadata {
            user_agent: self.user_agent.clone(),
            origin: self.origin.clone(),
        }
    }
}

/// Input for creating a session.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub id: SessionId,
    pub user_external_id: ExternalId,
    pub refresh_fingerprint: String,
    pub device: DeviceMetadata,
    pub expires_at: DateTime<Utc>,
}

impl NewSession {
    pub fn new(
        user_external_id: ExternalId,
        refresh_fingerprint: String,
        device: DeviceMetadata,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: SessionId::new(),
            user_external_id,
            refresh_fingerprint,
            device,
            expires_at,
        }
    }

    pub fn into_session(self, created_at: DateTime<Utc>) -> Session {
        Session {
            id: self.id,
            user_external_id: self.user_external_id,
            refresh_fingerprint: self.refresh_fingerprint,
            user_agent: self.device.user_agent,
            origin: self.device.origin,
            expires_at: self.expires_at,
            revoked: false,
            created_at,
        }
    }
}

/// Result of [`crate::SessionStore::rotate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotateOutcome {
    /// The consumed session was removed and the replacement stored.
    Rotated(Session),
    /// The consumed session was already gone; nothing was written.
    AlreadyConsumed,
}
